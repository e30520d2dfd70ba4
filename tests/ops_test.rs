//! Operation-level behavior against a scripted dispatcher: the catalog
//! election, quorum enforcement, the polling loop and prepare idempotence.

mod common;

use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::Mutex;

use clusterctl::error::OpError;
use clusterctl::net::TlsBundle;
use clusterctl::ops::https::HttpsPollSubscriptionStateOp;
use clusterctl::ops::nma::{NetworkProfile, NmaLoadRemoteCatalogOp, NmaReadCatalogOp};
use clusterctl::ops::https::HttpsCredentials;
use clusterctl::ops::{ClusterOp, ExecContext};
use clusterctl::vdb::CoordinationDatabase;
use common::{
    passing_result, test_logger, transport_error_result, unauthorized_result, ScriptedDispatcher,
};

const HOST_A: &str = "192.168.1.101";
const HOST_B: &str = "192.168.1.102";
const HOST_C: &str = "192.168.1.103";

fn three_host_vdb() -> Arc<Mutex<CoordinationDatabase>> {
    let mut vdb = CoordinationDatabase::new();
    vdb.set_from_create(
        "practice_db",
        &[HOST_A.to_string(), HOST_B.to_string(), HOST_C.to_string()],
        "/catalog",
        "/data",
        "",
        "",
        false,
    )
    .expect("vdb should build");
    Arc::new(Mutex::new(vdb))
}

fn descriptor(global: &str) -> String {
    format!(
        r#"{{"name":"practice_db","versions":{{"global":"{}","local":"1","session":"1","spread":"1","transaction":"1","two_phase_id":"0"}},"nodes":[],"control_mode":"pt2pt"}}"#,
        global
    )
}

#[tokio::test]
async fn test_election_clean_tie_keeps_first_seen_order() {
    // S1: globals {A:10, B:12, C:12} elect [B, C]
    let dispatcher = Arc::new(ScriptedDispatcher::single_round(vec![
        passing_result(HOST_A, &descriptor("10")),
        passing_result(HOST_B, &descriptor("12")),
        passing_result(HOST_C, &descriptor("12")),
    ]));
    let mut ctx = ExecContext::new(dispatcher, TlsBundle::default());
    let mut op = NmaReadCatalogOp::new(&test_logger(), three_host_vdb());

    op.prepare(&mut ctx).await.expect("prepare");
    op.execute(&mut ctx).await.expect("execute");

    assert_eq!(
        ctx.hosts_with_latest_catalog,
        vec![HOST_B.to_string(), HOST_C.to_string()]
    );
    let snapshot = ctx.catalog_snapshot.expect("snapshot published");
    assert_eq!(snapshot.versions.global, "12");
    assert!(ctx.warnings.is_empty());
}

#[tokio::test]
async fn test_election_partial_failure_wins_with_warning() {
    // S2: B fails at transport; C still wins and the op reports success,
    // stashing the joined failure as a warning
    let dispatcher = Arc::new(ScriptedDispatcher::single_round(vec![
        passing_result(HOST_A, &descriptor("10")),
        transport_error_result(HOST_B),
        passing_result(HOST_C, &descriptor("12")),
    ]));
    let mut ctx = ExecContext::new(dispatcher, TlsBundle::default());
    let mut op = NmaReadCatalogOp::new(&test_logger(), three_host_vdb());

    op.prepare(&mut ctx).await.expect("prepare");
    op.execute(&mut ctx).await.expect("execute succeeds despite B");

    assert_eq!(ctx.hosts_with_latest_catalog, vec![HOST_C.to_string()]);
    assert_eq!(ctx.warnings.len(), 1);
    assert!(ctx.warnings[0].to_string().contains(HOST_B));
}

#[tokio::test]
async fn test_election_total_failure_returns_aggregated_error() {
    // S3: every host errors; the op fails and names the missing catalog
    let dispatcher = Arc::new(ScriptedDispatcher::single_round(vec![
        transport_error_result(HOST_A),
        transport_error_result(HOST_B),
        transport_error_result(HOST_C),
    ]));
    let mut ctx = ExecContext::new(dispatcher, TlsBundle::default());
    let mut op = NmaReadCatalogOp::new(&test_logger(), three_host_vdb());

    op.prepare(&mut ctx).await.expect("prepare");
    let err = op.execute(&mut ctx).await.expect_err("must fail");

    assert!(ctx.hosts_with_latest_catalog.is_empty());
    assert!(err
        .to_string()
        .contains("cannot find any host with the latest catalog"));
}

#[tokio::test]
async fn test_election_unauthorized_short_circuits() {
    let dispatcher = Arc::new(ScriptedDispatcher::single_round(vec![
        unauthorized_result(HOST_A),
        passing_result(HOST_B, &descriptor("12")),
        passing_result(HOST_C, &descriptor("12")),
    ]));
    let mut ctx = ExecContext::new(dispatcher, TlsBundle::default());
    let mut op = NmaReadCatalogOp::new(&test_logger(), three_host_vdb());

    op.prepare(&mut ctx).await.expect("prepare");
    let err = op.execute(&mut ctx).await.expect_err("must fail");
    assert!(err.is_unauthorized());
    assert!(ctx.hosts_with_latest_catalog.is_empty());
}

#[tokio::test]
async fn test_prepare_is_idempotent() {
    let dispatcher = Arc::new(ScriptedDispatcher::new(Vec::new()));
    let mut ctx = ExecContext::new(dispatcher, TlsBundle::default());
    let mut op = NmaReadCatalogOp::new(&test_logger(), three_host_vdb());

    op.prepare(&mut ctx).await.expect("first prepare");
    let first: HashMap<String, (String, HashMap<String, String>)> = op
        .base()
        .cluster_request
        .request_collection
        .iter()
        .map(|(h, r)| (h.clone(), (r.path.clone(), r.query_params.clone())))
        .collect();

    op.prepare(&mut ctx).await.expect("second prepare");
    let second: HashMap<String, (String, HashMap<String, String>)> = op
        .base()
        .cluster_request
        .request_collection
        .iter()
        .map(|(h, r)| (h.clone(), (r.path.clone(), r.query_params.clone())))
        .collect();

    assert_eq!(first, second);
}

fn five_host_vdb() -> (Arc<Mutex<CoordinationDatabase>>, Vec<String>) {
    let hosts: Vec<String> = (1..=5).map(|i| format!("10.0.0.{}", i)).collect();
    let mut vdb = CoordinationDatabase::new();
    vdb.set_from_create("practice_db", &hosts, "/catalog", "/data", "", "", false)
        .expect("vdb should build");
    (Arc::new(Mutex::new(vdb)), hosts)
}

fn profile_map(hosts: &[String]) -> HashMap<String, NetworkProfile> {
    hosts
        .iter()
        .map(|h| {
            (
                h.clone(),
                NetworkProfile {
                    name: "eth0".to_string(),
                    address: h.clone(),
                    subnet: "10.0.0.0/24".to_string(),
                    netmask: "255.255.255.0".to_string(),
                    broadcast: "10.0.0.255".to_string(),
                },
            )
        })
        .collect()
}

async fn run_load_remote_catalog(success_count: usize) -> Result<(), OpError> {
    let (vdb, hosts) = five_host_vdb();
    let results = hosts
        .iter()
        .enumerate()
        .map(|(i, host)| {
            if i < success_count {
                passing_result(host, r#"{"status": 0}"#)
            } else {
                transport_error_result(host)
            }
        })
        .collect();
    let dispatcher = Arc::new(ScriptedDispatcher::single_round(results));
    let mut ctx = ExecContext::new(dispatcher, TlsBundle::default());
    ctx.network_profiles = profile_map(&hosts);

    let mut op = NmaLoadRemoteCatalogOp::new(
        &test_logger(),
        hosts.clone(),
        hosts,
        "s3://bucket/practice_db",
        HashMap::new(),
        vdb,
        60,
    )
    .await;

    op.prepare(&mut ctx).await.expect("prepare");
    op.execute(&mut ctx).await
}

#[tokio::test]
async fn test_load_remote_catalog_passes_with_quorum() {
    // S4: 3 of 5 primaries loaded; strict majority holds
    run_load_remote_catalog(3).await.expect("quorum reached");
}

#[tokio::test]
async fn test_load_remote_catalog_fails_below_quorum() {
    // S4: 2 of 5 is not a strict majority; the error names the count
    let err = run_load_remote_catalog(2).await.expect_err("must fail");
    let message = err.to_string();
    assert!(message.contains("Success count: 2"));
    assert!(
        matches!(&err, OpError::Quorum { .. })
            || matches!(&err, OpError::Multiple(list)
                if list.iter().any(|e| matches!(e, OpError::Quorum { .. })))
    );
}

fn subscriptions(states: &[&str]) -> String {
    let entries: Vec<String> = states
        .iter()
        .enumerate()
        .map(|(i, state)| {
            format!(
                r#"{{"node_name":"v_practice_db_node0001","shard_name":"segment{:04}","subscription_state":"{}","is_primary":true}}"#,
                i + 1,
                state
            )
        })
        .collect();
    format!(r#"{{"subscription_list":[{}]}}"#, entries.join(","))
}

#[tokio::test(start_paused = true)]
async fn test_poller_stops_once_subscriptions_are_active() {
    // S5: round one has an INITIALIZING entry, round two is all ACTIVE;
    // the poller dispatches exactly twice
    let round1: HashMap<_, _> = [(
        HOST_A.to_string(),
        passing_result(HOST_A, &subscriptions(&["ACTIVE", "ACTIVE", "INITIALIZING"])),
    )]
    .into();
    let round2: HashMap<_, _> = [(
        HOST_A.to_string(),
        passing_result(HOST_A, &subscriptions(&["ACTIVE", "ACTIVE", "ACTIVE"])),
    )]
    .into();
    let dispatcher = Arc::new(ScriptedDispatcher::new(vec![round1, round2]));
    let mut ctx = ExecContext::new(dispatcher.clone(), TlsBundle::default());

    let mut op = HttpsPollSubscriptionStateOp::new(
        &test_logger(),
        vec![HOST_A.to_string()],
        HttpsCredentials::default(),
        None,
    );
    op.prepare(&mut ctx).await.expect("prepare");
    op.execute(&mut ctx).await.expect("poller succeeds");

    assert_eq!(dispatcher.dispatch_count(), 2);
}

#[tokio::test(start_paused = true)]
async fn test_poller_times_out_when_condition_never_holds() {
    let round: HashMap<_, _> = [(
        HOST_A.to_string(),
        passing_result(HOST_A, &subscriptions(&["INITIALIZING"])),
    )]
    .into();
    let dispatcher = Arc::new(ScriptedDispatcher::new(vec![round]));
    let mut ctx = ExecContext::new(dispatcher.clone(), TlsBundle::default());

    let mut op = HttpsPollSubscriptionStateOp::new(
        &test_logger(),
        vec![HOST_A.to_string()],
        HttpsCredentials::default(),
        Some(5),
    );
    op.prepare(&mut ctx).await.expect("prepare");
    let err = op.execute(&mut ctx).await.expect_err("must time out");

    assert!(err.to_string().contains("not all subscriptions are ACTIVE"));
    // deadline 5 s with a 3 s interval: rounds at t=0, 3 and 6
    assert_eq!(dispatcher.dispatch_count(), 3);
}
