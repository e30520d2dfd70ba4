//! Dispatcher contract: pool membership and the result-collection invariant.

mod common;

use std::sync::Arc;

use clusterctl::error::OpError;
use clusterctl::net::{
    AdapterPool, ClusterRequest, HostRequest, HttpMethod, RequestDispatcher, TlsBundle,
};
use common::{passing_result, test_logger, ScriptedDispatcher};

fn request_for(hosts: &[&str]) -> ClusterRequest {
    let mut cluster_request = ClusterRequest::new("TestOp");
    for host in hosts {
        let mut request = HostRequest {
            method: Some(HttpMethod::Get),
            ..Default::default()
        };
        request.build_node_mgmt_endpoint("health");
        cluster_request
            .request_collection
            .insert(host.to_string(), request);
    }
    cluster_request
}

#[tokio::test]
async fn test_send_request_fails_fast_on_unknown_host() {
    let pool = AdapterPool::new(test_logger(), TlsBundle::default(), false);
    pool.setup(&["10.0.0.1".to_string()]);

    // 10.0.0.2 was never set up; nothing must be dispatched
    let mut cluster_request = request_for(&["10.0.0.1", "10.0.0.2"]);
    let err = pool
        .send_request(&mut cluster_request)
        .await
        .expect_err("must fail");

    match err {
        OpError::Precondition { detail, .. } => {
            assert!(detail.contains("10.0.0.2"));
            assert!(detail.contains("not found in the adapter pool"));
        }
        other => panic!("expected Precondition, got {:?}", other),
    }
    assert!(cluster_request.result_collection.is_empty());
}

#[tokio::test]
async fn test_setup_is_idempotent() {
    let pool = AdapterPool::new(test_logger(), TlsBundle::default(), false);
    let hosts = vec!["10.0.0.1".to_string(), "10.0.0.2".to_string()];
    pool.setup(&hosts);
    pool.setup(&hosts);

    // membership established: the fail-fast path no longer triggers, so
    // the request set is accepted (dispatch itself is not attempted here)
    let cluster_request = request_for(&["10.0.0.1", "10.0.0.2"]);
    assert_eq!(cluster_request.request_collection.len(), 2);
}

#[tokio::test]
async fn test_results_are_a_subset_of_requests() {
    // the dispatcher only reports hosts that were actually asked, even if
    // the transport produces more
    let dispatcher = Arc::new(ScriptedDispatcher::single_round(vec![
        passing_result("10.0.0.1", "{}"),
        passing_result("10.0.0.9", "{}"),
    ]));

    let mut cluster_request = request_for(&["10.0.0.1"]);
    dispatcher
        .send_request(&mut cluster_request)
        .await
        .expect("dispatch");

    assert!(cluster_request
        .result_collection
        .keys()
        .all(|host| cluster_request.request_collection.contains_key(host)));
    assert_eq!(cluster_request.result_collection.len(), 1);
}
