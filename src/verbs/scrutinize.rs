//! Diagnostic-bundle collection
//!
//! Scrutinize is a pure composition over the engine: find the hosts whose
//! agent is alive, learn which node lives where, stage logs, DC tables and
//! diagnostic files on each of them, pull the tarballs back and package
//! everything into one bundle.

use std::collections::HashMap;
use std::process::Command;
use std::sync::Arc;

use chrono::Local;
use slog::{info, warn, Logger};
use tokio::sync::Mutex;

use crate::error::OpError;
use crate::net::RequestDispatcher;
use crate::ops::https::{HttpsGetSystemTablesOp, HttpsGetUpNodesOp};
use crate::ops::nma::scrutinize_tar::SCRUTINIZE_REMOTE_OUTPUT_PATH;
use crate::ops::nma::stage::LOG_AGE_HOURS_DEFAULT;
use crate::ops::nma::{
    NmaGetHealthyNodesOp, NmaGetNodesInfoOp, NmaGetScrutinizeTarOp, NmaStageDcTablesOp,
    NmaStageFilesOp, NmaStageLogsOp,
};
use crate::ops::{ClusterOp, Engine};
use crate::util;
use crate::vdb::CoordinationDatabase;
use crate::verbs::DatabaseOptions;

pub const SCRUTINIZE_OUTPUT_BASE_PATH: &str = "/tmp/scrutinize";

const BATCH_NORMAL: &str = "normal";
const BATCH_CONTEXT: &str = "context";

#[derive(Debug, Clone)]
pub struct ScrutinizeOptions {
    pub db: DatabaseOptions,
    /// Bundle id; generated by the factory
    pub id: String,
    /// Final tarball name; defaults to the id
    pub tarball_name: String,
    pub log_age_max_hours: i64,
    pub log_age_min_hours: i64,
}

impl ScrutinizeOptions {
    pub fn new() -> Self {
        let id = generate_scrutinize_id();
        Self {
            db: DatabaseOptions::new(),
            tarball_name: id.clone(),
            id,
            log_age_max_hours: LOG_AGE_HOURS_DEFAULT,
            log_age_min_hours: 0,
        }
    }

    fn validate_analyze(&mut self) -> Result<(), OpError> {
        if self.log_age_max_hours < self.log_age_min_hours {
            return Err(OpError::Precondition {
                op: "scrutinize".to_string(),
                detail: "invalid time range: max log age cannot be less than min log age"
                    .to_string(),
            });
        }
        self.db.analyze()
    }
}

impl Default for ScrutinizeOptions {
    fn default() -> Self {
        Self::new()
    }
}

fn generate_scrutinize_id() -> String {
    format!("Scrutinize.{}", Local::now().format("%Y%m%d%H%M%S"))
}

/// Collect a diagnostic bundle from every reachable host.
pub async fn scrutinize(
    dispatcher: Arc<dyn RequestDispatcher>,
    logger: &Logger,
    options: &mut ScrutinizeOptions,
) -> Result<(), OpError> {
    options.validate_analyze()?;

    // preliminary runs populate the coordination database: first the hosts
    // whose agent answers, then the node living on each of them
    let vdb = Arc::new(Mutex::new(CoordinationDatabase::new()));
    {
        let mut vdb_guard = vdb.lock().await;
        vdb_guard.host_list = options.db.hosts.clone();
    }

    let engine = Engine::new(dispatcher.clone(), options.db.tls_bundle(), logger);

    let mut health_instructions: Vec<Box<dyn ClusterOp>> = vec![Box::new(
        NmaGetHealthyNodesOp::new(logger, options.db.hosts.clone(), vdb.clone()),
    )];
    engine.run(&mut health_instructions).await?;

    let healthy_hosts = vdb.lock().await.host_list.clone();
    let mut info_instructions: Vec<Box<dyn ClusterOp>> = vec![Box::new(NmaGetNodesInfoOp::new(
        logger,
        healthy_hosts,
        &options.db.db_name,
        &options.db.catalog_prefix,
        vdb.clone(),
    ))];
    let engine = Engine::new(dispatcher.clone(), options.db.tls_bundle(), logger);
    engine.run(&mut info_instructions).await?;

    // from here on, only hosts with usable node info participate
    let snapshot = vdb.lock().await.clone();
    let mut instructions = produce_scrutinize_instructions(logger, &snapshot, options)?;
    let engine = Engine::new(dispatcher, options.db.tls_bundle(), logger);
    engine.run(&mut instructions).await?;

    if let Err(e) = tar_and_remove_directory(&options.tarball_name, &options.id, logger) {
        warn!(logger, "fail to package the scrutinize output"; "detail" => %e);
        return Err(e);
    }
    Ok(())
}

fn produce_scrutinize_instructions(
    logger: &Logger,
    vdb: &CoordinationDatabase,
    options: &ScrutinizeOptions,
) -> Result<Vec<Box<dyn ClusterOp>>, OpError> {
    let hosts = vdb.host_list.clone();
    let (host_node_name_map, host_cat_path_map) = node_info_for_scrutinize(&hosts, vdb)?;
    let credentials = options.db.https_credentials("scrutinize")?;

    Ok(vec![
        Box::new(
            HttpsGetUpNodesOp::new(
                logger,
                &options.db.db_name,
                hosts.clone(),
                credentials.clone(),
            )
            .allow_no_up_hosts(),
        ),
        Box::new(HttpsGetSystemTablesOp::new(
            logger,
            hosts.clone(),
            credentials,
        )),
        Box::new(NmaStageLogsOp::new(
            logger,
            &options.id,
            hosts.clone(),
            host_node_name_map.clone(),
            host_cat_path_map.clone(),
            options.log_age_max_hours,
            options.log_age_min_hours,
        )),
        Box::new(NmaStageDcTablesOp::new(
            logger,
            &options.id,
            hosts.clone(),
            host_node_name_map.clone(),
            host_cat_path_map.clone(),
        )),
        Box::new(NmaStageFilesOp::new(
            logger,
            &options.id,
            BATCH_NORMAL,
            hosts.clone(),
            host_node_name_map.clone(),
            host_cat_path_map.clone(),
        )),
        Box::new(NmaStageFilesOp::new(
            logger,
            &options.id,
            BATCH_CONTEXT,
            hosts.clone(),
            host_node_name_map.clone(),
            host_cat_path_map,
        )),
        Box::new(NmaGetScrutinizeTarOp::new(
            logger,
            &options.id,
            BATCH_NORMAL,
            hosts.clone(),
            host_node_name_map.clone(),
        )),
        Box::new(NmaGetScrutinizeTarOp::new(
            logger,
            &options.id,
            BATCH_CONTEXT,
            hosts,
            host_node_name_map,
        )),
    ])
}

/// Extract and validate the per-host node name and catalog path needed by
/// every staging operation.
fn node_info_for_scrutinize(
    hosts: &[String],
    vdb: &CoordinationDatabase,
) -> Result<(HashMap<String, String>, HashMap<String, String>), OpError> {
    let mut host_node_name_map = HashMap::new();
    let mut host_cat_path_map = HashMap::new();
    for host in hosts {
        let node = vdb.node_for_host(host)?;
        if node.name.is_empty() {
            return Err(OpError::Precondition {
                op: "scrutinize".to_string(),
                detail: format!("host {} has an empty node name", host),
            });
        }
        util::validate_required_abs_path(&node.catalog_path, "catalog path")?;
        host_node_name_map.insert(host.clone(), node.name.clone());
        host_cat_path_map.insert(host.clone(), node.catalog_path.clone());
    }
    Ok((host_node_name_map, host_cat_path_map))
}

/// Package the staged output into a single tarball and drop the staging
/// tree.
fn tar_and_remove_directory(
    tarball_name: &str,
    id: &str,
    logger: &Logger,
) -> Result<(), OpError> {
    let tarball_path = format!("{}/{}.tar", SCRUTINIZE_OUTPUT_BASE_PATH, tarball_name);
    let status = Command::new("tar")
        .args(["cf", &tarball_path, "-C", SCRUTINIZE_REMOTE_OUTPUT_PATH, id])
        .status()
        .map_err(|e| OpError::Internal {
            detail: format!("fail to run tar: {}", e),
        })?;
    if !status.success() {
        return Err(OpError::Internal {
            detail: format!("tar exited with status {}", status),
        });
    }
    info!(logger, "scrutinize bundle ready"; "path" => &tarball_path);

    let staging_dir = format!("{}/{}", SCRUTINIZE_REMOTE_OUTPUT_PATH, id);
    if let Err(e) = std::fs::remove_dir_all(&staging_dir) {
        warn!(logger, "fail to remove the intermediate output directory";
            "path" => &staging_dir, "detail" => %e);
    }
    Ok(())
}
