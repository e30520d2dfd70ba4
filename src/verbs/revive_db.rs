//! Database revival from communal storage
//!
//! Revive runs the engine twice: the first run downloads the terminated
//! cluster's descriptor, which is needed to even build the second run's
//! instructions; the second run prepares directories and loads the remote
//! catalog onto the new hosts.

use std::collections::HashMap;
use std::sync::Arc;

use slog::{info, Logger};
use tokio::sync::Mutex;

use crate::error::OpError;
use crate::net::RequestDispatcher;
use crate::ops::https::HttpsCheckRunningDbOp;
use crate::ops::nma::{
    NmaDownloadFileOp, NmaHealthOp, NmaLoadRemoteCatalogOp, NmaNetworkProfileOp,
    NmaPrepareDirectoriesOp,
};
use crate::ops::{ClusterOp, Engine};
use crate::util;
use crate::vdb::CoordinationDatabase;
use crate::verbs::{get_initiator, DatabaseOptions};

const DESCRIPTOR_FILE_NAME: &str = "cluster_config.json";
const DESCRIPTOR_METADATA_FOLDER: &str = "metadata";
const DESCRIPTOR_DESTINATION_PATH: &str = "/tmp/desc.json";

pub const DEFAULT_LOAD_CATALOG_TIMEOUT_SECS: u64 = 3600;

#[derive(Debug, Clone)]
pub struct ReviveDbOptions {
    pub db: DatabaseOptions,
    pub communal_storage_location: String,
    pub communal_storage_parameters: HashMap<String, String>,
    pub load_catalog_timeout_secs: u64,
    /// Scrub any leftover directories before reviving into them
    pub force_removal: bool,
}

impl ReviveDbOptions {
    pub fn new() -> Self {
        Self {
            db: DatabaseOptions::new(),
            communal_storage_location: String::new(),
            communal_storage_parameters: HashMap::new(),
            load_catalog_timeout_secs: DEFAULT_LOAD_CATALOG_TIMEOUT_SECS,
            force_removal: false,
        }
    }

    fn validate_analyze(&mut self) -> Result<(), OpError> {
        util::validate_name(&self.db.db_name, "database")?;
        if self.db.raw_hosts.is_empty() {
            return Err(OpError::Precondition {
                op: "revive_db".to_string(),
                detail: "must specify a host or host list".to_string(),
            });
        }
        if self.communal_storage_location.is_empty() {
            return Err(OpError::Precondition {
                op: "revive_db".to_string(),
                detail: "must specify a communal storage location".to_string(),
            });
        }
        self.db.analyze()
    }
}

impl Default for ReviveDbOptions {
    fn default() -> Self {
        Self::new()
    }
}

/// Revive a terminated database whose data still lives in communal storage.
pub async fn revive_db(
    dispatcher: Arc<dyn RequestDispatcher>,
    logger: &Logger,
    options: &mut ReviveDbOptions,
) -> Result<CoordinationDatabase, OpError> {
    options.validate_analyze()?;

    // part 1: learn what the terminated cluster looked like
    let vdb = Arc::new(Mutex::new(CoordinationDatabase::new()));
    let mut instructions = produce_revive_instructions_part1(logger, options, &vdb)?;
    let engine = Engine::new(dispatcher.clone(), options.db.tls_bundle(), logger);
    engine.run(&mut instructions).await?;

    // part 2: rebuild the cluster model against the new hosts and load the
    // catalog onto them
    let terminated_vdb = vdb.lock().await.clone();
    let (new_vdb, old_hosts) = terminated_vdb.generate_revive_vdb(&options.db.hosts)?;
    let new_vdb = Arc::new(Mutex::new(new_vdb));

    let mut instructions =
        produce_revive_instructions_part2(logger, options, &new_vdb, old_hosts).await?;
    let engine = Engine::new(dispatcher, options.db.tls_bundle(), logger);
    engine.run(&mut instructions).await?;

    let snapshot = new_vdb.lock().await.clone();
    info!(logger, "database revived";
        "db_name" => &snapshot.name,
        "hosts" => snapshot.host_list.len()
    );
    Ok(snapshot)
}

fn produce_revive_instructions_part1(
    logger: &Logger,
    options: &ReviveDbOptions,
    vdb: &Arc<Mutex<CoordinationDatabase>>,
) -> Result<Vec<Box<dyn ClusterOp>>, OpError> {
    let hosts = options.db.hosts.clone();
    let credentials = options.db.https_credentials("revive_db")?;
    let initiator = vec![get_initiator(&hosts)?];

    // the descriptor sits under
    // <communal>/metadata/<db_name>/cluster_config.json
    let source_file_path = format!(
        "{}/{}/{}/{}",
        util::clean_path(&options.communal_storage_location),
        DESCRIPTOR_METADATA_FOLDER,
        options.db.db_name,
        DESCRIPTOR_FILE_NAME
    );

    Ok(vec![
        Box::new(NmaHealthOp::new(logger, hosts.clone())),
        Box::new(HttpsCheckRunningDbOp::new(logger, hosts, credentials)),
        Box::new(NmaDownloadFileOp::new(
            logger,
            initiator,
            &source_file_path,
            DESCRIPTOR_DESTINATION_PATH,
            options.communal_storage_parameters.clone(),
            vdb.clone(),
        )?),
    ])
}

async fn produce_revive_instructions_part2(
    logger: &Logger,
    options: &ReviveDbOptions,
    new_vdb: &Arc<Mutex<CoordinationDatabase>>,
    old_hosts: Vec<String>,
) -> Result<Vec<Box<dyn ClusterOp>>, OpError> {
    let snapshot = new_vdb.lock().await.clone();
    let hosts = snapshot.host_list.clone();

    // user storage locations are handled by their owners, not this tool;
    // exclude them from directory preparation
    let mut prepare_node_map = HashMap::with_capacity(snapshot.host_node_map.len());
    for (host, node) in &snapshot.host_node_map {
        let mut node = node.clone();
        let user_locations = node.user_storage_locations.clone();
        node.storage_locations
            .retain(|location| !user_locations.contains(location));
        prepare_node_map.insert(host.clone(), node);
    }

    Ok(vec![
        Box::new(NmaPrepareDirectoriesOp::new(
            logger,
            &prepare_node_map,
            options.force_removal,
            true,
        )?),
        Box::new(NmaNetworkProfileOp::new(logger, hosts.clone())),
        Box::new(
            NmaLoadRemoteCatalogOp::new(
                logger,
                hosts,
                old_hosts,
                &options.communal_storage_location,
                options.communal_storage_parameters.clone(),
                new_vdb.clone(),
                options.load_catalog_timeout_secs,
            )
            .await,
        ),
    ])
}
