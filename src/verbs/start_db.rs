//! Database startup from a stopped state

use std::sync::Arc;

use slog::{info, Logger};
use tokio::sync::Mutex;

use crate::config::ClusterConfig;
use crate::error::OpError;
use crate::net::RequestDispatcher;
use crate::ops::https::{HttpsPollNodeStateOp, HttpsPollSubscriptionStateOp, TargetNodeState};
use crate::ops::nma::{
    ConfigFile, NmaDownloadConfigOp, NmaHealthOp, NmaReadCatalogOp, NmaStartNodeOp,
    NmaUploadConfigOp,
};
use crate::ops::{ClusterOp, Engine};
use crate::vdb::CoordinationDatabase;
use crate::verbs::DatabaseOptions;

#[derive(Debug, Clone, Default)]
pub struct StartDbOptions {
    pub db: DatabaseOptions,
    pub timeout_node_startup_secs: Option<u64>,
}

impl StartDbOptions {
    pub fn new() -> Self {
        Self::default()
    }
}

/// Start a stopped database: elect the hosts holding the freshest catalog,
/// spread their config to everyone, start every node and wait for UP.
pub async fn start_db(
    dispatcher: Arc<dyn RequestDispatcher>,
    logger: &Logger,
    options: &StartDbOptions,
) -> Result<(), OpError> {
    let config = ClusterConfig::read(options.db.config_directory.as_deref())?;
    let mut vdb = CoordinationDatabase::new();
    vdb.set_from_cluster_config(&config);
    let is_eon = vdb.is_eon;
    let db_name = vdb.name.clone();
    let vdb = Arc::new(Mutex::new(vdb));

    let mut instructions = produce_start_db_instructions(logger, &vdb, options, is_eon).await?;
    let engine = Engine::new(dispatcher, options.db.tls_bundle(), logger);
    engine.run(&mut instructions).await?;

    info!(logger, "database started"; "db_name" => db_name);
    Ok(())
}

async fn produce_start_db_instructions(
    logger: &Logger,
    vdb: &Arc<Mutex<CoordinationDatabase>>,
    options: &StartDbOptions,
    is_eon: bool,
) -> Result<Vec<Box<dyn ClusterOp>>, OpError> {
    let hosts = vdb.lock().await.host_list.clone();
    let credentials = options.db.https_credentials("start_db")?;

    let database_conf = crate::ops::nma::config_files::ConfigContent::default();
    let spread_conf = crate::ops::nma::config_files::ConfigContent::default();

    let mut instructions: Vec<Box<dyn ClusterOp>> = vec![
        Box::new(NmaHealthOp::new(logger, hosts.clone())),
        // the election decides which catalog copy the cluster restarts from
        Box::new(NmaReadCatalogOp::new(logger, vdb.clone())),
        // source hosts resolve to an election winner inside the op
        Box::new(NmaDownloadConfigOp::new(
            logger,
            "NmaDownloadDatabaseConfigOp",
            Vec::new(),
            ConfigFile::Database,
            database_conf.clone(),
            None,
        )),
        Box::new(NmaUploadConfigOp::new(
            logger,
            "NmaUploadDatabaseConfigOp",
            hosts.clone(),
            ConfigFile::Database,
            database_conf,
        )),
        Box::new(NmaDownloadConfigOp::new(
            logger,
            "NmaDownloadSpreadConfigOp",
            Vec::new(),
            ConfigFile::Spread,
            spread_conf.clone(),
            None,
        )),
        Box::new(NmaUploadConfigOp::new(
            logger,
            "NmaUploadSpreadConfigOp",
            hosts.clone(),
            ConfigFile::Spread,
            spread_conf,
        )),
        Box::new(NmaStartNodeOp::new(logger, hosts.clone())),
        Box::new(HttpsPollNodeStateOp::new(
            logger,
            hosts.clone(),
            credentials.clone(),
            TargetNodeState::Up,
            options.timeout_node_startup_secs,
        )),
    ];

    if is_eon {
        instructions.push(Box::new(HttpsPollSubscriptionStateOp::new(
            logger,
            hosts,
            credentials,
            options.timeout_node_startup_secs,
        )));
    }

    Ok(instructions)
}
