//! Database removal

use std::sync::Arc;

use slog::{info, warn, Logger};

use crate::config::{remove_config_file, ClusterConfig};
use crate::error::OpError;
use crate::net::RequestDispatcher;
use crate::ops::https::HttpsCheckRunningDbOp;
use crate::ops::nma::{NmaDeleteDirectoriesOp, NmaHealthOp};
use crate::ops::{ClusterOp, Engine};
use crate::vdb::CoordinationDatabase;
use crate::verbs::DatabaseOptions;

#[derive(Debug, Clone, Default)]
pub struct DropDbOptions {
    pub db: DatabaseOptions,
    /// Remove directories even when they still hold files
    pub force_delete: bool,
}

impl DropDbOptions {
    pub fn new() -> Self {
        Self::default()
    }
}

/// Drop a stopped database: verify nothing is running, then delete its
/// directories on every host. The cluster config file goes with it.
pub async fn drop_db(
    dispatcher: Arc<dyn RequestDispatcher>,
    logger: &Logger,
    options: &DropDbOptions,
) -> Result<(), OpError> {
    let config = ClusterConfig::read(options.db.config_directory.as_deref())?;
    let mut vdb = CoordinationDatabase::new();
    vdb.set_from_cluster_config(&config);

    let mut instructions = produce_drop_db_instructions(logger, &vdb, options)?;
    let engine = Engine::new(dispatcher, options.db.tls_bundle(), logger);
    engine.run(&mut instructions).await?;

    // the database is gone; a stale config file would only mislead
    if let Err(e) = remove_config_file(options.db.config_directory.as_deref()) {
        warn!(logger, "fail to remove the cluster config file, please clean it up manually";
            "detail" => %e);
    }
    info!(logger, "database dropped"; "db_name" => &vdb.name);
    Ok(())
}

fn produce_drop_db_instructions(
    logger: &Logger,
    vdb: &CoordinationDatabase,
    options: &DropDbOptions,
) -> Result<Vec<Box<dyn ClusterOp>>, OpError> {
    let hosts = vdb.host_list.clone();
    let credentials = options.db.https_credentials("drop_db")?;

    Ok(vec![
        Box::new(NmaHealthOp::new(logger, hosts.clone())),
        Box::new(HttpsCheckRunningDbOp::new(logger, hosts, credentials)),
        Box::new(NmaDeleteDirectoriesOp::new(
            logger,
            vdb,
            options.force_delete,
        )?),
    ])
}
