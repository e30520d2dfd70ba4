//! Database shutdown

use std::sync::Arc;

use slog::{info, Logger};

use crate::config::ClusterConfig;
use crate::error::OpError;
use crate::net::RequestDispatcher;
use crate::ops::https::{
    HttpsGetUpNodesOp, HttpsPollNodeStateOp, HttpsShutdownDbOp, TargetNodeState,
};
use crate::ops::{ClusterOp, Engine};
use crate::vdb::CoordinationDatabase;
use crate::verbs::DatabaseOptions;

#[derive(Debug, Clone, Default)]
pub struct StopDbOptions {
    pub db: DatabaseOptions,
    /// Seconds user connections get to finish; None shuts down immediately
    pub drain_seconds: Option<i64>,
    pub timeout_secs: Option<u64>,
}

impl StopDbOptions {
    pub fn new() -> Self {
        Self::default()
    }
}

/// Stop a running database and wait until no node reports UP.
/// Returns the stopped database's name.
pub async fn stop_db(
    dispatcher: Arc<dyn RequestDispatcher>,
    logger: &Logger,
    options: &StopDbOptions,
) -> Result<String, OpError> {
    let config = ClusterConfig::read(options.db.config_directory.as_deref())?;
    let mut vdb = CoordinationDatabase::new();
    vdb.set_from_cluster_config(&config);

    let mut instructions = produce_stop_db_instructions(logger, &vdb, options)?;
    let engine = Engine::new(dispatcher, options.db.tls_bundle(), logger);
    engine.run(&mut instructions).await?;

    info!(logger, "database stopped"; "db_name" => &vdb.name);
    Ok(vdb.name)
}

fn produce_stop_db_instructions(
    logger: &Logger,
    vdb: &CoordinationDatabase,
    options: &StopDbOptions,
) -> Result<Vec<Box<dyn ClusterOp>>, OpError> {
    let hosts = vdb.host_list.clone();
    let credentials = options.db.https_credentials("stop_db")?;

    Ok(vec![
        Box::new(HttpsGetUpNodesOp::new(
            logger,
            &vdb.name,
            hosts.clone(),
            credentials.clone(),
        )),
        Box::new(HttpsShutdownDbOp::new(
            logger,
            credentials.clone(),
            options.drain_seconds,
        )?),
        Box::new(HttpsPollNodeStateOp::new(
            logger,
            hosts,
            credentials,
            TargetNodeState::Down,
            options.timeout_secs,
        )),
    ])
}
