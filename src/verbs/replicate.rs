//! Replication toward another database

use std::sync::Arc;

use slog::{info, Logger};

use crate::config::ClusterConfig;
use crate::error::OpError;
use crate::net::RequestDispatcher;
use crate::ops::https::{HttpsGetUpNodesOp, HttpsStartReplicationOp};
use crate::ops::{ClusterOp, Engine};
use crate::vdb::CoordinationDatabase;
use crate::verbs::DatabaseOptions;

#[derive(Debug, Clone, Default)]
pub struct ReplicateOptions {
    pub db: DatabaseOptions,
    pub target_db: String,
    /// Target database entry host
    pub target_hosts: String,
    pub target_username: String,
    pub target_password: Option<String>,
    /// Named TLS config on the source side; empty uses the server default
    pub tls_config: String,
    /// Replicate from this sandbox; empty means the main cluster
    pub sandbox: String,
}

impl ReplicateOptions {
    pub fn new() -> Self {
        Self::default()
    }

    fn validate(&self) -> Result<(), OpError> {
        if self.target_db.is_empty() || self.target_hosts.is_empty() {
            return Err(OpError::Precondition {
                op: "replicate".to_string(),
                detail: "must specify a target database and a target host".to_string(),
            });
        }
        Ok(())
    }
}

/// Start replication from one up source host toward the target database.
pub async fn replicate(
    dispatcher: Arc<dyn RequestDispatcher>,
    logger: &Logger,
    options: &ReplicateOptions,
) -> Result<(), OpError> {
    options.validate()?;

    let config = ClusterConfig::read(options.db.config_directory.as_deref())?;
    let mut vdb = CoordinationDatabase::new();
    vdb.set_from_cluster_config(&config);

    let mut instructions = produce_replicate_instructions(logger, &vdb, options)?;
    let engine = Engine::new(dispatcher, options.db.tls_bundle(), logger);
    engine.run(&mut instructions).await?;

    info!(logger, "replication started";
        "source_db" => &vdb.name,
        "target_db" => &options.target_db
    );
    Ok(())
}

fn produce_replicate_instructions(
    logger: &Logger,
    vdb: &CoordinationDatabase,
    options: &ReplicateOptions,
) -> Result<Vec<Box<dyn ClusterOp>>, OpError> {
    let hosts = vdb.host_list.clone();
    let credentials = options.db.https_credentials("replicate")?;

    Ok(vec![
        Box::new(HttpsGetUpNodesOp::new(
            logger,
            &vdb.name,
            hosts.clone(),
            credentials.clone(),
        )),
        Box::new(HttpsStartReplicationOp::new(
            logger,
            &vdb.name,
            hosts,
            credentials,
            &options.target_db,
            &options.target_hosts,
            &options.target_username,
            options.target_password.clone(),
            &options.tls_config,
            &options.sandbox,
        )?),
    ])
}
