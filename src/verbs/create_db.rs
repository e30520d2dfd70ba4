//! Database creation

use std::collections::HashMap;
use std::sync::Arc;

use slog::{info, warn, Logger};
use tokio::sync::Mutex;

use crate::config::{ClusterConfig, NodeConfig};
use crate::error::OpError;
use crate::net::RequestDispatcher;
use crate::ops::https::{
    HttpsCheckRunningDbOp, HttpsCreateDepotOp, HttpsCreateNodeOp, HttpsInstallPackagesOp,
    HttpsMarkKsafeOp, HttpsPollNodeStateOp, HttpsReloadSpreadOp, HttpsSyncCatalogOp,
    TargetNodeState,
};
use crate::ops::nma::bootstrap_catalog::BootstrapCatalogParams;
use crate::ops::nma::{
    ConfigFile, NmaBootstrapCatalogOp, NmaDownloadConfigOp, NmaHealthOp, NmaNetworkProfileOp,
    NmaPrepareDirectoriesOp, NmaReadCatalogOp, NmaStartNodeOp, NmaUploadConfigOp,
};
use crate::ops::{ClusterOp, Engine};
use crate::util;
use crate::vdb::CoordinationDatabase;
use crate::verbs::{get_initiator, DatabaseOptions};

/// Once a cluster reaches this size, its design is marked k-safe.
const KSAFETY_THRESHOLD: usize = 3;
const KSAFE_VALUE: u32 = 1;

const DEFAULT_CLIENT_PORT: u16 = 5433;
const DEFAULT_LARGE_CLUSTER: i32 = -1;
const MAX_LARGE_CLUSTER: i32 = 120;
const DEFAULT_STARTUP_TIMEOUT_SECS: u64 = 300;

#[derive(Debug, Clone)]
pub struct CreateDbOptions {
    pub db: DatabaseOptions,
    // eon
    pub shard_count: usize,
    pub communal_storage_location: String,
    pub communal_storage_parameters: HashMap<String, String>,
    pub depot_size: String,
    // optional behavior
    pub force_removal_at_creation: bool,
    pub force_cleanup_on_failure: bool,
    pub skip_package_install: bool,
    pub skip_startup_polling: bool,
    pub timeout_node_startup_secs: u64,
    // networking knobs that used to live in an installer-generated file
    pub broadcast: bool,
    pub p2p: bool,
    pub large_cluster: i32,
    pub client_port: u16,
    pub spread_logging: bool,
    pub spread_logging_level: i32,
    pub license_path: String,
    pub configuration_parameters: HashMap<String, String>,
}

impl CreateDbOptions {
    pub fn new() -> Self {
        Self {
            db: DatabaseOptions::new(),
            shard_count: 0,
            communal_storage_location: String::new(),
            communal_storage_parameters: HashMap::new(),
            depot_size: String::new(),
            force_removal_at_creation: false,
            force_cleanup_on_failure: false,
            skip_package_install: false,
            skip_startup_polling: false,
            timeout_node_startup_secs: DEFAULT_STARTUP_TIMEOUT_SECS,
            broadcast: false,
            p2p: true,
            large_cluster: DEFAULT_LARGE_CLUSTER,
            client_port: DEFAULT_CLIENT_PORT,
            spread_logging: false,
            spread_logging_level: -1,
            license_path: String::new(),
            configuration_parameters: HashMap::new(),
        }
    }

    pub fn validate_analyze(&mut self) -> Result<(), OpError> {
        util::validate_name(&self.db.db_name, "database")?;
        if !self.license_path.is_empty() && !util::is_absolute_path(&self.license_path) {
            return Err(precondition(
                "must provide a fully qualified path for the license file",
            ));
        }
        self.validate_eon_options()?;
        self.validate_network_options()?;
        self.db.analyze()
    }

    fn validate_eon_options(&self) -> Result<(), OpError> {
        if !self.communal_storage_location.is_empty() {
            if self.db.depot_prefix.is_empty() {
                return Err(precondition(
                    "must specify a depot path with a communal storage location",
                ));
            }
            if self.shard_count == 0 {
                return Err(precondition(
                    "must specify a shard count greater than 0 with a communal storage location",
                ));
            }
        }
        if !self.db.depot_prefix.is_empty() && self.communal_storage_location.is_empty() {
            return Err(precondition(
                "when a depot path is given, the communal storage location cannot be empty",
            ));
        }
        if !self.depot_size.is_empty() {
            if self.db.depot_prefix.is_empty() {
                return Err(precondition(
                    "when a depot size is given, the depot path cannot be empty",
                ));
            }
            validate_depot_size(&self.depot_size)?;
        }
        Ok(())
    }

    fn validate_network_options(&self) -> Result<(), OpError> {
        if self.broadcast && self.p2p {
            return Err(precondition(
                "cannot use both broadcast and point-to-point networking mode",
            ));
        }
        if self.large_cluster != DEFAULT_LARGE_CLUSTER
            && !(1..=MAX_LARGE_CLUSTER).contains(&self.large_cluster)
        {
            return Err(precondition(format!(
                "must specify a large cluster value in range [1, {}]",
                MAX_LARGE_CLUSTER
            )));
        }
        Ok(())
    }

    fn bootstrap_params(&self) -> BootstrapCatalogParams {
        BootstrapCatalogParams {
            broadcast: self.broadcast,
            p2p: self.p2p,
            large_cluster: self.large_cluster,
            client_port: self.client_port,
            spread_logging: self.spread_logging,
            spread_logging_level: self.spread_logging_level,
            license_path: self.license_path.clone(),
            shard_count: self.shard_count,
            configuration_parameters: self.configuration_parameters.clone(),
        }
    }
}

impl Default for CreateDbOptions {
    fn default() -> Self {
        Self::new()
    }
}

fn precondition(detail: impl Into<String>) -> OpError {
    OpError::Precondition {
        op: "create_db".to_string(),
        detail: detail.into(),
    }
}

/// A depot size is either a whole-number percentage of the disk ("40%") or
/// a byte count with a K/M/G/T suffix ("2048G").
fn validate_depot_size(size: &str) -> Result<(), OpError> {
    let clean = size.trim();
    if let Some(percent_str) = clean.strip_suffix('%') {
        let value: i64 = percent_str.parse().map_err(|_| {
            precondition(format!(
                "{} is not a well-formatted whole-number percentage of the format <int>%",
                size
            ))
        })?;
        if value > 100 {
            return Err(precondition(format!(
                "depot-size {} is invalid, because it is greater than 100%",
                size
            )));
        }
        if value < 0 {
            return Err(precondition(format!(
                "depot-size {} is invalid, because it is less than 0%",
                size
            )));
        }
        return Ok(());
    }

    let Some(unit) = clean.chars().last().filter(|c| "KMGT".contains(*c)) else {
        return Err(precondition(format!(
            "{} is not a well-formatted whole-number size in bytes of the format <int>[KMGT]",
            size
        )));
    };
    let value: i64 = clean[..clean.len() - unit.len_utf8()].parse().map_err(|_| {
        precondition(format!(
            "{} is not a well-formatted whole-number size in bytes of the format <int>[KMGT]",
            size
        ))
    })?;
    if value <= 0 {
        return Err(precondition(format!(
            "depot size {} is not a valid size because it is <= 0",
            size
        )));
    }
    Ok(())
}

/// Create a new database across the configured hosts and record it in the
/// cluster config.
pub async fn create_db(
    dispatcher: Arc<dyn RequestDispatcher>,
    logger: &Logger,
    options: &mut CreateDbOptions,
) -> Result<CoordinationDatabase, OpError> {
    options.validate_analyze()?;

    let mut vdb = CoordinationDatabase::new();
    vdb.set_from_create(
        &options.db.db_name,
        &options.db.hosts,
        &options.db.catalog_prefix,
        &options.db.data_prefix,
        &options.db.depot_prefix,
        &options.communal_storage_location,
        options.db.ipv6,
    )?;
    let vdb = Arc::new(Mutex::new(vdb));

    let mut instructions = produce_create_db_instructions(logger, &vdb, options).await?;
    let engine = Engine::new(dispatcher, options.db.tls_bundle(), logger);
    engine.run(&mut instructions).await?;

    let snapshot = vdb.lock().await.clone();
    if let Err(e) = write_cluster_config(&snapshot, options) {
        warn!(logger, "fail to write the cluster config file"; "detail" => %e);
    }
    info!(logger, "database created"; "db_name" => &snapshot.name, "hosts" => snapshot.host_list.len());
    Ok(snapshot)
}

async fn produce_create_db_instructions(
    logger: &Logger,
    vdb: &Arc<Mutex<CoordinationDatabase>>,
    options: &CreateDbOptions,
) -> Result<Vec<Box<dyn ClusterOp>>, OpError> {
    let snapshot = vdb.lock().await.clone();
    let hosts = snapshot.host_list.clone();
    let bootstrap_host = vec![get_initiator(&hosts)?];
    let new_node_hosts = util::slice_diff(&hosts, &bootstrap_host);
    let credentials = options.db.https_credentials("create_db")?;

    let mut instructions: Vec<Box<dyn ClusterOp>> = vec![
        Box::new(NmaHealthOp::new(logger, hosts.clone())),
        Box::new(HttpsCheckRunningDbOp::new(
            logger,
            hosts.clone(),
            credentials.clone(),
        )),
        Box::new(NmaPrepareDirectoriesOp::new(
            logger,
            &snapshot.host_node_map,
            options.force_removal_at_creation,
            false,
        )?),
        Box::new(NmaNetworkProfileOp::new(logger, hosts.clone())),
        Box::new(NmaBootstrapCatalogOp::new(
            logger,
            &snapshot,
            &options.bootstrap_params(),
            bootstrap_host.clone(),
        )?),
        Box::new(NmaReadCatalogOp::with_initiator(
            logger,
            bootstrap_host.clone(),
            vdb.clone(),
        )),
        Box::new(NmaStartNodeOp::new(logger, bootstrap_host.clone())),
        Box::new(HttpsPollNodeStateOp::new(
            logger,
            bootstrap_host.clone(),
            credentials.clone(),
            TargetNodeState::Up,
            Some(options.timeout_node_startup_secs),
        )),
    ];

    if hosts.len() > 1 {
        instructions.push(Box::new(HttpsCreateNodeOp::new(
            logger,
            bootstrap_host.clone(),
            credentials.clone(),
            &snapshot,
        )?));
    }

    instructions.push(Box::new(HttpsReloadSpreadOp::new(
        logger,
        bootstrap_host.clone(),
        credentials.clone(),
    )));

    if hosts.len() > 1 {
        // the bootstrap catalog now lists every node; re-read it so config
        // transfer and node startup see the whole cluster
        instructions.push(Box::new(NmaReadCatalogOp::with_initiator(
            logger,
            bootstrap_host.clone(),
            vdb.clone(),
        )));
        produce_transfer_config_ops(
            logger,
            &mut instructions,
            &bootstrap_host,
            &new_node_hosts
        );
        instructions.push(Box::new(NmaStartNodeOp::new(logger, new_node_hosts)));
    }

    if !options.skip_startup_polling {
        instructions.push(Box::new(HttpsPollNodeStateOp::new(
            logger,
            hosts.clone(),
            credentials.clone(),
            TargetNodeState::Up,
            Some(options.timeout_node_startup_secs),
        )));
    }

    if snapshot.use_depot {
        instructions.push(Box::new(HttpsCreateDepotOp::new(
            logger,
            &snapshot,
            bootstrap_host.clone(),
            &options.depot_size,
            credentials.clone(),
        )?));
    }

    if hosts.len() >= KSAFETY_THRESHOLD {
        instructions.push(Box::new(HttpsMarkKsafeOp::new(
            logger,
            bootstrap_host.clone(),
            credentials.clone(),
            KSAFE_VALUE,
        )?));
    }

    if !options.skip_package_install {
        instructions.push(Box::new(HttpsInstallPackagesOp::new(
            logger,
            bootstrap_host.clone(),
            credentials.clone(),
        )));
    }

    if snapshot.is_eon {
        instructions.push(Box::new(HttpsSyncCatalogOp::new(
            logger,
            bootstrap_host,
            credentials,
        )));
    }

    Ok(instructions)
}

/// Copy both config files from the bootstrap host to every new node.
fn produce_transfer_config_ops(
    logger: &Logger,
    instructions: &mut Vec<Box<dyn ClusterOp>>,
    bootstrap_host: &[String],
    new_node_hosts: &[String],
) {
    let database_conf = crate::ops::nma::config_files::ConfigContent::default();
    let spread_conf = crate::ops::nma::config_files::ConfigContent::default();

    instructions.push(Box::new(NmaDownloadConfigOp::new(
        logger,
        "NmaDownloadDatabaseConfigOp",
        bootstrap_host.to_vec(),
        ConfigFile::Database,
        database_conf.clone(),
        None,
    )));
    instructions.push(Box::new(NmaUploadConfigOp::new(
        logger,
        "NmaUploadDatabaseConfigOp",
        new_node_hosts.to_vec(),
        ConfigFile::Database,
        database_conf,
    )));
    instructions.push(Box::new(NmaDownloadConfigOp::new(
        logger,
        "NmaDownloadSpreadConfigOp",
        bootstrap_host.to_vec(),
        ConfigFile::Spread,
        spread_conf.clone(),
        None,
    )));
    instructions.push(Box::new(NmaUploadConfigOp::new(
        logger,
        "NmaUploadSpreadConfigOp",
        new_node_hosts.to_vec(),
        ConfigFile::Spread,
        spread_conf,
    )));
}

fn write_cluster_config(
    vdb: &CoordinationDatabase,
    options: &CreateDbOptions,
) -> Result<(), OpError> {
    let mut config = ClusterConfig::new();
    config.db_name = vdb.name.clone();
    config.hosts = vdb.host_list.clone();
    config.catalog_path = vdb.catalog_prefix.clone();
    config.data_path = vdb.data_prefix.clone();
    config.depot_path = vdb.depot_prefix.clone();
    config.is_eon = vdb.is_eon;
    config.ipv6 = vdb.ipv6;
    for host in &vdb.host_list {
        let node = vdb.node_for_host(host)?;
        config.nodes.push(NodeConfig {
            address: host.clone(),
            name: node.name.clone(),
        });
    }
    config.write(options.db.config_directory.as_deref())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validate_depot_size_percent() {
        assert!(validate_depot_size("-19%").is_err());
        assert!(validate_depot_size("119%").is_err());
        assert!(validate_depot_size("+19%").is_ok());
        assert!(validate_depot_size("19%").is_ok());
    }

    #[test]
    fn test_validate_depot_size_bytes() {
        assert!(validate_depot_size("-119K").is_err());
        assert!(validate_depot_size("+119T").is_ok());
        assert!(validate_depot_size("2048G").is_ok());
        assert!(validate_depot_size("1024").is_err());
        assert!(validate_depot_size("10X").is_err());
    }

    #[test]
    fn test_eon_options_require_each_other() {
        let mut options = CreateDbOptions::new();
        options.db.db_name = "practice_db".to_string();
        options.db.raw_hosts = vec!["10.0.0.1".to_string()];
        options.db.catalog_prefix = "/catalog".to_string();
        options.db.data_prefix = "/data".to_string();

        // communal location without depot prefix
        options.communal_storage_location = "s3://bucket/db".to_string();
        assert!(options.validate_analyze().is_err());

        // depot prefix and shard count make it whole
        options.db.depot_prefix = "/depot".to_string();
        options.shard_count = 6;
        assert!(options.validate_analyze().is_ok());
    }

    #[test]
    fn test_broadcast_and_p2p_conflict() {
        let mut options = CreateDbOptions::new();
        options.db.db_name = "practice_db".to_string();
        options.db.raw_hosts = vec!["10.0.0.1".to_string()];
        options.db.catalog_prefix = "/catalog".to_string();
        options.db.data_prefix = "/data".to_string();
        options.broadcast = true;
        // p2p defaults to true
        assert!(options.validate_analyze().is_err());
    }
}
