//! Command-line surface: one subcommand per verb
//!
//! The CLI's only job is mapping flags onto the verbs' option factories;
//! the engine neither parses arguments nor exits the process.

use std::collections::HashMap;
use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};

use crate::error::OpError;
use crate::verbs;

#[derive(Parser)]
#[command(
    name = "clusterctl",
    about = "Administer a distributed analytic database cluster",
    version
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Args, Debug, Clone)]
pub struct DbArgs {
    /// Name of the database
    #[arg(long = "name", default_value = "")]
    pub db_name: String,

    /// Comma-separated list of hosts participating in the database
    #[arg(long, value_delimiter = ',')]
    pub hosts: Vec<String>,

    /// Treat hosts as IPv6 addresses
    #[arg(long)]
    pub ipv6: bool,

    /// Absolute catalog path prefix
    #[arg(long, default_value = "")]
    pub catalog_path: String,

    /// Absolute data path prefix
    #[arg(long, default_value = "")]
    pub data_path: String,

    /// Absolute depot path prefix (eon mode)
    #[arg(long, default_value = "")]
    pub depot_path: String,

    /// Database user name for the HTTPS service
    #[arg(long, default_value = "")]
    pub db_user: String,

    /// Database password, in single quotes
    #[arg(long)]
    pub password: Option<String>,

    /// Path to the TLS key PEM file
    #[arg(long)]
    pub key_file: Option<PathBuf>,

    /// Path to the TLS certificate PEM file
    #[arg(long)]
    pub cert_file: Option<PathBuf>,

    /// Path to the CA certificate PEM file
    #[arg(long)]
    pub ca_cert_file: Option<PathBuf>,

    /// Directory holding the cluster config file
    #[arg(long)]
    pub config_directory: Option<PathBuf>,
}

impl DbArgs {
    /// Fold the flag values into the shared options struct, reading TLS
    /// material off disk.
    pub fn to_options(&self) -> Result<verbs::DatabaseOptions, OpError> {
        let mut options = verbs::DatabaseOptions::new();
        options.db_name = self.db_name.clone();
        options.raw_hosts = self.hosts.clone();
        options.ipv6 = self.ipv6;
        options.catalog_prefix = self.catalog_path.clone();
        options.data_prefix = self.data_path.clone();
        options.depot_prefix = self.depot_path.clone();
        options.username = self.db_user.clone();
        options.password = self.password.clone();
        options.config_directory = self.config_directory.clone();
        options.key = read_pem(self.key_file.as_ref())?;
        options.cert = read_pem(self.cert_file.as_ref())?;
        options.ca_cert = read_pem(self.ca_cert_file.as_ref())?;
        Ok(options)
    }
}

fn read_pem(path: Option<&PathBuf>) -> Result<String, OpError> {
    match path {
        Some(path) => std::fs::read_to_string(path).map_err(|e| OpError::Precondition {
            op: "read TLS material".to_string(),
            detail: format!("fail to read {}: {}", path.display(), e),
        }),
        None => Ok(String::new()),
    }
}

/// `key=value` pairs for communal storage parameters.
pub fn parse_parameters(raw: &[String]) -> Result<HashMap<String, String>, OpError> {
    let mut parameters = HashMap::new();
    for entry in raw {
        let Some((key, value)) = entry.split_once('=') else {
            return Err(OpError::Precondition {
                op: "parse parameters".to_string(),
                detail: format!("parameter {} is not of the form key=value", entry),
            });
        };
        parameters.insert(key.to_string(), value.to_string());
    }
    Ok(parameters)
}

#[derive(Subcommand)]
pub enum Commands {
    /// Create a new database on the given hosts
    CreateDb {
        #[command(flatten)]
        db: DbArgs,

        /// Shard count for an eon-mode database
        #[arg(long, default_value_t = 0)]
        shard_count: usize,

        /// Communal storage location (eon mode)
        #[arg(long, default_value = "")]
        communal_storage_location: String,

        /// key=value communal storage parameters
        #[arg(long = "communal-storage-param")]
        communal_storage_params: Vec<String>,

        /// Depot size, e.g. 10G or 40%
        #[arg(long, default_value = "")]
        depot_size: String,

        /// Remove existing directories before creating the database
        #[arg(long)]
        force_removal_at_creation: bool,

        /// Skip installing the default packages
        #[arg(long)]
        skip_package_install: bool,

        /// Do not wait for node startup
        #[arg(long)]
        skip_startup_polling: bool,

        /// Seconds to wait for nodes to come up
        #[arg(long, default_value_t = 300)]
        startup_timeout: u64,
    },

    /// Drop a stopped database and delete its directories
    DropDb {
        #[command(flatten)]
        db: DbArgs,

        /// Delete directories even when they are not empty
        #[arg(long)]
        force_delete: bool,
    },

    /// Start a stopped database
    StartDb {
        #[command(flatten)]
        db: DbArgs,

        /// Seconds to wait for nodes to come up
        #[arg(long)]
        startup_timeout: Option<u64>,
    },

    /// Stop a running database
    StopDb {
        #[command(flatten)]
        db: DbArgs,

        /// Seconds to wait for user connections to close
        #[arg(long)]
        drain_seconds: Option<i64>,
    },

    /// Revive a terminated database from communal storage
    ReviveDb {
        #[command(flatten)]
        db: DbArgs,

        /// Communal storage location the database lived in
        #[arg(long)]
        communal_storage_location: String,

        /// key=value communal storage parameters
        #[arg(long = "communal-storage-param")]
        communal_storage_params: Vec<String>,

        /// Seconds to wait for the remote catalog load
        #[arg(long, default_value_t = verbs::revive_db::DEFAULT_LOAD_CATALOG_TIMEOUT_SECS)]
        load_catalog_timeout: u64,

        /// Scrub leftover directories before reviving
        #[arg(long)]
        force_removal: bool,
    },

    /// Replicate this database to another one
    Replicate {
        #[command(flatten)]
        db: DbArgs,

        /// Target database name
        #[arg(long)]
        target_db: String,

        /// Target database entry host
        #[arg(long)]
        target_hosts: String,

        /// Target database user
        #[arg(long, default_value = "")]
        target_username: String,

        /// Target database password
        #[arg(long)]
        target_password: Option<String>,

        /// Named TLS config to authenticate with on the source side
        #[arg(long, default_value = "")]
        tls_config: String,

        /// Replicate from this sandbox instead of the main cluster
        #[arg(long, default_value = "")]
        sandbox: String,
    },

    /// Collect a diagnostic bundle from every reachable host
    Scrutinize {
        #[command(flatten)]
        db: DbArgs,

        /// Collect archived logs produced within this many hours
        #[arg(long, default_value_t = crate::ops::nma::stage::LOG_AGE_HOURS_DEFAULT)]
        log_age_hours: i64,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_parameters() {
        let raw = vec![
            "awsauth=key:secret".to_string(),
            "region=us-east-1".to_string(),
        ];
        let parsed = parse_parameters(&raw).expect("parse");
        assert_eq!(parsed.get("awsauth"), Some(&"key:secret".to_string()));
        assert_eq!(parsed.get("region"), Some(&"us-east-1".to_string()));
    }

    #[test]
    fn test_parse_parameters_rejects_bare_words() {
        assert!(parse_parameters(&["notakv".to_string()]).is_err());
    }

    #[test]
    fn test_cli_parses_create_db() {
        let cli = Cli::try_parse_from([
            "clusterctl",
            "create-db",
            "--name",
            "practice_db",
            "--hosts",
            "10.0.0.1,10.0.0.2",
            "--catalog-path",
            "/catalog",
            "--data-path",
            "/data",
        ])
        .expect("should parse");
        match cli.command {
            Commands::CreateDb { db, .. } => {
                assert_eq!(db.db_name, "practice_db");
                assert_eq!(db.hosts.len(), 2);
            }
            _ => panic!("expected create-db"),
        }
    }
}
