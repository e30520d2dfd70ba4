//! The administrator verbs: options, instruction factories and entry points
//!
//! Each verb follows the same shape: a typed options value with a factory
//! and validate/analyze steps, a function producing the ordered operation
//! list, and an entry function that feeds the list to a fresh Engine.

pub mod create_db;
pub mod drop_db;
pub mod replicate;
pub mod revive_db;
pub mod scrutinize;
pub mod start_db;
pub mod stop_db;

use std::path::PathBuf;

use crate::error::OpError;
use crate::net::TlsBundle;
use crate::ops::https::HttpsCredentials;
use crate::util;

/// Options every verb shares: database identity, hosts and credentials.
#[derive(Debug, Clone, Default)]
pub struct DatabaseOptions {
    pub db_name: String,
    /// Host names or addresses as the user gave them
    pub raw_hosts: Vec<String>,
    /// Resolved addresses; filled by `analyze`
    pub hosts: Vec<String>,
    pub ipv6: bool,
    pub catalog_prefix: String,
    pub data_prefix: String,
    pub depot_prefix: String,
    pub config_directory: Option<PathBuf>,
    pub username: String,
    pub password: Option<String>,
    pub key: String,
    pub cert: String,
    pub ca_cert: String,
}

impl DatabaseOptions {
    pub fn new() -> Self {
        Self::default()
    }

    /// Resolve raw hosts into addresses and normalize the prefixes.
    pub fn analyze(&mut self) -> Result<(), OpError> {
        self.hosts = util::resolve_raw_hosts_to_addresses(&self.raw_hosts, self.ipv6)?;
        self.catalog_prefix = util::clean_path(&self.catalog_prefix);
        self.data_prefix = util::clean_path(&self.data_prefix);
        self.depot_prefix = util::clean_path(&self.depot_prefix);
        Ok(())
    }

    pub fn tls_bundle(&self) -> TlsBundle {
        TlsBundle {
            key: self.key.clone(),
            cert: self.cert.clone(),
            ca_cert: self.ca_cert.clone(),
        }
    }

    /// Password-auth credentials for the HTTPS operations. A missing
    /// password means "authenticate with an empty one" for a fresh
    /// database, which is why `use_password` is always set here.
    pub fn https_credentials(&self, op_name: &str) -> Result<HttpsCredentials, OpError> {
        let username = if self.username.is_empty() {
            whoami()
        } else {
            self.username.clone()
        };
        HttpsCredentials::new(op_name, true, &username, self.password.clone())
    }
}

/// The host bootstrapping work starts from: prefer a local address, fall
/// back to the first host. The engine may run off-cluster, in which case no
/// host is local.
pub fn get_initiator(hosts: &[String]) -> Result<String, OpError> {
    if hosts.is_empty() {
        return Err(OpError::Precondition {
            op: "get initiator".to_string(),
            detail: "fail to find initiator node from an empty host list".to_string(),
        });
    }
    for host in hosts {
        if util::is_local_host(host) {
            return Ok(host.clone());
        }
    }
    Ok(hosts[0].clone())
}

fn whoami() -> String {
    std::env::var("USER")
        .or_else(|_| std::env::var("LOGNAME"))
        .unwrap_or_else(|_| "dbadmin".to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_get_initiator_prefers_local_host() {
        let hosts = vec!["192.168.1.10".to_string(), "127.0.0.1".to_string()];
        assert_eq!(get_initiator(&hosts).expect("initiator"), "127.0.0.1");
    }

    #[test]
    fn test_get_initiator_falls_back_to_first_host() {
        let hosts = vec!["192.168.1.10".to_string(), "192.168.1.11".to_string()];
        assert_eq!(get_initiator(&hosts).expect("initiator"), "192.168.1.10");
    }

    #[test]
    fn test_get_initiator_empty_list() {
        assert!(get_initiator(&[]).is_err());
    }

    #[test]
    fn test_analyze_normalizes_prefixes() {
        let mut options = DatabaseOptions {
            raw_hosts: vec!["10.0.0.1".to_string()],
            catalog_prefix: "/catalog/".to_string(),
            data_prefix: " /data ".to_string(),
            ..Default::default()
        };
        options.analyze().expect("analyze");
        assert_eq!(options.catalog_prefix, "/catalog");
        assert_eq!(options.data_prefix, "/data");
        assert_eq!(options.hosts, vec!["10.0.0.1".to_string()]);
    }
}
