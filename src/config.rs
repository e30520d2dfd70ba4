//! Cluster-config persistence
//!
//! The engine records just enough of a created database to address it again
//! later: name, hosts, prefixes, the eon and ipv6 flags and each node's
//! name/address pair. Everything else is re-read from the cluster itself.

use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::OpError;

pub const CONFIG_FILE_NAME: &str = "cluster_config.yaml";
pub const CONFIG_BACKUP_NAME: &str = "cluster_config.yaml.bak";

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct NodeConfig {
    pub address: String,
    pub name: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ClusterConfig {
    pub db_name: String,
    pub hosts: Vec<String>,
    pub nodes: Vec<NodeConfig>,
    pub catalog_path: String,
    pub data_path: String,
    #[serde(default)]
    pub depot_path: String,
    #[serde(default)]
    pub is_eon: bool,
    #[serde(default)]
    pub ipv6: bool,
}

impl ClusterConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// Read the config from `config_dir`, or the current directory when
    /// none is given.
    pub fn read(config_dir: Option<&Path>) -> Result<Self, OpError> {
        let path = config_file_path(config_dir)?;
        let contents = fs::read_to_string(&path).map_err(|e| OpError::Precondition {
            op: "read cluster config".to_string(),
            detail: format!("fail to read {}: {}", path.display(), e),
        })?;
        serde_yaml::from_str(&contents).map_err(|e| OpError::Parse {
            host: String::new(),
            detail: format!("malformed cluster config {}: {}", path.display(), e),
        })
    }

    /// Write the config, backing up any existing file first.
    pub fn write(&self, config_dir: Option<&Path>) -> Result<(), OpError> {
        let path = config_file_path(config_dir)?;
        backup_config_file(&path)?;

        let contents = serde_yaml::to_string(self).map_err(|e| OpError::Internal {
            detail: format!("fail to serialize cluster config: {}", e),
        })?;
        fs::write(&path, contents).map_err(|e| OpError::Internal {
            detail: format!("fail to write {}: {}", path.display(), e),
        })
    }
}

/// Delete the config file after a successful drop.
pub fn remove_config_file(config_dir: Option<&Path>) -> Result<(), OpError> {
    let path = config_file_path(config_dir)?;
    fs::remove_file(&path).map_err(|e| OpError::Internal {
        detail: format!("fail to remove {}: {}", path.display(), e),
    })
}

pub fn config_file_path(config_dir: Option<&Path>) -> Result<PathBuf, OpError> {
    let dir = match config_dir {
        Some(dir) => dir.to_path_buf(),
        None => std::env::current_dir().map_err(|e| OpError::Internal {
            detail: format!("fail to get current directory: {}", e),
        })?,
    };
    Ok(dir.join(CONFIG_FILE_NAME))
}

fn backup_config_file(path: &Path) -> Result<(), OpError> {
    if path.exists() {
        let backup = path.with_file_name(CONFIG_BACKUP_NAME);
        fs::rename(path, &backup).map_err(|e| OpError::Internal {
            detail: format!("fail to back up {}: {}", path.display(), e),
        })?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_config() -> ClusterConfig {
        ClusterConfig {
            db_name: "practice_db".to_string(),
            hosts: vec!["192.168.1.101".to_string(), "192.168.1.102".to_string()],
            nodes: vec![
                NodeConfig {
                    address: "192.168.1.101".to_string(),
                    name: "v_practice_db_node0001".to_string(),
                },
                NodeConfig {
                    address: "192.168.1.102".to_string(),
                    name: "v_practice_db_node0002".to_string(),
                },
            ],
            catalog_path: "/catalog".to_string(),
            data_path: "/data".to_string(),
            depot_path: "/depot".to_string(),
            is_eon: true,
            ipv6: false,
        }
    }

    #[test]
    fn test_write_read_round_trip() {
        let dir = tempfile::tempdir().expect("tempdir");
        let config = sample_config();
        config.write(Some(dir.path())).expect("write config");

        let read_back = ClusterConfig::read(Some(dir.path())).expect("read config");
        assert_eq!(read_back.db_name, config.db_name);
        assert_eq!(read_back.hosts, config.hosts);
        assert_eq!(read_back.nodes.len(), 2);
        assert_eq!(read_back.nodes[0].name, "v_practice_db_node0001");
        assert!(read_back.is_eon);
    }

    #[test]
    fn test_rewrite_creates_backup() {
        let dir = tempfile::tempdir().expect("tempdir");
        let config = sample_config();
        config.write(Some(dir.path())).expect("first write");
        config.write(Some(dir.path())).expect("second write");

        assert!(dir.path().join(CONFIG_FILE_NAME).exists());
        assert!(dir.path().join(CONFIG_BACKUP_NAME).exists());
    }

    #[test]
    fn test_remove_config_file() {
        let dir = tempfile::tempdir().expect("tempdir");
        sample_config().write(Some(dir.path())).expect("write");
        remove_config_file(Some(dir.path())).expect("remove");
        assert!(!dir.path().join(CONFIG_FILE_NAME).exists());
    }

    #[test]
    fn test_read_missing_config_is_precondition_error() {
        let dir = tempfile::tempdir().expect("tempdir");
        let err = ClusterConfig::read(Some(dir.path())).expect_err("must fail");
        assert!(matches!(err, OpError::Precondition { .. }));
    }
}
