//! Wire shapes of the catalog descriptor served by the node-management agent
//!
//! `GET /v1/catalog/database?catalog_path=<abs>` returns one of these per
//! host; the read-catalog operation elects the hosts holding the freshest
//! copy by comparing `versions.global`.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::error::OpError;

/// Catalog version counters. All numeric fields arrive as decimal strings.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CatalogVersions {
    #[serde(default)]
    pub global: String,
    #[serde(default)]
    pub local: String,
    #[serde(default)]
    pub session: String,
    #[serde(default)]
    pub spread: String,
    #[serde(default)]
    pub transaction: String,
    #[serde(default)]
    pub two_phase_id: String,
}

impl CatalogVersions {
    /// The election key; a parse failure is a per-host parse error.
    pub fn global_version(&self, host: &str) -> Result<i64, OpError> {
        self.global.parse::<i64>().map_err(|e| OpError::Parse {
            host: host.to_string(),
            detail: format!("cannot convert global version {:?} to integer: {}", self.global, e),
        })
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CatalogSubcluster {
    #[serde(default)]
    pub sc_name: String,
    #[serde(default)]
    pub is_primary_sc: bool,
    #[serde(default)]
    pub is_default: bool,
    #[serde(default)]
    pub sandbox: bool,
}

/// One node as the catalog editor describes it.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CatalogNode {
    pub name: String,
    pub address: String,
    #[serde(default)]
    pub catalog_path: String,
    #[serde(default)]
    pub control_address: String,
    #[serde(default)]
    pub control_port: String,
    #[serde(default)]
    pub control_broadcast: String,
    #[serde(default)]
    pub is_primary: bool,
    #[serde(default)]
    pub is_ephemeral: bool,
    #[serde(default)]
    pub has_catalog: bool,
    #[serde(default)]
    pub storage_locations: Vec<String>,
    #[serde(default)]
    pub start_command: Vec<String>,
    #[serde(default)]
    pub sc_details: CatalogSubcluster,
}

/// The whole descriptor.
///
/// `host_node_map` and `primary_node_count` are not part of the wire shape;
/// the read-catalog operation derives them after parsing so later steps
/// (start-node, revive) can index by address.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CatalogDatabase {
    pub name: String,
    #[serde(default)]
    pub versions: CatalogVersions,
    #[serde(default)]
    pub nodes: Vec<CatalogNode>,
    #[serde(default)]
    pub control_mode: String,
    #[serde(default)]
    pub spread_encryption: String,
    #[serde(default)]
    pub communal_storage_location: String,
    #[serde(skip)]
    pub host_node_map: HashMap<String, CatalogNode>,
    #[serde(skip)]
    pub primary_node_count: usize,
}

impl CatalogDatabase {
    /// Build the address index and the primary count from the node list.
    pub fn index_nodes(&mut self) {
        let mut host_node_map = HashMap::with_capacity(self.nodes.len());
        let mut primary_node_count = 0;
        for node in &self.nodes {
            if node.is_primary {
                primary_node_count += 1;
            }
            host_node_map.insert(node.address.clone(), node.clone());
        }
        self.host_node_map = host_node_map;
        self.primary_node_count = primary_node_count;
    }

    pub fn node_for_host(&self, host: &str) -> Result<&CatalogNode, OpError> {
        self.host_node_map.get(host).ok_or_else(|| OpError::Internal {
            detail: format!("host {} is not in the catalog descriptor", host),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const DESCRIPTOR: &str = r#"{
        "name": "practice_db",
        "versions": {
            "global": "12",
            "local": "3",
            "session": "7",
            "spread": "2",
            "transaction": "44",
            "two_phase_id": "0"
        },
        "nodes": [
            {
                "name": "v_practice_db_node0001",
                "address": "192.168.1.101",
                "catalog_path": "/catalog/practice_db/v_practice_db_node0001_catalog/Catalog",
                "is_primary": true,
                "storage_locations": ["/data/practice_db/v_practice_db_node0001_data"],
                "start_command": ["/opt/db/bin/db", "-D", "start"]
            },
            {
                "name": "v_practice_db_node0002",
                "address": "192.168.1.102",
                "is_primary": false
            }
        ],
        "control_mode": "pt2pt",
        "communal_storage_location": "s3://bucket/practice_db"
    }"#;

    #[test]
    fn test_parse_descriptor_and_index() {
        let mut db: CatalogDatabase =
            serde_json::from_str(DESCRIPTOR).expect("descriptor should parse");
        db.index_nodes();

        assert_eq!(db.versions.global_version("h").expect("version"), 12);
        assert_eq!(db.primary_node_count, 1);
        let node = db.node_for_host("192.168.1.101").expect("node exists");
        assert_eq!(node.name, "v_practice_db_node0001");
        assert_eq!(node.start_command.len(), 3);
    }

    #[test]
    fn test_bad_global_version_is_parse_error() {
        let versions = CatalogVersions {
            global: "not-a-number".to_string(),
            ..Default::default()
        };
        let err = versions.global_version("10.0.0.1").expect_err("must fail");
        assert!(matches!(err, OpError::Parse { .. }));
    }

    #[test]
    fn test_node_round_trip_preserves_identity() {
        let node = CatalogNode {
            name: "v_db_node0001".to_string(),
            address: "10.0.0.1".to_string(),
            catalog_path: "/cat/db/v_db_node0001_catalog".to_string(),
            is_primary: true,
            storage_locations: vec!["/data/db/v_db_node0001_data".to_string()],
            ..Default::default()
        };
        let encoded = serde_json::to_string(&node).expect("encode");
        let decoded: CatalogNode = serde_json::from_str(&encoded).expect("decode");
        assert_eq!(decoded.address, node.address);
        assert_eq!(decoded.name, node.name);
        assert_eq!(decoded.is_primary, node.is_primary);
        assert_eq!(decoded.catalog_path, node.catalog_path);
        assert_eq!(decoded.storage_locations, node.storage_locations);
    }
}
