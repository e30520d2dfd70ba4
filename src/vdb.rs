//! In-memory model of the cluster: the coordination database and its nodes

use std::collections::HashMap;

use crate::config::ClusterConfig;
use crate::error::OpError;
use crate::util;

pub const NODE_UP_STATE: &str = "UP";
pub const NODE_DOWN_STATE: &str = "DOWN";
pub const NODE_UNKNOWN_STATE: &str = "UNKNOWN";

/// One database node as the engine tracks it.
#[derive(Debug, Clone, Default)]
pub struct CoordinationNode {
    pub name: String,
    /// Resolved network address; equals the key indexing this node in its
    /// owning [`CoordinationDatabase`]
    pub address: String,
    pub catalog_path: String,
    pub data_path: String,
    pub depot_path: String,
    /// Ordered; includes user storage locations
    pub storage_locations: Vec<String>,
    pub user_storage_locations: Vec<String>,
    pub subcluster: String,
    pub is_primary: bool,
    pub is_ephemeral: bool,
    pub state: String,
    pub sandbox: String,
}

impl CoordinationNode {
    pub fn new() -> Self {
        Self {
            state: NODE_UNKNOWN_STATE.to_string(),
            ..Default::default()
        }
    }

    /// Fill name, address and the per-node directory layout derived from
    /// the database prefixes.
    pub fn set_from_create(
        &mut self,
        db_name: &str,
        address: &str,
        index: usize,
        catalog_prefix: &str,
        data_prefix: &str,
        depot_prefix: &str,
    ) {
        self.name = format!("v_{}_node{:04}", db_name.to_lowercase(), index + 1);
        self.address = address.to_string();
        self.catalog_path = format!("{}/{}/{}_catalog", catalog_prefix, db_name, self.name);
        self.data_path = format!("{}/{}/{}_data", data_prefix, db_name, self.name);
        self.storage_locations = vec![self.data_path.clone()];
        if !depot_prefix.is_empty() {
            self.depot_path = format!("{}/{}/{}_depot", depot_prefix, db_name, self.name);
        }
        self.is_primary = true;
    }
}

/// The cluster model most operations consume (abbreviated VDB).
///
/// Created by a verb's entry point, which owns it for the run; operations
/// borrow it and mutate only documented fields.
#[derive(Debug, Clone, Default)]
pub struct CoordinationDatabase {
    pub name: String,
    pub is_eon: bool,
    pub ipv6: bool,
    pub catalog_prefix: String,
    pub data_prefix: String,
    pub depot_prefix: String,
    pub use_depot: bool,
    pub communal_storage_location: String,
    /// Ordered; every entry appears as a key in `host_node_map`
    pub host_list: Vec<String>,
    pub host_node_map: HashMap<String, CoordinationNode>,
}

impl CoordinationDatabase {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn node_for_host(&self, host: &str) -> Result<&CoordinationNode, OpError> {
        self.host_node_map.get(host).ok_or_else(|| OpError::Internal {
            detail: format!("host {} has no saved node info", host),
        })
    }

    /// Number of nodes participating in the k-safety quorum.
    pub fn primary_node_count(&self) -> usize {
        self.host_node_map.values().filter(|n| n.is_primary).count()
    }

    /// Populate from create-db inputs: one primary node per host, directory
    /// layout derived from the prefixes.
    pub fn set_from_create(
        &mut self,
        db_name: &str,
        hosts: &[String],
        catalog_prefix: &str,
        data_prefix: &str,
        depot_prefix: &str,
        communal_storage_location: &str,
        ipv6: bool,
    ) -> Result<(), OpError> {
        util::validate_name(db_name, "database")?;
        util::validate_required_abs_path(catalog_prefix, "catalog prefix")?;
        util::validate_required_abs_path(data_prefix, "data prefix")?;
        if hosts.is_empty() {
            return Err(OpError::Precondition {
                op: "build coordination database".to_string(),
                detail: "must specify a host or host list".to_string(),
            });
        }

        self.name = db_name.to_string();
        self.catalog_prefix = util::clean_path(catalog_prefix);
        self.data_prefix = util::clean_path(data_prefix);
        self.depot_prefix = util::clean_path(depot_prefix);
        self.use_depot = !self.depot_prefix.is_empty();
        self.communal_storage_location = communal_storage_location.to_string();
        self.is_eon = !communal_storage_location.is_empty();
        self.ipv6 = ipv6;
        self.host_list = hosts.to_vec();

        self.host_node_map = HashMap::with_capacity(hosts.len());
        for (index, host) in hosts.iter().enumerate() {
            let mut node = CoordinationNode::new();
            node.set_from_create(
                db_name,
                host,
                index,
                &self.catalog_prefix,
                &self.data_prefix,
                &self.depot_prefix,
            );
            if self.use_depot {
                node.storage_locations.push(node.depot_path.clone());
            }
            self.host_node_map.insert(host.clone(), node);
        }
        Ok(())
    }

    /// Populate the fields the persisted cluster config knows about.
    pub fn set_from_cluster_config(&mut self, config: &ClusterConfig) {
        self.name = config.db_name.clone();
        self.catalog_prefix = config.catalog_path.clone();
        self.data_prefix = config.data_path.clone();
        self.depot_prefix = config.depot_path.clone();
        self.use_depot = !self.depot_prefix.is_empty();
        self.is_eon = config.is_eon;
        self.ipv6 = config.ipv6;
        self.host_list = config.hosts.clone();
        self.host_node_map = HashMap::with_capacity(config.nodes.len());
        for node_config in &config.nodes {
            let mut node = CoordinationNode::new();
            node.name = node_config.name.clone();
            node.address = node_config.address.clone();
            node.catalog_path =
                format!("{}/{}/{}_catalog", self.catalog_prefix, self.name, node.name);
            node.data_path = format!("{}/{}/{}_data", self.data_prefix, self.name, node.name);
            node.is_primary = true;
            self.host_node_map.insert(node.address.clone(), node);
        }
    }

    /// Rebuild this database against a replacement host list for revive.
    ///
    /// Nodes are ordered by name and assigned the new addresses in the
    /// user's input order; returns the new database plus the old addresses
    /// in the matching order.
    pub fn generate_revive_vdb(
        &self,
        new_hosts: &[String],
    ) -> Result<(CoordinationDatabase, Vec<String>), OpError> {
        if new_hosts.len() != self.host_node_map.len() {
            return Err(OpError::Precondition {
                op: "revive".to_string(),
                detail: format!(
                    "the number of new hosts ({}) does not match the number of nodes in the database ({})",
                    new_hosts.len(),
                    self.host_node_map.len()
                ),
            });
        }

        let mut nodes: Vec<CoordinationNode> = self.host_node_map.values().cloned().collect();
        nodes.sort_by(|a, b| a.name.cmp(&b.name));

        let mut new_vdb = self.clone();
        new_vdb.host_list = new_hosts.to_vec();
        new_vdb.host_node_map = HashMap::with_capacity(new_hosts.len());

        let mut old_hosts = Vec::with_capacity(new_hosts.len());
        for (mut node, new_host) in nodes.into_iter().zip(new_hosts.iter()) {
            old_hosts.push(node.address.clone());
            node.address = new_host.clone();
            new_vdb.host_node_map.insert(new_host.clone(), node);
        }

        Ok((new_vdb, old_hosts))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_vdb() -> CoordinationDatabase {
        let mut vdb = CoordinationDatabase::new();
        vdb.set_from_create(
            "practice_db",
            &[
                "192.168.1.103".to_string(),
                "192.168.1.101".to_string(),
                "192.168.1.102".to_string(),
            ],
            "/catalog",
            "/data",
            "/depot",
            "s3://bucket/practice_db",
            false,
        )
        .expect("vdb should build");
        vdb
    }

    #[test]
    fn test_set_from_create_layout() {
        let vdb = sample_vdb();
        assert!(vdb.is_eon);
        assert!(vdb.use_depot);
        assert_eq!(vdb.primary_node_count(), 3);

        let node = vdb.node_for_host("192.168.1.103").expect("node exists");
        assert_eq!(node.name, "v_practice_db_node0001");
        assert_eq!(node.catalog_path, "/catalog/practice_db/v_practice_db_node0001_catalog");
        assert_eq!(
            node.storage_locations,
            vec![
                "/data/practice_db/v_practice_db_node0001_data".to_string(),
                "/depot/practice_db/v_practice_db_node0001_depot".to_string(),
            ]
        );
    }

    #[test]
    fn test_every_host_has_a_node() {
        let vdb = sample_vdb();
        for host in &vdb.host_list {
            assert!(vdb.host_node_map.contains_key(host));
        }
    }

    #[test]
    fn test_generate_revive_vdb_reassigns_by_node_name_order() {
        let vdb = sample_vdb();
        let new_hosts = vec![
            "10.1.10.2".to_string(),
            "10.1.10.1".to_string(),
            "10.1.10.3".to_string(),
        ];
        let (new_vdb, old_hosts) = vdb.generate_revive_vdb(&new_hosts).expect("should rebuild");

        // node0001 lived on .103, node0002 on .101, node0003 on .102;
        // new hosts are taken in user input order against name order
        assert_eq!(
            old_hosts,
            vec![
                "192.168.1.103".to_string(),
                "192.168.1.101".to_string(),
                "192.168.1.102".to_string(),
            ]
        );
        assert_eq!(
            new_vdb.node_for_host("10.1.10.2").expect("node").name,
            "v_practice_db_node0001"
        );
        assert_eq!(
            new_vdb.node_for_host("10.1.10.3").expect("node").name,
            "v_practice_db_node0003"
        );
    }

    #[test]
    fn test_generate_revive_vdb_host_count_mismatch() {
        let vdb = sample_vdb();
        let err = vdb
            .generate_revive_vdb(&["10.1.10.1".to_string()])
            .expect_err("must reject mismatched host count");
        assert!(matches!(err, OpError::Precondition { .. }));
    }
}
