//! Directory preparation before bootstrap or revive

use std::collections::HashMap;

use async_trait::async_trait;
use serde::Serialize;
use slog::Logger;

use crate::error::OpError;
use crate::net::{ClusterRequest, HostRequest, HttpMethod};
use crate::ops::{reduce_all_hosts_passing, ClusterOp, ExecContext, OpBase};
use crate::vdb::CoordinationNode;

#[derive(Serialize)]
struct PrepareDirectoriesRequestData {
    catalog_path: String,
    data_paths: Vec<String>,
    #[serde(skip_serializing_if = "String::is_empty")]
    depot_path: String,
    force_cleanup: bool,
    for_db_revive: bool,
}

/// Creates (and optionally scrubs) the per-node catalog, data and depot
/// directories through the agent.
pub struct NmaPrepareDirectoriesOp {
    base: OpBase,
    host_request_body_map: HashMap<String, String>,
    force_cleanup: bool,
    for_db_revive: bool,
}

impl NmaPrepareDirectoriesOp {
    /// `host_node_map` supplies the directory layout per host. For revive,
    /// callers strip user storage locations from the nodes first since
    /// those are not managed by this tool.
    pub fn new(
        logger: &Logger,
        host_node_map: &HashMap<String, CoordinationNode>,
        force_cleanup: bool,
        for_db_revive: bool,
    ) -> Result<Self, OpError> {
        let hosts: Vec<String> = host_node_map.keys().cloned().collect();
        let mut op = Self {
            base: OpBase::new("NmaPrepareDirectoriesOp", "Prepare directories", logger, hosts),
            host_request_body_map: HashMap::new(),
            force_cleanup,
            for_db_revive,
        };
        op.setup_request_bodies(host_node_map)?;
        Ok(op)
    }

    fn setup_request_bodies(
        &mut self,
        host_node_map: &HashMap<String, CoordinationNode>,
    ) -> Result<(), OpError> {
        for (host, node) in host_node_map {
            let data = PrepareDirectoriesRequestData {
                catalog_path: node.catalog_path.clone(),
                data_paths: node.storage_locations.clone(),
                depot_path: node.depot_path.clone(),
                force_cleanup: self.force_cleanup,
                for_db_revive: self.for_db_revive,
            };
            let body = serde_json::to_string(&data).map_err(|e| OpError::Internal {
                detail: format!("[{}] fail to marshal request data: {}", self.base.name, e),
            })?;
            self.host_request_body_map.insert(host.clone(), body);
        }
        Ok(())
    }

    fn setup_cluster_request(&mut self) {
        self.base.cluster_request = ClusterRequest::new(self.base.name);
        for host in &self.base.hosts {
            let mut request = HostRequest {
                method: Some(HttpMethod::Post),
                ..Default::default()
            };
            request.build_node_mgmt_endpoint("directories/prepare");
            request.body = self
                .host_request_body_map
                .get(host)
                .cloned()
                .unwrap_or_default();
            self.base
                .cluster_request
                .request_collection
                .insert(host.clone(), request);
        }
    }
}

#[async_trait]
impl ClusterOp for NmaPrepareDirectoriesOp {
    fn base(&self) -> &OpBase {
        &self.base
    }

    fn base_mut(&mut self) -> &mut OpBase {
        &mut self.base
    }

    async fn prepare(&mut self, ctx: &mut ExecContext) -> Result<(), OpError> {
        ctx.dispatcher.setup(&self.base.hosts);
        self.setup_cluster_request();
        Ok(())
    }

    async fn process_result(&mut self, _ctx: &mut ExecContext) -> Result<(), OpError> {
        reduce_all_hosts_passing(&self.base)
    }
}
