//! Directory removal for drop-db

use std::collections::HashMap;

use async_trait::async_trait;
use serde::Serialize;
use slog::Logger;

use crate::error::OpError;
use crate::net::{ClusterRequest, HostRequest, HttpMethod};
use crate::ops::{reduce_all_hosts_passing, ClusterOp, ExecContext, OpBase};
use crate::vdb::CoordinationDatabase;

#[derive(Serialize)]
struct DeleteDirectoriesRequestData {
    directories: Vec<String>,
    force_delete: bool,
}

/// Removes every directory a node owns: catalog, data, depot and any other
/// storage locations.
pub struct NmaDeleteDirectoriesOp {
    base: OpBase,
    host_request_body_map: HashMap<String, String>,
}

impl NmaDeleteDirectoriesOp {
    pub fn new(
        logger: &Logger,
        vdb: &CoordinationDatabase,
        force_delete: bool,
    ) -> Result<Self, OpError> {
        let mut host_request_body_map = HashMap::new();
        for host in &vdb.host_list {
            let node = vdb.node_for_host(host)?;
            let mut directories = vec![node.catalog_path.clone()];
            directories.extend(node.storage_locations.iter().cloned());
            if !node.depot_path.is_empty() && !directories.contains(&node.depot_path) {
                directories.push(node.depot_path.clone());
            }
            let data = DeleteDirectoriesRequestData {
                directories,
                force_delete,
            };
            let body = serde_json::to_string(&data).map_err(|e| OpError::Internal {
                detail: format!("fail to marshal request data: {}", e),
            })?;
            host_request_body_map.insert(host.clone(), body);
        }

        Ok(Self {
            base: OpBase::new(
                "NmaDeleteDirectoriesOp",
                "Delete database directories",
                logger,
                vdb.host_list.clone(),
            ),
            host_request_body_map,
        })
    }

    fn setup_cluster_request(&mut self) {
        self.base.cluster_request = ClusterRequest::new(self.base.name);
        for host in &self.base.hosts {
            let mut request = HostRequest {
                method: Some(HttpMethod::Post),
                ..Default::default()
            };
            request.build_node_mgmt_endpoint("directories/delete");
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
impl ClusterOp for NmaDeleteDirectoriesOp {
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
