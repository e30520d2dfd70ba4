//! Per-host node identity lookup (scrutinize preliminaries)

use std::sync::Arc;

use async_trait::async_trait;
use serde::Deserialize;
use slog::Logger;
use tokio::sync::Mutex;

use crate::error::OpError;
use crate::net::{ClusterRequest, HostRequest, HttpMethod};
use crate::ops::{ClusterOp, ExecContext, OpBase};
use crate::vdb::{CoordinationDatabase, CoordinationNode};

#[derive(Deserialize)]
struct NodeInfoResponse {
    name: String,
    #[serde(default)]
    catalog_path: String,
    #[serde(default)]
    is_primary: bool,
}

/// Asks each agent which node lives on its host and records name and
/// catalog path in the coordination database. Hosts that cannot answer are
/// dropped with a warning so diagnostics still cover the rest.
pub struct NmaGetNodesInfoOp {
    base: OpBase,
    db_name: String,
    catalog_prefix: String,
    vdb: Arc<Mutex<CoordinationDatabase>>,
}

impl NmaGetNodesInfoOp {
    pub fn new(
        logger: &Logger,
        hosts: Vec<String>,
        db_name: &str,
        catalog_prefix: &str,
        vdb: Arc<Mutex<CoordinationDatabase>>,
    ) -> Self {
        Self {
            base: OpBase::new("NmaGetNodesInfoOp", "Collect node information", logger, hosts),
            db_name: db_name.to_string(),
            catalog_prefix: catalog_prefix.to_string(),
            vdb,
        }
    }

    fn setup_cluster_request(&mut self) {
        self.base.cluster_request = ClusterRequest::new(self.base.name);
        for host in &self.base.hosts {
            let mut request = HostRequest {
                method: Some(HttpMethod::Get),
                ..Default::default()
            };
            request.build_node_mgmt_endpoint("nodes/info");
            request
                .query_params
                .insert("db_name".to_string(), self.db_name.clone());
            if !self.catalog_prefix.is_empty() {
                request
                    .query_params
                    .insert("catalog_prefix".to_string(), self.catalog_prefix.clone());
            }
            self.base
                .cluster_request
                .request_collection
                .insert(host.clone(), request);
        }
    }
}

#[async_trait]
impl ClusterOp for NmaGetNodesInfoOp {
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

    async fn process_result(&mut self, ctx: &mut ExecContext) -> Result<(), OpError> {
        let mut vdb = self.vdb.lock().await;
        vdb.name = self.db_name.clone();
        vdb.host_node_map.clear();

        for (host, result) in self.base.results_in_host_order() {
            self.base.log_response(host, result);
            if result.is_unauthorized() {
                return Err(result.take_err());
            }
            if !result.is_passing() {
                ctx.warnings.push(result.take_err());
                continue;
            }
            match self.base.parse_response::<NodeInfoResponse>(host, &result.content) {
                Ok(node_info) => {
                    let mut node = CoordinationNode::new();
                    node.name = node_info.name;
                    node.address = host.clone();
                    node.catalog_path = node_info.catalog_path;
                    node.is_primary = node_info.is_primary;
                    vdb.host_node_map.insert(host.clone(), node);
                }
                Err(e) => ctx.warnings.push(e),
            }
        }

        // keep only hosts that returned usable node info
        let CoordinationDatabase {
            host_list,
            host_node_map,
            ..
        } = &mut *vdb;
        host_list.retain(|h| host_node_map.contains_key(h));
        if vdb.host_list.is_empty() {
            return Err(self
                .base
                .precondition_err("no hosts successfully returned node info"));
        }
        Ok(())
    }
}
