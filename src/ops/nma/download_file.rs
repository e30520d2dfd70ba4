//! Cluster-descriptor download from communal storage (revive, part 1)

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use slog::{info, Logger};
use tokio::sync::Mutex;

use crate::error::{ErrorCollection, OpError};
use crate::net::{ClusterRequest, HostRequest, HttpMethod};
use crate::ops::{ClusterOp, ExecContext, OpBase};
use crate::vdb::{CoordinationDatabase, CoordinationNode};

#[derive(Serialize)]
struct DownloadFileRequestData {
    source_file_path: String,
    destination_file_path: String,
    #[serde(skip_serializing_if = "String::is_empty")]
    catalog_path: String,
    #[serde(skip_serializing_if = "HashMap::is_empty")]
    parameters: HashMap<String, String>,
}

/// The terminated cluster's descriptor as stored in communal storage.
#[derive(Debug, Deserialize)]
struct ClusterDescriptor {
    name: String,
    #[serde(default)]
    communal_storage_location: String,
    nodes: Vec<DescriptorNode>,
}

#[derive(Debug, Deserialize)]
struct DescriptorNode {
    name: String,
    address: String,
    #[serde(default)]
    catalog_path: String,
    #[serde(default)]
    storage_locations: Vec<String>,
    #[serde(default)]
    user_storage_locations: Vec<String>,
    #[serde(default)]
    is_primary: bool,
}

/// Has the initiator agent fetch the cluster descriptor from communal
/// storage and fills the coordination database from it.
pub struct NmaDownloadFileOp {
    base: OpBase,
    request_body: String,
    vdb: Arc<Mutex<CoordinationDatabase>>,
}

impl NmaDownloadFileOp {
    pub fn new(
        logger: &Logger,
        initiator: Vec<String>,
        source_file_path: &str,
        destination_file_path: &str,
        communal_storage_parameters: HashMap<String, String>,
        vdb: Arc<Mutex<CoordinationDatabase>>,
    ) -> Result<Self, OpError> {
        let data = DownloadFileRequestData {
            source_file_path: source_file_path.to_string(),
            destination_file_path: destination_file_path.to_string(),
            catalog_path: String::new(),
            parameters: communal_storage_parameters,
        };
        let request_body = serde_json::to_string(&data).map_err(|e| OpError::Internal {
            detail: format!("fail to marshal request data: {}", e),
        })?;

        Ok(Self {
            base: OpBase::new(
                "NmaDownloadFileOp",
                "Download cluster descriptor from communal storage",
                logger,
                initiator,
            ),
            request_body,
            vdb,
        })
    }

    fn setup_cluster_request(&mut self) {
        self.base.cluster_request = ClusterRequest::new(self.base.name);
        for host in &self.base.hosts {
            let mut request = HostRequest {
                method: Some(HttpMethod::Post),
                ..Default::default()
            };
            request.build_node_mgmt_endpoint("files/download");
            request.body = self.request_body.clone();
            self.base
                .cluster_request
                .request_collection
                .insert(host.clone(), request);
        }
    }
}

#[async_trait]
impl ClusterOp for NmaDownloadFileOp {
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
        if self.base.cluster_request.result_collection.is_empty() {
            return Err(self
                .base
                .precondition_err("empty result collection received from the initiator"));
        }

        let mut errors = ErrorCollection::new();
        for (host, result) in self.base.results_in_host_order() {
            self.base.log_response(host, result);

            if result.is_unauthorized() {
                return Err(result.take_err());
            }
            if !result.is_passing() {
                errors.push(result.take_err());
                continue;
            }

            let descriptor: ClusterDescriptor =
                match self.base.parse_response(host, &result.content) {
                    Ok(d) => d,
                    Err(e) => {
                        errors.push(e);
                        continue;
                    }
                };

            let mut vdb = self.vdb.lock().await;
            vdb.name = descriptor.name.clone();
            if !descriptor.communal_storage_location.is_empty() {
                vdb.communal_storage_location = descriptor.communal_storage_location.clone();
                vdb.is_eon = true;
            }
            vdb.host_list.clear();
            vdb.host_node_map.clear();
            for desc_node in &descriptor.nodes {
                let mut node = CoordinationNode::new();
                node.name = desc_node.name.clone();
                node.address = desc_node.address.clone();
                node.catalog_path = desc_node.catalog_path.clone();
                node.storage_locations = desc_node.storage_locations.clone();
                node.user_storage_locations = desc_node.user_storage_locations.clone();
                node.is_primary = desc_node.is_primary;
                vdb.host_list.push(node.address.clone());
                vdb.host_node_map.insert(node.address.clone(), node);
            }

            info!(self.base.logger, "cluster descriptor loaded";
                "db_name" => &descriptor.name,
                "nodes" => descriptor.nodes.len()
            );
            return Ok(());
        }

        Err(errors.into_error())
    }
}
