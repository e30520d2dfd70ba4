//! Catalog bootstrap on the initiator host

use std::collections::HashMap;

use async_trait::async_trait;
use serde::Serialize;
use slog::{info, Logger};

use crate::error::{ErrorCollection, OpError};
use crate::net::{ClusterRequest, HostRequest, HttpMethod};
use crate::ops::{ClusterOp, ExecContext, OpBase};
use crate::vdb::CoordinationDatabase;

/// Creation-time knobs forwarded to the bootstrap endpoint.
#[derive(Debug, Clone, Default)]
pub struct BootstrapCatalogParams {
    pub broadcast: bool,
    pub p2p: bool,
    pub large_cluster: i32,
    pub client_port: u16,
    pub spread_logging: bool,
    pub spread_logging_level: i32,
    pub license_path: String,
    pub shard_count: usize,
    pub configuration_parameters: HashMap<String, String>,
}

#[derive(Serialize)]
struct BootstrapCatalogRequestData {
    db_name: String,
    host: String,
    node_name: String,
    catalog_path: String,
    data_path: String,
    #[serde(skip_serializing_if = "String::is_empty")]
    depot_path: String,
    #[serde(skip_serializing_if = "String::is_empty")]
    communal_storage_location: String,
    #[serde(skip_serializing_if = "is_zero")]
    shard_count: usize,
    port: u16,
    broadcast: bool,
    p2p: bool,
    large_cluster: i32,
    spread_logging: bool,
    spread_logging_level: i32,
    #[serde(skip_serializing_if = "String::is_empty")]
    license_key: String,
    #[serde(skip_serializing_if = "HashMap::is_empty")]
    parameters: HashMap<String, String>,
}

fn is_zero(n: &usize) -> bool {
    *n == 0
}

/// Runs the catalog bootstrap on exactly one host; every other node is
/// created from this catalog afterwards.
pub struct NmaBootstrapCatalogOp {
    base: OpBase,
    host_request_body_map: HashMap<String, String>,
}

impl NmaBootstrapCatalogOp {
    pub fn new(
        logger: &Logger,
        vdb: &CoordinationDatabase,
        params: &BootstrapCatalogParams,
        bootstrap_host: Vec<String>,
    ) -> Result<Self, OpError> {
        let base = OpBase::new(
            "NmaBootstrapCatalogOp",
            "Bootstrap the database catalog",
            logger,
            bootstrap_host
        );
        if base.hosts.len() != 1 {
            return Err(OpError::Internal {
                detail: format!(
                    "[{}] expected exactly one bootstrap host, got {}",
                    base.name,
                    base.hosts.len()
                ),
            });
        }

        let mut host_request_body_map = HashMap::new();
        for host in &base.hosts {
            let node = vdb.node_for_host(host)?;
            let data = BootstrapCatalogRequestData {
                db_name: vdb.name.clone(),
                host: host.clone(),
                node_name: node.name.clone(),
                catalog_path: node.catalog_path.clone(),
                data_path: node.data_path.clone(),
                depot_path: node.depot_path.clone(),
                communal_storage_location: vdb.communal_storage_location.clone(),
                shard_count: params.shard_count,
                port: params.client_port,
                broadcast: params.broadcast,
                p2p: params.p2p,
                large_cluster: params.large_cluster,
                spread_logging: params.spread_logging,
                spread_logging_level: params.spread_logging_level,
                license_key: params.license_path.clone(),
                parameters: params.configuration_parameters.clone(),
            };
            let body = serde_json::to_string(&data).map_err(|e| OpError::Internal {
                detail: format!("[{}] fail to marshal request data: {}", base.name, e),
            })?;
            host_request_body_map.insert(host.clone(), body);
        }

        Ok(Self {
            base,
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
            request.build_node_mgmt_endpoint("catalog/bootstrap");
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
impl ClusterOp for NmaBootstrapCatalogOp {
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
                .precondition_err("empty result collection received from the bootstrap host"));
        }
        let mut errors = ErrorCollection::new();
        for (host, result) in self.base.results_in_host_order() {
            self.base.log_response(host, result);
            if result.is_unauthorized() {
                return Err(result.take_err());
            }
            if result.is_passing() {
                info!(self.base.logger, "catalog bootstrapped"; "host" => host.as_str());
            } else {
                errors.push(result.take_err());
            }
        }
        errors.into_result()
    }
}
