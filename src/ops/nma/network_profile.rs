//! Network-profile collection

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use slog::Logger;

use crate::error::{ErrorCollection, OpError};
use crate::net::{ClusterRequest, HostRequest, HttpMethod};
use crate::ops::{ClusterOp, ExecContext, OpBase};

/// What the agent reports about the interface carrying a host's address.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct NetworkProfile {
    #[serde(default)]
    pub name: String,
    pub address: String,
    #[serde(default)]
    pub subnet: String,
    #[serde(default)]
    pub netmask: String,
    #[serde(default)]
    pub broadcast: String,
}

/// Collects one [`NetworkProfile`] per host and publishes the mapping to
/// the ExecContext for bootstrap-catalog and load-remote-catalog.
pub struct NmaNetworkProfileOp {
    base: OpBase,
}

impl NmaNetworkProfileOp {
    pub fn new(logger: &Logger, hosts: Vec<String>) -> Self {
        Self {
            base: OpBase::new("NmaNetworkProfileOp", "Get network profiles", logger, hosts),
        }
    }

    fn setup_cluster_request(&mut self) {
        self.base.cluster_request = ClusterRequest::new(self.base.name);
        for host in &self.base.hosts {
            let mut request = HostRequest {
                method: Some(HttpMethod::Get),
                ..Default::default()
            };
            request.build_node_mgmt_endpoint("network-profiles");
            request
                .query_params
                .insert("broadcast-hint".to_string(), host.clone());
            self.base
                .cluster_request
                .request_collection
                .insert(host.clone(), request);
        }
    }
}

#[async_trait]
impl ClusterOp for NmaNetworkProfileOp {
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
        if self.base.cluster_request.result_collection.is_empty() {
            return Err(self
                .base
                .precondition_err("empty result collection received from the hosts"));
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
            match self.base.parse_response::<NetworkProfile>(host, &result.content) {
                Ok(profile) => {
                    ctx.network_profiles.insert(host.clone(), profile);
                }
                Err(e) => errors.push(e),
            }
        }
        errors.into_result()
    }
}
