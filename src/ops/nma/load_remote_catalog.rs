//! Remote catalog load from communal storage (revive)

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use slog::{info, Logger};
use tokio::sync::Mutex;

use crate::error::{ErrorCollection, OpError};
use crate::net::{ClusterRequest, HostRequest, HttpMethod};
use crate::ops::{has_quorum, ClusterOp, ExecContext, OpBase};
use crate::vdb::CoordinationDatabase;

const SUCCESSFUL_CODE: i64 = 0;

#[derive(Serialize)]
struct LoadRemoteCatalogRequestData {
    db_name: String,
    storage_locations: Vec<String>,
    communal_location: String,
    catalog_path: String,
    /// The address this node had in the terminated cluster
    host: String,
    node_name: String,
    /// node_name → [address, control address, broadcast]
    node_addresses: HashMap<String, Vec<String>>,
    #[serde(skip_serializing_if = "String::is_empty")]
    aws_access_key_id: String,
    #[serde(skip_serializing_if = "String::is_empty")]
    aws_secret_access_key: String,
    #[serde(skip_serializing_if = "HashMap::is_empty")]
    parameters: HashMap<String, String>,
}

#[derive(Deserialize)]
struct LoadCatalogResponse {
    status: i64,
}

/// Reconstructs each node's catalog from communal storage.
///
/// Succeeds when a strict majority of primary nodes loaded; failures above
/// quorum are recorded as warnings only.
pub struct NmaLoadRemoteCatalogOp {
    base: OpBase,
    old_hosts: Vec<String>,
    communal_location: String,
    communal_storage_parameters: HashMap<String, String>,
    vdb: Arc<Mutex<CoordinationDatabase>>,
    timeout_secs: u64,
    primary_node_count: usize,
    host_request_body_map: HashMap<String, String>,
}

impl NmaLoadRemoteCatalogOp {
    /// `new_hosts[i]` replaces `old_hosts[i]`; both orderings come from the
    /// revive address reassignment.
    pub async fn new(
        logger: &Logger,
        new_hosts: Vec<String>,
        old_hosts: Vec<String>,
        communal_location: &str,
        communal_storage_parameters: HashMap<String, String>,
        vdb: Arc<Mutex<CoordinationDatabase>>,
        timeout_secs: u64,
    ) -> Self {
        let primary_node_count = vdb.lock().await.primary_node_count();
        Self {
            base: OpBase::new(
                "NmaLoadRemoteCatalogOp",
                "Load remote catalog from communal storage",
                logger,
                new_hosts,
            ),
            old_hosts,
            communal_location: communal_location.to_string(),
            communal_storage_parameters,
            vdb,
            timeout_secs,
            primary_node_count,
            host_request_body_map: HashMap::new(),
        }
    }

    async fn setup_request_bodies(&mut self, ctx: &ExecContext) -> Result<(), OpError> {
        if ctx.network_profiles.len() != self.base.hosts.len() {
            return Err(self.base.precondition_err(format!(
                "the number of hosts in the network profiles ({}) does not match the number of hosts loading remote catalogs ({})",
                ctx.network_profiles.len(),
                self.base.hosts.len()
            )));
        }

        let vdb = self.vdb.lock().await;

        // node_name → [new address, control address, broadcast address]
        let mut node_addresses: HashMap<String, Vec<String>> = HashMap::new();
        for (host, profile) in &ctx.network_profiles {
            let node = vdb.node_for_host(host)?;
            node_addresses.insert(
                node.name.clone(),
                vec![host.clone(), profile.address.clone(), profile.broadcast.clone()]
            );
        }

        let (aws_key_id, aws_key_secret) =
            extract_aws_auth(&self.communal_storage_parameters);

        self.host_request_body_map = HashMap::with_capacity(self.base.hosts.len());
        for (index, host) in self.base.hosts.iter().enumerate() {
            let old_host = self.old_hosts.get(index).ok_or_else(|| OpError::Internal {
                detail: format!(
                    "[{}] no old address recorded for host {}",
                    self.base.name, host
                ),
            })?;
            let node = vdb.node_for_host(host)?;
            let data = LoadRemoteCatalogRequestData {
                db_name: vdb.name.clone(),
                storage_locations: node.storage_locations.clone(),
                communal_location: self.communal_location.clone(),
                catalog_path: node.catalog_path.clone(),
                host: old_host.clone(),
                node_name: node.name.clone(),
                node_addresses: node_addresses.clone(),
                aws_access_key_id: aws_key_id.clone(),
                aws_secret_access_key: aws_key_secret.clone(),
                parameters: self.communal_storage_parameters.clone(),
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
                timeout_secs: self.timeout_secs,
                ..Default::default()
            };
            request.build_node_mgmt_endpoint("catalog/revive");
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

/// Pull AWS credentials out of the communal storage parameters so the agent
/// can authenticate against the object store.
fn extract_aws_auth(parameters: &HashMap<String, String>) -> (String, String) {
    let mut key_id = String::new();
    let mut secret = String::new();
    for (name, value) in parameters {
        match name.to_lowercase().as_str() {
            "awsauth" => {
                if let Some((id, sec)) = value.split_once(':') {
                    key_id = id.to_string();
                    secret = sec.to_string();
                }
            }
            "aws_access_key_id" => key_id = value.clone(),
            "aws_secret_access_key" => secret = value.clone(),
            _ => {}
        }
    }
    (key_id, secret)
}

#[async_trait]
impl ClusterOp for NmaLoadRemoteCatalogOp {
    fn base(&self) -> &OpBase {
        &self.base
    }

    fn base_mut(&mut self) -> &mut OpBase {
        &mut self.base
    }

    async fn prepare(&mut self, ctx: &mut ExecContext) -> Result<(), OpError> {
        self.setup_request_bodies(ctx).await?;
        ctx.dispatcher.setup(&self.base.hosts);
        self.setup_cluster_request();
        Ok(())
    }

    async fn process_result(&mut self, ctx: &mut ExecContext) -> Result<(), OpError> {
        let vdb = self.vdb.lock().await;
        let mut errors = ErrorCollection::new();
        let mut success_primary_count = 0usize;

        for (host, result) in self.base.results_in_host_order() {
            self.base.log_response(host, result);

            if result.is_unauthorized() {
                return Err(result.take_err());
            }
            if !result.is_passing() {
                errors.push(result.take_err());
                continue;
            }

            let response: LoadCatalogResponse =
                match self.base.parse_response(host, &result.content) {
                    Ok(r) => r,
                    Err(e) => {
                        errors.push(e);
                        continue;
                    }
                };
            if response.status != SUCCESSFUL_CODE {
                errors.push(OpError::Application {
                    host: host.clone(),
                    detail: format!(
                        "[{}] fail to load remote catalog (status {})",
                        self.base.name, response.status
                    ),
                });
                continue;
            }

            if vdb.node_for_host(host)?.is_primary {
                success_primary_count += 1;
            }
        }

        if !has_quorum(success_primary_count, self.primary_node_count) {
            errors.push(OpError::Quorum {
                op: self.base.name.to_string(),
                success: success_primary_count,
                total: self.primary_node_count,
            });
            return Err(errors.into_error());
        }

        info!(self.base.logger, "catalog loaded with quorum";
            "success_primary" => success_primary_count,
            "primary_total" => self.primary_node_count
        );
        // above quorum: remaining failures are not fatal
        if let Err(joined) = errors.into_result() {
            ctx.warnings.push(joined);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_extract_aws_auth_combined_form() {
        let mut params = HashMap::new();
        params.insert("awsauth".to_string(), "key123:secret456".to_string());
        let (id, secret) = extract_aws_auth(&params);
        assert_eq!(id, "key123");
        assert_eq!(secret, "secret456");
    }

    #[test]
    fn test_extract_aws_auth_split_form() {
        let mut params = HashMap::new();
        params.insert("AWS_ACCESS_KEY_ID".to_string(), "key123".to_string());
        params.insert("AWS_SECRET_ACCESS_KEY".to_string(), "secret456".to_string());
        let (id, secret) = extract_aws_auth(&params);
        assert_eq!(id, "key123");
        assert_eq!(secret, "secret456");
    }

    #[test]
    fn test_extract_aws_auth_absent() {
        let params = HashMap::new();
        let (id, secret) = extract_aws_auth(&params);
        assert!(id.is_empty());
        assert!(secret.is_empty());
    }
}
