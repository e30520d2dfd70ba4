//! Config file transfer between hosts
//!
//! Cluster creation and node startup copy the database and spread config
//! files from a host that has them to hosts that do not. The download half
//! stores the file content in a slot shared with the matching upload op.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use slog::{info, Logger};
use tokio::sync::Mutex;

use crate::error::{ErrorCollection, OpError};
use crate::net::{ClusterRequest, HostRequest, HttpMethod};
use crate::ops::{reduce_all_hosts_passing, ClusterOp, ExecContext, OpBase};
use crate::vdb::{CoordinationDatabase, NODE_UP_STATE};

/// Which config file a transfer op moves.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfigFile {
    Database,
    Spread,
}

impl ConfigFile {
    fn endpoint(&self) -> &'static str {
        match self {
            ConfigFile::Database => "config/database",
            ConfigFile::Spread => "config/spread",
        }
    }
}

/// Shared slot carrying the file bytes from download to upload.
pub type ConfigContent = Arc<Mutex<String>>;

/// Fetches a config file from one source host.
///
/// Source selection, in order: the explicit source hosts given at
/// construction; else a host with the latest catalog from the election;
/// else a primary UP node from the coordination database.
pub struct NmaDownloadConfigOp {
    base: OpBase,
    config_file: ConfigFile,
    content: ConfigContent,
    vdb: Option<Arc<Mutex<CoordinationDatabase>>>,
    catalog_path_map: HashMap<String, String>,
}

impl NmaDownloadConfigOp {
    pub fn new(
        logger: &Logger,
        name: &'static str,
        source_hosts: Vec<String>,
        config_file: ConfigFile,
        content: ConfigContent,
        vdb: Option<Arc<Mutex<CoordinationDatabase>>>,
    ) -> Self {
        Self {
            base: OpBase::new(name, "Download config file", logger, source_hosts),
            config_file,
            content,
            vdb,
            catalog_path_map: HashMap::new(),
        }
    }

    /// Resolve the source host and its catalog path from whatever facts are
    /// available.
    async fn resolve_source(&mut self, ctx: &ExecContext) -> Result<(), OpError> {
        self.catalog_path_map.clear();

        // a running cluster knows its primary UP nodes; prefer those when a
        // coordination database with node state is present
        if let Some(vdb) = &self.vdb {
            let vdb = vdb.lock().await;
            if !vdb.host_node_map.is_empty() {
                let primary_up: Vec<String> = vdb
                    .host_list
                    .iter()
                    .filter(|h| {
                        vdb.host_node_map
                            .get(*h)
                            .map(|n| n.is_primary && n.state == NODE_UP_STATE)
                            .unwrap_or(false)
                    })
                    .take(1)
                    .cloned()
                    .collect();
                if primary_up.is_empty() {
                    return Err(self.base.precondition_err("could not find any primary up nodes"));
                }
                for host in &primary_up {
                    let node = vdb.node_for_host(host)?;
                    self.catalog_path_map
                        .insert(host.clone(), node.catalog_path.clone());
                }
                self.base.hosts = primary_up;
                return Ok(());
            }
        }

        // otherwise the catalog snapshot from the election is the source of
        // truth; with no explicit host, the first election winner serves
        if self.base.hosts.is_empty() {
            let winner = ctx.hosts_with_latest_catalog.first().ok_or_else(|| {
                self.base
                    .precondition_err("could not find at least one host with the latest catalog")
            })?;
            self.base.hosts = vec![winner.clone()];
        }
        let snapshot = ctx.catalog_snapshot.as_ref().ok_or_else(|| {
            self.base
                .precondition_err("no catalog snapshot available; read the catalog first")
        })?;
        for host in &self.base.hosts.clone() {
            let node = snapshot.node_for_host(host)?;
            self.catalog_path_map
                .insert(host.clone(), catalog_parent_dir(&node.catalog_path));
        }
        Ok(())
    }

    fn setup_cluster_request(&mut self) -> Result<(), OpError> {
        self.base.cluster_request = ClusterRequest::new(self.base.name);
        for host in &self.base.hosts {
            let catalog_path = self.catalog_path_map.get(host).ok_or_else(|| {
                self.base
                    .precondition_err(format!("fail to get catalog path from host {}", host))
            })?;
            let mut request = HostRequest {
                method: Some(HttpMethod::Get),
                ..Default::default()
            };
            request.build_node_mgmt_endpoint(self.config_file.endpoint());
            request
                .query_params
                .insert("catalog_path".to_string(), catalog_path.clone());
            self.base
                .cluster_request
                .request_collection
                .insert(host.clone(), request);
        }
        Ok(())
    }
}

/// The editor reports `<node>_catalog/Catalog`; config files live one level
/// up.
fn catalog_parent_dir(catalog_path: &str) -> String {
    match catalog_path.strip_suffix("/Catalog") {
        Some(parent) => parent.to_string(),
        None => catalog_path.to_string(),
    }
}

#[async_trait]
impl ClusterOp for NmaDownloadConfigOp {
    fn base(&self) -> &OpBase {
        &self.base
    }

    fn base_mut(&mut self) -> &mut OpBase {
        &mut self.base
    }

    async fn prepare(&mut self, ctx: &mut ExecContext) -> Result<(), OpError> {
        self.resolve_source(ctx).await?;
        ctx.dispatcher.setup(&self.base.hosts);
        self.setup_cluster_request()
    }

    async fn process_result(&mut self, _ctx: &mut ExecContext) -> Result<(), OpError> {
        let mut errors = ErrorCollection::new();
        for (host, result) in self.base.results_in_host_order() {
            self.base.log_response(host, result);
            if result.is_unauthorized() {
                return Err(result.take_err());
            }
            if result.is_passing() {
                // the file content is the response body
                *self.content.lock().await = result.content.clone();
                info!(self.base.logger, "config file downloaded"; "host" => host.as_str());
                return Ok(());
            }
            errors.push(result.take_err());
        }
        if errors.is_empty() {
            return Err(self
                .base
                .precondition_err("empty result collection received from the hosts"));
        }
        Err(errors.into_error())
    }
}

/// Pushes a previously downloaded config file to the hosts that need it.
pub struct NmaUploadConfigOp {
    base: OpBase,
    config_file: ConfigFile,
    content: ConfigContent,
    catalog_path_map: HashMap<String, String>,
}

impl NmaUploadConfigOp {
    pub fn new(
        logger: &Logger,
        name: &'static str,
        target_hosts: Vec<String>,
        config_file: ConfigFile,
        content: ConfigContent,
    ) -> Self {
        Self {
            base: OpBase::new(name, "Upload config file", logger, target_hosts),
            config_file,
            content,
            catalog_path_map: HashMap::new(),
        }
    }

    async fn setup_cluster_request(&mut self) -> Result<(), OpError> {
        let content = self.content.lock().await.clone();
        if content.is_empty() {
            return Err(self
                .base
                .precondition_err("no config file content to upload; download it first"));
        }

        self.base.cluster_request = ClusterRequest::new(self.base.name);
        for host in &self.base.hosts {
            let catalog_path = self.catalog_path_map.get(host).ok_or_else(|| {
                self.base
                    .precondition_err(format!("fail to get catalog path from host {}", host))
            })?;
            let mut request = HostRequest {
                method: Some(HttpMethod::Post),
                ..Default::default()
            };
            request.build_node_mgmt_endpoint(self.config_file.endpoint());
            request
                .query_params
                .insert("catalog_path".to_string(), catalog_path.clone());
            request.body = content.clone();
            self.base
                .cluster_request
                .request_collection
                .insert(host.clone(), request);
        }
        Ok(())
    }
}

#[async_trait]
impl ClusterOp for NmaUploadConfigOp {
    fn base(&self) -> &OpBase {
        &self.base
    }

    fn base_mut(&mut self) -> &mut OpBase {
        &mut self.base
    }

    async fn prepare(&mut self, ctx: &mut ExecContext) -> Result<(), OpError> {
        let snapshot = ctx.catalog_snapshot.as_ref().ok_or_else(|| {
            self.base
                .precondition_err("no catalog snapshot available; read the catalog first")
        })?;
        self.catalog_path_map.clear();
        for host in &self.base.hosts.clone() {
            let node = snapshot.node_for_host(host)?;
            self.catalog_path_map
                .insert(host.clone(), catalog_parent_dir(&node.catalog_path));
        }

        ctx.dispatcher.setup(&self.base.hosts);
        self.setup_cluster_request().await
    }

    async fn process_result(&mut self, _ctx: &mut ExecContext) -> Result<(), OpError> {
        reduce_all_hosts_passing(&self.base)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_catalog_parent_dir() {
        assert_eq!(
            catalog_parent_dir("/cat/db/v_db_node0001_catalog/Catalog"),
            "/cat/db/v_db_node0001_catalog"
        );
        assert_eq!(catalog_parent_dir("/cat/db/plain"), "/cat/db/plain");
    }
}
