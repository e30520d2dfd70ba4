//! Catalog read and the catalog-version election
//!
//! Every recovery verb depends on this operation: it asks each candidate
//! host for its catalog descriptor, elects the hosts tied for the maximum
//! global version and publishes them to the ExecContext.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use slog::{info, Logger};
use tokio::sync::Mutex;

use crate::catalog::CatalogDatabase;
use crate::error::{ErrorCollection, OpError};
use crate::net::{ClusterRequest, HostRequest, HttpMethod};
use crate::ops::{ClusterOp, ExecContext, OpBase};
use crate::vdb::CoordinationDatabase;

/// Reads each host's catalog descriptor and elects the freshest copies.
pub struct NmaReadCatalogOp {
    base: OpBase,
    /// When non-empty, only these hosts are queried (used while creating
    /// new nodes, where the bootstrap host is the only one with a catalog)
    initiator: Vec<String>,
    vdb: Arc<Mutex<CoordinationDatabase>>,
    catalog_path_map: HashMap<String, String>,
}

impl NmaReadCatalogOp {
    pub fn new(logger: &Logger, vdb: Arc<Mutex<CoordinationDatabase>>) -> Self {
        Self::with_initiator(logger, Vec::new(), vdb)
    }

    /// `initiator` narrows the candidate set; empty means every host in the
    /// coordination database.
    pub fn with_initiator(
        logger: &Logger,
        initiator: Vec<String>,
        vdb: Arc<Mutex<CoordinationDatabase>>,
    ) -> Self {
        Self {
            base: OpBase::new("NmaReadCatalogOp", "Read catalog", logger, Vec::new()),
            initiator,
            vdb,
            catalog_path_map: HashMap::new(),
        }
    }

    fn setup_cluster_request(&mut self) -> Result<(), OpError> {
        self.base.cluster_request = ClusterRequest::new(self.base.name);
        for host in &self.base.hosts {
            let catalog_path = self
                .catalog_path_map
                .get(host)
                .ok_or_else(|| self.base.precondition_err(format!(
                    "cannot find catalog path of host {}",
                    host
                )))?;

            let mut request = HostRequest {
                method: Some(HttpMethod::Get),
                ..Default::default()
            };
            request.build_node_mgmt_endpoint("catalog/database");
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

#[async_trait]
impl ClusterOp for NmaReadCatalogOp {
    fn base(&self) -> &OpBase {
        &self.base
    }

    fn base_mut(&mut self) -> &mut OpBase {
        &mut self.base
    }

    async fn prepare(&mut self, ctx: &mut ExecContext) -> Result<(), OpError> {
        // build a host → catalog path map; with an initiator list, only for
        // those hosts
        let vdb = self.vdb.lock().await;
        self.catalog_path_map.clear();
        if self.initiator.is_empty() {
            self.base.hosts = vdb.host_list.clone();
        } else {
            self.base.hosts = self.initiator.clone();
        }
        for host in &self.base.hosts {
            let node = vdb.host_node_map.get(host).ok_or_else(|| {
                OpError::Precondition {
                    op: self.base.name.to_string(),
                    detail: format!("cannot find host {} in the coordination database", host),
                }
            })?;
            self.catalog_path_map
                .insert(host.clone(), node.catalog_path.clone());
        }
        drop(vdb);

        ctx.dispatcher.setup(&self.base.hosts);
        self.setup_cluster_request()
    }

    async fn process_result(&mut self, ctx: &mut ExecContext) -> Result<(), OpError> {
        let mut errors = ErrorCollection::new();
        let mut hosts_with_latest_catalog: Vec<String> = Vec::new();
        let mut max_global_version: i64 = i64::MIN;
        let mut latest_catalog: Option<CatalogDatabase> = None;

        for (host, result) in self.base.results_in_host_order() {
            self.base.log_response(host, result);

            if result.is_unauthorized() {
                return Err(result.take_err());
            }
            if !result.is_passing() {
                errors.push(result.take_err());
                continue;
            }

            let mut descriptor: CatalogDatabase =
                match self.base.parse_response(host, &result.content) {
                    Ok(d) => d,
                    Err(e) => {
                        errors.push(e);
                        continue;
                    }
                };

            let global_version = match descriptor.versions.global_version(host) {
                Ok(v) => v,
                Err(e) => {
                    errors.push(e);
                    continue;
                }
            };

            // derive the address index and primary count for later steps
            descriptor.index_nodes();

            if global_version > max_global_version {
                hosts_with_latest_catalog = vec![host.clone()];
                max_global_version = global_version;
                latest_catalog = Some(descriptor);
            } else if global_version == max_global_version {
                // ties keep first-seen order; the first winner's
                // descriptor stays published
                hosts_with_latest_catalog.push(host.clone());
            }
        }

        if hosts_with_latest_catalog.is_empty() {
            errors.push(self
                .base
                .precondition_err("cannot find any host with the latest catalog"));
            return Err(errors.into_error());
        }

        info!(self.base.logger, "catalog election complete";
            "winners" => hosts_with_latest_catalog.len(),
            "global_version" => max_global_version
        );

        ctx.hosts_with_latest_catalog = hosts_with_latest_catalog;
        ctx.catalog_snapshot = latest_catalog;

        // a winner exists: per-host failures are surfaced as warnings, not
        // as the operation's error
        if let Err(joined) = errors.into_result() {
            ctx.warnings.push(joined);
        }
        Ok(())
    }
}
