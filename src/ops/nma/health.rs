//! Agent reachability checks

use std::sync::Arc;

use async_trait::async_trait;
use slog::{info, Logger};
use tokio::sync::Mutex;

use crate::error::OpError;
use crate::net::{HostRequest, HttpMethod};
use crate::ops::{reduce_all_hosts_passing, ClusterOp, ExecContext, OpBase};
use crate::vdb::CoordinationDatabase;

/// Verifies the node-management agent answers on every target host.
pub struct NmaHealthOp {
    base: OpBase,
}

impl NmaHealthOp {
    pub fn new(logger: &Logger, hosts: Vec<String>) -> Self {
        Self {
            base: OpBase::new("NmaHealthOp", "Check node-management agent connectivity", logger, hosts),
        }
    }

    fn setup_cluster_request(&mut self) {
        self.base.cluster_request = crate::net::ClusterRequest::new(self.base.name);
        for host in &self.base.hosts {
            let mut request = HostRequest {
                method: Some(HttpMethod::Get),
                ..Default::default()
            };
            request.build_node_mgmt_endpoint("health");
            self.base
                .cluster_request
                .request_collection
                .insert(host.clone(), request);
        }
    }
}

#[async_trait]
impl ClusterOp for NmaHealthOp {
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

/// Like [`NmaHealthOp`] but tolerant: hosts whose agent does not answer are
/// dropped from the coordination database instead of failing the run.
/// Scrutinize uses this to work with whatever part of the cluster is alive.
pub struct NmaGetHealthyNodesOp {
    base: OpBase,
    vdb: Arc<Mutex<CoordinationDatabase>>,
}

impl NmaGetHealthyNodesOp {
    pub fn new(
        logger: &Logger,
        hosts: Vec<String>,
        vdb: Arc<Mutex<CoordinationDatabase>>,
    ) -> Self {
        Self {
            base: OpBase::new(
                "NmaGetHealthyNodesOp",
                "Collect hosts with a running node-management agent",
                logger,
                hosts,
            ),
            vdb,
        }
    }

    fn setup_cluster_request(&mut self) {
        self.base.cluster_request = crate::net::ClusterRequest::new(self.base.name);
        for host in &self.base.hosts {
            let mut request = HostRequest {
                method: Some(HttpMethod::Get),
                ..Default::default()
            };
            request.build_node_mgmt_endpoint("health");
            self.base
                .cluster_request
                .request_collection
                .insert(host.clone(), request);
        }
    }
}

#[async_trait]
impl ClusterOp for NmaGetHealthyNodesOp {
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
        let mut healthy = Vec::new();
        for (host, result) in self.base.results_in_host_order() {
            self.base.log_response(host, result);
            if result.is_unauthorized() {
                return Err(result.take_err());
            }
            if result.is_passing() {
                healthy.push(host.clone());
            } else {
                ctx.warnings.push(result.take_err());
            }
        }

        if healthy.is_empty() {
            return Err(self
                .base
                .precondition_err("no host has a healthy node-management agent"));
        }

        info!(self.base.logger, "healthy agents found"; "count" => healthy.len());
        self.vdb.lock().await.host_list = healthy;
        Ok(())
    }
}
