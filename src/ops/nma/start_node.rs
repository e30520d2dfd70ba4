//! Node process startup through the agent

use std::collections::HashMap;

use async_trait::async_trait;
use serde::Serialize;
use slog::Logger;

use crate::error::OpError;
use crate::net::{ClusterRequest, HostRequest, HttpMethod};
use crate::ops::{reduce_all_hosts_passing, ClusterOp, ExecContext, OpBase};

#[derive(Serialize)]
struct StartNodeRequestData {
    start_command: Vec<String>,
}

/// Starts the database process on each target host using the start command
/// recorded in the elected catalog snapshot.
pub struct NmaStartNodeOp {
    base: OpBase,
}

impl NmaStartNodeOp {
    pub fn new(logger: &Logger, hosts: Vec<String>) -> Self {
        Self {
            base: OpBase::new("NmaStartNodeOp", "Start node processes", logger, hosts),
        }
    }

    fn setup_cluster_request(
        &mut self,
        start_commands: &HashMap<String, Vec<String>>,
    ) -> Result<(), OpError> {
        self.base.cluster_request = ClusterRequest::new(self.base.name);
        for host in &self.base.hosts {
            let command = start_commands.get(host).ok_or_else(|| {
                self.base
                    .precondition_err(format!("no start command known for host {}", host))
            })?;
            let data = StartNodeRequestData {
                start_command: command.clone(),
            };
            let body = serde_json::to_string(&data).map_err(|e| OpError::Internal {
                detail: format!("[{}] fail to marshal request data: {}", self.base.name, e),
            })?;

            let mut request = HostRequest {
                method: Some(HttpMethod::Post),
                ..Default::default()
            };
            request.build_node_mgmt_endpoint("nodes/start");
            request.body = body;
            self.base
                .cluster_request
                .request_collection
                .insert(host.clone(), request);
        }
        Ok(())
    }
}

#[async_trait]
impl ClusterOp for NmaStartNodeOp {
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

        let mut start_commands = HashMap::with_capacity(self.base.hosts.len());
        for host in &self.base.hosts {
            let node = snapshot.node_for_host(host)?;
            start_commands.insert(host.clone(), node.start_command.clone());
        }

        ctx.dispatcher.setup(&self.base.hosts);
        self.setup_cluster_request(&start_commands)
    }

    async fn process_result(&mut self, _ctx: &mut ExecContext) -> Result<(), OpError> {
        reduce_all_hosts_passing(&self.base)
    }
}
