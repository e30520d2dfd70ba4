//! Wait for nodes to reach a target state

use async_trait::async_trait;
use slog::{info, Logger};

use crate::error::OpError;
use crate::net::{ClusterRequest, HostRequest, HttpMethod};
use crate::ops::https::up_nodes::NodesInfo;
use crate::ops::https::HttpsCredentials;
use crate::ops::poller::{poll_state, PollingOp, STARTUP_POLLING_TIMEOUT_SECS};
use crate::ops::{ClusterOp, ExecContext, OpBase};
use crate::vdb::NODE_UP_STATE;

const NODE_STATE_REQUEST_TIMEOUT_SECS: u64 = 20;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TargetNodeState {
    Up,
    Down,
}

/// Polls `GET /v1/nodes` until every target host reports the wanted state.
///
/// Waiting for DOWN treats an unreachable control endpoint as arrival: a
/// stopped database answers nobody.
pub struct HttpsPollNodeStateOp {
    base: OpBase,
    credentials: HttpsCredentials,
    target_state: TargetNodeState,
    timeout_secs: u64,
}

impl HttpsPollNodeStateOp {
    pub fn new(
        logger: &Logger,
        hosts: Vec<String>,
        credentials: HttpsCredentials,
        target_state: TargetNodeState,
        timeout_secs: Option<u64>,
    ) -> Self {
        Self {
            base: OpBase::new("HttpsPollNodeStateOp", "Wait for node state", logger, hosts),
            credentials,
            target_state,
            timeout_secs: timeout_secs.unwrap_or(STARTUP_POLLING_TIMEOUT_SECS),
        }
    }

    fn setup_cluster_request(&mut self) {
        self.base.cluster_request = ClusterRequest::new(self.base.name);
        for host in &self.base.hosts {
            let mut request = HostRequest {
                method: Some(HttpMethod::Get),
                timeout_secs: NODE_STATE_REQUEST_TIMEOUT_SECS,
                ..Default::default()
            };
            request.build_db_https_endpoint("nodes");
            self.credentials.apply(&mut request);
            self.base
                .cluster_request
                .request_collection
                .insert(host.clone(), request);
        }
    }
}

#[async_trait]
impl ClusterOp for HttpsPollNodeStateOp {
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

    async fn execute(&mut self, ctx: &mut ExecContext) -> Result<(), OpError> {
        poll_state(self, ctx).await
    }

    async fn process_result(&mut self, _ctx: &mut ExecContext) -> Result<(), OpError> {
        Ok(())
    }
}

impl PollingOp for HttpsPollNodeStateOp {
    fn polling_timeout_secs(&self) -> u64 {
        self.timeout_secs
    }

    fn should_stop_polling(&mut self, _ctx: &mut ExecContext) -> Result<bool, OpError> {
        let mut saw_listing = false;

        for (host, result) in self.base.results_in_host_order() {
            self.base.log_response(host, result);

            if result.is_password_or_cert_error() {
                return Err(OpError::Precondition {
                    op: self.base.name.to_string(),
                    detail: format!(
                        "wrong password/certificate for the https service on host {}",
                        host
                    ),
                });
            }

            if !result.is_passing() {
                continue;
            }
            let nodes: NodesInfo = self.base.parse_response(host, &result.content)?;
            saw_listing = true;

            let up_targets = self
                .base
                .hosts
                .iter()
                .filter(|target| {
                    nodes
                        .node_list
                        .iter()
                        .any(|n| n.address == **target && n.state == NODE_UP_STATE)
                })
                .count();

            match self.target_state {
                TargetNodeState::Up => {
                    if up_targets == self.base.hosts.len() {
                        info!(self.base.logger, "all target nodes are up";
                            "count" => up_targets);
                        return Ok(true);
                    }
                }
                TargetNodeState::Down => {
                    if up_targets == 0 {
                        info!(self.base.logger, "all target nodes are down");
                        return Ok(true);
                    }
                }
            }
            // one answer describes the whole cluster
            return Ok(false);
        }

        // nobody answered: down means arrived, up means keep waiting
        if !saw_listing && self.target_state == TargetNodeState::Down {
            info!(self.base.logger, "control endpoint no longer answering; nodes are down");
            return Ok(true);
        }
        Ok(false)
    }
}
