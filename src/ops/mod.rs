//! The operation engine: lifecycle trait, shared per-op state, engine and
//! poller.

pub mod engine;
pub mod https;
pub mod nma;
pub mod poller;

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use slog::{debug, o, Logger};

use crate::error::OpError;
use crate::net::{ClusterRequest, HostResult};

pub use engine::{Engine, ExecContext};
pub use poller::{poll_state, PollingOp};

/// State every operation carries: display name, scoped logger, its current
/// target hosts and the cluster request it has built.
pub struct OpBase {
    pub name: &'static str,
    pub description: &'static str,
    pub logger: Logger,
    /// Mutable across prepare; some operations narrow or widen their
    /// targets based on facts in the ExecContext
    pub hosts: Vec<String>,
    pub cluster_request: ClusterRequest,
}

impl OpBase {
    pub fn new(
        name: &'static str,
        description: &'static str,
        logger: &Logger,
        hosts: Vec<String>,
    ) -> Self {
        Self {
            name,
            description,
            logger: logger.new(o!("op" => name)),
            hosts,
            cluster_request: ClusterRequest::new(name),
        }
    }

    pub fn log_response(&self, host: &str, result: &HostResult) {
        debug!(self.logger, "host result";
            "host" => host,
            "status" => result.status.as_str(),
            "http_status" => result.http_status,
            "elapsed_ms" => result.elapsed.as_millis() as u64
        );
    }

    /// Decode a passing host's JSON body into `T`.
    pub fn parse_response<T: DeserializeOwned>(
        &self,
        host: &str,
        content: &str,
    ) -> Result<T, OpError> {
        serde_json::from_str(content).map_err(|e| OpError::Parse {
            host: host.to_string(),
            detail: format!("[{}] {}", self.name, e),
        })
    }

    /// Results in prepared-host order; this is the "first seen" order every
    /// order-sensitive reducer (notably the catalog election) relies on.
    pub fn results_in_host_order(&self) -> Vec<(&String, &HostResult)> {
        let mut ordered = Vec::with_capacity(self.cluster_request.result_collection.len());
        for host in &self.hosts {
            if let Some(result) = self.cluster_request.result_collection.get(host) {
                ordered.push((host, result));
            }
        }
        ordered
    }

    /// Precondition error scoped to this operation.
    pub fn precondition_err(&self, detail: impl Into<String>) -> OpError {
        OpError::Precondition {
            op: self.name.to_string(),
            detail: detail.into(),
        }
    }
}

/// The polymorphic step of a verb.
///
/// Lifecycle: prepare → execute (→ polling) → finalize. `finalize` runs on
/// every operation whose prepare succeeded, even after a later failure, and
/// never fails itself.
#[async_trait]
pub trait ClusterOp: Send {
    fn base(&self) -> &OpBase;
    fn base_mut(&mut self) -> &mut OpBase;

    fn name(&self) -> &'static str {
        self.base().name
    }

    /// Decide target hosts, consult earlier operations' facts, build the
    /// per-host request map. Must be idempotent with respect to `ctx`.
    async fn prepare(&mut self, ctx: &mut ExecContext) -> Result<(), OpError>;

    /// Dispatch the prepared request and reduce the results. Polling
    /// operations override this to drive the poller instead.
    async fn execute(&mut self, ctx: &mut ExecContext) -> Result<(), OpError> {
        self.run_execute(ctx).await?;
        self.process_result(ctx).await
    }

    /// Reduce the result collection into a ctx mutation, a success or an
    /// aggregated error.
    async fn process_result(&mut self, ctx: &mut ExecContext) -> Result<(), OpError>;

    /// Best-effort cleanup; errors are logged, never returned.
    async fn finalize(&mut self, _ctx: &mut ExecContext) {}

    /// Send the prepared cluster request through the context's dispatcher.
    async fn run_execute(&mut self, ctx: &mut ExecContext) -> Result<(), OpError> {
        let dispatcher = ctx.dispatcher.clone();
        let tls = ctx.tls.clone();
        let base = self.base_mut();
        if base.cluster_request.request_collection.is_empty() {
            return Err(OpError::Precondition {
                op: base.name.to_string(),
                detail: "no requests prepared for any host".to_string(),
            });
        }
        for request in base.cluster_request.request_collection.values_mut() {
            if request.tls.is_none() {
                request.tls = Some(tls.clone());
            }
        }
        dispatcher.send_request(&mut base.cluster_request).await
    }
}

/// Shared reduction rule: every host must pass; an unauthorized result
/// short-circuits without inspecting the remaining hosts.
pub fn reduce_all_hosts_passing(base: &OpBase) -> Result<(), OpError> {
    if base.cluster_request.result_collection.is_empty() {
        return Err(base.precondition_err("empty result collection received from the hosts"));
    }
    let mut errors = crate::error::ErrorCollection::new();
    for (host, result) in base.results_in_host_order() {
        base.log_response(host, result);
        if result.is_unauthorized() {
            return Err(result.take_err());
        }
        if !result.is_passing() {
            errors.push(result.take_err());
        }
    }
    errors.into_result()
}

/// Strict-majority quorum over primary nodes.
pub fn has_quorum(success_count: usize, primary_node_count: usize) -> bool {
    success_count * 2 > primary_node_count
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_quorum_is_strict_majority() {
        assert!(has_quorum(3, 5));
        assert!(!has_quorum(2, 5));
        assert!(!has_quorum(2, 4));
        assert!(has_quorum(3, 4));
        assert!(has_quorum(1, 1));
        assert!(!has_quorum(0, 0));
        assert!(!has_quorum(1, 2));
    }
}
