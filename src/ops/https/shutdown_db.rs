//! Database shutdown

use async_trait::async_trait;
use serde::Serialize;
use slog::{info, Logger};

use crate::error::{ErrorCollection, OpError};
use crate::net::{ClusterRequest, HostRequest, HttpMethod};
use crate::ops::https::HttpsCredentials;
use crate::ops::{ClusterOp, ExecContext, OpBase};

#[derive(Serialize)]
struct ShutdownRequestData {
    #[serde(skip_serializing_if = "Option::is_none")]
    drain_seconds: Option<i64>,
}

/// Sends the shutdown order to one up host; the cluster propagates it.
///
/// With drain seconds set, user connections get that long to finish before
/// being cut.
pub struct HttpsShutdownDbOp {
    base: OpBase,
    credentials: HttpsCredentials,
    request_body: String,
}

impl HttpsShutdownDbOp {
    pub fn new(
        logger: &Logger,
        credentials: HttpsCredentials,
        drain_seconds: Option<i64>,
    ) -> Result<Self, OpError> {
        let request_body = serde_json::to_string(&ShutdownRequestData { drain_seconds })
            .map_err(|e| OpError::Internal {
                detail: format!("fail to marshal request data: {}", e),
            })?;
        Ok(Self {
            base: OpBase::new("HttpsShutdownDbOp", "Shut down the database", logger, Vec::new()),
            credentials,
            request_body,
        })
    }

    fn setup_cluster_request(&mut self) {
        self.base.cluster_request = ClusterRequest::new(self.base.name);
        for host in &self.base.hosts {
            let mut request = HostRequest {
                method: Some(HttpMethod::Post),
                ..Default::default()
            };
            request.build_db_https_endpoint("cluster/shutdown");
            request.body = self.request_body.clone();
            self.credentials.apply(&mut request);
            self.base
                .cluster_request
                .request_collection
                .insert(host.clone(), request);
        }
    }
}

#[async_trait]
impl ClusterOp for HttpsShutdownDbOp {
    fn base(&self) -> &OpBase {
        &self.base
    }

    fn base_mut(&mut self) -> &mut OpBase {
        &mut self.base
    }

    async fn prepare(&mut self, ctx: &mut ExecContext) -> Result<(), OpError> {
        // one up host carries the order for the whole cluster
        let up_hosts = ctx.up_hosts();
        let initiator = up_hosts.first().ok_or_else(|| {
            self.base
                .precondition_err("cannot find any up host to send the shutdown order to")
        })?;
        self.base.hosts = vec![initiator.clone()];

        ctx.dispatcher.setup(&self.base.hosts);
        self.setup_cluster_request();
        Ok(())
    }

    async fn process_result(&mut self, _ctx: &mut ExecContext) -> Result<(), OpError> {
        let mut errors = ErrorCollection::new();
        for (host, result) in self.base.results_in_host_order() {
            self.base.log_response(host, result);
            if result.is_unauthorized() {
                return Err(result.take_err());
            }
            if result.is_passing() {
                info!(self.base.logger, "shutdown accepted"; "host" => host.as_str());
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
