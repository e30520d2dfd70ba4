//! k-safety marking

use async_trait::async_trait;
use serde::Serialize;
use slog::Logger;

use crate::error::OpError;
use crate::net::{ClusterRequest, HostRequest, HttpMethod};
use crate::ops::https::HttpsCredentials;
use crate::ops::{reduce_all_hosts_passing, ClusterOp, ExecContext, OpBase};

#[derive(Serialize)]
struct MarkKsafeRequestData {
    k: u32,
}

/// Marks the design k-safe so the cluster tolerates the loss of `k`
/// primary nodes.
pub struct HttpsMarkKsafeOp {
    base: OpBase,
    credentials: HttpsCredentials,
    request_body: String,
}

impl HttpsMarkKsafeOp {
    pub fn new(
        logger: &Logger,
        hosts: Vec<String>,
        credentials: HttpsCredentials,
        ksafe_value: u32,
    ) -> Result<Self, OpError> {
        let request_body = serde_json::to_string(&MarkKsafeRequestData { k: ksafe_value })
            .map_err(|e| OpError::Internal {
                detail: format!("fail to marshal request data: {}", e),
            })?;
        Ok(Self {
            base: OpBase::new("HttpsMarkKsafeOp", "Mark design k-safe", logger, hosts),
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
            request.build_db_https_endpoint("cluster/ksafety");
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
impl ClusterOp for HttpsMarkKsafeOp {
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
