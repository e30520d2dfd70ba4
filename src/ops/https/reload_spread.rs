//! Spread config reload after catalog changes

use async_trait::async_trait;
use serde::Deserialize;
use slog::Logger;

use crate::error::{ErrorCollection, OpError};
use crate::net::{ClusterRequest, HostRequest, HttpMethod};
use crate::ops::https::HttpsCredentials;
use crate::ops::{ClusterOp, ExecContext, OpBase};

#[derive(Deserialize)]
struct ReloadSpreadResponse {
    #[serde(default)]
    detail: String,
}

/// Tells the cluster to re-read its spread configuration.
pub struct HttpsReloadSpreadOp {
    base: OpBase,
    credentials: HttpsCredentials,
}

impl HttpsReloadSpreadOp {
    pub fn new(logger: &Logger, hosts: Vec<String>, credentials: HttpsCredentials) -> Self {
        Self {
            base: OpBase::new("HttpsReloadSpreadOp", "Reload spread", logger, hosts),
            credentials,
        }
    }

    fn setup_cluster_request(&mut self) {
        self.base.cluster_request = ClusterRequest::new(self.base.name);
        for host in &self.base.hosts {
            let mut request = HostRequest {
                method: Some(HttpMethod::Post),
                ..Default::default()
            };
            request.build_db_https_endpoint("cluster/reload-spread");
            self.credentials.apply(&mut request);
            self.base
                .cluster_request
                .request_collection
                .insert(host.clone(), request);
        }
    }
}

#[async_trait]
impl ClusterOp for HttpsReloadSpreadOp {
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
            let response: ReloadSpreadResponse =
                match self.base.parse_response(host, &result.content) {
                    Ok(r) => r,
                    Err(e) => {
                        errors.push(e);
                        continue;
                    }
                };
            if response.detail.is_empty() {
                errors.push(OpError::Application {
                    host: host.clone(),
                    detail: format!("[{}] spread reload gave no detail", self.base.name),
                });
            }
        }
        errors.into_result()
    }
}
