//! Guard against operating on a running database

use async_trait::async_trait;
use slog::{info, Logger};

use crate::error::OpError;
use crate::net::{ClusterRequest, HostRequest, HttpMethod};
use crate::ops::https::HttpsCredentials;
use crate::ops::{ClusterOp, ExecContext, OpBase};

/// Fails when any target host answers the database control endpoint:
/// create, drop and revive all require the database to be down.
pub struct HttpsCheckRunningDbOp {
    base: OpBase,
    credentials: HttpsCredentials,
}

impl HttpsCheckRunningDbOp {
    pub fn new(logger: &Logger, hosts: Vec<String>, credentials: HttpsCredentials) -> Self {
        Self {
            base: OpBase::new(
                "HttpsCheckRunningDbOp",
                "Verify no database is running",
                logger,
                hosts,
            ),
            credentials,
        }
    }

    fn setup_cluster_request(&mut self) {
        self.base.cluster_request = ClusterRequest::new(self.base.name);
        for host in &self.base.hosts {
            let mut request = HostRequest {
                method: Some(HttpMethod::Get),
                timeout_secs: 30,
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
impl ClusterOp for HttpsCheckRunningDbOp {
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
        // a passing answer means a database is up on that host; transport
        // failures are the expected, healthy outcome here
        let mut running_hosts = Vec::new();
        for (host, result) in self.base.results_in_host_order() {
            self.base.log_response(host, result);
            if result.is_unauthorized() {
                return Err(result.take_err());
            }
            if result.is_passing() {
                running_hosts.push(host.clone());
            }
        }

        if !running_hosts.is_empty() {
            return Err(self.base.precondition_err(format!(
                "a database is still running on hosts {}; stop it before continuing",
                running_hosts.join(",")
            )));
        }

        info!(self.base.logger, "no database running on the target hosts");
        Ok(())
    }
}
