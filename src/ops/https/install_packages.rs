//! Default package installation after creation

use async_trait::async_trait;
use slog::Logger;

use crate::error::OpError;
use crate::net::{ClusterRequest, HostRequest, HttpMethod};
use crate::ops::https::HttpsCredentials;
use crate::ops::{reduce_all_hosts_passing, ClusterOp, ExecContext, OpBase};

/// Installs the default package set shipped with the database.
pub struct HttpsInstallPackagesOp {
    base: OpBase,
    credentials: HttpsCredentials,
}

impl HttpsInstallPackagesOp {
    pub fn new(logger: &Logger, hosts: Vec<String>, credentials: HttpsCredentials) -> Self {
        Self {
            base: OpBase::new("HttpsInstallPackagesOp", "Install packages", logger, hosts),
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
            request.build_db_https_endpoint("packages/install");
            request
                .query_params
                .insert("default-install".to_string(), "true".to_string());
            self.credentials.apply(&mut request);
            self.base
                .cluster_request
                .request_collection
                .insert(host.clone(), request);
        }
    }
}

#[async_trait]
impl ClusterOp for HttpsInstallPackagesOp {
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
