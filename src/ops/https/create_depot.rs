//! Depot creation for eon-mode databases

use async_trait::async_trait;
use serde::Serialize;
use slog::Logger;

use crate::error::OpError;
use crate::net::{ClusterRequest, HostRequest, HttpMethod};
use crate::ops::https::HttpsCredentials;
use crate::ops::{reduce_all_hosts_passing, ClusterOp, ExecContext, OpBase};
use crate::vdb::CoordinationDatabase;

#[derive(Serialize)]
struct CreateDepotRequestData {
    path: String,
    #[serde(skip_serializing_if = "String::is_empty")]
    size: String,
}

/// Creates the cluster depot rooted at the depot prefix.
pub struct HttpsCreateDepotOp {
    base: OpBase,
    credentials: HttpsCredentials,
    request_body: String,
}

impl HttpsCreateDepotOp {
    pub fn new(
        logger: &Logger,
        vdb: &CoordinationDatabase,
        hosts: Vec<String>,
        depot_size: &str,
        credentials: HttpsCredentials,
    ) -> Result<Self, OpError> {
        let data = CreateDepotRequestData {
            path: vdb.depot_prefix.clone(),
            size: depot_size.to_string(),
        };
        let request_body = serde_json::to_string(&data).map_err(|e| OpError::Internal {
            detail: format!("fail to marshal request data: {}", e),
        })?;
        Ok(Self {
            base: OpBase::new("HttpsCreateDepotOp", "Create depot", logger, hosts),
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
            request.build_db_https_endpoint("depot");
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
impl ClusterOp for HttpsCreateDepotOp {
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
