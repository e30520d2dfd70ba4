//! Node creation in a bootstrapped catalog

use async_trait::async_trait;
use serde::Serialize;
use slog::Logger;

use crate::error::OpError;
use crate::net::{ClusterRequest, HostRequest, HttpMethod};
use crate::ops::https::HttpsCredentials;
use crate::ops::{reduce_all_hosts_passing, ClusterOp, ExecContext, OpBase};
use crate::vdb::CoordinationDatabase;

#[derive(Serialize)]
struct CreateNodeRequestData {
    db_name: String,
    hosts: Vec<String>,
    catalog_prefix: String,
    data_prefix: String,
    #[serde(skip_serializing_if = "String::is_empty")]
    depot_prefix: String,
}

/// Asks the bootstrap node to add every remaining host to the catalog.
pub struct HttpsCreateNodeOp {
    base: OpBase,
    credentials: HttpsCredentials,
    request_body: String,
}

impl HttpsCreateNodeOp {
    pub fn new(
        logger: &Logger,
        bootstrap_host: Vec<String>,
        credentials: HttpsCredentials,
        vdb: &CoordinationDatabase,
    ) -> Result<Self, OpError> {
        let new_hosts = crate::util::slice_diff(&vdb.host_list, &bootstrap_host);
        let data = CreateNodeRequestData {
            db_name: vdb.name.clone(),
            hosts: new_hosts,
            catalog_prefix: vdb.catalog_prefix.clone(),
            data_prefix: vdb.data_prefix.clone(),
            depot_prefix: vdb.depot_prefix.clone(),
        };
        let request_body = serde_json::to_string(&data).map_err(|e| OpError::Internal {
            detail: format!("fail to marshal request data: {}", e),
        })?;

        Ok(Self {
            base: OpBase::new("HttpsCreateNodeOp", "Create nodes", logger, bootstrap_host),
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
            request.build_db_https_endpoint("nodes");
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
impl ClusterOp for HttpsCreateNodeOp {
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
