//! System-table listing (scrutinize)

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use slog::{info, Logger};

use crate::error::{ErrorCollection, OpError};
use crate::net::{ClusterRequest, HostRequest, HttpMethod};
use crate::ops::https::HttpsCredentials;
use crate::ops::{ClusterOp, ExecContext, OpBase};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SystemTableInfo {
    pub schema: String,
    pub table_name: String,
}

#[derive(Debug, Default, Deserialize)]
struct SystemTableList {
    #[serde(default)]
    system_table_list: Vec<SystemTableInfo>,
}

/// Publishes the list of existing system tables to the ExecContext; one
/// passing host is enough.
pub struct HttpsGetSystemTablesOp {
    base: OpBase,
    credentials: HttpsCredentials,
}

impl HttpsGetSystemTablesOp {
    pub fn new(logger: &Logger, hosts: Vec<String>, credentials: HttpsCredentials) -> Self {
        Self {
            base: OpBase::new(
                "HttpsGetSystemTablesOp",
                "Collect system table listing",
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
                ..Default::default()
            };
            request.build_db_https_endpoint("catalog/systables");
            self.credentials.apply(&mut request);
            self.base
                .cluster_request
                .request_collection
                .insert(host.clone(), request);
        }
    }
}

#[async_trait]
impl ClusterOp for HttpsGetSystemTablesOp {
    fn base(&self) -> &OpBase {
        &self.base
    }

    fn base_mut(&mut self) -> &mut OpBase {
        &mut self.base
    }

    async fn prepare(&mut self, ctx: &mut ExecContext) -> Result<(), OpError> {
        // only up hosts can answer; fall back to the configured hosts when
        // the up-node listing is empty (scrutinize on a down cluster)
        let up_hosts = ctx.up_hosts();
        if !up_hosts.is_empty() {
            self.base.hosts = up_hosts;
        }
        ctx.dispatcher.setup(&self.base.hosts);
        self.setup_cluster_request();
        Ok(())
    }

    async fn process_result(&mut self, ctx: &mut ExecContext) -> Result<(), OpError> {
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
            match self
                .base
                .parse_response::<SystemTableList>(host, &result.content)
            {
                Ok(listing) => {
                    info!(self.base.logger, "system tables collected";
                        "count" => listing.system_table_list.len());
                    ctx.system_tables = listing.system_table_list;
                    return Ok(());
                }
                Err(e) => errors.push(e),
            }
        }

        // without a running database there is no listing to take; callers
        // treat that as reduced diagnostics rather than failure
        if let Err(joined) = errors.into_result() {
            ctx.warnings.push(joined);
        }
        ctx.system_tables = Vec::new();
        Ok(())
    }
}
