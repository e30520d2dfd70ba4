//! Cluster node-state query

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use slog::{info, Logger};

use crate::error::{ErrorCollection, OpError};
use crate::net::{ClusterRequest, HostRequest, HttpMethod};
use crate::ops::https::HttpsCredentials;
use crate::ops::{ClusterOp, ExecContext, OpBase};
use crate::vdb::NODE_UP_STATE;

/// One entry of the `GET /v1/nodes` listing.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct NodeStateInfo {
    pub name: String,
    pub address: String,
    #[serde(default)]
    pub state: String,
    #[serde(default)]
    pub is_primary: bool,
    #[serde(default)]
    pub catalog_path: String,
    #[serde(default)]
    pub subcluster_name: String,
    #[serde(default)]
    pub sandbox: String,
}

#[derive(Debug, Default, Serialize, Deserialize)]
pub struct NodesInfo {
    #[serde(default)]
    pub node_list: Vec<NodeStateInfo>,
}

/// Publishes the cluster's node listing to the ExecContext.
///
/// Any one host's answer describes the whole cluster; hosts are tried in
/// order until one passes.
pub struct HttpsGetUpNodesOp {
    base: OpBase,
    db_name: String,
    credentials: HttpsCredentials,
    allow_no_up_hosts: bool,
}

impl HttpsGetUpNodesOp {
    pub fn new(
        logger: &Logger,
        db_name: &str,
        hosts: Vec<String>,
        credentials: HttpsCredentials,
    ) -> Self {
        Self {
            base: OpBase::new("HttpsGetUpNodesOp", "Collect up nodes", logger, hosts),
            db_name: db_name.to_string(),
            credentials,
            allow_no_up_hosts: false,
        }
    }

    /// Scrutinize still wants diagnostics from a fully down cluster.
    pub fn allow_no_up_hosts(mut self) -> Self {
        self.allow_no_up_hosts = true;
        self
    }

    fn setup_cluster_request(&mut self) {
        self.base.cluster_request = ClusterRequest::new(self.base.name);
        for host in &self.base.hosts {
            let mut request = HostRequest {
                method: Some(HttpMethod::Get),
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
impl ClusterOp for HttpsGetUpNodesOp {
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
            let nodes: NodesInfo = match self.base.parse_response(host, &result.content) {
                Ok(n) => n,
                Err(e) => {
                    errors.push(e);
                    continue;
                }
            };

            let up_count = nodes
                .node_list
                .iter()
                .filter(|n| n.state == NODE_UP_STATE)
                .count();
            info!(self.base.logger, "node listing collected";
                "source" => host.as_str(),
                "nodes" => nodes.node_list.len(),
                "up" => up_count
            );
            ctx.nodes_info = nodes.node_list;

            if up_count == 0 && !self.allow_no_up_hosts {
                return Err(self.base.precondition_err(format!(
                    "no up nodes found in database {}",
                    self.db_name
                )));
            }
            return Ok(());
        }

        if self.allow_no_up_hosts {
            // a fully down cluster is acceptable; report what we saw
            ctx.nodes_info = Vec::new();
            if let Err(joined) = errors.into_result() {
                ctx.warnings.push(joined);
            }
            return Ok(());
        }
        errors.push(self.base.precondition_err(format!(
            "cannot find any up node in database {}",
            self.db_name
        )));
        Err(errors.into_error())
    }
}
