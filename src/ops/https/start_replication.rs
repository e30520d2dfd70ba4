//! Replication kickoff toward a target database

use async_trait::async_trait;
use serde::Serialize;
use slog::{info, Logger};

use crate::error::{ErrorCollection, OpError};
use crate::net::{ClusterRequest, HostRequest, HttpMethod};
use crate::ops::https::HttpsCredentials;
use crate::ops::{ClusterOp, ExecContext, OpBase};
use crate::util;
use crate::vdb::NODE_DOWN_STATE;

const START_REPLICATION_SUCCESS_MSG: &str = "REPLICATE";

#[derive(Serialize)]
struct ReplicateRequestData {
    host: String,
    dbname: String,
    #[serde(skip_serializing_if = "String::is_empty")]
    user: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    password: Option<String>,
    #[serde(skip_serializing_if = "String::is_empty")]
    tls_config: String,
}

/// Starts replication from one up source host toward the target database.
///
/// The source host is picked from the nodes listing: an up node in the
/// requested sandbox (the main cluster when the sandbox is empty) that is
/// also among the configured source hosts.
pub struct HttpsStartReplicationOp {
    base: OpBase,
    source_db: String,
    sandbox: String,
    credentials: HttpsCredentials,
    target_db: String,
    target_hosts: String,
    target_username: String,
    target_password: Option<String>,
    tls_config: String,
    request_body: String,
}

impl HttpsStartReplicationOp {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        logger: &Logger,
        source_db: &str,
        source_hosts: Vec<String>,
        credentials: HttpsCredentials,
        target_db: &str,
        target_hosts: &str,
        target_username: &str,
        target_password: Option<String>,
        tls_config: &str,
        sandbox: &str,
    ) -> Result<Self, OpError> {
        if !target_username.is_empty() || target_password.is_some() {
            util::validate_username_and_password(
                "HttpsStartReplicationOp",
                true,
                target_username,
            )?;
        }
        Ok(Self {
            base: OpBase::new(
                "HttpsStartReplicationOp",
                "Start database replication",
                logger,
                source_hosts,
            ),
            source_db: source_db.to_string(),
            sandbox: sandbox.to_string(),
            credentials,
            target_db: target_db.to_string(),
            target_hosts: target_hosts.to_string(),
            target_username: target_username.to_string(),
            target_password,
            tls_config: tls_config.to_string(),
            request_body: String::new(),
        })
    }

    fn setup_request_body(&mut self) -> Result<(), OpError> {
        let data = ReplicateRequestData {
            host: self.target_hosts.clone(),
            dbname: self.target_db.clone(),
            user: self.target_username.clone(),
            password: self.target_password.clone(),
            tls_config: self.tls_config.clone(),
        };
        self.request_body = serde_json::to_string(&data).map_err(|e| OpError::Internal {
            detail: format!("[{}] fail to marshal request data: {}", self.base.name, e),
        })?;
        Ok(())
    }

    fn setup_cluster_request(&mut self) {
        self.base.cluster_request = ClusterRequest::new(self.base.name);
        for host in &self.base.hosts {
            let mut request = HostRequest {
                method: Some(HttpMethod::Post),
                ..Default::default()
            };
            request.build_db_https_endpoint("replicate/start");
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
impl ClusterOp for HttpsStartReplicationOp {
    fn base(&self) -> &OpBase {
        &self.base
    }

    fn base_mut(&mut self) -> &mut OpBase {
        &mut self.base
    }

    async fn prepare(&mut self, ctx: &mut ExecContext) -> Result<(), OpError> {
        if ctx.nodes_info.is_empty() {
            return Err(self
                .base
                .precondition_err("cannot find any node information; collect up nodes first"));
        }

        let candidates: Vec<String> = ctx
            .nodes_info
            .iter()
            .filter(|n| n.state != NODE_DOWN_STATE && n.sandbox == self.sandbox)
            .map(|n| n.address.clone())
            .collect();
        let source_hosts = util::slice_common(&self.base.hosts, &candidates);
        let Some(initiator) = source_hosts.first() else {
            if self.sandbox.is_empty() {
                return Err(self.base.precondition_err(format!(
                    "cannot find any up hosts from source database {}",
                    self.source_db
                )));
            }
            return Err(self.base.precondition_err(format!(
                "cannot find any up hosts in the sandbox {}",
                self.sandbox
            )));
        };
        self.base.hosts = vec![initiator.clone()];

        self.setup_request_body()?;
        ctx.dispatcher.setup(&self.base.hosts);
        self.setup_cluster_request();
        Ok(())
    }

    async fn process_result(&mut self, _ctx: &mut ExecContext) -> Result<(), OpError> {
        let mut errors = ErrorCollection::new();
        for (host, result) in self.base.results_in_host_order() {
            self.base.log_response(host, result);

            if result.is_unauthorized() {
                // every node rejects the same credentials; skip the rest
                return Err(result.take_err());
            }
            if !result.is_passing() {
                errors.push(result.take_err());
                continue;
            }

            // the successful response is {"detail": "REPLICATE"}
            let response: serde_json::Value =
                match self.base.parse_response(host, &result.content) {
                    Ok(v) => v,
                    Err(e) => {
                        errors.push(e);
                        continue;
                    }
                };
            let detail = response
                .get("detail")
                .and_then(|v| v.as_str())
                .unwrap_or_default();
            if detail != START_REPLICATION_SUCCESS_MSG {
                errors.push(OpError::Application {
                    host: host.clone(),
                    detail: format!(
                        "[{}] response detail should be '{}' but got '{}'",
                        self.base.name, START_REPLICATION_SUCCESS_MSG, detail
                    ),
                });
                continue;
            }
            info!(self.base.logger, "replication started";
                "source" => host.as_str(),
                "target_db" => &self.target_db
            );
        }
        errors.into_result()
    }
}
