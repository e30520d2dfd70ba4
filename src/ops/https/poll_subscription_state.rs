//! Wait for shard subscriptions to become ACTIVE

use async_trait::async_trait;
use serde::Deserialize;
use slog::{info, Logger};

use crate::error::OpError;
use crate::net::{ClusterRequest, HostRequest, HttpMethod};
use crate::ops::https::HttpsCredentials;
use crate::ops::poller::{poll_state, PollingOp, STARTUP_POLLING_TIMEOUT_SECS};
use crate::ops::{ClusterOp, ExecContext, OpBase};

const SUBSCRIPTION_ACTIVE_STATE: &str = "ACTIVE";
const SUBSCRIPTION_REQUEST_TIMEOUT_SECS: u64 = 20;

#[derive(Debug, Deserialize)]
pub struct SubscriptionList {
    #[serde(default)]
    pub subscription_list: Vec<SubscriptionInfo>,
}

#[derive(Debug, Deserialize)]
pub struct SubscriptionInfo {
    pub node_name: String,
    pub shard_name: String,
    pub subscription_state: String,
    #[serde(default)]
    pub is_primary: bool,
}

/// Polls `GET /v1/subscriptions` until every entry reports ACTIVE.
pub struct HttpsPollSubscriptionStateOp {
    base: OpBase,
    credentials: HttpsCredentials,
    timeout_secs: u64,
}

impl HttpsPollSubscriptionStateOp {
    pub fn new(
        logger: &Logger,
        hosts: Vec<String>,
        credentials: HttpsCredentials,
        timeout_secs: Option<u64>,
    ) -> Self {
        Self {
            base: OpBase::new(
                "HttpsPollSubscriptionStateOp",
                "Wait for subscriptions to become active",
                logger,
                hosts,
            ),
            credentials,
            timeout_secs: timeout_secs.unwrap_or(STARTUP_POLLING_TIMEOUT_SECS),
        }
    }

    fn setup_cluster_request(&mut self) {
        self.base.cluster_request = ClusterRequest::new(self.base.name);
        for host in &self.base.hosts {
            let mut request = HostRequest {
                method: Some(HttpMethod::Get),
                timeout_secs: SUBSCRIPTION_REQUEST_TIMEOUT_SECS,
                ..Default::default()
            };
            request.build_db_https_endpoint("subscriptions");
            self.credentials.apply(&mut request);
            self.base
                .cluster_request
                .request_collection
                .insert(host.clone(), request);
        }
    }
}

#[async_trait]
impl ClusterOp for HttpsPollSubscriptionStateOp {
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

    async fn execute(&mut self, ctx: &mut ExecContext) -> Result<(), OpError> {
        poll_state(self, ctx).await.map_err(|e| match e {
            OpError::Timeout { .. } => OpError::Application {
                host: self.base.hosts.join(","),
                detail: format!("not all subscriptions are ACTIVE, {}", e),
            },
            other => other,
        })
    }

    async fn process_result(&mut self, _ctx: &mut ExecContext) -> Result<(), OpError> {
        Ok(())
    }
}

impl PollingOp for HttpsPollSubscriptionStateOp {
    fn polling_timeout_secs(&self) -> u64 {
        self.timeout_secs
    }

    fn should_stop_polling(&mut self, _ctx: &mut ExecContext) -> Result<bool, OpError> {
        for (host, result) in self.base.results_in_host_order() {
            self.base.log_response(host, result);

            if result.is_password_or_cert_error() {
                return Err(OpError::Precondition {
                    op: self.base.name.to_string(),
                    detail: format!(
                        "wrong password/certificate for the https service on host {}",
                        host
                    ),
                });
            }

            if !result.is_passing() {
                continue;
            }
            let subscriptions: SubscriptionList =
                self.base.parse_response(host, &result.content)?;

            if subscriptions
                .subscription_list
                .iter()
                .any(|s| s.subscription_state != SUBSCRIPTION_ACTIVE_STATE)
            {
                return Ok(false);
            }

            info!(self.base.logger, "all subscriptions are active";
                "count" => subscriptions.subscription_list.len());
            return Ok(true);
        }

        // an empty result collection only means nobody answered this round
        Ok(false)
    }
}
