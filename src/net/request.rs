//! Outbound request value types

use std::collections::HashMap;

/// Port the node-management agent listens on, on every host.
pub const NODE_MGMT_PORT: u16 = 5554;
/// Port of the database's HTTPS control service.
pub const DB_HTTPS_PORT: u16 = 8443;

/// Default per-request timeout when a request does not carry its own.
pub const DEFAULT_REQUEST_TIMEOUT_SECS: u64 = 300;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HttpMethod {
    Get,
    Post,
    Put,
    Delete,
}

impl HttpMethod {
    pub fn as_str(&self) -> &'static str {
        match self {
            HttpMethod::Get => "GET",
            HttpMethod::Post => "POST",
            HttpMethod::Put => "PUT",
            HttpMethod::Delete => "DELETE",
        }
    }
}

/// Which of the two control planes a request targets.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EndpointKind {
    /// The unprivileged per-host node-management agent
    NodeMgmt,
    /// The running database's HTTPS control service
    DbHttps,
}

impl EndpointKind {
    pub fn port(&self) -> u16 {
        match self {
            EndpointKind::NodeMgmt => NODE_MGMT_PORT,
            EndpointKind::DbHttps => DB_HTTPS_PORT,
        }
    }
}

/// TLS material handed to every dispatched request.
///
/// Empty strings mean "no client identity"; the adapter then relies on
/// username/password auth carried by the request itself.
#[derive(Debug, Clone, Default)]
pub struct TlsBundle {
    pub key: String,
    pub cert: String,
    pub ca_cert: String,
}

impl TlsBundle {
    pub fn has_identity(&self) -> bool {
        !self.key.is_empty() && !self.cert.is_empty()
    }
}

/// One outbound HTTP call to one host.
#[derive(Debug, Clone, Default)]
pub struct HostRequest {
    pub method: Option<HttpMethod>,
    pub endpoint_kind: Option<EndpointKind>,
    pub path: String,
    pub query_params: HashMap<String, String>,
    pub body: String,
    /// Seconds; 0 means [`DEFAULT_REQUEST_TIMEOUT_SECS`]
    pub timeout_secs: u64,
    pub username: Option<String>,
    pub password: Option<String>,
    pub tls: Option<TlsBundle>,
}

impl HostRequest {
    /// Point this request at the node-management agent endpoint `path`.
    pub fn build_node_mgmt_endpoint(&mut self, path: &str) {
        self.endpoint_kind = Some(EndpointKind::NodeMgmt);
        self.path = format!("/v1/{}", path);
    }

    /// Point this request at the database HTTPS endpoint `path`.
    pub fn build_db_https_endpoint(&mut self, path: &str) {
        self.endpoint_kind = Some(EndpointKind::DbHttps);
        self.path = format!("/v1/{}", path);
    }

    pub fn effective_timeout_secs(&self) -> u64 {
        if self.timeout_secs == 0 {
            DEFAULT_REQUEST_TIMEOUT_SECS
        } else {
            self.timeout_secs
        }
    }

    /// Full URL for `host`, which must already be a resolved address.
    pub fn url(&self, host: &str) -> String {
        let port = self
            .endpoint_kind
            .map(|k| k.port())
            .unwrap_or(NODE_MGMT_PORT);
        // bracket IPv6 literals
        let authority = if host.contains(':') {
            format!("[{}]:{}", host, port)
        } else {
            format!("{}:{}", host, port)
        };
        format!("https://{}{}", authority, self.path)
    }
}

/// A bag of per-host requests dispatched together, plus their results.
#[derive(Debug, Default)]
pub struct ClusterRequest {
    /// Operation name, used in progress messages
    pub name: String,
    pub request_collection: HashMap<String, HostRequest>,
    pub result_collection: HashMap<String, crate::net::result::HostResult>,
}

impl ClusterRequest {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            ..Default::default()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_url_builds_both_endpoint_families() {
        let mut req = HostRequest::default();
        req.build_node_mgmt_endpoint("catalog/database");
        assert_eq!(
            req.url("192.168.1.10"),
            "https://192.168.1.10:5554/v1/catalog/database"
        );

        req.build_db_https_endpoint("nodes");
        assert_eq!(req.url("192.168.1.10"), "https://192.168.1.10:8443/v1/nodes");
    }

    #[test]
    fn test_url_brackets_ipv6_hosts() {
        let mut req = HostRequest::default();
        req.build_node_mgmt_endpoint("health");
        assert_eq!(req.url("fd00::1"), "https://[fd00::1]:5554/v1/health");
    }

    #[test]
    fn test_zero_timeout_falls_back_to_default() {
        let req = HostRequest::default();
        assert_eq!(req.effective_timeout_secs(), DEFAULT_REQUEST_TIMEOUT_SECS);
    }
}
