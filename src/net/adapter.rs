//! Per-host HTTP transport

use std::time::{Duration, Instant};

use slog::{debug, warn, Logger};

use crate::error::OpError;
use crate::net::request::{HostRequest, HttpMethod, TlsBundle};
use crate::net::result::{HostResult, ResultStatus};

/// Serializes one [`HostRequest`] against one host and classifies the outcome.
///
/// The adapter itself is cheap state (host + logger + default TLS material);
/// a `reqwest::Client` is built per call so each request's timeout and
/// identity are honored.
#[derive(Clone)]
pub struct Adapter {
    host: String,
    tls: TlsBundle,
    logger: Logger,
}

impl Adapter {
    pub fn new(host: &str, tls: TlsBundle, logger: Logger) -> Self {
        Self {
            host: host.to_string(),
            tls,
            logger,
        }
    }

    pub fn host(&self) -> &str {
        &self.host
    }

    /// Send `request` and always produce a result; errors are folded into
    /// the result's status class rather than returned.
    pub async fn send_request(&self, request: &HostRequest) -> HostResult {
        let started = Instant::now();
        match self.try_send(request).await {
            Ok(result) => result,
            Err(err) => {
                warn!(self.logger, "request failed";
                    "host" => &self.host,
                    "path" => &request.path,
                    "error" => %err
                );
                let status = classify_send_error(&err);
                HostResult {
                    host: self.host.clone(),
                    status,
                    http_status: 0,
                    content: String::new(),
                    err: Some(OpError::Transport {
                        host: self.host.clone(),
                        detail: err.to_string(),
                    }),
                    elapsed: started.elapsed(),
                }
            }
        }
    }

    async fn try_send(&self, request: &HostRequest) -> Result<HostResult, reqwest::Error> {
        let started = Instant::now();
        let client = self.build_client(request)?;
        let url = request.url(&self.host);

        debug!(self.logger, "sending request";
            "method" => request.method.map(|m| m.as_str()).unwrap_or("GET"),
            "url" => &url
        );

        let mut builder = match request.method.unwrap_or(HttpMethod::Get) {
            HttpMethod::Get => client.get(&url),
            HttpMethod::Post => client.post(&url),
            HttpMethod::Put => client.put(&url),
            HttpMethod::Delete => client.delete(&url),
        };

        if !request.query_params.is_empty() {
            builder = builder.query(&request.query_params);
        }
        if !request.body.is_empty() {
            builder = builder.body(request.body.clone());
        }
        if let Some(username) = &request.username {
            builder = builder.basic_auth(username, request.password.as_deref());
        }

        let response = builder.send().await?;
        let http_status = response.status().as_u16();
        let content = response.text().await?;
        let elapsed = started.elapsed();

        let (status, err) = classify_response(&self.host, http_status);
        Ok(HostResult {
            host: self.host.clone(),
            status,
            http_status,
            content,
            err,
            elapsed,
        })
    }

    fn build_client(&self, request: &HostRequest) -> Result<reqwest::Client, reqwest::Error> {
        let tls = request.tls.as_ref().unwrap_or(&self.tls);
        let mut builder = reqwest::Client::builder()
            .timeout(Duration::from_secs(request.effective_timeout_secs()))
            // control-plane endpoints present self-signed certificates
            // unless a CA is configured below
            .danger_accept_invalid_certs(tls.ca_cert.is_empty());

        if !tls.ca_cert.is_empty() {
            if let Ok(ca) = reqwest::Certificate::from_pem(tls.ca_cert.as_bytes()) {
                builder = builder.add_root_certificate(ca);
            }
        }
        if tls.has_identity() {
            let pem = format!("{}\n{}", tls.cert, tls.key);
            if let Ok(identity) = reqwest::Identity::from_pem(pem.as_bytes()) {
                builder = builder.identity(identity);
            }
        }

        builder.build()
    }
}

fn classify_response(host: &str, http_status: u16) -> (ResultStatus, Option<OpError>) {
    match http_status {
        200..=299 => (ResultStatus::Passing, None),
        401 => (
            ResultStatus::Unauthorized,
            Some(OpError::Unauthorized {
                host: host.to_string(),
            }),
        ),
        _ => (
            ResultStatus::Failure,
            Some(OpError::Application {
                host: host.to_string(),
                detail: format!("endpoint returned HTTP status {}", http_status),
            }),
        ),
    }
}

fn classify_send_error(err: &reqwest::Error) -> ResultStatus {
    if err.is_body() || err.is_decode() {
        ResultStatus::Eof
    } else {
        ResultStatus::Exception
    }
}
