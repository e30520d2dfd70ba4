//! Shared test fixtures: a scripted dispatcher and result builders

// not every test binary uses every fixture
#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use slog::{o, Drain, Logger};

use clusterctl::error::OpError;
use clusterctl::net::result::ResultStatus;
use clusterctl::net::{ClusterRequest, HostResult, RequestDispatcher};

pub fn test_logger() -> Logger {
    let decorator = slog_term::PlainDecorator::new(std::io::stdout());
    let drain = slog_term::FullFormat::new(decorator).build().fuse();
    let drain = slog_async::Async::new(drain).build().fuse();
    Logger::root(drain, o!())
}

pub fn passing_result(host: &str, content: &str) -> HostResult {
    HostResult {
        host: host.to_string(),
        status: ResultStatus::Passing,
        http_status: 200,
        content: content.to_string(),
        err: None,
        elapsed: Duration::from_millis(5),
    }
}

pub fn transport_error_result(host: &str) -> HostResult {
    HostResult {
        host: host.to_string(),
        status: ResultStatus::Exception,
        http_status: 0,
        content: String::new(),
        err: Some(OpError::Transport {
            host: host.to_string(),
            detail: "connection refused".to_string(),
        }),
        elapsed: Duration::from_millis(5),
    }
}

pub fn unauthorized_result(host: &str) -> HostResult {
    HostResult {
        host: host.to_string(),
        status: ResultStatus::Unauthorized,
        http_status: 401,
        content: String::new(),
        err: Some(OpError::Unauthorized {
            host: host.to_string(),
        }),
        elapsed: Duration::from_millis(5),
    }
}

/// Dispatcher fed with one result map per round; the last round repeats
/// when the script runs out. Results are filtered down to the hosts the
/// request actually targets, like the real pool's result collection.
pub struct ScriptedDispatcher {
    rounds: Mutex<Vec<HashMap<String, HostResult>>>,
    dispatch_count: AtomicUsize,
}

impl ScriptedDispatcher {
    pub fn new(rounds: Vec<HashMap<String, HostResult>>) -> Self {
        Self {
            rounds: Mutex::new(rounds),
            dispatch_count: AtomicUsize::new(0),
        }
    }

    pub fn single_round(results: Vec<HostResult>) -> Self {
        let round: HashMap<String, HostResult> = results
            .into_iter()
            .map(|r| (r.host.clone(), r))
            .collect();
        Self::new(vec![round])
    }

    pub fn dispatch_count(&self) -> usize {
        self.dispatch_count.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl RequestDispatcher for ScriptedDispatcher {
    fn setup(&self, _hosts: &[String]) {}

    async fn send_request(&self, request: &mut ClusterRequest) -> Result<(), OpError> {
        self.dispatch_count.fetch_add(1, Ordering::SeqCst);
        let round = {
            let mut rounds = match self.rounds.lock() {
                Ok(guard) => guard,
                Err(poisoned) => poisoned.into_inner(),
            };
            if rounds.len() > 1 {
                rounds.remove(0)
            } else {
                rounds.first().cloned().unwrap_or_default()
            }
        };

        request.result_collection = round
            .into_iter()
            .filter(|(host, _)| request.request_collection.contains_key(host))
            .collect();
        Ok(())
    }
}
