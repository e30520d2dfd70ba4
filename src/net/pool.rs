//! Process-wide adapter registry and the fan-out dispatch primitive

use std::collections::HashMap;
use std::sync::{Arc, Mutex, OnceLock};
use std::time::{Duration, Instant};

use async_trait::async_trait;
use slog::{debug, info, o, Logger};
use tokio::sync::mpsc;

use crate::error::OpError;
use crate::net::adapter::Adapter;
use crate::net::request::{ClusterRequest, TlsBundle};
use crate::net::result::HostResult;

const PROGRESS_CHECK_INTERVAL_SECS: u64 = 5;

/// The dispatch surface operations talk to.
///
/// Production code uses [`AdapterPool`]; tests inject fakes so the engine,
/// poller and result reducers run without sockets.
#[async_trait]
pub trait RequestDispatcher: Send + Sync {
    /// Ensure every host in `hosts` has an adapter; called from each
    /// operation's prepare.
    fn setup(&self, hosts: &[String]);

    /// Fan out every request in `request.request_collection` concurrently
    /// and fill `request.result_collection`. Fails fast if any host is
    /// missing from the pool.
    async fn send_request(&self, request: &mut ClusterRequest) -> Result<(), OpError>;
}

/// One adapter per host, shared by every engine run in the process.
///
/// The mapping is read-mostly: `setup` adds adapters before a dispatch and
/// nothing mutates it while one is in flight.
pub struct AdapterPool {
    logger: Logger,
    tls: TlsBundle,
    /// Emit progress lines on stdout; set for interactive CLI use
    for_cli: bool,
    connections: Mutex<HashMap<String, Adapter>>,
}

impl AdapterPool {
    pub fn new(logger: Logger, tls: TlsBundle, for_cli: bool) -> Self {
        Self {
            logger: logger.new(o!("component" => "AdapterPool")),
            tls,
            for_cli,
            connections: Mutex::new(HashMap::new()),
        }
    }

    fn adapters_for(&self, request: &ClusterRequest) -> Result<Vec<Adapter>, OpError> {
        let connections = match self.connections.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        let mut adapters = Vec::with_capacity(request.request_collection.len());
        for host in request.request_collection.keys() {
            match connections.get(host) {
                Some(adapter) => adapters.push(adapter.clone()),
                None => {
                    return Err(OpError::Precondition {
                        op: request.name.clone(),
                        detail: format!("host {} is not found in the adapter pool", host),
                    })
                }
            }
        }
        Ok(adapters)
    }
}

#[async_trait]
impl RequestDispatcher for AdapterPool {
    fn setup(&self, hosts: &[String]) {
        let mut connections = match self.connections.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        for host in hosts {
            if !connections.contains_key(host) {
                debug!(self.logger, "adding adapter"; "host" => host.as_str());
                let adapter = Adapter::new(
                    host,
                    self.tls.clone(),
                    self.logger.new(o!("host" => host.clone()))
                );
                connections.insert(host.clone(), adapter);
            }
        }
    }

    async fn send_request(&self, request: &mut ClusterRequest) -> Result<(), OpError> {
        // resolve adapters first: a host absent from the pool aborts the
        // whole dispatch before anything is sent
        let adapters = self.adapters_for(request)?;
        let host_count = adapters.len();

        let (result_tx, mut result_rx) = mpsc::channel::<HostResult>(host_count.max(1));

        let ticker = self.for_cli.then(|| {
            let name = request.name.clone();
            tokio::spawn(progress_check(name))
        });

        for adapter in adapters {
            let Some(host_request) = request.request_collection.get(adapter.host()).cloned()
            else {
                continue;
            };
            let tx = result_tx.clone();
            tokio::spawn(async move {
                let result = adapter.send_request(&host_request).await;
                // receiver only drops once all workers finished; a send
                // error here means the dispatch was abandoned
                let _ = tx.send(result).await;
            });
        }
        drop(result_tx);

        request.result_collection = HashMap::with_capacity(host_count);
        while let Some(result) = result_rx.recv().await {
            request.result_collection.insert(result.host.clone(), result);
        }

        // a host whose worker died without reporting counts as timed out
        for host in request.request_collection.keys() {
            if !request.result_collection.contains_key(host) {
                request
                    .result_collection
                    .insert(host.clone(), HostResult::missing(host));
            }
        }

        if let Some(handle) = ticker {
            handle.abort();
        }

        info!(self.logger, "dispatch complete";
            "op" => &request.name,
            "hosts" => host_count,
            "results" => request.result_collection.len()
        );
        Ok(())
    }
}

/// Emits a heartbeat line while a step is in flight; aborted when the
/// dispatch returns.
async fn progress_check(name: String) {
    let started = Instant::now();
    let mut ticker = tokio::time::interval(Duration::from_secs(PROGRESS_CHECK_INTERVAL_SECS));
    // the first tick of a tokio interval fires immediately
    ticker.tick().await;
    loop {
        ticker.tick().await;
        let elapsed = started.elapsed();
        println!(
            "[{}] is still running. {:.0} seconds spent at this step.",
            name,
            elapsed.as_secs_f64()
        );
    }
}

static POOL_INSTANCE: OnceLock<Arc<AdapterPool>> = OnceLock::new();

/// Process-wide pool, created lazily on first use.
///
/// Top-level CLI glue only; library callers should construct an
/// [`AdapterPool`] and pass it down explicitly.
pub fn pool_instance(logger: &Logger, tls: &TlsBundle) -> Arc<AdapterPool> {
    POOL_INSTANCE
        .get_or_init(|| Arc::new(AdapterPool::new(logger.clone(), tls.clone(), true)))
        .clone()
}
