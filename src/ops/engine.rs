//! Engine: runs an ordered list of operations against one ExecContext

use std::collections::HashMap;
use std::sync::Arc;

use slog::{error, info, o, warn, Logger};

use crate::catalog::CatalogDatabase;
use crate::error::OpError;
use crate::net::{RequestDispatcher, TlsBundle};
use crate::ops::https::system_tables::SystemTableInfo;
use crate::ops::https::up_nodes::NodeStateInfo;
use crate::ops::nma::network_profile::NetworkProfile;
use crate::ops::ClusterOp;

/// Mutable scratchpad threaded through one verb's run.
///
/// Write owners: `network_profiles` — the network-profile op; `nodes_info` —
/// the up-nodes op; `hosts_with_latest_catalog` and `catalog_snapshot` — the
/// read-catalog op; `system_tables` — the system-tables op; `warnings` — any
/// operation. Operations run sequentially, so no locking.
pub struct ExecContext {
    pub dispatcher: Arc<dyn RequestDispatcher>,
    pub tls: TlsBundle,
    pub network_profiles: HashMap<String, NetworkProfile>,
    /// Listing from the last successful `GET /nodes`
    pub nodes_info: Vec<NodeStateInfo>,
    /// Winners of the catalog-version election, first-seen order
    pub hosts_with_latest_catalog: Vec<String>,
    /// Parsed descriptor of one winning host
    pub catalog_snapshot: Option<CatalogDatabase>,
    pub system_tables: Vec<SystemTableInfo>,
    /// Non-fatal findings surfaced at the end of the run
    pub warnings: Vec<OpError>,
}

impl ExecContext {
    pub fn new(dispatcher: Arc<dyn RequestDispatcher>, tls: TlsBundle) -> Self {
        Self {
            dispatcher,
            tls,
            network_profiles: HashMap::new(),
            nodes_info: Vec::new(),
            hosts_with_latest_catalog: Vec::new(),
            catalog_snapshot: None,
            system_tables: Vec::new(),
            warnings: Vec::new(),
        }
    }

    /// Addresses of nodes currently reporting UP.
    pub fn up_hosts(&self) -> Vec<String> {
        self.nodes_info
            .iter()
            .filter(|n| n.state == crate::vdb::NODE_UP_STATE)
            .map(|n| n.address.clone())
            .collect()
    }
}

/// Runs instructions in order, stops at the first prepare/execute error and
/// finalizes every prepared operation in reverse order.
///
/// Single-run: construct a new Engine per verb.
pub struct Engine {
    dispatcher: Arc<dyn RequestDispatcher>,
    tls: TlsBundle,
    logger: Logger,
}

impl Engine {
    pub fn new(dispatcher: Arc<dyn RequestDispatcher>, tls: TlsBundle, logger: &Logger) -> Self {
        Self {
            dispatcher,
            tls,
            logger: logger.new(o!("component" => "Engine")),
        }
    }

    pub async fn run(&self, instructions: &mut [Box<dyn ClusterOp>]) -> Result<(), OpError> {
        let mut ctx = ExecContext::new(self.dispatcher.clone(), self.tls.clone());
        let mut run_error: Option<OpError> = None;
        // count of leading operations whose prepare succeeded
        let mut prepared = 0usize;

        for op in instructions.iter_mut() {
            info!(self.logger, "running operation";
                "op" => op.name(),
                "description" => op.base().description
            );

            if let Err(e) = op.prepare(&mut ctx).await {
                error!(self.logger, "prepare failed"; "op" => op.name(), "error" => %e);
                run_error = Some(e);
                break;
            }
            prepared += 1;

            if let Err(e) = op.execute(&mut ctx).await {
                error!(self.logger, "execute failed"; "op" => op.name(), "error" => %e);
                run_error = Some(e);
                break;
            }
        }

        for op in instructions[..prepared].iter_mut().rev() {
            op.finalize(&mut ctx).await;
        }

        for warning in &ctx.warnings {
            warn!(self.logger, "run warning"; "detail" => %warning);
        }

        match run_error {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }
}
