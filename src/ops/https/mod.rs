//! Operations against the running database's HTTPS control service

pub mod check_running_db;
pub mod create_depot;
pub mod create_node;
pub mod install_packages;
pub mod mark_ksafe;
pub mod poll_node_state;
pub mod poll_subscription_state;
pub mod reload_spread;
pub mod shutdown_db;
pub mod start_replication;
pub mod sync_catalog;
pub mod system_tables;
pub mod up_nodes;

pub use check_running_db::HttpsCheckRunningDbOp;
pub use create_depot::HttpsCreateDepotOp;
pub use create_node::HttpsCreateNodeOp;
pub use install_packages::HttpsInstallPackagesOp;
pub use mark_ksafe::HttpsMarkKsafeOp;
pub use poll_node_state::{HttpsPollNodeStateOp, TargetNodeState};
pub use poll_subscription_state::HttpsPollSubscriptionStateOp;
pub use reload_spread::HttpsReloadSpreadOp;
pub use shutdown_db::HttpsShutdownDbOp;
pub use start_replication::HttpsStartReplicationOp;
pub use sync_catalog::HttpsSyncCatalogOp;
pub use system_tables::{HttpsGetSystemTablesOp, SystemTableInfo};
pub use up_nodes::{HttpsGetUpNodesOp, NodeStateInfo, NodesInfo};

use crate::error::OpError;
use crate::net::HostRequest;
use crate::util;

/// Database credentials shared by every HTTPS operation.
///
/// With `use_password` unset the caller relies on certificate auth and the
/// username/password are left off the wire.
#[derive(Debug, Clone, Default)]
pub struct HttpsCredentials {
    pub use_password: bool,
    pub username: String,
    pub password: Option<String>,
}

impl HttpsCredentials {
    pub fn new(
        op_name: &str,
        use_password: bool,
        username: &str,
        password: Option<String>,
    ) -> Result<Self, OpError> {
        util::validate_username_and_password(op_name, use_password, username)?;
        Ok(Self {
            use_password,
            username: username.to_string(),
            password,
        })
    }

    pub fn apply(&self, request: &mut HostRequest) {
        if self.use_password {
            request.username = Some(self.username.clone());
            request.password = self.password.clone();
        }
    }
}
