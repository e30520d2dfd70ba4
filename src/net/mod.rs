//! Transport layer: request/result value types, per-host adapters and the
//! fan-out dispatcher.

pub mod adapter;
pub mod pool;
pub mod request;
pub mod result;

pub use adapter::Adapter;
pub use pool::{pool_instance, AdapterPool, RequestDispatcher};
pub use request::{
    ClusterRequest, EndpointKind, HostRequest, HttpMethod, TlsBundle, DB_HTTPS_PORT,
    DEFAULT_REQUEST_TIMEOUT_SECS, NODE_MGMT_PORT,
};
pub use result::{HostResult, ResultStatus};
