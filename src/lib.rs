//! Cluster-operations engine for a distributed analytic database
//!
//! Administrator verbs (create, drop, start, stop, revive, replicate,
//! scrutinize) are compositions of small operations dispatched in parallel
//! to the cluster's hosts over two HTTP control planes: the per-host
//! node-management agent and the database's HTTPS service.

pub mod catalog;
pub mod cli;
pub mod config;
pub mod error;
pub mod net;
pub mod ops;
pub mod util;
pub mod vdb;
pub mod verbs;

pub use error::OpError;
pub use net::{AdapterPool, RequestDispatcher, TlsBundle};
pub use ops::{ClusterOp, Engine, ExecContext};
pub use vdb::{CoordinationDatabase, CoordinationNode};
