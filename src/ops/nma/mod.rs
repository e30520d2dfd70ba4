//! Operations against the per-host node-management agent

pub mod bootstrap_catalog;
pub mod config_files;
pub mod delete_directories;
pub mod download_file;
pub mod get_nodes_info;
pub mod health;
pub mod load_remote_catalog;
pub mod network_profile;
pub mod prepare_directories;
pub mod read_catalog;
pub mod scrutinize_tar;
pub mod stage;
pub mod start_node;

pub use bootstrap_catalog::NmaBootstrapCatalogOp;
pub use config_files::{ConfigFile, NmaDownloadConfigOp, NmaUploadConfigOp};
pub use delete_directories::NmaDeleteDirectoriesOp;
pub use download_file::NmaDownloadFileOp;
pub use get_nodes_info::NmaGetNodesInfoOp;
pub use health::{NmaGetHealthyNodesOp, NmaHealthOp};
pub use load_remote_catalog::NmaLoadRemoteCatalogOp;
pub use network_profile::{NetworkProfile, NmaNetworkProfileOp};
pub use prepare_directories::NmaPrepareDirectoriesOp;
pub use read_catalog::NmaReadCatalogOp;
pub use scrutinize_tar::NmaGetScrutinizeTarOp;
pub use stage::{NmaStageDcTablesOp, NmaStageFilesOp, NmaStageLogsOp};
pub use start_node::NmaStartNodeOp;
