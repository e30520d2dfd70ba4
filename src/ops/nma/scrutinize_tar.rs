//! Retrieval of staged diagnostic tarballs

use std::collections::HashMap;
use std::path::PathBuf;

use async_trait::async_trait;
use slog::{info, Logger};

use crate::error::{ErrorCollection, OpError};
use crate::net::{ClusterRequest, HostRequest, HttpMethod};
use crate::ops::{ClusterOp, ExecContext, OpBase};

/// Local directory the per-node tarballs land in before final packaging.
pub const SCRUTINIZE_REMOTE_OUTPUT_PATH: &str = "/tmp/scrutinize/remote";

/// Downloads the tarball one batch of staged diagnostics produced on each
/// host and writes it under the local staging tree.
pub struct NmaGetScrutinizeTarOp {
    base: OpBase,
    id: String,
    batch: String,
    host_node_name_map: HashMap<String, String>,
}

impl NmaGetScrutinizeTarOp {
    pub fn new(
        logger: &Logger,
        id: &str,
        batch: &str,
        hosts: Vec<String>,
        host_node_name_map: HashMap<String, String>,
    ) -> Self {
        Self {
            base: OpBase::new(
                "NmaGetScrutinizeTarOp",
                "Retrieve staged diagnostics",
                logger,
                hosts,
            ),
            id: id.to_string(),
            batch: batch.to_string(),
            host_node_name_map,
        }
    }

    fn setup_cluster_request(&mut self) {
        self.base.cluster_request = ClusterRequest::new(self.base.name);
        for host in &self.base.hosts {
            let mut request = HostRequest {
                method: Some(HttpMethod::Get),
                ..Default::default()
            };
            request.build_node_mgmt_endpoint("scrutinize/tarball");
            request.query_params.insert("id".to_string(), self.id.clone());
            request
                .query_params
                .insert("batch".to_string(), self.batch.clone());
            self.base
                .cluster_request
                .request_collection
                .insert(host.clone(), request);
        }
    }

    fn output_path(&self, node_name: &str) -> PathBuf {
        PathBuf::from(SCRUTINIZE_REMOTE_OUTPUT_PATH)
            .join(&self.id)
            .join(node_name)
            .join(format!("{}.tgz", self.batch))
    }
}

#[async_trait]
impl ClusterOp for NmaGetScrutinizeTarOp {
    fn base(&self) -> &OpBase {
        &self.base
    }

    fn base_mut(&mut self) -> &mut OpBase {
        &mut self.base
    }

    async fn prepare(&mut self, ctx: &mut ExecContext) -> Result<(), OpError> {
        for host in &self.base.hosts {
            if !self.host_node_name_map.contains_key(host) {
                return Err(self
                    .base
                    .precondition_err(format!("host {} has no saved node name", host)));
            }
        }
        ctx.dispatcher.setup(&self.base.hosts);
        self.setup_cluster_request();
        Ok(())
    }

    async fn process_result(&mut self, ctx: &mut ExecContext) -> Result<(), OpError> {
        if self.base.cluster_request.result_collection.is_empty() {
            return Err(self
                .base
                .precondition_err("empty result collection received from the hosts"));
        }

        let mut errors = ErrorCollection::new();
        let mut any_passing = false;
        for (host, result) in self.base.results_in_host_order() {
            self.base.log_response(host, result);
            if result.is_unauthorized() {
                return Err(result.take_err());
            }
            if !result.is_passing() {
                errors.push(result.take_err());
                continue;
            }

            let node_name = match self.host_node_name_map.get(host) {
                Some(name) => name.clone(),
                None => {
                    errors.push(OpError::Internal {
                        detail: format!("host {} has no saved node name", host),
                    });
                    continue;
                }
            };
            let path = self.output_path(&node_name);
            if let Some(parent) = path.parent() {
                if let Err(e) = std::fs::create_dir_all(parent) {
                    errors.push(OpError::Internal {
                        detail: format!("fail to create staging directory {}: {}", parent.display(), e),
                    });
                    continue;
                }
            }
            match std::fs::write(&path, result.content.as_bytes()) {
                Ok(()) => {
                    any_passing = true;
                    info!(self.base.logger, "tarball retrieved";
                        "host" => host.as_str(),
                        "path" => path.display().to_string()
                    );
                }
                Err(e) => errors.push(OpError::Internal {
                    detail: format!("fail to write tarball {}: {}", path.display(), e),
                }),
            }
        }

        if !any_passing {
            return Err(errors.into_error());
        }
        if let Err(joined) = errors.into_result() {
            ctx.warnings.push(joined);
        }
        Ok(())
    }
}
