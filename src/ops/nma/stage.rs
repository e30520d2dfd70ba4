//! Diagnostic staging on each host (scrutinize)
//!
//! Staging is best-effort: a host that cannot stage is recorded as a
//! warning and the bundle covers whoever succeeded. Only a total failure
//! aborts the verb.

use std::collections::HashMap;

use async_trait::async_trait;
use serde::Serialize;
use slog::Logger;

use crate::error::{ErrorCollection, OpError};
use crate::net::{ClusterRequest, HostRequest, HttpMethod};
use crate::ops::{ClusterOp, ExecContext, OpBase};

/// Copy archived logs produced in the most recent 24 hours by default.
pub const LOG_AGE_HOURS_DEFAULT: i64 = 24;
/// 10 GB cap for one staged log file.
pub const LOG_SIZE_LIMIT_BYTES: u64 = 10 * 1024 * 1024 * 1024;
/// 100 MB cap for one staged misc file.
pub const FILE_SIZE_LIMIT_BYTES: u64 = 100 * 1024 * 1024;

fn lenient_reduce(base: &OpBase, ctx: &mut ExecContext) -> Result<(), OpError> {
    if base.cluster_request.result_collection.is_empty() {
        return Err(base.precondition_err("empty result collection received from the hosts"));
    }
    let mut errors = ErrorCollection::new();
    let mut any_passing = false;
    for (host, result) in base.results_in_host_order() {
        base.log_response(host, result);
        if result.is_unauthorized() {
            return Err(result.take_err());
        }
        if result.is_passing() {
            any_passing = true;
        } else {
            errors.push(result.take_err());
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

fn per_host_body<T: Serialize>(
    base: &OpBase,
    data_for: impl Fn(&str) -> Result<T, OpError>,
) -> Result<HashMap<String, String>, OpError> {
    let mut bodies = HashMap::with_capacity(base.hosts.len());
    for host in &base.hosts {
        let data = data_for(host)?;
        let body = serde_json::to_string(&data).map_err(|e| OpError::Internal {
            detail: format!("[{}] fail to marshal request data: {}", base.name, e),
        })?;
        bodies.insert(host.clone(), body);
    }
    Ok(bodies)
}

fn build_requests(base: &mut OpBase, endpoint: &str, bodies: &HashMap<String, String>) {
    base.cluster_request = ClusterRequest::new(base.name);
    for host in &base.hosts {
        let mut request = HostRequest {
            method: Some(HttpMethod::Post),
            ..Default::default()
        };
        request.build_node_mgmt_endpoint(endpoint);
        request.body = bodies.get(host).cloned().unwrap_or_default();
        base.cluster_request
            .request_collection
            .insert(host.clone(), request);
    }
}

#[derive(Serialize)]
struct StageLogsRequestData {
    id: String,
    node_name: String,
    catalog_path: String,
    log_age_max_hours: i64,
    log_age_min_hours: i64,
    log_size_limit_bytes: u64,
}

/// Stages database logs within the requested age window.
pub struct NmaStageLogsOp {
    base: OpBase,
    id: String,
    host_node_name_map: HashMap<String, String>,
    host_cat_path_map: HashMap<String, String>,
    log_age_max_hours: i64,
    log_age_min_hours: i64,
}

impl NmaStageLogsOp {
    pub fn new(
        logger: &Logger,
        id: &str,
        hosts: Vec<String>,
        host_node_name_map: HashMap<String, String>,
        host_cat_path_map: HashMap<String, String>,
        log_age_max_hours: i64,
        log_age_min_hours: i64,
    ) -> Self {
        Self {
            base: OpBase::new("NmaStageLogsOp", "Stage database logs", logger, hosts),
            id: id.to_string(),
            host_node_name_map,
            host_cat_path_map,
            log_age_max_hours,
            log_age_min_hours,
        }
    }
}

#[async_trait]
impl ClusterOp for NmaStageLogsOp {
    fn base(&self) -> &OpBase {
        &self.base
    }

    fn base_mut(&mut self) -> &mut OpBase {
        &mut self.base
    }

    async fn prepare(&mut self, ctx: &mut ExecContext) -> Result<(), OpError> {
        let bodies = per_host_body(&self.base, |host| {
            Ok(StageLogsRequestData {
                id: self.id.clone(),
                node_name: lookup(&self.base, &self.host_node_name_map, host, "node name")?,
                catalog_path: lookup(&self.base, &self.host_cat_path_map, host, "catalog path")?,
                log_age_max_hours: self.log_age_max_hours,
                log_age_min_hours: self.log_age_min_hours,
                log_size_limit_bytes: LOG_SIZE_LIMIT_BYTES,
            })
        })?;
        ctx.dispatcher.setup(&self.base.hosts);
        build_requests(&mut self.base, "logs/stage", &bodies);
        Ok(())
    }

    async fn process_result(&mut self, ctx: &mut ExecContext) -> Result<(), OpError> {
        lenient_reduce(&self.base, ctx)
    }
}

#[derive(Serialize)]
struct StageDcTablesRequestData {
    id: String,
    node_name: String,
    catalog_path: String,
}

/// Stages the data-collector tables.
pub struct NmaStageDcTablesOp {
    base: OpBase,
    id: String,
    host_node_name_map: HashMap<String, String>,
    host_cat_path_map: HashMap<String, String>,
}

impl NmaStageDcTablesOp {
    pub fn new(
        logger: &Logger,
        id: &str,
        hosts: Vec<String>,
        host_node_name_map: HashMap<String, String>,
        host_cat_path_map: HashMap<String, String>,
    ) -> Self {
        Self {
            base: OpBase::new("NmaStageDcTablesOp", "Stage DC tables", logger, hosts),
            id: id.to_string(),
            host_node_name_map,
            host_cat_path_map,
        }
    }
}

#[async_trait]
impl ClusterOp for NmaStageDcTablesOp {
    fn base(&self) -> &OpBase {
        &self.base
    }

    fn base_mut(&mut self) -> &mut OpBase {
        &mut self.base
    }

    async fn prepare(&mut self, ctx: &mut ExecContext) -> Result<(), OpError> {
        let bodies = per_host_body(&self.base, |host| {
            Ok(StageDcTablesRequestData {
                id: self.id.clone(),
                node_name: lookup(&self.base, &self.host_node_name_map, host, "node name")?,
                catalog_path: lookup(&self.base, &self.host_cat_path_map, host, "catalog path")?,
            })
        })?;
        ctx.dispatcher.setup(&self.base.hosts);
        build_requests(&mut self.base, "dc-tables/stage", &bodies);
        Ok(())
    }

    async fn process_result(&mut self, ctx: &mut ExecContext) -> Result<(), OpError> {
        lenient_reduce(&self.base, ctx)
    }
}

#[derive(Serialize)]
struct StageFilesRequestData {
    id: String,
    batch: String,
    node_name: String,
    catalog_path: String,
    file_size_limit_bytes: u64,
}

/// Stages a fixed batch of miscellaneous files (what belongs to each batch
/// is the agent's business).
pub struct NmaStageFilesOp {
    base: OpBase,
    id: String,
    batch: String,
    host_node_name_map: HashMap<String, String>,
    host_cat_path_map: HashMap<String, String>,
}

impl NmaStageFilesOp {
    pub fn new(
        logger: &Logger,
        id: &str,
        batch: &str,
        hosts: Vec<String>,
        host_node_name_map: HashMap<String, String>,
        host_cat_path_map: HashMap<String, String>,
    ) -> Self {
        Self {
            base: OpBase::new("NmaStageFilesOp", "Stage diagnostic files", logger, hosts),
            id: id.to_string(),
            batch: batch.to_string(),
            host_node_name_map,
            host_cat_path_map,
        }
    }
}

#[async_trait]
impl ClusterOp for NmaStageFilesOp {
    fn base(&self) -> &OpBase {
        &self.base
    }

    fn base_mut(&mut self) -> &mut OpBase {
        &mut self.base
    }

    async fn prepare(&mut self, ctx: &mut ExecContext) -> Result<(), OpError> {
        let bodies = per_host_body(&self.base, |host| {
            Ok(StageFilesRequestData {
                id: self.id.clone(),
                batch: self.batch.clone(),
                node_name: lookup(&self.base, &self.host_node_name_map, host, "node name")?,
                catalog_path: lookup(&self.base, &self.host_cat_path_map, host, "catalog path")?,
                file_size_limit_bytes: FILE_SIZE_LIMIT_BYTES,
            })
        })?;
        ctx.dispatcher.setup(&self.base.hosts);
        build_requests(&mut self.base, "files/stage", &bodies);
        Ok(())
    }

    async fn process_result(&mut self, ctx: &mut ExecContext) -> Result<(), OpError> {
        lenient_reduce(&self.base, ctx)
    }
}

fn lookup(
    base: &OpBase,
    map: &HashMap<String, String>,
    host: &str,
    label: &str,
) -> Result<String, OpError> {
    map.get(host).cloned().ok_or_else(|| {
        base.precondition_err(format!("host {} has no saved {}", host, label))
    })
}
