//! Analytical warehouse access.
//!
//! `Warehouse` is the seam the pipeline talks to; `bigquery::BigQueryClient`
//! implements it over the BigQuery REST API and tests substitute in-memory
//! fakes.
pub mod auth;
pub mod bigquery;
pub mod schema;
pub mod upload;

use anyhow::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::info;

use schema::SchemaField;

#[derive(Debug, thiserror::Error)]
pub enum WarehouseError {
    #[error("{op} failed: {status} body={body}")]
    Http {
        op: &'static str,
        status: u16,
        body: String,
    },
    #[error("load job {job_id} finished with {} error(s)", errors.len())]
    LoadFailed {
        job_id: String,
        errors: Vec<JobError>,
    },
    #[error("query job {job_id} returned errors: {message}")]
    QueryFailed { job_id: String, message: String },
}

/// One entry of a job's `status.errors` list.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobError {
    #[serde(default)]
    pub reason: Option<String>,
    #[serde(default)]
    pub location: Option<String>,
    #[serde(default)]
    pub message: Option<String>,
}

impl std::fmt::Display for JobError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "reason={} location={} message={}",
            self.reason.as_deref().unwrap_or("-"),
            self.location.as_deref().unwrap_or("-"),
            self.message.as_deref().unwrap_or("-")
        )
    }
}

/// Handle of a submitted load job.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoadJob {
    pub job_id: String,
    pub location: Option<String>,
}

/// A query result row; `None` is SQL NULL.
pub type Row = Vec<Option<String>>;

#[async_trait]
pub trait Warehouse: Send + Sync {
    fn project_id(&self) -> &str;
    fn dataset_id(&self) -> &str;

    /// Fully qualified `project.dataset.table`.
    fn table_id(&self, table: &str) -> String {
        format!("{}.{}.{}", self.project_id(), self.dataset_id(), table)
    }

    async fn dataset_exists(&self) -> Result<bool>;
    async fn create_dataset(&self) -> Result<()>;
    async fn table_exists(&self, table: &str) -> Result<bool>;
    async fn create_table(&self, table: &str, schema: &[SchemaField]) -> Result<()>;

    /// Submit a CSV (header row included) for appending to `table`.
    async fn submit_csv_load(
        &self,
        table: &str,
        schema: &[SchemaField],
        csv: Vec<u8>,
    ) -> Result<LoadJob>;

    /// Block until the job is done and return its errors (empty on success).
    async fn wait_for_job(&self, job: &LoadJob) -> Result<Vec<JobError>>;

    async fn query(&self, sql: &str) -> Result<Vec<Row>>;
}

/// Create the configured dataset when it does not exist yet. Returns whether
/// it was created.
pub async fn ensure_dataset(warehouse: &dyn Warehouse) -> Result<bool> {
    if warehouse.dataset_exists().await? {
        info!(
            project = %warehouse.project_id(),
            dataset = %warehouse.dataset_id(),
            "dataset already exists"
        );
        return Ok(false);
    }
    warehouse.create_dataset().await?;
    info!(
        project = %warehouse.project_id(),
        dataset = %warehouse.dataset_id(),
        "created dataset"
    );
    Ok(true)
}
