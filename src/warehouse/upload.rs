use anyhow::{anyhow, Result};
use tracing::{error, info, warn};

use super::schema::{company_schema, PARTITION_COLUMN};
use super::{Warehouse, WarehouseError};
use crate::models::{to_csv_bytes, CompanyRecord};

/// What happened to a batch handed to [`upload_records`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UploadOutcome {
    SkippedEmpty,
    Created { rows: usize },
    Appended { rows: usize },
    SkippedDuplicate { partition: String },
}

/// Duplicate probe for a batch: does any row already carry the batch's
/// partition timestamp (truncated to seconds)?
pub fn duplicate_probe_sql(table_id: &str, partition_seconds: &str) -> String {
    format!(
        "SELECT {col} FROM `{table_id}` WHERE DATETIME_TRUNC({col}, SECOND) = DATETIME(\"{partition_seconds}\") LIMIT 1",
        col = PARTITION_COLUMN
    )
}

/// Append fetched companies to `table`, creating it on first use.
///
/// Only the first record's partition timestamp is probed, so a batch is either
/// loaded whole or skipped whole. Nothing is rolled back on failure.
pub async fn upload_records(
    warehouse: &dyn Warehouse,
    table: &str,
    records: &[CompanyRecord],
) -> Result<UploadOutcome> {
    let table_id = warehouse.table_id(table);
    let Some(first) = records.first() else {
        info!(table = %table_id, "no records to upload");
        return Ok(UploadOutcome::SkippedEmpty);
    };

    let created = if warehouse.table_exists(table).await? {
        let partition = first
            .partition_timestamp()
            .ok_or_else(|| anyhow!("unparsable partition date: {:?}", first.partition_date))?
            .format("%Y-%m-%d %H:%M:%S")
            .to_string();
        let rows = warehouse
            .query(&duplicate_probe_sql(&table_id, &partition))
            .await?;
        if !rows.is_empty() {
            warn!(table = %table_id, %partition, "partition already loaded, skipping upload");
            return Ok(UploadOutcome::SkippedDuplicate { partition });
        }
        false
    } else {
        info!(table = %table_id, "table missing, creating");
        warehouse.create_table(table, &company_schema()).await?;
        true
    };

    let csv = to_csv_bytes(records)?;
    let job = warehouse
        .submit_csv_load(table, &company_schema(), csv)
        .await?;
    info!(table = %table_id, job_id = %job.job_id, rows = records.len(), "load job submitted");

    let errors = warehouse.wait_for_job(&job).await?;
    if !errors.is_empty() {
        for err in &errors {
            error!(job_id = %job.job_id, %err, "load job error");
        }
        return Err(WarehouseError::LoadFailed {
            job_id: job.job_id,
            errors,
        }
        .into());
    }

    let rows = records.len();
    info!(table = %table_id, rows, "upload finished");
    Ok(if created {
        UploadOutcome::Created { rows }
    } else {
        UploadOutcome::Appended { rows }
    })
}
