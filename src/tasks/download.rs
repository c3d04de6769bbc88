use std::path::Path;

use anyhow::Result;
use tracing::info;

use crate::models::{write_csv, CompanyRecord};
use crate::providers::crunchbase::fetch::fetch_all;
use crate::providers::crunchbase::{CrunchbaseClient, SearchQuery};
use crate::warehouse::schema::COMPANY_TABLE;
use crate::warehouse::upload::{upload_records, UploadOutcome};
use crate::warehouse::Warehouse;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DownloadSummary {
    pub rows: usize,
    pub upload: Option<UploadOutcome>,
}

/// Fetch companies, write them to `output`, and append them to the warehouse
/// when one is given.
pub async fn run(
    client: &CrunchbaseClient,
    query: &SearchQuery,
    warehouse: Option<&dyn Warehouse>,
    output: &Path,
) -> Result<DownloadSummary> {
    let records = fetch_all(client, query).await?;
    save(&records, output)?;

    let upload = match warehouse {
        Some(wh) => {
            info!(table = COMPANY_TABLE, rows = records.len(), "uploading to warehouse");
            let outcome = upload_records(wh, COMPANY_TABLE, &records).await?;
            info!(?outcome, "upload step done");
            Some(outcome)
        }
        None => None,
    };

    Ok(DownloadSummary {
        rows: records.len(),
        upload,
    })
}

fn save(records: &[CompanyRecord], output: &Path) -> Result<()> {
    write_csv(output, records)?;
    info!(path = %output.display(), rows = records.len(), "saved fetched companies");
    Ok(())
}
