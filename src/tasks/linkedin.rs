use std::path::Path;
use std::time::Duration;

use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use rand::Rng;
use serde_json::Value;
use tracing::{error, info, warn};

use crate::providers::linkedin::LinkedinClient;

/// Looks a company up by name.
#[async_trait]
pub trait CompanyLookup: Send + Sync {
    async fn company(&self, name: &str) -> Result<Option<Value>>;
}

#[async_trait]
impl CompanyLookup for LinkedinClient {
    async fn company(&self, name: &str) -> Result<Option<Value>> {
        self.get_company(name).await
    }
}

/// Random pause between lookups, drawn uniformly from `[min, max]`.
#[derive(Debug, Clone, Copy)]
pub struct Pause {
    pub min: Duration,
    pub max: Duration,
}

impl Pause {
    fn draw(&self) -> Duration {
        if self.max <= self.min {
            return self.min;
        }
        rand::thread_rng().gen_range(self.min..=self.max)
    }
}

/// Add a `linkedin_data` column (company JSON, empty when unknown) to every row
/// of the fetched-companies CSV.
pub async fn run(
    lookup: &dyn CompanyLookup,
    input: &Path,
    output: &Path,
    pause: Pause,
) -> Result<usize> {
    info!(path = %input.display(), "loading fetched companies");
    let mut reader = csv::Reader::from_path(input)
        .with_context(|| format!("opening {}", input.display()))?;
    let headers = reader.headers()?.clone();
    let name_idx = headers
        .iter()
        .position(|h| h == "Name")
        .ok_or_else(|| anyhow!("{} has no Name column", input.display()))?;

    if let Some(parent) = output.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)?;
    }
    let mut writer = csv::Writer::from_path(output)
        .with_context(|| format!("creating {}", output.display()))?;
    writer.write_record(headers.iter().chain(std::iter::once("linkedin_data")))?;

    let mut rows = 0;
    for record in reader.records() {
        let record = record?;
        let name = record.get(name_idx).unwrap_or_default();
        info!(company = %name, "looking up LinkedIn company");
        let data = match lookup.company(name).await {
            Ok(Some(company)) => company.to_string(),
            Ok(None) => String::new(),
            Err(err) => {
                error!(company = %name, %err, "LinkedIn lookup failed");
                String::new()
            }
        };
        writer.write_record(record.iter().chain(std::iter::once(data.as_str())))?;
        rows += 1;
        tokio::time::sleep(pause.draw()).await;
    }
    writer.flush()?;
    if rows == 0 {
        warn!("no companies to enrich");
    }
    info!(path = %output.display(), rows, "saved LinkedIn enrichment");
    Ok(rows)
}
