//! Runs the enabled tasks in their fixed order.
use std::time::Instant;

use anyhow::{Context, Result};
use tracing::{error, info, warn};

use crate::config::Config;
use crate::providers::crunchbase::{CrunchbaseClient, SearchQuery};
use crate::providers::linkedin::LinkedinClient;
use crate::providers::nominatim::{Geocoder, NominatimClient};
use crate::providers::openai::OpenAiClient;
use crate::tasks::{analysis, download, linkedin, mapping, validation};
use crate::util::cache::JsonFileCache;
use crate::util::env::preflight_check;
use crate::warehouse::bigquery::{BigQueryClient, BigQueryConfig};
use crate::warehouse::{ensure_dataset, Warehouse};

const GOOGLE_KEYS: [&str; 3] = [
    "GOOGLE_PRIVATE_KEY",
    "GOOGLE_CLIENT_EMAIL",
    "GOOGLE_PRIVATE_KEY_ID",
];

/// Clients for the enabled tasks; `None` when no task needs one.
struct Clients {
    crunchbase: Option<CrunchbaseClient>,
    bigquery: Option<BigQueryClient>,
    openai: Option<OpenAiClient>,
}

async fn connect(cfg: &Config) -> Result<Clients> {
    let timeout = cfg.http_timeout_secs;

    let crunchbase = match cfg.crunchbase.api_key.as_deref() {
        Some(key) if cfg.crunchbase_needed() => {
            let client = CrunchbaseClient::new(
                cfg.crunchbase.base_url.as_deref(),
                key,
                timeout,
                cfg.retry,
            )?;
            client.check_connectivity().await?;
            Some(client)
        }
        _ => None,
    };

    let bigquery = match (cfg.project_id.as_deref(), cfg.dataset_id.as_deref()) {
        (Some(project), Some(dataset)) if cfg.bigquery_needed() => {
            preflight_check(
                "bigquery",
                &GOOGLE_KEYS,
                &["GOOGLE_PROJECT_ID", "GOOGLE_DATASET_ID", "GOOGLE_CLIENT_EMAIL"],
            )?;
            let client = BigQueryClient::from_env(
                BigQueryConfig::new(project, dataset),
                timeout,
                cfg.retry,
            )?;
            ensure_dataset(&client)
                .await
                .context("warehouse is not reachable")?;
            Some(client)
        }
        _ => None,
    };

    let openai = match cfg.openai.api_key.as_deref() {
        Some(key) if cfg.openai_needed() => {
            let client = OpenAiClient::new(
                cfg.openai.base_url.as_deref(),
                key,
                cfg.openai.model.as_deref(),
                timeout,
                cfg.retry,
            )?;
            client.check_connectivity().await?;
            info!(model = client.model(), "LLM API is reachable");
            Some(client)
        }
        _ => None,
    };

    Ok(Clients {
        crunchbase,
        bigquery,
        openai,
    })
}

async fn run_linkedin(cfg: &Config) -> Result<()> {
    let Some((account, password)) = cfg.linkedin.credentials() else {
        error!("LinkedIn task requested but LINKEDIN_ACCOUNT/LINKEDIN_PASSWORD are not set; skipping");
        return Ok(());
    };
    let input = cfg.paths.crunchbase_csv();
    if !input.exists() {
        warn!(path = %input.display(), "no fetched companies to enrich; run the download first");
        return Ok(());
    }
    let client = LinkedinClient::new(cfg.linkedin.base_url.as_deref(), cfg.http_timeout_secs)?;
    client.login(account, password).await?;
    let pause = linkedin::Pause {
        min: cfg.linkedin.min_pause,
        max: cfg.linkedin.max_pause,
    };
    linkedin::run(&client, &input, &cfg.paths.linkedin_csv(), pause).await?;
    Ok(())
}

/// Execute every enabled task. Connectivity problems abort before any task
/// starts.
pub async fn run(cfg: &Config) -> Result<()> {
    let started = Instant::now();
    cfg.log_summary();

    let clients = connect(cfg).await?;

    if cfg.tasks.download {
        if let Some(client) = &clients.crunchbase {
            let query = SearchQuery::organizations_in(&cfg.crunchbase.location_id);
            let warehouse = clients.bigquery.as_ref().map(|c| c as &dyn Warehouse);
            let summary =
                download::run(client, &query, warehouse, &cfg.paths.crunchbase_csv()).await?;
            info!(rows = summary.rows, upload = ?summary.upload, "download task finished");
        }
    }

    if cfg.tasks.linkedin {
        run_linkedin(cfg).await?;
    }

    if cfg.tasks.analysis {
        let summary = analysis::run(&cfg.paths.crunchbase_csv(), &cfg.paths.categorized_csv())?;
        info!(
            total = summary.total,
            categorized = summary.categorized,
            "analysis task finished"
        );
    }

    if cfg.tasks.validation {
        if let Some(client) = &clients.openai {
            let mut cache: JsonFileCache<String> =
                JsonFileCache::load(&cfg.paths.openai_cache, cfg.cache_max_entries)?;
            info!(entries = cache.len(), path = %cache.path().display(), "LLM cache loaded");
            validation::run(
                client,
                &cfg.paths.categorized_csv(),
                &cfg.paths.validated_csv(),
                &mut cache,
                cfg.openai.request_delay,
            )
            .await?;
        }
    }

    if cfg.tasks.mapping {
        let client = NominatimClient::new(cfg.nominatim_base_url.as_deref(), cfg.http_timeout_secs)?;
        let mut geocoder = Geocoder::open(client, &cfg.paths.geocode_cache, cfg.cache_max_entries)?;
        if let Some(summary) = mapping::run(
            &mut geocoder,
            &cfg.paths.categorized_csv(),
            &cfg.map_country,
            &cfg.paths.reporting_dir,
        )
        .await?
        {
            info!(
                maps = summary.maps.len(),
                dropped = summary.dropped_cities.len(),
                "mapping task finished"
            );
        }
    }

    info!(elapsed = ?started.elapsed(), "pipeline finished");
    Ok(())
}
