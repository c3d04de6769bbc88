//! Command-line flags plus environment, resolved once into [`Config`].
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{bail, Result};
use clap::{ArgAction, Parser};
use tracing::{debug, info, warn};

use crate::env_boot::{dev_mode_requested, EnvSource};
use crate::providers::crunchbase::query::GERMANY_LOCATION_ID;
use crate::util::env::{env_opt, env_parse, env_parse_opt};
use crate::util::retry::RetryPolicy;

/// Blank flag values are treated as absent so the environment still applies.
fn given(value: Option<String>) -> Option<String> {
    value.filter(|v| !v.trim().is_empty())
}

#[derive(Parser, Debug, Clone, Default)]
#[command(
    name = "circular-radar",
    version,
    about = "Fetch companies, map them to circular-economy strategies and report on them"
)]
pub struct Cli {
    /// Fetch companies from the search API into crunchbase.csv
    #[arg(long = "download_flag", alias = "download-flag", action = ArgAction::SetTrue)]
    pub download: bool,
    /// Append fetched companies to the warehouse (ignored in development mode)
    #[arg(long = "upload_flag", alias = "upload-flag", action = ArgAction::SetTrue)]
    pub upload: bool,
    /// Enrich fetched companies with LinkedIn company pages
    #[arg(long = "linkedin_flag", alias = "linkedin-flag", action = ArgAction::SetTrue)]
    pub linkedin: bool,
    /// Categorize companies against the 9R taxonomy
    #[arg(long = "analysis_flag", alias = "analysis-flag", action = ArgAction::SetTrue)]
    pub analysis: bool,
    /// Ask the LLM to confirm each matched strategy
    #[arg(long = "validation_flag", alias = "validation-flag", action = ArgAction::SetTrue)]
    pub validation: bool,
    /// Geocode cities and render strategy maps
    #[arg(long = "mapping_flag", alias = "mapping-flag", action = ArgAction::SetTrue)]
    pub mapping: bool,
    /// Warehouse project (overrides GOOGLE_PROJECT_ID)
    #[arg(long = "project_id", alias = "project-id")]
    pub project_id: Option<String>,
    /// Warehouse dataset (overrides GOOGLE_DATASET_ID)
    #[arg(long = "dataset_id", alias = "dataset-id")]
    pub dataset_id: Option<String>,
    /// Search API key (overrides CRUNCHBASE_API_KEY)
    #[arg(long = "crunchbase_api_key", alias = "crunchbase-api-key")]
    pub crunchbase_api_key: Option<String>,
    /// LLM API key (overrides OPENAI_API_KEY)
    #[arg(long = "openai_api_key", alias = "openai-api-key")]
    pub openai_api_key: Option<String>,
    /// Output directory for CSV reports and maps (overrides REPORTING_DIR)
    #[arg(long = "reporting_dir", alias = "reporting-dir")]
    pub reporting_dir: Option<PathBuf>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Tasks {
    pub download: bool,
    pub upload: bool,
    pub linkedin: bool,
    pub analysis: bool,
    pub validation: bool,
    pub mapping: bool,
}

#[derive(Debug, Clone)]
pub struct CrunchbaseSettings {
    pub api_key: Option<String>,
    pub base_url: Option<String>,
    pub location_id: String,
}

#[derive(Debug, Clone)]
pub struct OpenAiSettings {
    pub api_key: Option<String>,
    pub base_url: Option<String>,
    pub model: Option<String>,
    pub request_delay: Duration,
}

#[derive(Debug, Clone)]
pub struct LinkedinSettings {
    pub account: Option<String>,
    pub password: Option<String>,
    pub base_url: Option<String>,
    pub min_pause: Duration,
    pub max_pause: Duration,
}

impl LinkedinSettings {
    pub fn credentials(&self) -> Option<(&str, &str)> {
        Some((self.account.as_deref()?, self.password.as_deref()?))
    }
}

#[derive(Debug, Clone)]
pub struct Paths {
    pub reporting_dir: PathBuf,
    pub openai_cache: PathBuf,
    pub geocode_cache: PathBuf,
}

impl Paths {
    pub fn new(reporting_dir: &Path) -> Self {
        Self {
            reporting_dir: reporting_dir.to_path_buf(),
            openai_cache: PathBuf::from("openai_cache.json"),
            geocode_cache: PathBuf::from("city_coords_cache.json"),
        }
    }

    pub fn crunchbase_csv(&self) -> PathBuf {
        self.reporting_dir.join("crunchbase.csv")
    }

    pub fn linkedin_csv(&self) -> PathBuf {
        self.reporting_dir.join("linkedin.csv")
    }

    pub fn categorized_csv(&self) -> PathBuf {
        self.reporting_dir.join("categorized_crunchbase_with_address.csv")
    }

    pub fn validated_csv(&self) -> PathBuf {
        self.reporting_dir
            .join("categorized_crunchbase_with_openai_responses.csv")
    }
}

/// Everything the pipeline needs, resolved once at startup.
#[derive(Debug, Clone)]
pub struct Config {
    pub env_source: EnvSource,
    pub dev_mode: bool,
    pub stage: String,
    pub tasks: Tasks,
    pub project_id: Option<String>,
    pub dataset_id: Option<String>,
    pub crunchbase: CrunchbaseSettings,
    pub openai: OpenAiSettings,
    pub linkedin: LinkedinSettings,
    pub nominatim_base_url: Option<String>,
    pub map_country: String,
    pub paths: Paths,
    pub cache_max_entries: Option<usize>,
    pub retry: RetryPolicy,
    pub http_timeout_secs: u64,
}

impl Config {
    /// Combine parsed flags with the (already loaded) environment. Flags win
    /// over environment values. Development mode never uploads.
    pub fn from_cli(cli: Cli, env_source: EnvSource) -> Result<Self> {
        let dev_mode = dev_mode_requested(env_source);
        let mut tasks = Tasks {
            download: cli.download,
            upload: cli.upload,
            linkedin: cli.linkedin,
            analysis: cli.analysis,
            validation: cli.validation,
            mapping: cli.mapping,
        };
        if dev_mode && tasks.upload {
            debug!("development mode: upload disabled");
            tasks.upload = false;
        }

        let reporting_dir = cli
            .reporting_dir
            .or_else(|| env_opt("REPORTING_DIR").map(PathBuf::from))
            .unwrap_or_else(|| PathBuf::from("reporting"));
        let mut paths = Paths::new(&reporting_dir);
        if let Some(p) = env_opt("OPENAI_CACHE_FILE") {
            paths.openai_cache = PathBuf::from(p);
        }
        if let Some(p) = env_opt("GEOCODE_CACHE_FILE") {
            paths.geocode_cache = PathBuf::from(p);
        }

        let min_pause = env_parse("LINKEDIN_MIN_PAUSE_SECS", 10u64);
        let max_pause = env_parse("LINKEDIN_MAX_PAUSE_SECS", 20u64).max(min_pause);

        let cfg = Self {
            env_source,
            dev_mode,
            stage: env_opt("STAGE").unwrap_or_else(|| "unknown".to_string()),
            tasks,
            project_id: given(cli.project_id).or_else(|| env_opt("GOOGLE_PROJECT_ID")),
            dataset_id: given(cli.dataset_id).or_else(|| env_opt("GOOGLE_DATASET_ID")),
            crunchbase: CrunchbaseSettings {
                api_key: given(cli.crunchbase_api_key).or_else(|| env_opt("CRUNCHBASE_API_KEY")),
                base_url: env_opt("CRUNCHBASE_BASE_URL"),
                location_id: env_opt("CRUNCHBASE_LOCATION_ID")
                    .unwrap_or_else(|| GERMANY_LOCATION_ID.to_string()),
            },
            openai: OpenAiSettings {
                api_key: given(cli.openai_api_key).or_else(|| env_opt("OPENAI_API_KEY")),
                base_url: env_opt("OPENAI_BASE_URL"),
                model: env_opt("OPENAI_MODEL"),
                request_delay: Duration::from_millis(env_parse("OPENAI_REQUEST_DELAY_MS", 0u64)),
            },
            linkedin: LinkedinSettings {
                account: env_opt("LINKEDIN_ACCOUNT"),
                password: env_opt("LINKEDIN_PASSWORD"),
                base_url: env_opt("LINKEDIN_BASE_URL"),
                min_pause: Duration::from_secs(min_pause),
                max_pause: Duration::from_secs(max_pause),
            },
            nominatim_base_url: env_opt("NOMINATIM_BASE_URL"),
            map_country: env_opt("MAP_COUNTRY").unwrap_or_else(|| "Germany".to_string()),
            paths,
            cache_max_entries: env_parse_opt("CACHE_MAX_ENTRIES"),
            retry: RetryPolicy::from_env(),
            http_timeout_secs: env_parse("HTTP_TIMEOUT_SECS", 60u64),
        };
        cfg.validate()?;
        Ok(cfg)
    }

    /// Credentials for every client an enabled task needs must be present.
    fn validate(&self) -> Result<()> {
        if self.crunchbase_needed() && self.crunchbase.api_key.is_none() {
            bail!("download requested but no search API key (CRUNCHBASE_API_KEY / --crunchbase_api_key)");
        }
        if self.bigquery_needed() && (self.project_id.is_none() || self.dataset_id.is_none()) {
            bail!("upload requested but project/dataset not set (GOOGLE_PROJECT_ID, GOOGLE_DATASET_ID)");
        }
        if self.openai_needed() && self.openai.api_key.is_none() {
            bail!("validation requested but no LLM API key (OPENAI_API_KEY / --openai_api_key)");
        }
        Ok(())
    }

    pub fn crunchbase_needed(&self) -> bool {
        self.tasks.download
    }

    pub fn bigquery_needed(&self) -> bool {
        self.tasks.upload
    }

    pub fn openai_needed(&self) -> bool {
        self.tasks.validation
    }

    pub fn linkedin_needed(&self) -> bool {
        self.tasks.linkedin
    }

    pub fn nominatim_needed(&self) -> bool {
        self.tasks.mapping
    }

    /// Log the resolved settings (no secrets).
    pub fn log_summary(&self) {
        info!(
            source = self.env_source.describe(),
            dev_mode = self.dev_mode,
            stage = %self.stage,
            "configuration loaded"
        );
        info!(tasks = ?self.tasks, reporting_dir = %self.paths.reporting_dir.display(), "tasks enabled");
        if self.dev_mode {
            debug!("development mode is enabled");
        }
        if self.tasks.upload && !self.tasks.download {
            warn!("upload requested without download; there will be nothing to upload");
        }
    }
}
