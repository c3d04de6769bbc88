use dotenv::dotenv;
use std::path::Path;

/// Local developer env file. Its presence is what marks a machine as "local".
pub const LOCAL_ENV_FILE: &str = "env_base.env";

/// Where the process environment came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EnvSource {
    /// `env_base.env` was found and loaded; `MODE` is honoured.
    LocalFile,
    /// Plain `.env` (if any) on top of the container environment.
    Container,
}

impl EnvSource {
    pub fn describe(self) -> &'static str {
        match self {
            EnvSource::LocalFile => "environment loaded from env_base.env",
            EnvSource::Container => "environment loaded from container",
        }
    }
}

/// Load `env_base.env` from the working directory when present, otherwise fall
/// back to `.env` (working directory, then the project root).
///
/// Runs before tracing is initialised, so it reports what it did instead of
/// logging it.
pub fn ensure_dotenv() -> EnvSource {
    load_from(Path::new(LOCAL_ENV_FILE))
}

pub(crate) fn load_from(local_file: &Path) -> EnvSource {
    if local_file.exists() {
        let _ = dotenv::from_path(local_file);
        return EnvSource::LocalFile;
    }
    if dotenv().is_err() {
        let root = env!("CARGO_MANIFEST_DIR");
        let candidate = format!("{}/.env", root);
        let _ = dotenv::from_filename(candidate);
    }
    EnvSource::Container
}

/// Development mode can only be switched on from a local env file.
pub fn dev_mode_requested(source: EnvSource) -> bool {
    source == EnvSource::LocalFile
        && std::env::var("MODE")
            .map(|v| v.trim() == "DEV")
            .unwrap_or(false)
}
