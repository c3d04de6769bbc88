//! Environment helpers: ergonomic getters and a redacted configuration snapshot.
//! `env_boot::ensure_dotenv()` must run first so the env files are loaded.
use std::str::FromStr;
use tracing::info;

/// Get required env var; error if missing or blank.
pub fn env_req(key: &str) -> anyhow::Result<String> {
    env_opt(key).ok_or_else(|| anyhow::anyhow!("missing env var {key}"))
}

/// Get optional env var (None if unset or empty).
pub fn env_opt(key: &str) -> Option<String> {
    match std::env::var(key) {
        Ok(v) if !v.trim().is_empty() => Some(v),
        _ => None,
    }
}

/// Get parsed value with default fallback.
pub fn env_parse<T>(key: &str, default: T) -> T
where
    T: FromStr + Clone,
{
    match std::env::var(key) {
        Ok(raw) => raw.trim().parse::<T>().unwrap_or(default),
        Err(_) => default,
    }
}

/// Optional parsed value.
pub fn env_parse_opt<T>(key: &str) -> Option<T>
where
    T: FromStr,
{
    std::env::var(key).ok().and_then(|s| s.trim().parse().ok())
}

pub(crate) fn redact_value(key: &str, val: &str) -> String {
    let k = key.to_ascii_uppercase();
    if k.contains("PASSWORD")
        || k.contains("SECRET")
        || k.contains("KEY")
        || k.contains("TOKEN")
    {
        if val.trim().is_empty() {
            return String::new();
        }
        return "***".to_string();
    }

    // Service-account emails identify the account but are not secret; keep the
    // domain so misconfigured projects are visible.
    if k.contains("EMAIL") {
        if let Some((_, domain)) = val.trim().split_once('@') {
            return format!("***@{domain}");
        }
    }

    val.trim().to_string()
}

/// Validate required keys and log a consolidated, redacted snapshot of configuration.
/// Returns error if any required key is missing.
pub fn preflight_check(title: &str, required: &[&str], also_log: &[&str]) -> anyhow::Result<()> {
    let missing: Vec<&str> = required
        .iter()
        .copied()
        .filter(|k| env_opt(k).is_none())
        .collect();
    let snapshot: Vec<(String, String)> = also_log
        .iter()
        .map(|&k| {
            let v = env_opt(k).unwrap_or_default();
            (k.to_string(), redact_value(k, &v))
        })
        .collect();
    info!(target: "preflight", title, snapshot = ?snapshot, "configuration snapshot");
    if !missing.is_empty() {
        return Err(anyhow::anyhow!(format!(
            "missing required env: {:?}",
            missing
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn secrets_are_redacted() {
        assert_eq!(redact_value("CRUNCHBASE_API_KEY", "abc123"), "***");
        assert_eq!(redact_value("LINKEDIN_PASSWORD", "hunter2"), "***");
        assert_eq!(redact_value("GOOGLE_PRIVATE_KEY", ""), "");
    }

    #[test]
    fn emails_keep_their_domain() {
        assert_eq!(
            redact_value("GOOGLE_CLIENT_EMAIL", "loader@proj.iam.gserviceaccount.com"),
            "***@proj.iam.gserviceaccount.com"
        );
    }

    #[test]
    fn plain_values_pass_through() {
        assert_eq!(redact_value("GOOGLE_DATASET_ID", " crunchbase "), "crunchbase");
    }

    #[test]
    fn parse_falls_back_on_garbage() {
        std::env::set_var("CIRCULAR_RADAR_ENV_PARSE_PROBE", "not-a-number");
        assert_eq!(env_parse("CIRCULAR_RADAR_ENV_PARSE_PROBE", 7u32), 7);
        std::env::set_var("CIRCULAR_RADAR_ENV_PARSE_PROBE", " 12 ");
        assert_eq!(env_parse("CIRCULAR_RADAR_ENV_PARSE_PROBE", 7u32), 12);
    }

    #[test]
    fn blank_values_count_as_missing() {
        std::env::set_var("CIRCULAR_RADAR_ENV_BLANK_PROBE", "   ");
        assert!(env_opt("CIRCULAR_RADAR_ENV_BLANK_PROBE").is_none());
        assert!(env_req("CIRCULAR_RADAR_ENV_BLANK_PROBE").is_err());
    }
}
