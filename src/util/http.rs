use std::time::Duration;

use anyhow::{Context, Result};
use reqwest::Client;

pub const USER_AGENT: &str = concat!("circular-radar/", env!("CARGO_PKG_VERSION"));

pub fn truncate_for_log(mut s: String, max_len: usize) -> String {
    if s.len() > max_len {
        let mut cut = max_len;
        while !s.is_char_boundary(cut) {
            cut -= 1;
        }
        s.truncate(cut);
        s.push('…');
    }
    s
}

/// Shared reqwest client shape: fixed user agent and a per-request timeout.
pub fn build_client(user_agent: &str, timeout_secs: u64) -> Result<Client> {
    Client::builder()
        .user_agent(user_agent)
        .timeout(Duration::from_secs(timeout_secs))
        .build()
        .with_context(|| format!("failed to construct HTTP client ({user_agent})"))
}
