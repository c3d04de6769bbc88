use anyhow::{Context, Result};
use reqwest::{Client, StatusCode};
use serde::Deserialize;
use serde_json::{Map, Value};
use tracing::{debug, error, info};

use super::query::SearchQuery;
use crate::util::http::{build_client, truncate_for_log, USER_AGENT};
use crate::util::retry::{retry, RetryPolicy};

pub const DEFAULT_BASE_URL: &str = "https://api.crunchbase.com/api/v4";
pub const MAX_PAGE_SIZE: u32 = 1000;

#[derive(Debug, thiserror::Error)]
pub enum SearchError {
    #[error("invalid search API credentials")]
    InvalidCredentials,
    #[error("search request failed: {status} code={} {message}", code.as_deref().unwrap_or("-"))]
    Rejected {
        status: u16,
        code: Option<String>,
        message: String,
    },
}

/// One page of organization search results.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct SearchResponse {
    #[serde(default)]
    pub count: u64,
    #[serde(default)]
    pub entities: Vec<Entity>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct Entity {
    #[serde(default)]
    pub uuid: String,
    #[serde(default)]
    pub properties: Map<String, Value>,
}

/// Human-readable meaning of the API's documented error codes.
pub fn describe_error(status: u16, code: Option<&str>) -> Option<&'static str> {
    match (status, code) {
        (401, _) => Some("Invalid credentials"),
        (400, Some("MD103")) => Some("Multiple pagination parameters specified"),
        (400, Some("MD403")) => Some("Request is asking for more than 1000 results"),
        (400 | 404, Some("CS102")) => Some("Invalid entity collection id specified"),
        (400, Some("CS103")) => Some("Invalid JSON body or search request"),
        (400, Some("CS105")) => Some("Invalid URI"),
        (400, Some("CS106")) => Some("Query timeout exceeded"),
        (400, Some("CS109")) => Some("Unknown or invalid operator ID"),
        (400, Some("CS111")) => Some("Invalid specified values or format"),
        (400 | 404, Some("CS112")) => Some("Field ID does not exist"),
        (400, Some(c)) if c.starts_with("CS15") => Some("Too many concurrent requests"),
        (400, Some("CS404")) => Some("Requested resource not found"),
        (429, _) => Some("Too many concurrent requests"),
        (409, _) => Some("Too many requests, user is rate-limited"),
        (502, _) => Some("Service is unavailable during an outage"),
        (500, _) => Some("Internal server error"),
        _ => None,
    }
}

/// Pull `(code, message)` out of `{"error": {...}}` or `[{...}]` error bodies.
fn error_code(body: &str) -> (Option<String>, Option<String>) {
    let Ok(value) = serde_json::from_str::<Value>(body) else {
        return (None, None);
    };
    let obj = value
        .get("error")
        .or_else(|| value.as_array().and_then(|a| a.first()))
        .unwrap_or(&value);
    let field = |k: &str| obj.get(k).and_then(Value::as_str).map(str::to_string);
    (field("code"), field("message"))
}

#[derive(Debug, Clone)]
pub struct CrunchbaseClient {
    search_url: String,
    http: Client,
    api_key: String,
    retry: RetryPolicy,
}

impl CrunchbaseClient {
    pub fn new(
        base_url: Option<&str>,
        api_key: &str,
        timeout_secs: u64,
        retry: RetryPolicy,
    ) -> Result<Self> {
        let base = base_url.unwrap_or(DEFAULT_BASE_URL).trim_end_matches('/');
        Ok(Self {
            search_url: format!("{base}/searches/organizations"),
            http: build_client(USER_AGENT, timeout_secs)?,
            api_key: api_key.to_string(),
            retry,
        })
    }

    async fn search(&self, body: &SearchQuery) -> Result<SearchResponse> {
        let resp = self
            .http
            .post(&self.search_url)
            .header("accept", "application/json")
            .header("X-cb-user-key", &self.api_key)
            .json(body)
            .send()
            .await
            .with_context(|| format!("POST {}", self.search_url))?;
        let status = resp.status();
        if status.is_success() {
            return resp
                .json::<SearchResponse>()
                .await
                .context("decoding organization search response");
        }
        if status == StatusCode::UNAUTHORIZED {
            error!("invalid search API credentials");
            return Err(SearchError::InvalidCredentials.into());
        }
        let text = resp.text().await.unwrap_or_default();
        let (code, message) = error_code(&text);
        let meaning = describe_error(status.as_u16(), code.as_deref()).unwrap_or("unexpected status");
        error!(status = status.as_u16(), code = code.as_deref().unwrap_or("-"), "{meaning}");
        Err(SearchError::Rejected {
            status: status.as_u16(),
            code,
            message: message.unwrap_or_else(|| truncate_for_log(text, 400)),
        }
        .into())
    }

    /// Single request with the cheapest possible body. Used at startup.
    pub async fn check_connectivity(&self) -> Result<()> {
        self.search(&SearchQuery::probe())
            .await
            .context("search API is not reachable")?;
        info!("search API is reachable");
        Ok(())
    }

    /// Number of organizations matching `query`, requested with `limit = 1`.
    pub async fn company_count(&self, query: &SearchQuery) -> Result<u64> {
        let body = query.page(1, None);
        let body = &body;
        let resp = retry(&self.retry, "company_count", move || async move {
            self.search(body).await
        })
        .await?;
        Ok(resp.count)
    }

    /// One page of at most `limit` organizations after `after_id`.
    pub async fn get_data(
        &self,
        query: &SearchQuery,
        after_id: Option<&str>,
        limit: u32,
    ) -> Result<SearchResponse> {
        let body = query.page(limit.min(MAX_PAGE_SIZE), after_id);
        let body = &body;
        debug!(after_id = after_id.unwrap_or("-"), limit, "requesting page");
        retry(&self.retry, "get_data", move || async move {
            self.search(body).await
        })
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_codes_are_described() {
        assert_eq!(
            describe_error(400, Some("MD403")),
            Some("Request is asking for more than 1000 results")
        );
        assert_eq!(
            describe_error(400, Some("CS150")),
            Some("Too many concurrent requests")
        );
        assert_eq!(
            describe_error(404, Some("CS112")),
            Some("Field ID does not exist")
        );
        assert_eq!(describe_error(404, Some("CS103")), None);
        assert_eq!(
            describe_error(409, None),
            Some("Too many requests, user is rate-limited")
        );
    }

    #[test]
    fn error_code_reads_both_body_shapes() {
        assert_eq!(
            error_code(r#"{"error": {"code": "CS106", "message": "slow"}}"#),
            (Some("CS106".into()), Some("slow".into()))
        );
        assert_eq!(
            error_code(r#"[{"code": "MD103", "message": "two cursors"}]"#),
            (Some("MD103".into()), Some("two cursors".into()))
        );
        assert_eq!(error_code("<html>"), (None, None));
    }

    #[test]
    fn base_url_trailing_slash_is_ignored() {
        let c = CrunchbaseClient::new(Some("http://x/api/"), "k", 5, RetryPolicy::once()).unwrap();
        assert_eq!(c.search_url, "http://x/api/searches/organizations");
    }
}
