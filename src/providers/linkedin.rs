//! Session-based LinkedIn company lookup.
//!
//! Logs in with account credentials (cookie session, CSRF token taken from the
//! `JSESSIONID` cookie) and reads company pages through the voyager API.
use std::sync::Arc;

use anyhow::{anyhow, bail, Context, Result};
use reqwest::cookie::{CookieStore, Jar};
use reqwest::{Client, StatusCode};
use serde::Deserialize;
use serde_json::Value;
use std::time::Duration;
use tracing::{debug, info, warn};
use url::Url;

pub const DEFAULT_BASE_URL: &str = "https://www.linkedin.com";
const COMPANY_DECORATION: &str = "com.linkedin.voyager.deco.organization.web.WebFullCompanyMain-12";
const BROWSER_AGENT: &str = "Mozilla/5.0 (X11; Linux x86_64) AppleWebKit/537.36 (KHTML, like Gecko)";

#[derive(Debug, Deserialize)]
struct LoginResult {
    #[serde(default)]
    login_result: String,
}

pub struct LinkedinClient {
    base_url: Url,
    http: Client,
    jar: Arc<Jar>,
}

/// Vanity name LinkedIn uses in company URLs (`"Acme Recycling GmbH"` → `acme-recycling-gmbh`).
pub fn universal_name(company: &str) -> String {
    company
        .split_whitespace()
        .collect::<Vec<_>>()
        .join("-")
        .to_lowercase()
}

impl LinkedinClient {
    pub fn new(base_url: Option<&str>, timeout_secs: u64) -> Result<Self> {
        let base_url = Url::parse(base_url.unwrap_or(DEFAULT_BASE_URL))
            .context("invalid LinkedIn base url")?;
        let jar = Arc::new(Jar::default());
        let http = Client::builder()
            .user_agent(BROWSER_AGENT)
            .cookie_provider(Arc::clone(&jar))
            .timeout(Duration::from_secs(timeout_secs))
            .build()
            .context("failed to construct LinkedIn HTTP client")?;
        Ok(Self {
            base_url,
            http,
            jar,
        })
    }

    fn url(&self, path: &str) -> Result<Url> {
        self.base_url
            .join(path)
            .with_context(|| format!("joining {path} onto {}", self.base_url))
    }

    /// Value of the `JSESSIONID` cookie without its quotes; doubles as the CSRF token.
    fn session_id(&self) -> Option<String> {
        let header = self.jar.cookies(&self.base_url)?;
        let raw = header.to_str().ok()?;
        raw.split(';')
            .filter_map(|kv| kv.trim().split_once('='))
            .find(|(k, _)| *k == "JSESSIONID")
            .map(|(_, v)| v.trim_matches('"').to_string())
    }

    pub async fn login(&self, account: &str, password: &str) -> Result<()> {
        info!("LinkedIn login starting");
        let auth_url = self.url("uas/authenticate")?;
        self.http
            .get(auth_url.clone())
            .send()
            .await
            .context("opening LinkedIn session")?;
        let session = self
            .session_id()
            .ok_or_else(|| anyhow!("LinkedIn did not issue a session cookie"))?;

        let resp = self
            .http
            .post(auth_url)
            .header("X-Li-User-Agent", "LIAuthLibrary:3.2.4 com.linkedin.LinkedIn:8.8.1")
            .header("X-User-Language", "en")
            .form(&[
                ("session_key", account),
                ("session_password", password),
                ("JSESSIONID", session.as_str()),
            ])
            .send()
            .await
            .context("LinkedIn authentication request")?;
        let status = resp.status();
        if status == StatusCode::UNAUTHORIZED {
            bail!("LinkedIn rejected the credentials");
        }
        if !status.is_success() {
            bail!("LinkedIn login failed: {status}");
        }
        let result: LoginResult = resp.json().await.context("decoding LinkedIn login result")?;
        if result.login_result != "PASS" {
            bail!("LinkedIn login failed: {}", result.login_result);
        }
        info!("LinkedIn login succeeded");
        Ok(())
    }

    /// Company page for `company`, or `None` when LinkedIn has no match.
    pub async fn get_company(&self, company: &str) -> Result<Option<Value>> {
        let mut url = self.url("voyager/api/organization/companies")?;
        url.query_pairs_mut()
            .append_pair("decorationId", COMPANY_DECORATION)
            .append_pair("q", "universalName")
            .append_pair("universalName", &universal_name(company));
        let csrf = self.session_id().unwrap_or_default();
        let resp = self
            .http
            .get(url)
            .header("csrf-token", csrf)
            .header("accept", "application/vnd.linkedin.normalized+json+2.1")
            .send()
            .await
            .with_context(|| format!("LinkedIn company lookup for {company}"))?;
        let status = resp.status();
        if status == StatusCode::NOT_FOUND {
            warn!(%company, "no LinkedIn company found");
            return Ok(None);
        }
        if !status.is_success() {
            bail!("LinkedIn company lookup failed: {status}");
        }
        let body: Value = resp.json().await.context("decoding LinkedIn company")?;
        let first = body
            .get("elements")
            .and_then(Value::as_array)
            .and_then(|els| els.first())
            .cloned();
        match &first {
            Some(_) => debug!(%company, "received LinkedIn company"),
            None => warn!(%company, "no LinkedIn company found"),
        }
        Ok(first)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn universal_names_are_slugged() {
        assert_eq!(universal_name("Acme Recycling  GmbH"), "acme-recycling-gmbh");
        assert_eq!(universal_name("ReTech"), "retech");
    }

    #[test]
    fn session_id_strips_quotes() {
        let client = LinkedinClient::new(Some("https://www.linkedin.com"), 5).unwrap();
        let url = Url::parse("https://www.linkedin.com/").unwrap();
        client
            .jar
            .add_cookie_str("JSESSIONID=\"ajax:123\"; Path=/", &url);
        assert_eq!(client.session_id().as_deref(), Some("ajax:123"));
    }
}
