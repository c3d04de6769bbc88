//! OAuth bearer tokens for the BigQuery REST API.
//!
//! Service-account credentials come from the `GOOGLE_*` environment fields. The
//! signed JWT assertion is exchanged at `token_uri` and the access token is
//! cached until shortly before it expires.
use std::time::{Duration, Instant};

use anyhow::{anyhow, Context, Result};
use jsonwebtoken::{Algorithm, EncodingKey, Header};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;
use tracing::{debug, info};

use crate::util::env::{env_opt, env_req};

pub const BIGQUERY_SCOPE: &str = "https://www.googleapis.com/auth/cloud-platform";
const DEFAULT_TOKEN_URI: &str = "https://oauth2.googleapis.com/token";
const JWT_BEARER_GRANT: &str = "urn:ietf:params:oauth:grant-type:jwt-bearer";

#[derive(Clone)]
pub struct ServiceAccountKey {
    pub client_email: String,
    pub private_key: String,
    pub private_key_id: Option<String>,
    pub token_uri: String,
}

impl std::fmt::Debug for ServiceAccountKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ServiceAccountKey")
            .field("client_email", &self.client_email)
            .field("private_key", &"***")
            .field("private_key_id", &self.private_key_id.as_ref().map(|_| "***"))
            .field("token_uri", &self.token_uri)
            .finish()
    }
}

impl ServiceAccountKey {
    /// Read the service-account fields from the environment. Env files store the
    /// PEM on one line with literal `\n` sequences, which are unescaped here.
    pub fn from_env() -> Result<Self> {
        let private_key = env_req("GOOGLE_PRIVATE_KEY")?.replace("\\n", "\n");
        Ok(Self {
            client_email: env_req("GOOGLE_CLIENT_EMAIL")?,
            private_key,
            private_key_id: env_opt("GOOGLE_PRIVATE_KEY_ID"),
            token_uri: env_opt("GOOGLE_TOKEN_URI").unwrap_or_else(|| DEFAULT_TOKEN_URI.into()),
        })
    }
}

#[derive(Debug, Serialize)]
struct Claims<'a> {
    iss: &'a str,
    scope: &'a str,
    aud: &'a str,
    iat: i64,
    exp: i64,
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
    #[serde(default = "default_expires_in")]
    expires_in: u64,
}

fn default_expires_in() -> u64 {
    3600
}

/// Seconds shaved off `expires_in` so a token is never used right at expiry.
const EXPIRY_MARGIN_SECS: u64 = 30;

#[derive(Debug, Clone)]
struct CachedToken {
    access_token: String,
    expires_at: Instant,
}

impl CachedToken {
    fn new(access_token: String, expires_in: u64, now: Instant) -> Self {
        let ttl = expires_in
            .saturating_sub(EXPIRY_MARGIN_SECS)
            .max(EXPIRY_MARGIN_SECS);
        Self {
            access_token,
            expires_at: now + Duration::from_secs(ttl),
        }
    }

    fn is_fresh(&self, now: Instant) -> bool {
        self.expires_at > now
    }
}

/// Service-account credentials plus the last token they produced.
#[derive(Debug)]
pub struct ServiceAccountTokens {
    key: ServiceAccountKey,
    http: Client,
    cached: Mutex<Option<CachedToken>>,
}

impl ServiceAccountTokens {
    async fn bearer(&self) -> Result<String> {
        let mut guard = self.cached.lock().await;
        if let Some(token) = guard.as_ref().filter(|t| t.is_fresh(Instant::now())) {
            return Ok(token.access_token.clone());
        }
        let token = request_token(&self.key, &self.http).await?;
        let access = token.access_token.clone();
        *guard = Some(token);
        Ok(access)
    }
}

/// Produces bearer tokens for warehouse requests.
#[derive(Debug)]
pub enum TokenSource {
    /// Fixed token (tests, or a token minted by `gcloud auth print-access-token`).
    Static(String),
    ServiceAccount(ServiceAccountTokens),
}

impl TokenSource {
    pub fn service_account(key: ServiceAccountKey, http: Client) -> Self {
        TokenSource::ServiceAccount(ServiceAccountTokens {
            key,
            http,
            cached: Mutex::new(None),
        })
    }

    pub async fn bearer(&self) -> Result<String> {
        match self {
            TokenSource::Static(token) => Ok(token.clone()),
            TokenSource::ServiceAccount(tokens) => tokens.bearer().await,
        }
    }
}

fn build_assertion(key: &ServiceAccountKey, now: i64) -> Result<String> {
    let mut header = Header::new(Algorithm::RS256);
    header.kid = key.private_key_id.clone();
    let claims = Claims {
        iss: &key.client_email,
        scope: BIGQUERY_SCOPE,
        aud: &key.token_uri,
        iat: now,
        exp: now + 3600,
    };
    let signing_key = EncodingKey::from_rsa_pem(key.private_key.as_bytes())
        .context("GOOGLE_PRIVATE_KEY is not a valid RSA PEM key")?;
    jsonwebtoken::encode(&header, &claims, &signing_key).context("signing service-account JWT")
}

async fn request_token(key: &ServiceAccountKey, http: &Client) -> Result<CachedToken> {
    let assertion = build_assertion(key, chrono::Utc::now().timestamp())?;
    debug!(token_uri = %key.token_uri, "requesting BigQuery access token");
    let resp = http
        .post(&key.token_uri)
        .form(&[("grant_type", JWT_BEARER_GRANT), ("assertion", assertion.as_str())])
        .send()
        .await
        .context("requesting service-account access token")?;
    let status = resp.status();
    if !status.is_success() {
        let text = resp.text().await.unwrap_or_default();
        return Err(anyhow!(
            "service-account token request failed (status={}): {}",
            status,
            text
        ));
    }
    let token: TokenResponse = resp.json().await?;
    info!(expires_in = token.expires_in, "BigQuery credentials initialised");
    Ok(CachedToken::new(token.access_token, token.expires_in, Instant::now()))
}
