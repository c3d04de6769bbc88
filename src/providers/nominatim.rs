//! City geocoding against an OpenStreetMap Nominatim instance.
//!
//! Resolved coordinates are cached by city name. The public instance allows at
//! most one request per second, so [`Geocoder`] sleeps after every network
//! resolution (never after a cache hit).
use std::path::Path;
use std::time::Duration;

use anyhow::{Context, Result};
use reqwest::{Client, StatusCode};
use serde::Deserialize;
use tracing::{debug, error, info, warn};

use crate::util::cache::JsonFileCache;
use crate::util::http::{build_client, USER_AGENT};

pub const DEFAULT_BASE_URL: &str = "https://nominatim.openstreetmap.org";

/// `(latitude, longitude)`, stored as a two-element JSON array in the cache.
pub type Coordinates = (f64, f64);

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum GeocodeOutcome {
    Cached(Coordinates),
    Resolved(Coordinates),
    /// The service answered but knows no such place.
    NotFound,
    /// Every attempt failed (rate limited or errored).
    Failed,
}

impl GeocodeOutcome {
    pub fn coordinates(&self) -> Option<Coordinates> {
        match self {
            GeocodeOutcome::Cached(c) | GeocodeOutcome::Resolved(c) => Some(*c),
            GeocodeOutcome::NotFound | GeocodeOutcome::Failed => None,
        }
    }
}

#[derive(Debug, Deserialize)]
struct Place {
    lat: String,
    lon: String,
}

#[derive(Debug, Clone)]
pub struct NominatimClient {
    base_url: String,
    http: Client,
    max_attempts: u32,
    initial_backoff: Duration,
}

impl NominatimClient {
    pub fn new(base_url: Option<&str>, timeout_secs: u64) -> Result<Self> {
        Ok(Self {
            base_url: base_url
                .unwrap_or(DEFAULT_BASE_URL)
                .trim_end_matches('/')
                .to_string(),
            http: build_client(USER_AGENT, timeout_secs)?,
            max_attempts: 5,
            initial_backoff: Duration::from_secs(1),
        })
    }

    pub fn with_backoff(mut self, max_attempts: u32, initial: Duration) -> Self {
        self.max_attempts = max_attempts.max(1);
        self.initial_backoff = initial;
        self
    }

    /// Look one city up over the network, backing off (doubling from the
    /// initial delay) on rate limits and errors.
    pub async fn lookup(&self, city: &str, country: &str) -> GeocodeOutcome {
        let url = format!("{}/search", self.base_url);
        let q = format!("{city},{country}");
        let mut backoff = self.initial_backoff;
        for attempt in 1..=self.max_attempts {
            debug!(%city, attempt, max = self.max_attempts, "geocoding");
            let resp = self
                .http
                .get(&url)
                .query(&[("q", q.as_str()), ("format", "json"), ("limit", "1")])
                .send()
                .await;
            match resp {
                Ok(resp) if resp.status().is_success() => {
                    match resp.json::<Vec<Place>>().await {
                        Ok(places) => {
                            // an empty result is final, it is not retried like a 429
                            let Some(place) = places.into_iter().next() else {
                                warn!(%city, "no geocoding result");
                                return GeocodeOutcome::NotFound;
                            };
                            match (place.lat.parse::<f64>(), place.lon.parse::<f64>()) {
                                (Ok(lat), Ok(lon)) => {
                                    info!(%city, lat, lon, "resolved coordinates");
                                    return GeocodeOutcome::Resolved((lat, lon));
                                }
                                _ => {
                                    error!(%city, lat = %place.lat, lon = %place.lon, "unparsable coordinates");
                                    return GeocodeOutcome::NotFound;
                                }
                            }
                        }
                        Err(err) => error!(%city, %err, "undecodable geocoding response"),
                    }
                }
                Ok(resp) if resp.status() == StatusCode::TOO_MANY_REQUESTS => {
                    warn!(%city, wait_ms = backoff.as_millis() as u64, "rate limited, backing off");
                }
                Ok(resp) => {
                    error!(%city, status = resp.status().as_u16(), "geocoding failed, retrying");
                }
                Err(err) => {
                    error!(%city, %err, "geocoding request failed, retrying");
                }
            }
            if attempt < self.max_attempts {
                tokio::time::sleep(backoff).await;
                backoff *= 2;
            }
        }
        error!(%city, attempts = self.max_attempts, "giving up on city");
        GeocodeOutcome::Failed
    }
}

/// Cache-first geocoder with a fixed pause after each network resolution.
pub struct Geocoder {
    client: NominatimClient,
    cache: JsonFileCache<Coordinates>,
    pause: Duration,
    network_calls: usize,
}

impl Geocoder {
    pub fn new(client: NominatimClient, cache: JsonFileCache<Coordinates>) -> Self {
        Self {
            client,
            cache,
            pause: Duration::from_secs(1),
            network_calls: 0,
        }
    }

    pub fn with_pause(mut self, pause: Duration) -> Self {
        self.pause = pause;
        self
    }

    pub fn open(client: NominatimClient, cache_path: &Path, max_entries: Option<usize>) -> Result<Self> {
        let cache = JsonFileCache::load(cache_path, max_entries)
            .with_context(|| format!("loading geocode cache {}", cache_path.display()))?;
        Ok(Self::new(client, cache))
    }

    pub async fn resolve(&mut self, city: &str, country: &str) -> GeocodeOutcome {
        if let Some(coords) = self.cache.get(city) {
            debug!(%city, "using cached coordinates");
            return GeocodeOutcome::Cached(*coords);
        }
        let outcome = self.client.lookup(city, country).await;
        self.network_calls += 1;
        if let GeocodeOutcome::Resolved(coords) = outcome {
            self.cache.insert(city.to_string(), coords);
        }
        tokio::time::sleep(self.pause).await;
        outcome
    }

    /// Cities resolved over the network (not from cache) so far.
    pub fn network_calls(&self) -> usize {
        self.network_calls
    }

    pub fn save(&self) -> Result<()> {
        self.cache.save()
    }
}
