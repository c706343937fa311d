//! [Nominatim](https://nominatim.org/) search client – the production
//! [`LocationLookup`].
//!
//! The public OpenStreetMap instance requires an identifying User-Agent and
//! allows roughly one request per second; the general-token stage of the
//! extraction pipeline paces itself with `GEOCODE_DELAY_MS` for that reason.

use std::time::Duration;

use anyhow::{Context, Result};
use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use tracing::debug;

use super::{Candidate, LocationLookup, LookupError};

const DEFAULT_ENDPOINT: &str = "https://nominatim.openstreetmap.org/search";
const DEFAULT_LANGUAGE: &str = "uk,en";
const DEFAULT_USER_AGENT: &str = concat!("tg_geomapper/", env!("CARGO_PKG_VERSION"));

#[derive(Deserialize)]
struct Place {
    #[serde(default)]
    display_name: String,
    #[serde(default)]
    lat: String,
    #[serde(default)]
    lon: String,
}

pub struct NominatimLookup {
    client: Client,
    endpoint: String,
    language: String,
    timeout: Duration,
}

impl NominatimLookup {
    /// Build from environment variables.
    ///
    /// | Env var               | Default                                      | Description                  |
    /// |-----------------------|----------------------------------------------|------------------------------|
    /// | `GEOCODER_ENDPOINT`   | `https://nominatim.openstreetmap.org/search` | Search endpoint              |
    /// | `GEOCODER_LANGUAGE`   | `uk,en`                                      | `accept-language` parameter  |
    /// | `GEOCODER_USER_AGENT` | `tg_geomapper/<version>`                     | Identifying User-Agent       |
    /// | `GEOCODER_TIMEOUT_MS` | `5000`                                       | Per-request timeout in ms    |
    pub fn from_env() -> Result<Self> {
        let endpoint =
            std::env::var("GEOCODER_ENDPOINT").unwrap_or_else(|_| DEFAULT_ENDPOINT.into());
        let language =
            std::env::var("GEOCODER_LANGUAGE").unwrap_or_else(|_| DEFAULT_LANGUAGE.into());
        let user_agent =
            std::env::var("GEOCODER_USER_AGENT").unwrap_or_else(|_| DEFAULT_USER_AGENT.into());
        let timeout_ms: u64 = std::env::var("GEOCODER_TIMEOUT_MS")
            .ok()
            .and_then(|v| v.parse().ok())
            .unwrap_or(5000);

        let client = Client::builder()
            .user_agent(user_agent)
            .build()
            .context("failed to build geocoder HTTP client")?;

        Ok(Self {
            client,
            endpoint,
            language,
            timeout: Duration::from_millis(timeout_ms),
        })
    }
}

#[async_trait]
impl LocationLookup for NominatimLookup {
    async fn lookup(&self, query: &str, limit: usize) -> Result<Vec<Candidate>, LookupError> {
        let limit = limit.to_string();
        let resp = self
            .client
            .get(&self.endpoint)
            .query(&[
                ("q", query),
                ("format", "json"),
                ("limit", limit.as_str()),
                ("accept-language", self.language.as_str()),
            ])
            .timeout(self.timeout)
            .send()
            .await?;

        if !resp.status().is_success() {
            return Err(LookupError::Unavailable(format!(
                "HTTP {} for {query:?}",
                resp.status()
            )));
        }

        let places: Vec<Place> = resp.json().await?;
        debug!("Nominatim returned {} place(s) for {query:?}", places.len());

        Ok(places
            .into_iter()
            .map(|p| Candidate {
                display_name: p.display_name,
                lat: p.lat,
                lon: p.lon,
            })
            .collect())
    }
}

impl std::fmt::Display for NominatimLookup {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "NominatimLookup(endpoint={}, language={}, timeout={}ms)",
            self.endpoint,
            self.language,
            self.timeout.as_millis(),
        )
    }
}
