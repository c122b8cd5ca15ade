//! Geocoding fact provider.
//!
//! Maps a free-text location name to its administrative region via the
//! OpenWeatherMap direct-geocoding endpoint. Only the first result is used.
//! The region resolver consumes this behind `GeocodingProvider` and persists
//! successful lookups so each location is geocoded at most once.

use async_trait::async_trait;
use serde::Deserialize;

use crate::services::error::FetchError;
use crate::services::http_client;

/// A geocoded place. `region` carries the administrative subdivision when
/// the provider knows one.
#[derive(Debug, Clone)]
pub struct GeocodedPlace {
    pub name: String,
    pub region: Option<String>,
}

#[async_trait]
pub trait GeocodingProvider: Send + Sync {
    /// `Ok(None)` means the provider had no match for the name.
    async fn lookup(&self, location: &str) -> Result<Option<GeocodedPlace>, FetchError>;
}

#[derive(Debug, Deserialize)]
struct GeoRow {
    name: String,
    state: Option<String>,
}

#[derive(Clone)]
pub struct GeocodingClient {
    base_url: String,
    api_key: String,
    http: reqwest::Client,
}

impl GeocodingClient {
    pub fn new(api_key: String) -> Self {
        Self::with_base_url("https://api.openweathermap.org".to_string(), api_key)
    }

    pub fn with_base_url(base_url: String, api_key: String) -> Self {
        Self {
            base_url,
            api_key,
            http: http_client(),
        }
    }
}

#[async_trait]
impl GeocodingProvider for GeocodingClient {
    async fn lookup(&self, location: &str) -> Result<Option<GeocodedPlace>, FetchError> {
        let url = format!("{}/geo/1.0/direct", self.base_url);

        let response = self
            .http
            .get(&url)
            .query(&[("q", location), ("limit", "1"), ("appid", &self.api_key)])
            .send()
            .await
            .map_err(|err| FetchError::Transport(err.to_string()))?;

        match response.status() {
            status if status.is_success() => {
                let rows = response
                    .json::<Vec<GeoRow>>()
                    .await
                    .map_err(|err| FetchError::Malformed(err.to_string()))?;

                Ok(rows.into_iter().next().map(|row| GeocodedPlace {
                    name: row.name,
                    region: row.state,
                }))
            }
            reqwest::StatusCode::TOO_MANY_REQUESTS => Err(FetchError::RateLimited),
            status => Err(FetchError::Transport(format!(
                "geocoding provider returned HTTP {}",
                status
            ))),
        }
    }
}
