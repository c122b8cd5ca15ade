//! Hazard feed provider.
//!
//! One periodic full-feed fetch returns the currently active alert
//! categories per region. The data is safety-critical: it is never cached,
//! and a failed fetch propagates as an error — it must never be read as
//! "all clear".

use std::collections::HashSet;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::services::error::FetchError;
use crate::services::http_client;

/// Alert category taxonomy carried by the feed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum AlertType {
    AirRaid,
    Artillery,
    UrbanCombat,
    Missile,
    Nuclear,
    Chemical,
    Other,
}

impl AlertType {
    /// Map a feed wire label onto the taxonomy. Unknown labels collapse to
    /// `Other` rather than failing the whole region entry.
    pub fn from_wire(label: &str) -> Self {
        match label {
            "AIR" => AlertType::AirRaid,
            "ARTILLERY" => AlertType::Artillery,
            "URBAN_FIGHTS" => AlertType::UrbanCombat,
            "MISSILE" => AlertType::Missile,
            "NUCLEAR" => AlertType::Nuclear,
            "CHEMICAL" => AlertType::Chemical,
            _ => AlertType::Other,
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            AlertType::AirRaid => "air-raid",
            AlertType::Artillery => "artillery",
            AlertType::UrbanCombat => "urban combat",
            AlertType::Missile => "missile",
            AlertType::Nuclear => "nuclear",
            AlertType::Chemical => "chemical",
            AlertType::Other => "hazard",
        }
    }
}

/// Active alert state for one region, as of the latest poll.
#[derive(Debug, Clone)]
pub struct RegionAlertState {
    pub region: String,
    pub alerts: HashSet<AlertType>,
}

impl RegionAlertState {
    pub fn is_active(&self) -> bool {
        !self.alerts.is_empty()
    }
}

#[async_trait]
pub trait HazardFeedProvider: Send + Sync {
    /// Fetch the full feed. Every region the feed knows appears exactly
    /// once; regions without active alerts carry an empty set.
    async fn active_alerts(&self) -> Result<Vec<RegionAlertState>, FetchError>;
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct FeedRegion {
    region_name: String,
    #[serde(default)]
    active_alerts: Vec<FeedAlert>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct FeedAlert {
    #[serde(rename = "type")]
    alert_type: String,
}

#[derive(Clone)]
pub struct HazardFeedClient {
    base_url: String,
    api_key: String,
    http: reqwest::Client,
}

impl HazardFeedClient {
    pub fn new(api_key: String) -> Self {
        Self::with_base_url("https://api.ukrainealarm.com".to_string(), api_key)
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
impl HazardFeedProvider for HazardFeedClient {
    async fn active_alerts(&self) -> Result<Vec<RegionAlertState>, FetchError> {
        let url = format!("{}/api/v3/alerts", self.base_url);

        let response = self
            .http
            .get(&url)
            .header("Authorization", &self.api_key)
            .send()
            .await
            .map_err(|err| FetchError::Transport(err.to_string()))?;

        match response.status() {
            status if status.is_success() => {
                let rows = response
                    .json::<Vec<FeedRegion>>()
                    .await
                    .map_err(|err| FetchError::Malformed(err.to_string()))?;

                Ok(rows
                    .into_iter()
                    .map(|row| RegionAlertState {
                        region: row.region_name,
                        alerts: row
                            .active_alerts
                            .iter()
                            .map(|a| AlertType::from_wire(&a.alert_type))
                            .collect(),
                    })
                    .collect())
            }
            reqwest::StatusCode::TOO_MANY_REQUESTS => Err(FetchError::RateLimited),
            status => Err(FetchError::Transport(format!(
                "hazard feed returned HTTP {}",
                status
            ))),
        }
    }
}
