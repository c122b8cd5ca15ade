//! Currency rates provider.
//!
//! One-shot fetch of the latest exchange rates, rendered as UAH per major
//! currency. Dispatched on user request only; never cached, never scheduled.

use std::collections::HashMap;

use async_trait::async_trait;
use serde::Deserialize;

use crate::services::error::FetchError;
use crate::services::http_client;

#[async_trait]
pub trait CurrencyProvider: Send + Sync {
    /// Formatted UAH rates summary.
    async fn rates_summary(&self) -> Result<String, FetchError>;
}

#[derive(Debug, Deserialize)]
struct RatesPayload {
    rates: HashMap<String, f64>,
}

#[derive(Clone)]
pub struct CurrencyClient {
    base_url: String,
    app_id: String,
    http: reqwest::Client,
}

impl CurrencyClient {
    pub fn new(app_id: String) -> Self {
        Self::with_base_url("https://openexchangerates.org".to_string(), app_id)
    }

    pub fn with_base_url(base_url: String, app_id: String) -> Self {
        Self {
            base_url,
            app_id,
            http: http_client(),
        }
    }
}

#[async_trait]
impl CurrencyProvider for CurrencyClient {
    async fn rates_summary(&self) -> Result<String, FetchError> {
        let url = format!("{}/api/latest.json", self.base_url);

        let response = self
            .http
            .get(&url)
            .query(&[("app_id", &self.app_id)])
            .send()
            .await
            .map_err(|err| FetchError::Transport(err.to_string()))?;

        match response.status() {
            status if status.is_success() => {
                let payload = response
                    .json::<RatesPayload>()
                    .await
                    .map_err(|err| FetchError::Malformed(err.to_string()))?;
                format_rates(&payload.rates)
            }
            reqwest::StatusCode::TOO_MANY_REQUESTS => Err(FetchError::RateLimited),
            status => Err(FetchError::Transport(format!(
                "currency provider returned HTTP {}",
                status
            ))),
        }
    }
}

/// Rates are USD-based; UAH per X is `rates[UAH] / rates[X]`.
fn format_rates(rates: &HashMap<String, f64>) -> Result<String, FetchError> {
    let uah = *rates
        .get("UAH")
        .ok_or_else(|| FetchError::Malformed("UAH rate missing".to_string()))?;

    let mut lines = vec!["Hryvnia (UAH) exchange rates:".to_string()];
    for code in ["USD", "EUR", "GBP", "JPY"] {
        match rates.get(code) {
            Some(rate) if *rate > 0.0 => {
                lines.push(format!("{}: {:.2}", code, uah / rate));
            }
            _ => lines.push(format!("{}: n/a", code)),
        }
    }

    Ok(lines.join("\n"))
}
