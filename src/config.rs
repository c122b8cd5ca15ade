use std::env;

use crate::cli::Cli;

/// Runtime configuration, sourced from the environment with CLI overrides.
///
/// The four service credentials are required; the process refuses to start
/// without them. Everything else has a default matching the cadence the
/// subscribers were promised ("next update in 2 hours", morning forecast
/// at 08:00, hazard poll every 5 minutes).
#[derive(Debug, Clone)]
pub struct Config {
    pub telegram_token: String,
    pub weather_api_key: String,
    pub alerts_api_key: String,
    pub currency_api_key: String,

    pub database_url: String,
    pub weather_interval_seconds: u64,
    pub hazard_poll_seconds: u64,
    pub scheduler_tick_seconds: u64,
    pub weather_cache_ttl_seconds: u64,
    pub daily_forecast_hour: u32,
    pub onboarding_delay_seconds: u64,
}

impl Config {
    pub fn from_env() -> Result<Self, String> {
        let telegram_token =
            env::var("TELEGRAM_TOKEN").map_err(|_| "TELEGRAM_TOKEN is required")?;
        let weather_api_key =
            env::var("WEATHER_API_KEY").map_err(|_| "WEATHER_API_KEY is required")?;
        let alerts_api_key =
            env::var("ALERTS_API_KEY").map_err(|_| "ALERTS_API_KEY is required")?;
        let currency_api_key =
            env::var("CURRENCY_API_KEY").map_err(|_| "CURRENCY_API_KEY is required")?;

        Ok(Self {
            telegram_token,
            weather_api_key,
            alerts_api_key,
            currency_api_key,
            database_url: env::var("DATABASE_URL")
                .unwrap_or_else(|_| "sqlite://skywatch.db".to_string()),
            weather_interval_seconds: env_u64("WEATHER_INTERVAL_SECONDS", 7200)?,
            hazard_poll_seconds: env_u64("HAZARD_POLL_SECONDS", 300)?,
            scheduler_tick_seconds: env_u64("SCHEDULER_TICK_SECONDS", 5)?,
            weather_cache_ttl_seconds: env_u64("WEATHER_CACHE_TTL_SECONDS", 600)?,
            daily_forecast_hour: env_u64("DAILY_FORECAST_HOUR", 8)? as u32,
            onboarding_delay_seconds: env_u64("ONBOARDING_DELAY_SECONDS", 300)?,
        })
    }

    /// Apply CLI flags on top of the environment-derived config.
    pub fn apply_cli(&mut self, cli: &Cli) {
        if let Some(url) = &cli.database_url {
            self.database_url = url.clone();
        }
        if let Some(interval) = cli.weather_interval {
            self.weather_interval_seconds = interval;
        }
        if let Some(interval) = cli.hazard_poll_interval {
            self.hazard_poll_seconds = interval;
        }
    }
}

fn env_u64(name: &str, default: u64) -> Result<u64, String> {
    match env::var(name) {
        Ok(raw) => raw
            .parse::<u64>()
            .map_err(|_| format!("{} must be a valid number", name)),
        Err(_) => Ok(default),
    }
}
