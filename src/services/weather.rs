//! Weather fact provider.
//!
//! Wraps the OpenWeatherMap current-weather endpoint. `WeatherService` is
//! what the engine talks to: it consults the expiring cache first, issues at
//! most one bounded-timeout fetch on a miss, classifies the response into
//! the `FetchError` taxonomy, and caches the *formatted* report for the
//! configured TTL. Error responses are never cached.

use std::sync::Arc;

use async_trait::async_trait;
use serde::Deserialize;
use tokio::sync::Mutex;

use crate::cache::ExpiringCache;
use crate::services::error::FetchError;
use crate::services::http_client;

/// Raw current-weather payload. Optional readings stay `Option` so a
/// partial payload renders placeholders instead of failing the whole fact.
#[derive(Debug, Clone, Deserialize)]
pub struct WeatherPayload {
    pub weather: Vec<WeatherCondition>,
    pub main: MainReadings,
    pub wind: Option<WindReadings>,
    pub sys: Option<SunTimes>,
    /// UTC offset of the location, in seconds.
    pub timezone: Option<i32>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct WeatherCondition {
    pub description: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct MainReadings {
    pub temp: f64,
    pub feels_like: f64,
    pub humidity: Option<f64>,
    pub pressure: Option<f64>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct WindReadings {
    pub speed: Option<f64>,
    /// Bearing in degrees, 0 = north.
    pub deg: Option<f64>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SunTimes {
    pub sunrise: Option<i64>,
    pub sunset: Option<i64>,
}

/// Trait for weather data sources, so tests can script payloads.
#[async_trait]
pub trait WeatherProvider: Send + Sync {
    async fn fetch(&self, location: &str) -> Result<WeatherPayload, FetchError>;
}

/// OpenWeatherMap client.
#[derive(Clone)]
pub struct WeatherClient {
    base_url: String,
    api_key: String,
    http: reqwest::Client,
}

impl WeatherClient {
    pub fn new(api_key: String) -> Self {
        Self::with_base_url("https://api.openweathermap.org".to_string(), api_key)
    }

    /// Test seam: point the client at a stub server.
    pub fn with_base_url(base_url: String, api_key: String) -> Self {
        Self {
            base_url,
            api_key,
            http: http_client(),
        }
    }
}

#[async_trait]
impl WeatherProvider for WeatherClient {
    async fn fetch(&self, location: &str) -> Result<WeatherPayload, FetchError> {
        let url = format!("{}/data/2.5/weather", self.base_url);

        let response = self
            .http
            .get(&url)
            .query(&[
                ("q", location),
                ("appid", &self.api_key),
                ("units", "metric"),
            ])
            .send()
            .await
            .map_err(|err| FetchError::Transport(err.to_string()))?;

        match response.status() {
            status if status.is_success() => response
                .json::<WeatherPayload>()
                .await
                .map_err(|err| FetchError::Malformed(err.to_string())),
            reqwest::StatusCode::NOT_FOUND => Err(FetchError::NotFound),
            reqwest::StatusCode::TOO_MANY_REQUESTS => Err(FetchError::RateLimited),
            status => Err(FetchError::Transport(format!(
                "weather provider returned HTTP {}",
                status
            ))),
        }
    }
}

/// A formatted weather fact, ready for dispatch.
#[derive(Debug, Clone)]
pub struct WeatherReport {
    pub text: String,
    pub tz_offset_secs: i32,
}

/// Cache-fronted weather facade.
pub struct WeatherService {
    provider: Arc<dyn WeatherProvider>,
    cache: Arc<Mutex<ExpiringCache<String, WeatherReport>>>,
}

impl WeatherService {
    pub fn new(
        provider: Arc<dyn WeatherProvider>,
        cache: Arc<Mutex<ExpiringCache<String, WeatherReport>>>,
    ) -> Self {
        Self { provider, cache }
    }

    /// Formatted weather report for `location`, cache first.
    pub async fn report(&self, location: &str) -> Result<WeatherReport, FetchError> {
        let location = location.trim();
        if location.is_empty() {
            return Err(FetchError::NotFound);
        }

        let key = location.to_lowercase();
        if let Some(report) = self.cache.lock().await.get(&key) {
            return Ok(report);
        }

        let payload = self.provider.fetch(location).await?;
        let report = WeatherReport {
            text: format_report(location, &payload),
            tz_offset_secs: payload.timezone.unwrap_or(0),
        };

        self.cache.lock().await.put(key, report.clone());
        Ok(report)
    }
}

const NOT_AVAILABLE: &str = "n/a";

/// Render the raw payload into the display string. Pure, so the formatted
/// result is what gets cached.
pub fn format_report(location: &str, payload: &WeatherPayload) -> String {
    let description = payload
        .weather
        .first()
        .map(|c| c.description.as_str())
        .unwrap_or(NOT_AVAILABLE);
    let emoji = weather_emoji(description);

    let humidity = payload
        .main
        .humidity
        .map(|h| format!("{:.0}%", h))
        .unwrap_or_else(|| NOT_AVAILABLE.to_string());
    let pressure = payload
        .main
        .pressure
        .map(|p| format!("{:.0} hPa", p))
        .unwrap_or_else(|| NOT_AVAILABLE.to_string());

    let wind = match &payload.wind {
        Some(w) => {
            let speed = w
                .speed
                .map(|s| format!("{:.1} m/s", s))
                .unwrap_or_else(|| NOT_AVAILABLE.to_string());
            match w.deg {
                Some(deg) => format!("{} {}", speed, compass_label(deg)),
                None => speed,
            }
        }
        None => NOT_AVAILABLE.to_string(),
    };

    let tz_offset = payload.timezone.unwrap_or(0);
    let sunrise = sun_clock(payload.sys.as_ref().and_then(|s| s.sunrise), tz_offset);
    let sunset = sun_clock(payload.sys.as_ref().and_then(|s| s.sunset), tz_offset);

    format!(
        "Weather in {location}:\n\
         {description} {emoji}\n\
         Temperature: {temp:.1}°C 🌡️\n\
         Feels like: {feels:.1}°C\n\
         Humidity: {humidity} 💧\n\
         Pressure: {pressure} 🌬️\n\
         Wind: {wind}\n\
         Sunrise: {sunrise} / Sunset: {sunset}",
        location = location,
        description = description,
        emoji = emoji,
        temp = payload.main.temp,
        feels = payload.main.feels_like,
        humidity = humidity,
        pressure = pressure,
        wind = wind,
        sunrise = sunrise,
        sunset = sunset,
    )
}

/// 16-point compass label for a wind bearing in degrees.
pub fn compass_label(degrees: f64) -> &'static str {
    const POINTS: [&str; 16] = [
        "N", "NNE", "NE", "ENE", "E", "ESE", "SE", "SSE", "S", "SSW", "SW", "WSW", "W", "WNW",
        "NW", "NNW",
    ];
    let normalized = degrees.rem_euclid(360.0);
    let index = ((normalized / 22.5) + 0.5) as usize % 16;
    POINTS[index]
}

/// Epoch seconds + UTC offset → local "HH:MM".
fn sun_clock(epoch: Option<i64>, tz_offset_secs: i32) -> String {
    use chrono::{DateTime, FixedOffset};

    let Some(epoch) = epoch else {
        return NOT_AVAILABLE.to_string();
    };
    let Some(offset) = FixedOffset::east_opt(tz_offset_secs) else {
        return NOT_AVAILABLE.to_string();
    };
    match DateTime::from_timestamp(epoch, 0) {
        Some(utc) => utc.with_timezone(&offset).format("%H:%M").to_string(),
        None => NOT_AVAILABLE.to_string(),
    }
}

fn weather_emoji(description: &str) -> &'static str {
    const EMOJIS: [(&str, &str); 9] = [
        ("thunderstorm", "⛈"),
        ("drizzle", "🌧"),
        ("rain", "🌧"),
        ("snow", "❄️"),
        ("mist", "🌫"),
        ("fog", "🌫"),
        ("clear", "☀️"),
        ("few clouds", "🌤"),
        ("clouds", "☁️"),
    ];
    for (needle, emoji) in EMOJIS {
        if description.contains(needle) {
            return emoji;
        }
    }
    ""
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    use wiremock::matchers::{method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    use crate::services::mock::MockWeatherProvider;

    fn payload_json() -> serde_json::Value {
        serde_json::json!({
            "weather": [{"description": "clear sky"}],
            "main": {"temp": 20.3, "feels_like": 19.1, "humidity": 40.0, "pressure": 1015.0},
            "wind": {"speed": 3.2, "deg": 90.0},
            "sys": {"sunrise": 1_700_000_000i64, "sunset": 1_700_040_000i64},
            "timezone": 7200
        })
    }

    fn sample_payload() -> WeatherPayload {
        serde_json::from_value(payload_json()).unwrap()
    }

    fn make_cache() -> Arc<Mutex<ExpiringCache<String, WeatherReport>>> {
        Arc::new(Mutex::new(ExpiringCache::new(16, Duration::from_secs(600))))
    }

    // ---- formatting ----

    #[test]
    fn format_report_renders_all_fields() {
        let text = format_report("Kyiv", &sample_payload());
        assert!(text.starts_with("Weather in Kyiv:"));
        assert!(text.contains("clear sky ☀️"));
        assert!(text.contains("Temperature: 20.3°C"));
        assert!(text.contains("Feels like: 19.1°C"));
        assert!(text.contains("Humidity: 40%"));
        assert!(text.contains("Pressure: 1015 hPa"));
        assert!(text.contains("Wind: 3.2 m/s E"));
    }

    #[test]
    fn format_report_renders_placeholders_for_missing_fields() {
        let payload = WeatherPayload {
            weather: vec![],
            main: MainReadings {
                temp: 5.0,
                feels_like: 2.0,
                humidity: None,
                pressure: None,
            },
            wind: None,
            sys: None,
            timezone: None,
        };
        let text = format_report("Kyiv", &payload);
        assert!(text.contains("Humidity: n/a"));
        assert!(text.contains("Pressure: n/a"));
        assert!(text.contains("Wind: n/a"));
        assert!(text.contains("Sunrise: n/a / Sunset: n/a"));
    }

    #[test]
    fn compass_label_covers_the_cardinal_points() {
        assert_eq!(compass_label(0.0), "N");
        assert_eq!(compass_label(90.0), "E");
        assert_eq!(compass_label(180.0), "S");
        assert_eq!(compass_label(270.0), "W");
        assert_eq!(compass_label(359.9), "N");
        assert_eq!(compass_label(22.5), "NNE");
        assert_eq!(compass_label(-90.0), "W");
    }

    #[test]
    fn sun_clock_applies_the_offset() {
        // 1700000000 = 2023-11-14 22:13:20 UTC; +2h = 00:13 local
        assert_eq!(sun_clock(Some(1_700_000_000), 7200), "00:13");
        assert_eq!(sun_clock(None, 7200), "n/a");
    }

    // ---- client classification (wiremock) ----

    #[tokio::test]
    async fn client_parses_successful_response() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/data/2.5/weather"))
            .and(query_param("q", "Kyiv"))
            .respond_with(ResponseTemplate::new(200).set_body_json(payload_json()))
            .mount(&server)
            .await;

        let client = WeatherClient::with_base_url(server.uri(), "key".to_string());
        let payload = client.fetch("Kyiv").await.unwrap();
        assert_eq!(payload.main.temp, 20.3);
        assert_eq!(payload.timezone, Some(7200));
    }

    #[tokio::test]
    async fn client_maps_404_to_not_found() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(404))
            .mount(&server)
            .await;

        let client = WeatherClient::with_base_url(server.uri(), "key".to_string());
        assert!(matches!(
            client.fetch("Nowhere").await,
            Err(FetchError::NotFound)
        ));
    }

    #[tokio::test]
    async fn client_maps_429_to_rate_limited() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(429))
            .mount(&server)
            .await;

        let client = WeatherClient::with_base_url(server.uri(), "key".to_string());
        assert!(matches!(
            client.fetch("Kyiv").await,
            Err(FetchError::RateLimited)
        ));
    }

    #[tokio::test]
    async fn client_maps_5xx_to_transport() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(503))
            .mount(&server)
            .await;

        let client = WeatherClient::with_base_url(server.uri(), "key".to_string());
        assert!(matches!(
            client.fetch("Kyiv").await,
            Err(FetchError::Transport(_))
        ));
    }

    // ---- cache policy ----

    #[tokio::test]
    async fn report_serves_second_request_from_cache() {
        let provider = Arc::new(MockWeatherProvider::new().with_payload(sample_payload()));
        let service = WeatherService::new(provider.clone(), make_cache());

        let first = service.report("Kyiv").await.unwrap();
        let second = service.report("Kyiv").await.unwrap();

        assert_eq!(first.text, second.text);
        assert_eq!(provider.calls(), 1);
    }

    #[tokio::test]
    async fn report_cache_key_ignores_case_and_whitespace() {
        let provider = Arc::new(MockWeatherProvider::new().with_payload(sample_payload()));
        let service = WeatherService::new(provider.clone(), make_cache());

        service.report("Kyiv").await.unwrap();
        service.report("  kyiv ").await.unwrap();

        assert_eq!(provider.calls(), 1);
    }

    #[tokio::test]
    async fn report_does_not_cache_errors() {
        let provider = Arc::new(MockWeatherProvider::new().with_error(FetchError::NotFound));
        let service = WeatherService::new(provider.clone(), make_cache());

        assert!(service.report("Nowhere").await.is_err());
        assert!(service.report("Nowhere").await.is_err());

        // Both requests hit the provider — errors must never populate the cache.
        assert_eq!(provider.calls(), 2);
    }

    #[tokio::test]
    async fn report_rejects_empty_location() {
        let provider = Arc::new(MockWeatherProvider::new().with_payload(sample_payload()));
        let service = WeatherService::new(provider.clone(), make_cache());

        assert!(matches!(
            service.report("   ").await,
            Err(FetchError::NotFound)
        ));
        assert_eq!(provider.calls(), 0);
    }
}
