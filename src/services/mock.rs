//! Scripted fakes for the external services.
//!
//! Used by the unit tests and the integration scenarios in `tests/`. Each
//! mock records how often it was called so tests can assert call budgets
//! (e.g. resolver idempotence, dispatcher attempt counts).

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;

use async_trait::async_trait;

use crate::services::alerts::{HazardFeedProvider, RegionAlertState};
use crate::services::currency::CurrencyProvider;
use crate::services::error::{FetchError, SendError};
use crate::services::geocoding::{GeocodedPlace, GeocodingProvider};
use crate::services::telegram::ChatTransport;
use crate::services::weather::{WeatherPayload, WeatherProvider};

fn replay_fetch(err: &FetchError) -> FetchError {
    match err {
        FetchError::NotFound => FetchError::NotFound,
        FetchError::RateLimited => FetchError::RateLimited,
        FetchError::Transport(msg) => FetchError::Transport(msg.clone()),
        FetchError::Malformed(msg) => FetchError::Malformed(msg.clone()),
    }
}

// ---- Chat transport ---------------------------------------------------------

/// Transport fake: pops one scripted outcome per send attempt; once the
/// script is exhausted every attempt succeeds.
#[derive(Default)]
pub struct MockTransport {
    script: Mutex<VecDeque<Result<(), SendError>>>,
    sent: Mutex<Vec<(i64, String)>>,
    attempts: AtomicUsize,
}

impl MockTransport {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fail the first `n` attempts with a transient error.
    pub fn with_transient_failures(self, n: usize) -> Self {
        {
            let mut script = self.script.lock().unwrap();
            for _ in 0..n {
                script.push_back(Err(SendError::Transient("scripted failure".to_string())));
            }
        }
        self
    }

    /// Fail the next attempt with a permanent error.
    pub fn with_permanent_failure(self) -> Self {
        self.script
            .lock()
            .unwrap()
            .push_back(Err(SendError::Permanent("scripted failure".to_string())));
        self
    }

    /// Total transport attempts observed (including failed ones).
    pub fn attempts(&self) -> usize {
        self.attempts.load(Ordering::SeqCst)
    }

    /// Successfully delivered messages, in order.
    pub fn sent(&self) -> Vec<(i64, String)> {
        self.sent.lock().unwrap().clone()
    }
}

#[async_trait]
impl ChatTransport for MockTransport {
    async fn send_message(&self, chat_id: i64, text: &str) -> Result<(), SendError> {
        self.attempts.fetch_add(1, Ordering::SeqCst);
        if let Some(outcome) = self.script.lock().unwrap().pop_front() {
            outcome?;
        }
        self.sent.lock().unwrap().push((chat_id, text.to_string()));
        Ok(())
    }
}

// ---- Weather ----------------------------------------------------------------

#[derive(Default)]
pub struct MockWeatherProvider {
    payload: Mutex<Option<WeatherPayload>>,
    error: Mutex<Option<FetchError>>,
    calls: AtomicUsize,
}

impl MockWeatherProvider {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_payload(self, payload: WeatherPayload) -> Self {
        *self.payload.lock().unwrap() = Some(payload);
        self
    }

    pub fn with_error(self, error: FetchError) -> Self {
        *self.error.lock().unwrap() = Some(error);
        self
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl WeatherProvider for MockWeatherProvider {
    async fn fetch(&self, _location: &str) -> Result<WeatherPayload, FetchError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if let Some(err) = self.error.lock().unwrap().as_ref() {
            return Err(replay_fetch(err));
        }
        self.payload
            .lock()
            .unwrap()
            .clone()
            .ok_or(FetchError::NotFound)
    }
}

// ---- Geocoding --------------------------------------------------------------

#[derive(Default)]
pub struct MockGeocoder {
    places: Mutex<HashMap<String, GeocodedPlace>>,
    fail: Mutex<bool>,
    calls: AtomicUsize,
}

impl MockGeocoder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_place(self, location: &str, region: Option<&str>) -> Self {
        self.places.lock().unwrap().insert(
            location.trim().to_lowercase(),
            GeocodedPlace {
                name: location.trim().to_string(),
                region: region.map(str::to_string),
            },
        );
        self
    }

    pub fn failing(self) -> Self {
        *self.fail.lock().unwrap() = true;
        self
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl GeocodingProvider for MockGeocoder {
    async fn lookup(&self, location: &str) -> Result<Option<GeocodedPlace>, FetchError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if *self.fail.lock().unwrap() {
            return Err(FetchError::Transport("scripted failure".to_string()));
        }
        Ok(self
            .places
            .lock()
            .unwrap()
            .get(&location.trim().to_lowercase())
            .cloned())
    }
}

// ---- Hazard feed ------------------------------------------------------------

/// Feed fake scripted per poll cycle: each `active_alerts` call pops the
/// next scripted cycle; once the script runs out the feed reports no
/// regions at all.
#[derive(Default)]
pub struct MockHazardFeed {
    cycles: Mutex<VecDeque<Result<Vec<RegionAlertState>, FetchError>>>,
    calls: AtomicUsize,
}

impl MockHazardFeed {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_cycle(self, states: Vec<RegionAlertState>) -> Self {
        self.cycles.lock().unwrap().push_back(Ok(states));
        self
    }

    pub fn with_failed_cycle(self) -> Self {
        self.cycles
            .lock()
            .unwrap()
            .push_back(Err(FetchError::Transport("scripted failure".to_string())));
        self
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl HazardFeedProvider for MockHazardFeed {
    async fn active_alerts(&self) -> Result<Vec<RegionAlertState>, FetchError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.cycles
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| Ok(Vec::new()))
    }
}

// ---- Currency ---------------------------------------------------------------

pub struct MockCurrencyProvider {
    summary: String,
}

impl MockCurrencyProvider {
    pub fn new(summary: &str) -> Self {
        Self {
            summary: summary.to_string(),
        }
    }
}

#[async_trait]
impl CurrencyProvider for MockCurrencyProvider {
    async fn rates_summary(&self) -> Result<String, FetchError> {
        Ok(self.summary.clone())
    }
}
