//! External fact providers and the chat transport.
//!
//! Each service is a thin reqwest client behind a trait so the engine and
//! the tests can swap in fakes. Every request carries a fixed timeout;
//! timeout expiry is treated exactly like any other transport error.

pub mod alerts;
pub mod currency;
pub mod error;
pub mod geocoding;
pub mod mock;
pub mod telegram;
pub mod weather;

use std::time::Duration;

/// Timeout applied to every outbound HTTP call.
pub const REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

/// Shared reqwest client with the standard timeout applied.
pub(crate) fn http_client() -> reqwest::Client {
    reqwest::Client::builder()
        .timeout(REQUEST_TIMEOUT)
        .build()
        .unwrap_or_else(|_| reqwest::Client::new())
}
