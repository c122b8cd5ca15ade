//! Error taxonomy for the external services.

use thiserror::Error;

/// Classified outcome of a provider fetch.
///
/// `NotFound` and `RateLimited` are surfaced to the user verbatim and never
/// retried; `Transport` covers timeouts and connection failures; `Malformed`
/// covers payloads the provider returned but we could not use.
#[derive(Error, Debug)]
pub enum FetchError {
    #[error("location not known to the provider")]
    NotFound,

    #[error("provider rate limit exceeded")]
    RateLimited,

    #[error("transport error: {0}")]
    Transport(String),

    #[error("malformed payload: {0}")]
    Malformed(String),
}

impl FetchError {
    /// Short user-facing message. Raw errors never reach the chat.
    pub fn user_message(&self) -> &'static str {
        match self {
            FetchError::NotFound => "Location not found. Please check the spelling and try again.",
            FetchError::RateLimited => "The service is busy right now. Please try again later.",
            FetchError::Transport(_) | FetchError::Malformed(_) => {
                "Something went wrong while fetching the data. Please try again later."
            }
        }
    }
}

/// Classified outcome of a chat transport send attempt.
///
/// The dispatcher retries `Transient` failures with backoff and gives up
/// immediately on `Permanent` ones (e.g. the destination chat is gone).
#[derive(Error, Debug)]
pub enum SendError {
    #[error("transient transport failure: {0}")]
    Transient(String),

    #[error("permanent transport failure: {0}")]
    Permanent(String),
}
