//! Resilient message dispatch.
//!
//! `Dispatcher::send` delivers one message to one destination, retrying
//! transient transport failures with exponential backoff (base ~5s, plus a
//! little jitter so a burst of failed fan-out sends does not retry in
//! lockstep). A permanent failure short-circuits the remaining attempts.
//! The final outcome is only ever logged — dispatch is best-effort and a
//! failed delivery must never take down the caller.

use std::sync::Arc;
use std::time::Duration;

use rand::Rng;
use tokio::time::sleep;

use crate::services::error::SendError;
use crate::services::telegram::ChatTransport;

pub const MAX_ATTEMPTS: u32 = 3;
pub const BASE_DELAY: Duration = Duration::from_secs(5);

/// Terminal result of a dispatch. `Exhausted` covers both a permanent
/// transport rejection and running out of retries.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SendOutcome {
    Delivered { attempts: u32 },
    Exhausted,
}

impl SendOutcome {
    pub fn is_delivered(&self) -> bool {
        matches!(self, SendOutcome::Delivered { .. })
    }
}

pub struct Dispatcher {
    transport: Arc<dyn ChatTransport>,
    max_attempts: u32,
    base_delay: Duration,
}

impl Dispatcher {
    pub fn new(transport: Arc<dyn ChatTransport>) -> Self {
        Self::with_policy(transport, MAX_ATTEMPTS, BASE_DELAY)
    }

    pub fn with_policy(
        transport: Arc<dyn ChatTransport>,
        max_attempts: u32,
        base_delay: Duration,
    ) -> Self {
        Self {
            transport,
            max_attempts,
            base_delay,
        }
    }

    /// Attempt delivery up to `max_attempts` times. Exactly one transport
    /// call per attempt; no queuing beyond the attempt loop.
    pub async fn send(&self, chat_id: i64, text: &str) -> SendOutcome {
        for attempt in 0..self.max_attempts {
            match self.transport.send_message(chat_id, text).await {
                Ok(()) => {
                    return SendOutcome::Delivered {
                        attempts: attempt + 1,
                    }
                }
                Err(SendError::Permanent(reason)) => {
                    tracing::error!(chat_id, %reason, "Permanent send failure, not retrying");
                    return SendOutcome::Exhausted;
                }
                Err(SendError::Transient(reason)) => {
                    tracing::warn!(
                        chat_id,
                        attempt = attempt + 1,
                        %reason,
                        "Transient send failure"
                    );
                    if attempt + 1 < self.max_attempts {
                        sleep(self.backoff_delay(attempt)).await;
                    }
                }
            }
        }

        tracing::error!(
            chat_id,
            attempts = self.max_attempts,
            "Message delivery exhausted all attempts"
        );
        SendOutcome::Exhausted
    }

    /// `base * 2^attempt` plus up to one second of jitter.
    fn backoff_delay(&self, attempt: u32) -> Duration {
        let jitter = rand::thread_rng().gen_range(0..1000);
        self.base_delay * 2u32.saturating_pow(attempt) + Duration::from_millis(jitter)
    }
}
