//! Notification engine — the per-subscriber state machine.
//!
//! Inbound user events synchronously update the subscription store and may
//! trigger an immediate fetch + dispatch; fired jobs repeat the fetch +
//! dispatch for the job's bound location. All shared structures (cache,
//! resolver, job table) are injected, never ambient, so the whole engine
//! runs against fakes in tests.

use std::sync::Arc;

use chrono::{Duration, Utc};

use crate::dispatch::Dispatcher;
use crate::notify::jobs::{next_daily_fire, Job, JobKind, JobTable};
use crate::repository::{Repository, SubscriberRecord};
use crate::resolver::RegionResolver;
use crate::services::alerts::HazardFeedProvider;
use crate::services::currency::CurrencyProvider;
use crate::services::weather::WeatherService;

const GREETING: &str = "Hi! I can send you weather forecasts, hryvnia exchange rates and \
     air-raid alerts. Just type a location name to get started. 😃";

const NEXT_UPDATE_NOTE: &str = "Next forecast update in 2 hours. 🌦️";

const ONBOARDING_NUDGE: &str = "Heads up: you will get a morning forecast at 08:00 local time. \
     You can also enable air-raid alerts for your region with /alarm.";

/// Inbound user event, already parsed from the chat transport.
#[derive(Debug, Clone)]
pub enum UserEvent {
    Started { user_id: i64, chat_id: i64 },
    LocationSet { user_id: i64, chat_id: i64, location: String },
    HazardToggled { user_id: i64, chat_id: i64 },
    HazardStatusRequested { user_id: i64, chat_id: i64 },
    CurrencyRequested { chat_id: i64 },
    Unsubscribed { user_id: i64, chat_id: i64 },
}

/// Cadence knobs, split out so tests can shrink them.
#[derive(Debug, Clone)]
pub struct EngineTiming {
    pub weather_interval_seconds: i64,
    pub daily_forecast_hour: u32,
    pub onboarding_delay_seconds: i64,
}

impl Default for EngineTiming {
    fn default() -> Self {
        Self {
            weather_interval_seconds: 7200,
            daily_forecast_hour: 8,
            onboarding_delay_seconds: 300,
        }
    }
}

pub struct NotificationEngine {
    repository: Arc<Repository>,
    weather: Arc<WeatherService>,
    currency: Arc<dyn CurrencyProvider>,
    feed: Arc<dyn HazardFeedProvider>,
    resolver: Arc<RegionResolver>,
    dispatcher: Arc<Dispatcher>,
    jobs: Arc<JobTable>,
    timing: EngineTiming,
}

impl NotificationEngine {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        repository: Arc<Repository>,
        weather: Arc<WeatherService>,
        currency: Arc<dyn CurrencyProvider>,
        feed: Arc<dyn HazardFeedProvider>,
        resolver: Arc<RegionResolver>,
        dispatcher: Arc<Dispatcher>,
        jobs: Arc<JobTable>,
        timing: EngineTiming,
    ) -> Self {
        Self {
            repository,
            weather,
            currency,
            feed,
            resolver,
            dispatcher,
            jobs,
            timing,
        }
    }

    pub async fn handle_event(&self, event: UserEvent) {
        match event {
            UserEvent::Started { user_id, chat_id } => self.started(user_id, chat_id).await,
            UserEvent::LocationSet {
                user_id,
                chat_id,
                location,
            } => self.location_set(user_id, chat_id, location).await,
            UserEvent::HazardToggled { user_id, chat_id } => {
                self.hazard_toggled(user_id, chat_id).await
            }
            UserEvent::HazardStatusRequested { user_id, chat_id } => {
                self.hazard_status(user_id, chat_id).await
            }
            UserEvent::CurrencyRequested { chat_id } => self.currency_requested(chat_id).await,
            UserEvent::Unsubscribed { user_id, chat_id } => {
                self.unsubscribed(user_id, chat_id).await
            }
        }
    }

    /// Execute one fired job. Never changes subscriber state except for the
    /// one-shot onboarding flag.
    pub async fn run_job(&self, job: Job) {
        match job.kind {
            JobKind::RecurringInterval | JobKind::DailyAtTime => {
                let Some(location) = job.location else {
                    return;
                };
                self.send_weather(job.chat_id, &location).await;
            }
            JobKind::OneShot => {
                let Some(mut record) = self.load_subscriber(job.user_id).await else {
                    return;
                };
                if record.notified_hazard_onboarding {
                    return;
                }
                self.dispatcher.send(job.chat_id, ONBOARDING_NUDGE).await;
                record.notified_hazard_onboarding = true;
                self.persist(&record).await;
            }
        }
    }

    async fn started(&self, user_id: i64, chat_id: i64) {
        let existing = self.load_subscriber(user_id).await;
        let mut record = existing.unwrap_or_else(|| SubscriberRecord::new(user_id, chat_id));
        record.chat_id = chat_id;
        self.persist(&record).await;

        self.dispatcher.send(chat_id, GREETING).await;
        self.maybe_schedule_onboarding(&record, chat_id);
    }

    async fn location_set(&self, user_id: i64, chat_id: i64, location: String) {
        let existing = self.load_subscriber(user_id).await;
        let mut record = existing.unwrap_or_else(|| SubscriberRecord::new(user_id, chat_id));
        record.chat_id = chat_id;
        record.location = Some(location.clone());

        // Immediate fetch + dispatch before any scheduling.
        match self.weather.report(&location).await {
            Ok(report) => {
                record.tz_offset_secs = report.tz_offset_secs;
                self.dispatcher.send(chat_id, &report.text).await;
            }
            Err(err) => {
                tracing::warn!(user_id, %location, "Weather fetch failed: {}", err);
                self.dispatcher.send(chat_id, err.user_message()).await;
            }
        }
        self.dispatcher.send(chat_id, NEXT_UPDATE_NOTE).await;

        self.persist(&record).await;

        // `schedule` atomically replaces any job of the same kind, so a
        // location change retires the old timers in the same step that
        // installs the new ones.
        let now = Utc::now();
        self.jobs.schedule(Job {
            user_id,
            kind: JobKind::RecurringInterval,
            next_fire_at: now + Duration::seconds(self.timing.weather_interval_seconds),
            chat_id,
            location: Some(location.clone()),
            interval_seconds: self.timing.weather_interval_seconds,
        });
        self.jobs.schedule(Job {
            user_id,
            kind: JobKind::DailyAtTime,
            next_fire_at: next_daily_fire(
                now,
                record.tz_offset_secs,
                self.timing.daily_forecast_hour,
            ),
            chat_id,
            location: Some(location),
            interval_seconds: 86_400,
        });

        self.maybe_schedule_onboarding(&record, chat_id);
    }

    async fn hazard_toggled(&self, user_id: i64, chat_id: i64) {
        let existing = self.load_subscriber(user_id).await;
        let mut record = existing.unwrap_or_else(|| SubscriberRecord::new(user_id, chat_id));
        record.chat_id = chat_id;
        record.hazard_subscription_active = !record.hazard_subscription_active;
        self.persist(&record).await;

        let confirmation = if record.hazard_subscription_active {
            if record.location.is_some() {
                "🔔 Air-raid alerts enabled for your region."
            } else {
                "🔔 Air-raid alerts enabled. Set a location so I know your region."
            }
        } else {
            "🔕 Air-raid alerts disabled."
        };
        self.dispatcher.send(chat_id, confirmation).await;
    }

    async fn hazard_status(&self, user_id: i64, chat_id: i64) {
        let location = self
            .load_subscriber(user_id)
            .await
            .and_then(|record| record.location);
        let Some(location) = location else {
            self.dispatcher
                .send(chat_id, "Set a location first, then I can check alerts for it.")
                .await;
            return;
        };

        // Always a fresh fetch: alert status is never served from a cache,
        // and a failed fetch is reported as such, never as "all clear".
        let states = match self.feed.active_alerts().await {
            Ok(states) => states,
            Err(err) => {
                tracing::error!("Hazard feed fetch failed: {}", err);
                self.dispatcher
                    .send(chat_id, "Could not fetch alert status. Please try again later.")
                    .await;
                return;
            }
        };

        let Some(region) = self.resolver.resolve(&location).await else {
            self.dispatcher
                .send(
                    chat_id,
                    "I could not map your location to a region. Try a different spelling.",
                )
                .await;
            return;
        };

        let text = match states.iter().find(|state| state.region == region) {
            Some(state) if state.is_active() => {
                format!("🔴 Attention! An alert is active in {}!", region)
            }
            Some(_) => format!("No active alerts in {}.", region),
            None => format!("No data for {} in the current feed.", region),
        };
        self.dispatcher.send(chat_id, &text).await;
    }

    async fn currency_requested(&self, chat_id: i64) {
        match self.currency.rates_summary().await {
            Ok(summary) => {
                self.dispatcher.send(chat_id, &summary).await;
            }
            Err(err) => {
                tracing::warn!("Currency fetch failed: {}", err);
                self.dispatcher.send(chat_id, err.user_message()).await;
            }
        }
    }

    async fn unsubscribed(&self, user_id: i64, chat_id: i64) {
        self.jobs.cancel_all(user_id);

        // The record is kept (re-subscribing restores the location), but no
        // future fan-out of any kind should reach this subscriber.
        if let Some(mut record) = self.load_subscriber(user_id).await {
            if record.hazard_subscription_active {
                record.hazard_subscription_active = false;
                self.persist(&record).await;
            }
        }

        self.dispatcher
            .send(chat_id, "You are unsubscribed. Send a location any time to resume.")
            .await;
    }

    async fn send_weather(&self, chat_id: i64, location: &str) {
        match self.weather.report(location).await {
            Ok(report) => {
                self.dispatcher.send(chat_id, &report.text).await;
            }
            Err(err) => {
                tracing::warn!(%location, "Scheduled weather fetch failed: {}", err);
                self.dispatcher.send(chat_id, err.user_message()).await;
            }
        }
    }

    fn maybe_schedule_onboarding(&self, record: &SubscriberRecord, chat_id: i64) {
        if record.notified_hazard_onboarding {
            return;
        }
        self.jobs.schedule(Job {
            user_id: record.user_id,
            kind: JobKind::OneShot,
            next_fire_at: Utc::now() + Duration::seconds(self.timing.onboarding_delay_seconds),
            chat_id,
            location: None,
            interval_seconds: 0,
        });
    }

    async fn load_subscriber(&self, user_id: i64) -> Option<SubscriberRecord> {
        match self.repository.subscriber(user_id).await {
            Ok(record) => record,
            Err(err) => {
                tracing::error!(user_id, "Failed to load subscriber record: {}", err);
                None
            }
        }
    }

    /// Upsert with the log-and-skip persistence policy: the in-memory state
    /// already reflects the change, and the next successful write repairs
    /// the stored record.
    async fn persist(&self, record: &SubscriberRecord) {
        if let Err(err) = self.repository.upsert_subscriber(record).await {
            tracing::error!(
                user_id = record.user_id,
                "Failed to persist subscriber record: {}",
                err
            );
        }
    }
}
