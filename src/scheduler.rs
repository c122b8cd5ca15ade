//! Scheduler loops.
//!
//! Two long-running loops drive everything that is not a direct reply to an
//! inbound message: the job scheduler drains the per-subscriber timer table
//! on a coarse tick, and the hazard poller runs a fan-out cycle on its own
//! interval. Both run until `Ctrl+C` (SIGINT) is received.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tokio::signal;
use tokio::time;

use crate::notify::{HazardFanout, JobTable, NotificationEngine};

/// Run the job scheduler loop.
///
/// On each tick every due job is drained from the table (recurring jobs
/// re-arm themselves in the same step) and executed as its own task, so one
/// slow weather fetch never delays the other subscribers' jobs.
pub async fn run_job_scheduler(
    engine: Arc<NotificationEngine>,
    jobs: Arc<JobTable>,
    tick_seconds: u64,
) {
    let mut interval = time::interval(Duration::from_secs(tick_seconds));

    tracing::info!("Job scheduler started (tick: {}s)", tick_seconds);

    loop {
        tokio::select! {
            _ = interval.tick() => {
                tick_jobs(&engine, &jobs).await;
            }

            _ = signal::ctrl_c() => {
                tracing::info!("Shutdown signal received. Stopping job scheduler.");
                break;
            }
        }
    }

    tracing::info!("Job scheduler stopped cleanly");
}

/// Drain and run every due job. Extracted for testability.
async fn tick_jobs(engine: &Arc<NotificationEngine>, jobs: &Arc<JobTable>) {
    let due = jobs.due(Utc::now());
    if due.is_empty() {
        return;
    }
    tracing::debug!(count = due.len(), "Running due jobs");

    for job in due {
        let engine = engine.clone();
        tokio::spawn(async move {
            engine.run_job(job).await;
        });
    }
}

/// Run the hazard polling loop. Each tick is one full fetch-diff-notify
/// cycle; a failed cycle is logged inside `poll_once` and the loop keeps
/// ticking.
pub async fn run_hazard_polling(fanout: Arc<HazardFanout>, poll_interval_seconds: u64) {
    let mut interval = time::interval(Duration::from_secs(poll_interval_seconds));

    tracing::info!(
        "Hazard polling started (interval: {}s)",
        poll_interval_seconds
    );

    loop {
        tokio::select! {
            _ = interval.tick() => {
                fanout.poll_once().await;
            }

            _ = signal::ctrl_c() => {
                tracing::info!("Shutdown signal received. Stopping hazard polling.");
                break;
            }
        }
    }

    tracing::info!("Hazard polling stopped cleanly");
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration as StdDuration;

    use chrono::Duration;
    use tokio::sync::Mutex;

    use crate::cache::ExpiringCache;
    use crate::db::create_pool;
    use crate::dispatch::Dispatcher;
    use crate::notify::engine::EngineTiming;
    use crate::notify::{Job, JobKind};
    use crate::repository::Repository;
    use crate::resolver::RegionResolver;
    use crate::services::mock::{
        MockCurrencyProvider, MockGeocoder, MockHazardFeed, MockTransport, MockWeatherProvider,
    };
    use crate::services::weather::{MainReadings, WeatherCondition, WeatherPayload, WeatherService};

    fn sample_payload() -> WeatherPayload {
        WeatherPayload {
            weather: vec![WeatherCondition {
                description: "clear sky".to_string(),
            }],
            main: MainReadings {
                temp: 20.0,
                feels_like: 19.0,
                humidity: Some(40.0),
                pressure: Some(1015.0),
            },
            wind: None,
            sys: None,
            timezone: Some(0),
        }
    }

    async fn make_engine(transport: Arc<MockTransport>) -> Arc<NotificationEngine> {
        let pool = create_pool("sqlite::memory:").await.unwrap();
        let repository = Arc::new(Repository::new(pool));
        let dispatcher = Arc::new(Dispatcher::new(transport));
        let cache = Arc::new(Mutex::new(ExpiringCache::new(
            16,
            StdDuration::from_secs(600),
        )));
        let weather = Arc::new(WeatherService::new(
            Arc::new(MockWeatherProvider::new().with_payload(sample_payload())),
            cache,
        ));
        let geocoder = Arc::new(MockGeocoder::new());
        let resolver = Arc::new(
            RegionResolver::load(repository.clone(), geocoder)
                .await
                .unwrap(),
        );

        Arc::new(NotificationEngine::new(
            repository,
            weather,
            Arc::new(MockCurrencyProvider::new("rates")),
            Arc::new(MockHazardFeed::new()),
            resolver,
            dispatcher,
            Arc::new(JobTable::new()),
            EngineTiming::default(),
        ))
    }

    #[tokio::test]
    async fn tick_runs_due_jobs_and_leaves_future_ones() {
        let transport = Arc::new(MockTransport::new());
        let engine = make_engine(transport.clone()).await;
        let jobs = Arc::new(JobTable::new());

        jobs.schedule(Job {
            user_id: 1,
            kind: JobKind::RecurringInterval,
            next_fire_at: Utc::now() - Duration::seconds(1),
            chat_id: 100,
            location: Some("Kyiv".to_string()),
            interval_seconds: 7200,
        });
        jobs.schedule(Job {
            user_id: 2,
            kind: JobKind::RecurringInterval,
            next_fire_at: Utc::now() + Duration::seconds(600),
            chat_id: 200,
            location: Some("Lviv".to_string()),
            interval_seconds: 7200,
        });

        tick_jobs(&engine, &jobs).await;
        // Drained jobs run in spawned tasks; give them a beat to finish.
        tokio::task::yield_now().await;
        tokio::time::sleep(StdDuration::from_millis(50)).await;

        let sent = transport.sent();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].0, 100);
        assert!(jobs.get(2, JobKind::RecurringInterval).is_some());
    }

    #[tokio::test]
    async fn tick_with_no_due_jobs_sends_nothing() {
        let transport = Arc::new(MockTransport::new());
        let engine = make_engine(transport.clone()).await;
        let jobs = Arc::new(JobTable::new());

        jobs.schedule(Job {
            user_id: 1,
            kind: JobKind::RecurringInterval,
            next_fire_at: Utc::now() + Duration::seconds(600),
            chat_id: 100,
            location: Some("Kyiv".to_string()),
            interval_seconds: 7200,
        });

        tick_jobs(&engine, &jobs).await;
        tokio::time::sleep(StdDuration::from_millis(20)).await;

        assert!(transport.sent().is_empty());
    }
}
