use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use dotenvy::dotenv;
use tokio::sync::Mutex;

use skywatch::cache::ExpiringCache;
use skywatch::cli::Cli;
use skywatch::config::Config;
use skywatch::db::create_pool;
use skywatch::dispatch::Dispatcher;
use skywatch::error::AppError;
use skywatch::logging::init_logging;
use skywatch::notify::engine::EngineTiming;
use skywatch::notify::{HazardFanout, JobTable, NotificationEngine, UserEvent};
use skywatch::repository::Repository;
use skywatch::resolver::RegionResolver;
use skywatch::scheduler::{run_hazard_polling, run_job_scheduler};
use skywatch::services::alerts::HazardFeedClient;
use skywatch::services::currency::CurrencyClient;
use skywatch::services::geocoding::GeocodingClient;
use skywatch::services::telegram::{InboundMessage, TelegramClient};
use skywatch::services::weather::{WeatherClient, WeatherService};

/// Pause before retrying a failed long-poll, so a dead network does not
/// spin the loop.
const POLL_RETRY_DELAY: Duration = Duration::from_secs(5);

#[tokio::main]
async fn main() {
    dotenv().ok();
    init_logging();

    let cli = Cli::parse();
    let mut config = Config::from_env()
        .map_err(AppError::Config)
        .unwrap_or_else(|err| {
            tracing::error!("{}", err);
            std::process::exit(1);
        });
    config.apply_cli(&cli);

    if let Err(err) = run(config).await {
        tracing::error!("Fatal: {}", err);
        std::process::exit(1);
    }
}

async fn run(config: Config) -> Result<(), AppError> {
    let pool = create_pool(&config.database_url).await?;
    let repository = Arc::new(Repository::new(pool));

    let telegram = Arc::new(TelegramClient::new(&config.telegram_token));
    let dispatcher = Arc::new(Dispatcher::new(telegram.clone()));

    let weather_cache = Arc::new(Mutex::new(ExpiringCache::new(
        256,
        Duration::from_secs(config.weather_cache_ttl_seconds),
    )));
    let weather = Arc::new(WeatherService::new(
        Arc::new(WeatherClient::new(config.weather_api_key.clone())),
        weather_cache,
    ));

    let geocoder = Arc::new(GeocodingClient::new(config.weather_api_key.clone()));
    let resolver = Arc::new(RegionResolver::load(repository.clone(), geocoder).await?);

    let feed = Arc::new(HazardFeedClient::new(config.alerts_api_key.clone()));
    let currency = Arc::new(CurrencyClient::new(config.currency_api_key.clone()));

    let jobs = Arc::new(JobTable::new());
    let engine = Arc::new(NotificationEngine::new(
        repository.clone(),
        weather,
        currency,
        feed.clone(),
        resolver.clone(),
        dispatcher,
        jobs.clone(),
        EngineTiming {
            weather_interval_seconds: config.weather_interval_seconds as i64,
            daily_forecast_hour: config.daily_forecast_hour,
            onboarding_delay_seconds: config.onboarding_delay_seconds as i64,
        },
    ));
    // Fan-out sends share the retry policy but not the dispatcher instance,
    // so a burst of alert messages does not serialize behind user replies.
    let fanout = Arc::new(HazardFanout::new(
        feed,
        repository,
        resolver,
        Arc::new(Dispatcher::new(telegram.clone())),
    ));

    tracing::info!(
        "skywatch started (weather every {}s, hazard poll every {}s)",
        config.weather_interval_seconds,
        config.hazard_poll_seconds
    );

    let scheduler = tokio::spawn(run_job_scheduler(
        engine.clone(),
        jobs,
        config.scheduler_tick_seconds,
    ));
    let hazard = tokio::spawn(run_hazard_polling(fanout, config.hazard_poll_seconds));

    run_update_loop(telegram, engine).await;

    let _ = scheduler.await;
    let _ = hazard.await;
    tracing::info!("skywatch stopped cleanly");
    Ok(())
}

/// Consume inbound updates until `Ctrl+C`. Each message maps to at most one
/// user event; the engine handles events inline so replies stay ordered per
/// chat.
async fn run_update_loop(telegram: Arc<TelegramClient>, engine: Arc<NotificationEngine>) {
    let mut offset = 0i64;

    loop {
        let updates = tokio::select! {
            result = telegram.get_updates(offset) => result,
            _ = tokio::signal::ctrl_c() => {
                tracing::info!("Shutdown signal received. Stopping update loop.");
                return;
            }
        };

        let messages = match updates {
            Ok(messages) => messages,
            Err(err) => {
                tracing::warn!("getUpdates failed: {}", err);
                tokio::time::sleep(POLL_RETRY_DELAY).await;
                continue;
            }
        };

        for message in messages {
            offset = offset.max(message.update_id + 1);
            if let Some(event) = parse_event(&message) {
                engine.handle_event(event).await;
            }
        }
    }
}

/// Map an inbound text message onto a user event. Unknown slash commands
/// are dropped; any other non-empty text is taken as a location name.
fn parse_event(message: &InboundMessage) -> Option<UserEvent> {
    let text = message.text.trim();
    let user_id = message.user_id;
    let chat_id = message.chat_id;

    match text {
        "" => None,
        "/start" => Some(UserEvent::Started { user_id, chat_id }),
        "/stop" => Some(UserEvent::Unsubscribed { user_id, chat_id }),
        "/alarm" => Some(UserEvent::HazardToggled { user_id, chat_id }),
        "/status" => Some(UserEvent::HazardStatusRequested { user_id, chat_id }),
        "/currency" => Some(UserEvent::CurrencyRequested { chat_id }),
        _ if text.starts_with('/') => None,
        location => Some(UserEvent::LocationSet {
            user_id,
            chat_id,
            location: location.to_string(),
        }),
    }
}
