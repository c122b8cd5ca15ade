//! Hazard alert fan-out.
//!
//! One poll cycle fetches the full regional alert snapshot, diffs it against
//! the previous cycle, and notifies every subscribed user whose region just
//! became active. Notifications are edge-triggered: a region that stays
//! active across cycles produces no repeat messages, and a region that
//! clears and re-activates notifies again.
//!
//! A failed fetch skips the whole cycle and leaves the previous snapshot in
//! place. Silence from the feed is never treated as "all clear".

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use tokio::sync::{Mutex, Semaphore};
use tokio::task::JoinSet;

use crate::dispatch::Dispatcher;
use crate::repository::Repository;
use crate::resolver::RegionResolver;
use crate::services::alerts::{AlertType, HazardFeedProvider};

/// Upper bound on concurrent per-subscriber notification tasks in one cycle.
const FANOUT_PARALLELISM: usize = 8;

pub struct HazardFanout {
    feed: Arc<dyn HazardFeedProvider>,
    repository: Arc<Repository>,
    resolver: Arc<RegionResolver>,
    dispatcher: Arc<Dispatcher>,
    /// Regions active in the last successful cycle, with their alert types.
    active_regions: Mutex<HashMap<String, HashSet<AlertType>>>,
    parallelism: Arc<Semaphore>,
}

impl HazardFanout {
    pub fn new(
        feed: Arc<dyn HazardFeedProvider>,
        repository: Arc<Repository>,
        resolver: Arc<RegionResolver>,
        dispatcher: Arc<Dispatcher>,
    ) -> Self {
        Self {
            feed,
            repository,
            resolver,
            dispatcher,
            active_regions: Mutex::new(HashMap::new()),
            parallelism: Arc::new(Semaphore::new(FANOUT_PARALLELISM)),
        }
    }

    /// Run one poll cycle end to end. Errors are logged, never returned: the
    /// scheduler loop must keep ticking no matter what a cycle did.
    pub async fn poll_once(&self) {
        let states = match self.feed.active_alerts().await {
            Ok(states) => states,
            Err(err) => {
                tracing::error!("Hazard feed fetch failed, skipping cycle: {}", err);
                return;
            }
        };

        let now_active: HashMap<String, HashSet<AlertType>> = states
            .into_iter()
            .filter(|state| state.is_active())
            .map(|state| (state.region, state.alerts))
            .collect();

        let newly_active: HashMap<String, HashSet<AlertType>> = {
            let mut previous = self.active_regions.lock().await;
            let fresh = now_active
                .iter()
                .filter(|(region, _)| !previous.contains_key(*region))
                .map(|(region, alerts)| (region.clone(), alerts.clone()))
                .collect();
            *previous = now_active;
            fresh
        };

        if newly_active.is_empty() {
            tracing::debug!("Hazard cycle complete, no newly active regions");
            return;
        }
        tracing::info!(
            regions = newly_active.len(),
            "Hazard cycle found newly active regions"
        );

        let audience = match self.repository.hazard_subscribers().await {
            Ok(audience) => audience,
            Err(err) => {
                tracing::error!("Failed to load hazard subscribers: {}", err);
                return;
            }
        };

        let newly_active = Arc::new(newly_active);
        let mut tasks = JoinSet::new();

        for subscriber in audience {
            let Some(location) = subscriber.location else {
                continue;
            };
            let chat_id = subscriber.chat_id;
            let user_id = subscriber.user_id;

            let resolver = self.resolver.clone();
            let dispatcher = self.dispatcher.clone();
            let newly_active = newly_active.clone();
            let permit = self.parallelism.clone();

            // One task per subscriber: a failure (unresolvable location,
            // exhausted dispatch) affects that subscriber only.
            tasks.spawn(async move {
                let Ok(_permit) = permit.acquire_owned().await else {
                    return;
                };

                let Some(region) = resolver.resolve(&location).await else {
                    tracing::warn!(user_id, %location, "Could not resolve region for fan-out");
                    return;
                };
                let Some(alerts) = newly_active.get(&region) else {
                    return;
                };

                dispatcher.send(chat_id, &alert_message(&region, alerts)).await;
            });
        }

        while tasks.join_next().await.is_some() {}
    }
}

fn alert_message(region: &str, alerts: &HashSet<AlertType>) -> String {
    let mut labels: Vec<&str> = alerts.iter().map(AlertType::label).collect();
    labels.sort_unstable();
    format!("🔴 Attention! {} alert declared in {}!", labels.join(", "), region)
}
