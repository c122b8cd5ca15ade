//! Database repository for subscriber records and region mappings.
//!
//! All SQLite read/write logic lives here; no business rules do. Callers
//! (the notification engine, the region resolver) apply the invariants —
//! the repository only guarantees whole-record upserts keyed by user id and
//! append-only region mappings that survive a restart.

use serde::{Deserialize, Serialize};
use sqlx::{Row, SqlitePool};

/// Durable per-subscriber record.
///
/// A record exists for every user who has ever interacted with the bot;
/// `location` stays `None` until the user supplies one. Records are never
/// deleted — unsubscribing only cancels scheduled jobs.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SubscriberRecord {
    pub user_id: i64,
    pub chat_id: i64,
    pub location: Option<String>,
    /// UTC offset of the subscriber's location, taken from the most recent
    /// successful weather fetch. Zero (UTC) until one exists.
    pub tz_offset_secs: i32,
    pub hazard_subscription_active: bool,
    pub notified_hazard_onboarding: bool,
}

impl SubscriberRecord {
    /// Fresh record for a user seen for the first time.
    pub fn new(user_id: i64, chat_id: i64) -> Self {
        Self {
            user_id,
            chat_id,
            location: None,
            tz_offset_secs: 0,
            hazard_subscription_active: false,
            notified_hazard_onboarding: false,
        }
    }
}

/// Repository for reading and writing subscriber state to SQLite.
pub struct Repository {
    pool: SqlitePool,
}

impl Repository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Fetch a subscriber record by user id.
    pub async fn subscriber(&self, user_id: i64) -> Result<Option<SubscriberRecord>, sqlx::Error> {
        let row = sqlx::query(
            "SELECT user_id, chat_id, location, tz_offset_secs,
                    hazard_subscription_active, notified_hazard_onboarding
             FROM subscribers WHERE user_id = ?",
        )
        .bind(user_id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.map(record_from_row))
    }

    /// Whole-record upsert keyed by user id.
    pub async fn upsert_subscriber(&self, record: &SubscriberRecord) -> Result<(), sqlx::Error> {
        sqlx::query(
            "INSERT INTO subscribers
                 (user_id, chat_id, location, tz_offset_secs,
                  hazard_subscription_active, notified_hazard_onboarding)
             VALUES (?, ?, ?, ?, ?, ?)
             ON CONFLICT(user_id) DO UPDATE SET
                 chat_id = excluded.chat_id,
                 location = excluded.location,
                 tz_offset_secs = excluded.tz_offset_secs,
                 hazard_subscription_active = excluded.hazard_subscription_active,
                 notified_hazard_onboarding = excluded.notified_hazard_onboarding",
        )
        .bind(record.user_id)
        .bind(record.chat_id)
        .bind(&record.location)
        .bind(record.tz_offset_secs)
        .bind(record.hazard_subscription_active as i64)
        .bind(record.notified_hazard_onboarding as i64)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    /// All subscribers with the hazard subscription enabled and a location
    /// on file — the fan-out audience for a hazard poll cycle.
    pub async fn hazard_subscribers(&self) -> Result<Vec<SubscriberRecord>, sqlx::Error> {
        let rows = sqlx::query(
            "SELECT user_id, chat_id, location, tz_offset_secs,
                    hazard_subscription_active, notified_hazard_onboarding
             FROM subscribers
             WHERE hazard_subscription_active = 1 AND location IS NOT NULL
             ORDER BY user_id ASC",
        )
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.into_iter().map(record_from_row).collect())
    }

    // ---- Region mappings (append-only) ----

    /// Look up the persisted region for a normalized location key.
    pub async fn region_mapping(&self, location: &str) -> Result<Option<String>, sqlx::Error> {
        let row = sqlx::query("SELECT region FROM region_mappings WHERE location = ?")
            .bind(location)
            .fetch_optional(&self.pool)
            .await?;

        Ok(row.and_then(|r| r.try_get("region").ok()))
    }

    /// Persist a newly resolved mapping. Mappings are authoritative once
    /// written; a racing duplicate insert keeps the first value.
    pub async fn insert_region_mapping(
        &self,
        location: &str,
        region: &str,
    ) -> Result<(), sqlx::Error> {
        sqlx::query(
            "INSERT INTO region_mappings (location, region) VALUES (?, ?)
             ON CONFLICT(location) DO NOTHING",
        )
        .bind(location)
        .bind(region)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    /// Full mapping table, used to hydrate the resolver's in-memory mirror
    /// at startup.
    pub async fn all_region_mappings(&self) -> Result<Vec<(String, String)>, sqlx::Error> {
        let rows = sqlx::query("SELECT location, region FROM region_mappings ORDER BY location")
            .fetch_all(&self.pool)
            .await?;

        let mappings = rows
            .into_iter()
            .filter_map(|row| {
                let location: String = row.try_get("location").ok()?;
                let region: String = row.try_get("region").ok()?;
                Some((location, region))
            })
            .collect();

        Ok(mappings)
    }
}

fn record_from_row(row: sqlx::sqlite::SqliteRow) -> SubscriberRecord {
    let hazard: i64 = row.try_get("hazard_subscription_active").unwrap_or(0);
    let notified: i64 = row.try_get("notified_hazard_onboarding").unwrap_or(0);

    SubscriberRecord {
        user_id: row.try_get("user_id").unwrap_or(0),
        chat_id: row.try_get("chat_id").unwrap_or(0),
        location: row.try_get("location").ok(),
        tz_offset_secs: row.try_get("tz_offset_secs").unwrap_or(0),
        hazard_subscription_active: hazard != 0,
        notified_hazard_onboarding: notified != 0,
    }
}
