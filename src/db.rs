//! SQLite pool construction and schema bootstrap.
//!
//! The pool is capped at a single connection: subscriber records and region
//! mappings are low-traffic whole-row writes, and one connection gives the
//! single-writer discipline both tables need without extra locking. It also
//! keeps `sqlite::memory:` databases coherent in tests.

use std::str::FromStr;

use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use sqlx::SqlitePool;

/// Open (creating if missing) the database at `url` and ensure the schema.
pub async fn create_pool(url: &str) -> Result<SqlitePool, sqlx::Error> {
    let options = SqliteConnectOptions::from_str(url)?.create_if_missing(true);

    let pool = SqlitePoolOptions::new()
        .max_connections(1)
        .connect_with(options)
        .await?;

    sqlx::query(
        "CREATE TABLE IF NOT EXISTS subscribers (
            user_id INTEGER PRIMARY KEY,
            chat_id INTEGER NOT NULL,
            location TEXT,
            tz_offset_secs INTEGER NOT NULL DEFAULT 0,
            hazard_subscription_active INTEGER NOT NULL DEFAULT 0,
            notified_hazard_onboarding INTEGER NOT NULL DEFAULT 0
        )",
    )
    .execute(&pool)
    .await?;

    sqlx::query(
        "CREATE TABLE IF NOT EXISTS region_mappings (
            location TEXT PRIMARY KEY,
            region TEXT NOT NULL,
            created_at TEXT NOT NULL DEFAULT (datetime('now'))
        )",
    )
    .execute(&pool)
    .await?;

    Ok(pool)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn create_pool_in_memory_creates_schema() {
        let pool = create_pool("sqlite::memory:").await.unwrap();

        // Both tables must exist and be queryable.
        sqlx::query("SELECT COUNT(*) FROM subscribers")
            .execute(&pool)
            .await
            .unwrap();
        sqlx::query("SELECT COUNT(*) FROM region_mappings")
            .execute(&pool)
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn create_pool_is_idempotent_on_existing_schema() {
        let pool = create_pool("sqlite::memory:").await.unwrap();
        sqlx::query("INSERT INTO region_mappings (location, region) VALUES ('kyiv', 'Kyiv region')")
            .execute(&pool)
            .await
            .unwrap();

        // Re-running the DDL must not touch existing rows.
        sqlx::query(
            "CREATE TABLE IF NOT EXISTS region_mappings (
                location TEXT PRIMARY KEY,
                region TEXT NOT NULL,
                created_at TEXT NOT NULL DEFAULT (datetime('now'))
            )",
        )
        .execute(&pool)
        .await
        .unwrap();

        let row: (i64,) = sqlx::query_as("SELECT COUNT(*) FROM region_mappings")
            .fetch_one(&pool)
            .await
            .unwrap();
        assert_eq!(row.0, 1);
    }
}
