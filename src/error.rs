//! Top-level application error.
//!
//! Only two failure classes are allowed to abort the process: a missing or
//! malformed configuration value and a database that cannot be opened at
//! startup. Everything else is recovered close to where it happens and the
//! affected operation is logged and skipped.

use thiserror::Error;

use crate::services::error::FetchError;

#[derive(Error, Debug)]
pub enum AppError {
    #[error("Config error: {0}")]
    Config(String),

    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Fetch error: {0}")]
    Fetch(#[from] FetchError),
}
