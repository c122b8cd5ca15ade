// Library root — exposes internal modules for integration tests in `tests/`.
// Production entry point remains `src/main.rs`.

pub mod cache;
pub mod db;
pub mod dispatch;
pub mod error;
pub mod notify;
pub mod repository;
pub mod resolver;
pub mod scheduler;
pub mod services;

// These modules are only needed by the binary.
// Declared pub so integration tests can reach them if needed, but they
// contain no logic of interest to tests.
pub mod cli;
pub mod config;
pub mod logging;
