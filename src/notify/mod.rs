//! Notification scheduling and fan-out.
//!
//! `jobs` owns the per-subscriber timer table, `engine` is the state
//! machine driven by inbound user events and fired jobs, and `fanout`
//! handles the subscriber-independent hazard poll cycle.

pub mod engine;
pub mod fanout;
pub mod jobs;

pub use engine::{NotificationEngine, UserEvent};
pub use fanout::HazardFanout;
pub use jobs::{Job, JobKind, JobTable};
