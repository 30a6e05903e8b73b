// Parole Tracker - Core Library
// Exposes all modules for use in CLI, API server, and tests

pub mod calendar;
pub mod config;
pub mod db;
pub mod error;
pub mod gate;
pub mod records;
pub mod scoring;
pub mod service;
pub mod store;
pub mod timeline;

#[cfg(feature = "server")]
pub mod api;

// Re-export commonly used types
pub use calendar::{add_fractional_years, human_duration};
pub use config::Config;
pub use db::{Event, SqliteStore};
pub use error::{GateReason, StoreError, TrackingError};
pub use gate::GateState;
pub use records::{BehaviorLogEntry, InmateRecord, ParoleRecord, SubmissionBatch};
pub use scoring::{BehaviorRule, EligibilityPolicy, RuleId, MAX_POSSIBLE_SCORE};
pub use service::{BehaviorTrackingService, SubmissionResult};
pub use store::{BehaviorStore, InmateDirectory, MemoryStore};
pub use timeline::SentenceTimeline;

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
