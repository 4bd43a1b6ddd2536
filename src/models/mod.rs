// src/models/mod.rs

//! Domain models for the status watcher.
//!
//! This module contains all data structures used throughout the application,
//! organized by their primary purpose.

mod config;
mod disruption;
mod line;
mod mentions;
mod schedule;

// Re-export all public types
pub use config::{
    ApiConfig, Config, FailurePolicy, FetcherConfig, NotifyConfig, PathsConfig, ScheduleConfig,
    SourceKind, StatusPageConfig,
};
pub use disruption::{
    DETAILS_SEPARATOR, DisruptionRecord, DisruptionSet, normalize_details, reduce_messages,
};
pub use line::{LineDescriptor, LineRegistry};
pub use mentions::MentionRegistry;
pub use schedule::{MANUAL_BLOCK, RunInfo, ScheduleSlot, resolve_run};
