//! Core model of pipewatch: the phase/task manifest, snapshot types, the
//! on-disk Snapshot Reader, change detection and process configuration.

pub mod config;
pub mod diff;
pub mod lenient;
pub mod manifest;
pub mod reader;
pub mod timefmt;
pub mod types;

pub use config::{ConfigError, WatchConfig};
pub use diff::{diff, ChangeTracker};
pub use reader::SnapshotReader;
