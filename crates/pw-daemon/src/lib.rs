//! pipewatch daemon: the refresh engine behind the HTTP surface.
//!
//! - [`activity`]: log tailing and output-tree scanning per task
//! - [`summary`]: periodic digests from an external text generator
//! - [`coordinator`]: debounced, concurrency-safe state refresh
//! - [`daemon`]: wiring and server lifecycle

pub mod activity;
pub mod coordinator;
pub mod daemon;
pub mod log_line;
pub mod shutdown;
pub mod summary;
