use std::sync::Arc;
use std::time::Instant;

use pw_core::WatchConfig;

use crate::source::StateSource;

/// Shared, immutable context captured by every handler.
pub struct ApiState {
    pub source: Arc<dyn StateSource>,
    pub config: Arc<WatchConfig>,
    pub start_time: Instant,
}

impl ApiState {
    pub fn new(source: Arc<dyn StateSource>, config: Arc<WatchConfig>) -> Self {
        Self {
            source,
            config,
            start_time: Instant::now(),
        }
    }
}
