use std::sync::Arc;

use async_trait::async_trait;
use pw_core::types::StateDocument;

/// A refresh could not produce a document at all.
#[derive(Debug, thiserror::Error)]
pub enum SourceError {
    #[error("state refresh aborted: {0}")]
    Aborted(String),
}

/// Supplier of the outward-facing state document.
///
/// Implementations decide when to re-read disk; callers may invoke
/// `current_state` concurrently and as often as they like.
#[async_trait]
pub trait StateSource: Send + Sync {
    async fn current_state(&self) -> Result<Arc<StateDocument>, SourceError>;

    /// Number of full refresh cycles performed so far.
    fn refresh_count(&self) -> u64;
}
