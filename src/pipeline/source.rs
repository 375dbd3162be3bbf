//! Activity source trait
//!
//! An activity source returns the bounded daily activity series of one
//! handle. The sync engine treats every error as a per-entity fetch failure:
//! it counts it, logs it and moves on to the next entity.

use super::types::ActivityCalendar;
use async_trait::async_trait;
use thiserror::Error;
use tokio_util::sync::CancellationToken;

#[derive(Debug, Error)]
pub enum FetchError {
    #[error("No activity found for handle {0}")]
    NotFound(String),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Upstream error: {0}")]
    Upstream(String),

    #[error("Fetch cancelled")]
    Cancelled,
}

#[async_trait]
pub trait ActivitySource: Send + Sync {
    /// Fetch the daily activity calendar for `handle`
    ///
    /// Implementations should stop early and return `FetchError::Cancelled`
    /// once `cancel` fires.
    async fn fetch(
        &self,
        handle: &str,
        cancel: &CancellationToken,
    ) -> Result<ActivityCalendar, FetchError>;

    /// Source name for logging
    fn source_name(&self) -> &'static str;
}
