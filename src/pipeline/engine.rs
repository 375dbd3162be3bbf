//! Sync Engine - batched fetch → upsert → reclassify → persist
//!
//! ## Flow
//!
//! ```text
//! list_entities (sorted by handle)
//!     ↓ chunks of batch_size
//! fetch phase   - ActivitySource::fetch per entity, failures counted and skipped
//!     ↓
//! commit phase  - one BatchWriter transaction: upsert days, window sums,
//!                 classify, save entity, commit
//!     ↓ cancellable pause (batch_delay_ms), not after the last batch
//! next batch
//! ```
//!
//! Fetch failures never reach the store, so they never roll anything back.
//! A store failure rolls back the in-flight batch and ends the run; batches
//! committed before it stay durable.

use super::classifier::{classify, ClassificationThresholds};
use super::config::{ConfigError, SyncConfig};
use super::db::{BatchWriter, EntityStore, StoreError};
use super::guard::SyncGuard;
use super::source::{ActivitySource, FetchError};
use super::types::{start_of_day, ActivityCalendar, TrackedEntity};
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::sync::Arc;
use std::time::{Duration, Instant};
use thiserror::Error;
use tokio_util::sync::CancellationToken;

/// Summary of one sync run
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct SyncReport {
    /// Entities written in committed batches
    pub processed: usize,
    /// Entities whose fetch failed
    pub failed: usize,
    pub elapsed: Duration,
    /// The run stopped early because cancellation was requested
    pub cancelled: bool,
}

#[derive(Debug, Error)]
pub enum SyncError {
    #[error("A sync run is already in progress")]
    AlreadyRunning,

    #[error("Failed to list entities: {0}")]
    StoreRead(StoreError),

    /// The in-flight batch was rolled back; `partial` holds the counts up to the abort
    #[error("Store write failed, in-flight batch rolled back: {source}")]
    StoreWrite {
        source: StoreError,
        partial: SyncReport,
    },
}

impl SyncError {
    /// Counts accumulated before the run was aborted, if it got that far
    pub fn partial_report(&self) -> Option<&SyncReport> {
        match self {
            SyncError::StoreWrite { partial, .. } => Some(partial),
            _ => None,
        }
    }
}

/// Result of the fetch phase of one batch
struct FetchedBatch {
    fetched: Vec<(TrackedEntity, ActivityCalendar)>,
    failed: usize,
    interrupted: bool,
}

/// Apply one fetched calendar to the store inside an open batch
///
/// Upserts every day, recomputes `last_active` from the fetched window
/// (keeping the previous value when the window has no active day), sums both
/// classification windows over the whole ledger and saves the entity.
pub fn apply_activity(
    writer: &mut dyn BatchWriter,
    entity: &TrackedEntity,
    calendar: &ActivityCalendar,
    thresholds: &ClassificationThresholds,
    now: DateTime<Utc>,
) -> Result<TrackedEntity, StoreError> {
    for day in &calendar.days {
        writer.upsert_daily_record(entity.id, day.date, day.count.max(0))?;
    }

    let today = now.date_naive();
    let pending_window = thresholds.pending_removal_window(today);
    let inactive_window = thresholds.inactive_window(today);

    let sum_pending =
        writer.activity_sum(entity.id, pending_window.start(), pending_window.end())?;
    let sum_inactive =
        writer.activity_sum(entity.id, inactive_window.start(), inactive_window.end())?;

    let mut updated = entity.clone();
    if let Some(date) = calendar.latest_active_date() {
        updated.last_active = Some(start_of_day(date));
    }
    updated.status = classify(sum_pending, sum_inactive);
    updated.updated_at = now;

    writer.save_entity(&updated)?;

    if updated.status != entity.status {
        log::info!(
            "🔁 {}: {} → {}",
            entity.handle,
            entity.status,
            updated.status
        );
    }

    Ok(updated)
}

/// Sync engine orchestrating ingestion and classification for all entities
pub struct SyncEngine {
    store: Arc<dyn EntityStore>,
    source: Arc<dyn ActivitySource>,
    config: SyncConfig,
    thresholds: ClassificationThresholds,
    guard: Arc<SyncGuard>,

    /// Clock (replaced in tests for deterministic windows)
    now_fn: Box<dyn Fn() -> DateTime<Utc> + Send + Sync>,
}

impl SyncEngine {
    /// Create an engine with its own guard and the system clock
    ///
    /// Fails if the config does not validate.
    pub fn new(
        store: Arc<dyn EntityStore>,
        source: Arc<dyn ActivitySource>,
        config: SyncConfig,
    ) -> Result<Self, ConfigError> {
        config.validate()?;

        Ok(Self {
            store,
            source,
            thresholds: ClassificationThresholds::from_config(&config),
            config,
            guard: Arc::new(SyncGuard::new()),
            now_fn: Box::new(Utc::now),
        })
    }

    /// Share a guard with other triggers of the same store
    pub fn with_guard(mut self, guard: Arc<SyncGuard>) -> Self {
        self.guard = guard;
        self
    }

    /// Replace the clock used for "today"
    pub fn with_now_fn(mut self, now_fn: Box<dyn Fn() -> DateTime<Utc> + Send + Sync>) -> Self {
        self.now_fn = now_fn;
        self
    }

    pub fn config(&self) -> &SyncConfig {
        &self.config
    }

    pub fn guard(&self) -> Arc<SyncGuard> {
        Arc::clone(&self.guard)
    }

    /// Sync every entity once
    ///
    /// Returns `SyncError::AlreadyRunning` immediately if another run holds the
    /// guard. Cancellation is not an error: the report comes back with
    /// `cancelled = true` and the counts reached so far.
    pub async fn run_full_sync(&self, cancel: &CancellationToken) -> Result<SyncReport, SyncError> {
        let _permit = self.guard.try_acquire().ok_or(SyncError::AlreadyRunning)?;

        let started = Instant::now();
        let mut report = SyncReport::default();

        let mut entities = self.store.list_entities().map_err(SyncError::StoreRead)?;
        entities.sort_by(|a, b| a.handle.cmp(&b.handle));

        let batch_size = self.config.batch_size.max(1);
        let batch_count = entities.len().div_ceil(batch_size);

        log::info!(
            "🚀 Starting sync: {} entities in {} batches (source: {}, batch size: {}, delay: {}ms)",
            entities.len(),
            batch_count,
            self.source.source_name(),
            batch_size,
            self.config.batch_delay_ms
        );

        for (index, batch) in entities.chunks(batch_size).enumerate() {
            if index > 0 && !self.pause_between_batches(cancel).await {
                report.cancelled = true;
                break;
            }

            if cancel.is_cancelled() {
                report.cancelled = true;
                break;
            }

            let outcome = self.fetch_batch(batch, cancel).await;
            report.failed += outcome.failed;

            match self.commit_batch(&outcome.fetched) {
                Ok(written) => {
                    report.processed += written;
                    log::debug!(
                        "✅ Batch {}/{} committed: {} written, {} failed",
                        index + 1,
                        batch_count,
                        written,
                        outcome.failed
                    );
                }
                Err(source) => {
                    report.elapsed = started.elapsed();
                    log::error!(
                        "❌ Sync aborted in batch {}/{}: {} (processed: {}, failed: {})",
                        index + 1,
                        batch_count,
                        source,
                        report.processed,
                        report.failed
                    );
                    return Err(SyncError::StoreWrite {
                        source,
                        partial: report,
                    });
                }
            }

            if outcome.interrupted {
                report.cancelled = true;
                break;
            }
        }

        report.elapsed = started.elapsed();

        if report.cancelled {
            log::warn!(
                "⚠️  Sync cancelled: {} processed, {} failed in {}ms",
                report.processed,
                report.failed,
                report.elapsed.as_millis()
            );
        } else {
            log::info!(
                "✅ Sync complete: {} processed, {} failed in {}ms",
                report.processed,
                report.failed,
                report.elapsed.as_millis()
            );
        }

        Ok(report)
    }

    /// Fetch every entity of one batch, stopping early on cancellation
    async fn fetch_batch(
        &self,
        batch: &[TrackedEntity],
        cancel: &CancellationToken,
    ) -> FetchedBatch {
        let mut outcome = FetchedBatch {
            fetched: Vec::with_capacity(batch.len()),
            failed: 0,
            interrupted: false,
        };

        for entity in batch {
            if cancel.is_cancelled() {
                outcome.interrupted = true;
                break;
            }

            let result = tokio::select! {
                biased;
                _ = cancel.cancelled() => Err(FetchError::Cancelled),
                result = self.source.fetch(&entity.handle, cancel) => result,
            };

            match result {
                Ok(calendar) => outcome.fetched.push((entity.clone(), calendar)),
                Err(e) => {
                    outcome.failed += 1;
                    log::warn!("⚠️  Fetch failed for {}: {}", entity.handle, e);
                    if matches!(e, FetchError::Cancelled) {
                        outcome.interrupted = true;
                        break;
                    }
                }
            }
        }

        outcome
    }

    /// Write one batch in a single transaction
    ///
    /// Any error drops the writer uncommitted, which rolls the batch back.
    fn commit_batch(
        &self,
        fetched: &[(TrackedEntity, ActivityCalendar)],
    ) -> Result<usize, StoreError> {
        if fetched.is_empty() {
            return Ok(0);
        }

        let now = (self.now_fn)();
        let mut writer = self.store.begin_batch()?;

        for (entity, calendar) in fetched {
            apply_activity(writer.as_mut(), entity, calendar, &self.thresholds, now)?;
        }

        writer.commit()?;
        Ok(fetched.len())
    }

    /// Wait `batch_delay_ms`; returns false if cancelled while waiting
    async fn pause_between_batches(&self, cancel: &CancellationToken) -> bool {
        let delay = self.config.batch_delay();
        if delay.is_zero() {
            return !cancel.is_cancelled();
        }

        log::debug!("⏳ Pausing {}ms before next batch", delay.as_millis());

        tokio::select! {
            biased;
            _ = cancel.cancelled() => false,
            _ = tokio::time::sleep(delay) => true,
        }
    }
}
