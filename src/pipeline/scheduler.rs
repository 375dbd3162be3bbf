//! Pipeline schedulers for background tasks
//!
//! - Sync scheduler: full sync on a fixed interval
//! - Snapshot scheduler: snapshot regeneration on a fixed interval or when
//!   `SnapshotCache::trigger_regeneration` is called
//!
//! Both tasks run their first pass immediately and exit when `cancel` fires.

use super::engine::{SyncEngine, SyncError};
use crate::snapshot::SnapshotCache;
use std::sync::Arc;
use tokio::time::{interval, Duration, MissedTickBehavior};
use tokio_util::sync::CancellationToken;

/// Sync scheduler task - periodically run a full sync
///
/// A tick that lands while another run holds the guard (a manual trigger) is
/// skipped, not queued.
pub async fn sync_scheduler_task(
    engine: Arc<SyncEngine>,
    sync_interval: Duration,
    cancel: CancellationToken,
) {
    log::info!("⏰ Starting sync scheduler (interval: {}s)", sync_interval.as_secs());

    let mut timer = interval(sync_interval);
    timer.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            _ = cancel.cancelled() => break,
            _ = timer.tick() => {}
        }

        match engine.run_full_sync(&cancel).await {
            Ok(report) => {
                log::info!(
                    "📊 Scheduled sync done: {} processed, {} failed",
                    report.processed,
                    report.failed
                );
            }
            Err(SyncError::AlreadyRunning) => {
                log::warn!("⚠️  Scheduled sync skipped: a sync is already running");
            }
            Err(e) => {
                log::error!("❌ Scheduled sync failed: {}", e);
            }
        }
    }

    log::info!("🛑 Sync scheduler stopped");
}

/// Snapshot scheduler task - regenerate the snapshot catalog
pub async fn snapshot_scheduler_task(
    cache: Arc<SnapshotCache>,
    regen_interval: Duration,
    cancel: CancellationToken,
) {
    log::info!(
        "⏰ Starting snapshot scheduler (interval: {}s)",
        regen_interval.as_secs()
    );

    let mut timer = interval(regen_interval);
    timer.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            _ = cancel.cancelled() => break,
            _ = timer.tick() => {}
            _ = cache.regeneration_requested() => {
                log::info!("🔧 Snapshot regeneration requested");
            }
        }

        if let Err(e) = cache.regenerate(&cancel).await {
            log::error!("❌ Snapshot regeneration failed: {}", e);
        }
    }

    log::info!("🛑 Snapshot scheduler stopped");
}
