//! Activity Runtime
//!
//! This binary runs the activity sync pipeline and the snapshot cache:
//! - Opens the SQLite entity store and applies the schema
//! - Creates the SyncEngine over the GitHub contribution source
//! - Creates the SnapshotCache over a separate read-only connection
//! - Spawns the sync and snapshot schedulers until CTRL+C
//!
//! Usage:
//!   cargo run --release --bin activity_runtime
//!
//! Environment variables:
//!   ACTIVITY_DB_PATH - SQLite database path (default: activity.db)
//!   ACTIVITY_SCHEMA_DIR - Extra migrations directory (default: sql)
//!   GITHUB_TOKEN - GitHub API token (required)
//!   ACTIVITY_LOOKBACK_DAYS - Days fetched per entity (default: 365)
//!   SYNC_BATCH_SIZE / SYNC_BATCH_DELAY_MS - Batching (default: 50 / 5000)
//!   INACTIVE_DAYS / PENDING_REMOVAL_DAYS - Thresholds (default: 30 / 60)
//!   SYNC_INTERVAL_SECS - Full sync interval (default: 86400)
//!   SNAPSHOT_INTERVAL_SECS - Snapshot regeneration interval (default: 3600)
//!   SNAPSHOT_DIR - Directory for persisted snapshots (optional)

use activity_pulse::pipeline::{
    config::RuntimeConfig,
    db::{EntityStore, SqliteEntityStore},
    engine::SyncEngine,
    github::GithubContributionSource,
    scheduler::{snapshot_scheduler_task, sync_scheduler_task},
    source::ActivitySource,
    types::EntityStatus,
};
use activity_pulse::snapshot::{JsonRenderer, SnapshotCache};
use dotenv::dotenv;
use log::{error, info, warn};
use std::path::Path;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize environment and logging
    dotenv().ok();
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    info!("🚀 Activity Runtime");
    info!("   └─ Version: {}", env!("CARGO_PKG_VERSION"));

    // Load configuration (fatal on error)
    let config = match RuntimeConfig::from_env() {
        Ok(config) => config,
        Err(e) => {
            error!("❌ Invalid configuration: {}", e);
            return Err(e.into());
        }
    };

    info!("✅ Configuration loaded");
    info!("   ├─ Database: {}", config.db_path.display());
    info!(
        "   ├─ Batching: {} entities, {}ms delay",
        config.sync.batch_size, config.sync.batch_delay_ms
    );
    info!(
        "   ├─ Thresholds: inactive {}d, pending removal {}d",
        config.sync.inactive_days, config.sync.pending_removal_days
    );
    info!("   ├─ Lookback: {} days", config.lookback_days);
    info!("   ├─ Sync interval: {}s", config.sync_interval.as_secs());
    info!("   ├─ Snapshot interval: {}s", config.snapshot_interval.as_secs());
    match &config.snapshot_dir {
        Some(dir) => info!("   └─ Snapshot dir: {}", dir.display()),
        None => info!("   └─ Snapshot dir: (in-memory only)"),
    }

    // Initialize database
    info!("🔧 Initializing database...");
    let store = Arc::new(SqliteEntityStore::open(&config.db_path)?);
    if Path::new(&config.schema_dir).exists() {
        store.run_migrations(&config.schema_dir)?;
    } else {
        warn!(
            "⚠️  Schema directory {} not found, using bundled schema only",
            config.schema_dir
        );
    }

    let counts = store.status_counts()?;
    info!("✅ Database initialized");
    for status in EntityStatus::ALL {
        info!(
            "   ├─ {}: {}",
            status.label(),
            counts.get(&status).copied().unwrap_or(0)
        );
    }

    // Create SyncEngine
    let source: Arc<dyn ActivitySource> = Arc::new(GithubContributionSource::new(
        config.github_token.clone(),
        config.lookback_days,
    )?);
    let writer: Arc<dyn EntityStore> = store;
    let engine = Arc::new(SyncEngine::new(writer, source, config.sync.clone())?);
    info!(
        "✅ SyncEngine created (batch size: {})",
        engine.config().batch_size
    );

    // Create SnapshotCache on its own read-only connection
    let reader: Arc<dyn EntityStore> = Arc::new(SqliteEntityStore::open_reader(&config.db_path)?);
    let mut cache = SnapshotCache::new(reader, Arc::new(JsonRenderer::pretty()));
    if let Some(dir) = &config.snapshot_dir {
        cache = cache.with_persist_dir(dir.clone());
    }
    match cache.warm_from_dir() {
        Ok(0) => {}
        Ok(n) => info!("✅ Warmed {} snapshots from disk", n),
        Err(e) => warn!("⚠️  Failed to warm snapshots from disk: {}", e),
    }
    let cache = Arc::new(cache);
    info!("✅ SnapshotCache created");
    info!("   ├─ Format: {}", cache.content_type());
    match cache.persist_dir() {
        Some(dir) => info!("   └─ Persisting to: {}", dir.display()),
        None => info!("   └─ Persisting: disabled"),
    }

    // Spawn background tasks
    info!("🚀 Spawning background tasks...");
    let cancel = CancellationToken::new();

    let sync_task = tokio::spawn(sync_scheduler_task(
        engine.clone(),
        config.sync_interval,
        cancel.clone(),
    ));
    info!("   ├─ ✅ Sync scheduler spawned");

    let snapshot_task = tokio::spawn(snapshot_scheduler_task(
        cache.clone(),
        config.snapshot_interval,
        cancel.clone(),
    ));
    info!("   └─ ✅ Snapshot scheduler spawned");

    info!("🔄 Press CTRL+C to shutdown gracefully");

    // Wait for CTRL+C
    match tokio::signal::ctrl_c().await {
        Ok(()) => {
            info!("");
            info!("⚠️  Received CTRL+C, shutting down...");
        }
        Err(err) => {
            error!("❌ Failed to listen for CTRL+C: {}", err);
        }
    }

    cancel.cancel();

    // Give tasks time to finish
    let grace = tokio::time::Duration::from_secs(2);
    if tokio::time::timeout(grace, async {
        let _ = sync_task.await;
        let _ = snapshot_task.await;
    })
    .await
    .is_err()
    {
        warn!("⚠️  Background tasks did not stop within {}s", grace.as_secs());
    }

    info!("✅ Activity runtime stopped");
    Ok(())
}
