//! Snapshot cache
//!
//! Holds one pre-rendered blob per catalog key. Readers never block on a
//! regeneration: each key's blob is swapped in whole once it is rendered, so a
//! reader sees either the previous blob or the new one.

use super::persistence::{load_snapshots, save_snapshot};
use super::render::{RenderError, SnapshotRenderer};
use super::views::{compute_view, ledger_since, SnapshotKey, SnapshotWindow, ViewName};
use crate::pipeline::db::{EntityStore, LedgerView, StoreError};
use chrono::{DateTime, NaiveDate, Utc};
use serde::Serialize;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, RwLock};
use std::time::{Duration, Instant};
use thiserror::Error;
use tokio::sync::{Mutex, Notify};
use tokio_util::sync::CancellationToken;

#[derive(Debug, Error)]
pub enum SnapshotError {
    #[error("Failed to read the activity ledger: {0}")]
    Store(#[from] StoreError),

    #[error("Snapshot IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Outcome of one regeneration pass
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct RegenerationReport {
    pub generated: usize,
    pub failed: usize,
    pub elapsed: Duration,
    pub cancelled: bool,
}

pub struct SnapshotCache {
    store: Arc<dyn EntityStore>,
    renderer: Arc<dyn SnapshotRenderer>,
    entries: RwLock<HashMap<SnapshotKey, Arc<[u8]>>>,
    last_regenerated: RwLock<Option<DateTime<Utc>>>,
    persist_dir: Option<PathBuf>,
    regenerating: Mutex<()>,
    wake: Notify,

    /// Clock (replaced in tests for deterministic windows)
    now_fn: Box<dyn Fn() -> DateTime<Utc> + Send + Sync>,
}

impl SnapshotCache {
    pub fn new(store: Arc<dyn EntityStore>, renderer: Arc<dyn SnapshotRenderer>) -> Self {
        Self {
            store,
            renderer,
            entries: RwLock::new(HashMap::new()),
            last_regenerated: RwLock::new(None),
            persist_dir: None,
            regenerating: Mutex::new(()),
            wake: Notify::new(),
            now_fn: Box::new(Utc::now),
        }
    }

    /// Also write every rendered blob to `dir`
    pub fn with_persist_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.persist_dir = Some(dir.into());
        self
    }

    pub fn with_now_fn(mut self, now_fn: Box<dyn Fn() -> DateTime<Utc> + Send + Sync>) -> Self {
        self.now_fn = now_fn;
        self
    }

    pub fn persist_dir(&self) -> Option<&Path> {
        self.persist_dir.as_deref()
    }

    /// Current blob for the key, `None` if it was never generated
    pub fn get(&self, view: ViewName, window: SnapshotWindow) -> Option<Arc<[u8]>> {
        let entries = self.entries.read().unwrap_or_else(|e| e.into_inner());
        entries.get(&SnapshotKey::new(view, window)).cloned()
    }

    /// Lookup by name, e.g. `("trend", "7d")`
    ///
    /// Unknown names behave like keys that were never generated.
    pub fn get_snapshot(&self, view: &str, window: &str) -> Option<Arc<[u8]>> {
        match (view.parse::<ViewName>(), window.parse::<SnapshotWindow>()) {
            (Ok(view), Ok(window)) => self.get(view, window),
            _ => {
                log::debug!("Snapshot lookup for unknown key {}/{}", view, window);
                None
            }
        }
    }

    /// Keys that currently hold a blob
    pub fn keys(&self) -> Vec<SnapshotKey> {
        let entries = self.entries.read().unwrap_or_else(|e| e.into_inner());
        let mut keys: Vec<SnapshotKey> = entries.keys().copied().collect();
        keys.sort_by_key(|k| k.to_string());
        keys
    }

    pub fn last_regenerated(&self) -> Option<DateTime<Utc>> {
        *self
            .last_regenerated
            .read()
            .unwrap_or_else(|e| e.into_inner())
    }

    pub fn content_type(&self) -> &'static str {
        self.renderer.content_type()
    }

    /// Ask the snapshot scheduler to regenerate as soon as possible
    pub fn trigger_regeneration(&self) {
        self.wake.notify_one();
    }

    /// Resolves once `trigger_regeneration` has been called
    pub async fn regeneration_requested(&self) {
        self.wake.notified().await;
    }

    /// Preload blobs persisted by an earlier process
    ///
    /// Keys already present in memory are left alone.
    pub fn warm_from_dir(&self) -> Result<usize, SnapshotError> {
        let Some(dir) = self.persist_dir.as_deref() else {
            return Ok(0);
        };

        let loaded = load_snapshots(dir)?;
        let mut entries = self.entries.write().unwrap_or_else(|e| e.into_inner());
        let mut warmed = 0;
        for (key, bytes) in loaded {
            entries.entry(key).or_insert_with(|| {
                warmed += 1;
                Arc::from(bytes)
            });
        }
        Ok(warmed)
    }

    /// Rebuild every catalog key from one read of the store
    ///
    /// A key whose render fails keeps its previous blob and is counted in
    /// `failed`. Only a failed store read fails the whole pass. Concurrent
    /// calls run one after the other.
    pub async fn regenerate(
        &self,
        cancel: &CancellationToken,
    ) -> Result<RegenerationReport, SnapshotError> {
        let _running = self.regenerating.lock().await;
        let started = Instant::now();
        let now = (self.now_fn)();
        let today = now.date_naive();

        let ledger = self.store.load_ledger(ledger_since(today)).map_err(|e| {
            log::error!("❌ Snapshot regeneration aborted: {}", e);
            SnapshotError::Store(e)
        })?;

        if ledger.is_empty() {
            log::debug!("Ledger is empty, every snapshot will report no data");
        }

        let mut report = RegenerationReport::default();
        for key in SnapshotKey::catalog() {
            if cancel.is_cancelled() {
                report.cancelled = true;
                break;
            }

            match self.regenerate_key(key, &ledger, today) {
                Ok(()) => report.generated += 1,
                Err(e) => {
                    report.failed += 1;
                    log::warn!("⚠️  Snapshot {} not regenerated: {}", key, e);
                }
            }
        }

        report.elapsed = started.elapsed();
        if report.generated > 0 {
            *self
                .last_regenerated
                .write()
                .unwrap_or_else(|e| e.into_inner()) = Some(now);
        }

        log::info!(
            "✅ Snapshots regenerated: {} ok, {} failed{} in {}ms",
            report.generated,
            report.failed,
            if report.cancelled { " (cancelled)" } else { "" },
            report.elapsed.as_millis()
        );
        Ok(report)
    }

    fn regenerate_key(
        &self,
        key: SnapshotKey,
        ledger: &LedgerView,
        today: NaiveDate,
    ) -> Result<(), RenderError> {
        let data = compute_view(key, ledger, today);
        let bytes = self.renderer.render(key.view, key.window, &data)?;
        if bytes.is_empty() {
            return Err(RenderError::Empty);
        }

        if let Some(dir) = self.persist_dir.as_deref() {
            if let Err(e) = save_snapshot(dir, key, &bytes) {
                log::warn!("⚠️  Failed to persist snapshot {}: {}", key, e);
            }
        }

        let blob: Arc<[u8]> = Arc::from(bytes);
        self.entries
            .write()
            .unwrap_or_else(|e| e.into_inner())
            .insert(key, blob);
        Ok(())
    }
}
