//! # Activity Sync Pipeline
//!
//! Keeps a registry of tracked entities in step with an external activity
//! source and classifies each entity by how recently it was active.
//!
//! ## Architecture
//!
//! 1. `SyncEngine` lists every entity, ordered by handle
//! 2. Entities are processed in fixed-size batches with a cancellable pause
//!    between batches (rate limiting)
//! 3. Each batch fetches calendars from the `ActivitySource`, then writes the
//!    ledger rows and the new statuses in one store transaction
//! 4. A failed fetch skips only that entity; a failed write aborts the run
//!    after rolling back the current batch
//!
//! Classification reads the ledger inside the batch transaction, so an entity
//! is classified against the rows it was just given.
//!
//! ## Schema Reference
//!
//! All types match SQL schema in `/sql/`:
//! - `tracked_entities` → `TrackedEntity`
//! - `daily_activity` → `DailyActivityRecord`
//!
//! ## Module Organization
//!
//! - `types` - Core data structures (TrackedEntity, EntityStatus, ActivityCalendar)
//! - `config` - `SyncConfig` from environment variables
//! - `windows` - Trailing date windows
//! - `classifier` - Status classification rule
//! - `db` - Entity store trait and SQLite implementation
//! - `source` - Activity source trait
//! - `github` - GitHub contribution calendar source
//! - `guard` - Single-run guard
//! - `engine` - Batched sync engine
//! - `scheduler` - Background tasks for sync and snapshot regeneration

pub mod types;
pub mod config;
pub mod windows;
pub mod classifier;
pub mod db;
pub mod source;
pub mod github;
pub mod guard;
pub mod engine;
pub mod scheduler;

// Re-export commonly used types
pub use types::{ActivityCalendar, ActivityDay, DailyActivityRecord, EntityStatus, NewEntity, TrackedEntity};
pub use config::{ConfigError, RuntimeConfig, SyncConfig};
pub use windows::TrailingWindow;
pub use classifier::{classify, ClassificationThresholds};
pub use db::{BatchWriter, EntityStore, LedgerView, SqliteEntityStore, StoreError};
pub use source::{ActivitySource, FetchError};
pub use github::GithubContributionSource;
pub use guard::{SyncGuard, SyncPermit};
pub use engine::{SyncEngine, SyncError, SyncReport};
