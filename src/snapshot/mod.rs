//! # Snapshot Cache
//!
//! Pre-renders a fixed catalog of aggregate views (view × window) from the
//! activity ledger so reads are a map lookup. Blobs are regenerated on a
//! schedule or on demand, and optionally persisted to a directory so a
//! restarted process can serve them before its first regeneration.
//!
//! - `views` - Catalog keys and view computation
//! - `render` - Renderer trait and the JSON renderer
//! - `cache` - In-memory cache and regeneration
//! - `persistence` - Atomic blob files

pub mod views;
pub mod render;
pub mod cache;
pub mod persistence;

pub use views::{compute_view, SnapshotKey, SnapshotWindow, ViewData, ViewName};
pub use render::{JsonRenderer, RenderError, SnapshotRenderer};
pub use cache::{RegenerationReport, SnapshotCache, SnapshotError};
