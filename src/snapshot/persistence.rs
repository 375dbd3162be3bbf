//! Snapshot blob files
//!
//! One file per catalog key, laid out as `<dir>/<view>_<window>.bin`
//! (for example `trend_7d.bin`). Each write goes to a temp file in the same
//! directory and is renamed over the target, so readers never see a torn blob.
//! Files whose names do not parse as a catalog key are skipped on load.

use super::views::SnapshotKey;
use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use tempfile::NamedTempFile;

/// File holding the blob of `key` inside `dir`
pub fn snapshot_path(dir: &Path, key: SnapshotKey) -> PathBuf {
    dir.join(format!("{}.bin", key))
}

/// Write a snapshot blob atomically
///
/// The blob goes to a temp file in the same directory which is then renamed
/// over the target, so readers never see a half-written file.
pub fn save_snapshot(dir: &Path, key: SnapshotKey, bytes: &[u8]) -> io::Result<PathBuf> {
    fs::create_dir_all(dir)?;

    let path = snapshot_path(dir, key);
    let mut tmp = NamedTempFile::new_in(dir)?;
    tmp.write_all(bytes)?;
    tmp.as_file().sync_all()?;
    tmp.persist(&path).map_err(|e| e.error)?;

    log::debug!("Saved snapshot {} ({} bytes) to {}", key, bytes.len(), path.display());
    Ok(path)
}

/// Load every snapshot blob found in `dir`
///
/// Files that are not named after a catalog key, and empty files, are skipped.
pub fn load_snapshots(dir: &Path) -> io::Result<Vec<(SnapshotKey, Vec<u8>)>> {
    if !dir.exists() {
        log::info!("No existing snapshot directory found: {}", dir.display());
        return Ok(Vec::new());
    }

    let mut loaded = Vec::new();
    for entry in fs::read_dir(dir)? {
        let path = entry?.path();
        if path.extension().and_then(|e| e.to_str()) != Some("bin") {
            continue;
        }

        let Some(key) = path
            .file_stem()
            .and_then(|s| s.to_str())
            .and_then(|s| s.parse::<SnapshotKey>().ok())
        else {
            log::warn!("⚠️  Ignoring unrecognised snapshot file {}", path.display());
            continue;
        };

        let bytes = fs::read(&path)?;
        if bytes.is_empty() {
            log::warn!("⚠️  Ignoring empty snapshot file {}", path.display());
            continue;
        }
        loaded.push((key, bytes));
    }

    log::info!("Loaded {} snapshots from {}", loaded.len(), dir.display());
    Ok(loaded)
}
