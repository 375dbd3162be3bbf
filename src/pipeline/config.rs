//! Sync and runtime configuration from environment variables
//!
//! Loaded once at startup. Invalid values are fatal: the runtime must not
//! build a `SyncEngine` from a config that failed validation.

use std::env;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;
use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("Missing environment variable: {0}")]
    MissingVariable(String),

    #[error("Invalid value for {key}: {value:?} ({reason})")]
    InvalidValue {
        key: String,
        value: String,
        reason: String,
    },

    #[error(
        "PENDING_REMOVAL_DAYS ({pending_removal_days}) must be >= INACTIVE_DAYS ({inactive_days})"
    )]
    InvalidThresholds {
        inactive_days: u32,
        pending_removal_days: u32,
    },
}

/// Configuration for the sync engine
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SyncConfig {
    /// Entities per batch (one transaction per batch)
    pub batch_size: usize,

    /// Pause between batches in milliseconds (not applied after the last batch)
    pub batch_delay_ms: u64,

    /// Trailing window, in days, whose zero sum marks an entity inactive
    pub inactive_days: u32,

    /// Trailing window, in days, whose zero sum marks an entity for removal
    pub pending_removal_days: u32,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            batch_size: 50,
            batch_delay_ms: 5_000,
            inactive_days: 30,
            pending_removal_days: 60,
        }
    }
}

impl SyncConfig {
    /// Load configuration from environment variables
    ///
    /// Environment variables:
    /// - `SYNC_BATCH_SIZE` (default: 50)
    /// - `SYNC_BATCH_DELAY_MS` (default: 5000)
    /// - `INACTIVE_DAYS` (default: 30)
    /// - `PENDING_REMOVAL_DAYS` (default: 60)
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Load configuration through an arbitrary key lookup
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Self::default();

        let config = Self {
            batch_size: parse_or(&lookup, "SYNC_BATCH_SIZE", defaults.batch_size)?,
            batch_delay_ms: parse_or(&lookup, "SYNC_BATCH_DELAY_MS", defaults.batch_delay_ms)?,
            inactive_days: parse_or(&lookup, "INACTIVE_DAYS", defaults.inactive_days)?,
            pending_removal_days: parse_or(
                &lookup,
                "PENDING_REMOVAL_DAYS",
                defaults.pending_removal_days,
            )?,
        };

        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.batch_size == 0 {
            return Err(ConfigError::InvalidValue {
                key: "SYNC_BATCH_SIZE".to_string(),
                value: "0".to_string(),
                reason: "must be greater than zero".to_string(),
            });
        }

        if self.inactive_days == 0 {
            return Err(ConfigError::InvalidValue {
                key: "INACTIVE_DAYS".to_string(),
                value: "0".to_string(),
                reason: "must be greater than zero".to_string(),
            });
        }

        if self.pending_removal_days < self.inactive_days {
            return Err(ConfigError::InvalidThresholds {
                inactive_days: self.inactive_days,
                pending_removal_days: self.pending_removal_days,
            });
        }

        Ok(())
    }

    pub fn batch_delay(&self) -> Duration {
        Duration::from_millis(self.batch_delay_ms)
    }
}

/// Process-level settings for the runtime binary
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RuntimeConfig {
    pub db_path: PathBuf,
    /// Directory of `*.sql` migrations applied at startup when it exists
    pub schema_dir: String,
    pub github_token: String,
    /// How far back each fetch asks the activity source for days
    pub lookback_days: u32,
    pub sync_interval: Duration,
    pub snapshot_interval: Duration,
    pub snapshot_dir: Option<PathBuf>,
    pub sync: SyncConfig,
}

impl RuntimeConfig {
    /// Load configuration from environment variables
    ///
    /// Environment variables:
    /// - `ACTIVITY_DB_PATH` (default: activity.db)
    /// - `ACTIVITY_SCHEMA_DIR` (default: sql)
    /// - `GITHUB_TOKEN` (required)
    /// - `ACTIVITY_LOOKBACK_DAYS` (default: 365)
    /// - `SYNC_INTERVAL_SECS` (default: 86400)
    /// - `SNAPSHOT_INTERVAL_SECS` (default: 3600)
    /// - `SNAPSHOT_DIR` (optional)
    /// - everything `SyncConfig::from_env` reads
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let non_blank = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        let github_token = non_blank("GITHUB_TOKEN")
            .ok_or_else(|| ConfigError::MissingVariable("GITHUB_TOKEN".to_string()))?;

        let sync_interval_secs: u64 = parse_or(&lookup, "SYNC_INTERVAL_SECS", 86_400)?;
        let snapshot_interval_secs: u64 = parse_or(&lookup, "SNAPSHOT_INTERVAL_SECS", 3_600)?;
        for (key, secs) in [
            ("SYNC_INTERVAL_SECS", sync_interval_secs),
            ("SNAPSHOT_INTERVAL_SECS", snapshot_interval_secs),
        ] {
            if secs == 0 {
                return Err(ConfigError::InvalidValue {
                    key: key.to_string(),
                    value: "0".to_string(),
                    reason: "must be greater than zero".to_string(),
                });
            }
        }

        Ok(Self {
            db_path: PathBuf::from(
                non_blank("ACTIVITY_DB_PATH").unwrap_or_else(|| "activity.db".to_string()),
            ),
            schema_dir: non_blank("ACTIVITY_SCHEMA_DIR").unwrap_or_else(|| "sql".to_string()),
            github_token: github_token.trim().to_string(),
            lookback_days: parse_or(&lookup, "ACTIVITY_LOOKBACK_DAYS", 365)?,
            sync_interval: Duration::from_secs(sync_interval_secs),
            snapshot_interval: Duration::from_secs(snapshot_interval_secs),
            snapshot_dir: non_blank("SNAPSHOT_DIR").map(PathBuf::from),
            sync: SyncConfig::from_lookup(&lookup)?,
        })
    }
}

/// Parse an optional variable, falling back to `default` when unset or blank
pub(crate) fn parse_or<T, F>(lookup: &F, key: &str, default: T) -> Result<T, ConfigError>
where
    T: FromStr,
    T::Err: std::fmt::Display,
    F: Fn(&str) -> Option<String>,
{
    match lookup(key) {
        Some(raw) if !raw.trim().is_empty() => {
            raw.trim()
                .parse::<T>()
                .map_err(|e| ConfigError::InvalidValue {
                    key: key.to_string(),
                    value: raw.clone(),
                    reason: e.to_string(),
                })
        }
        _ => Ok(default),
    }
}
