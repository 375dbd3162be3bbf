//! Core data structures shared by the sync engine, the store and the snapshot cache
//!
//! All types mirror the SQL schema in `/sql/`:
//! - `tracked_entities` → `TrackedEntity`
//! - `daily_activity` → `DailyActivityRecord`

use chrono::{DateTime, NaiveDate, TimeZone, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// Lifecycle status of a tracked entity
///
/// Stored as upper-case text (`ACTIVE`, `INACTIVE`, `PENDING_REMOVAL`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum EntityStatus {
    Active,
    Inactive,
    PendingRemoval,
}

impl EntityStatus {
    pub const ALL: [EntityStatus; 3] = [
        EntityStatus::Active,
        EntityStatus::Inactive,
        EntityStatus::PendingRemoval,
    ];

    /// Convert to database string representation
    pub fn as_str(&self) -> &'static str {
        match self {
            EntityStatus::Active => "ACTIVE",
            EntityStatus::Inactive => "INACTIVE",
            EntityStatus::PendingRemoval => "PENDING_REMOVAL",
        }
    }

    /// Human-readable label for consumers that print statuses
    pub fn label(&self) -> &'static str {
        match self {
            EntityStatus::Active => "active",
            EntityStatus::Inactive => "inactive",
            EntityStatus::PendingRemoval => "pending removal",
        }
    }
}

impl fmt::Display for EntityStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("unknown entity status: {0}")]
pub struct UnknownStatus(pub String);

impl FromStr for EntityStatus {
    type Err = UnknownStatus;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "ACTIVE" => Ok(EntityStatus::Active),
            "INACTIVE" => Ok(EntityStatus::Inactive),
            "PENDING_REMOVAL" => Ok(EntityStatus::PendingRemoval),
            other => Err(UnknownStatus(other.to_string())),
        }
    }
}

/// A tracked entity row
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TrackedEntity {
    pub id: i64,
    /// External handle, unique across entities (e.g. a GitHub login)
    pub handle: String,
    pub display_name: Option<String>,
    pub contact: Option<String>,
    /// Midnight UTC of the most recent day with activity, once known
    pub last_active: Option<DateTime<Utc>>,
    pub status: EntityStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Fields supplied by the import surface when a new entity is registered
#[derive(Debug, Clone, Default)]
pub struct NewEntity {
    pub handle: String,
    pub display_name: Option<String>,
    pub contact: Option<String>,
}

impl NewEntity {
    pub fn new(handle: impl Into<String>) -> Self {
        Self {
            handle: handle.into(),
            ..Self::default()
        }
    }

    pub fn with_display_name(mut self, name: impl Into<String>) -> Self {
        self.display_name = Some(name.into());
        self
    }

    pub fn with_contact(mut self, contact: impl Into<String>) -> Self {
        self.contact = Some(contact.into());
        self
    }
}

/// One ledger row: the activity count of an entity on a UTC day
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DailyActivityRecord {
    pub entity_id: i64,
    pub date: NaiveDate,
    pub count: i64,
}

/// A single day as reported by an activity source
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActivityDay {
    pub date: NaiveDate,
    pub count: i64,
}

impl ActivityDay {
    pub fn new(date: NaiveDate, count: i64) -> Self {
        Self { date, count }
    }
}

/// Bounded time series returned by an activity source for one handle
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActivityCalendar {
    pub total_count: i64,
    pub days: Vec<ActivityDay>,
}

impl ActivityCalendar {
    /// Build a calendar from days, deriving the total from the counts
    pub fn from_days(days: Vec<ActivityDay>) -> Self {
        let total_count = days.iter().map(|d| d.count.max(0)).sum();
        Self { total_count, days }
    }

    /// Most recent date with a positive count, if any
    pub fn latest_active_date(&self) -> Option<NaiveDate> {
        self.days
            .iter()
            .filter(|d| d.count > 0)
            .map(|d| d.date)
            .max()
    }
}

/// Midnight UTC of a calendar date
pub fn start_of_day(date: NaiveDate) -> DateTime<Utc> {
    Utc.from_utc_datetime(&date.and_time(chrono::NaiveTime::MIN))
}

/// Convert a stored unix timestamp back into a UTC datetime
///
/// Out-of-range values collapse to the epoch rather than failing the row.
pub fn from_unix(ts: i64) -> DateTime<Utc> {
    DateTime::<Utc>::from_timestamp(ts, 0).unwrap_or(DateTime::<Utc>::UNIX_EPOCH)
}
