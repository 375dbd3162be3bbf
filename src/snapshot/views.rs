//! Snapshot catalog and view computation
//!
//! The catalog is fixed: every `ViewName` × every `SnapshotWindow`. Each view
//! is computed from one `LedgerView` read and never fails; with no entities or
//! no records it produces a view with `has_data = false`.

use crate::pipeline::db::LedgerView;
use crate::pipeline::types::{DailyActivityRecord, EntityStatus};
use crate::pipeline::windows::TrailingWindow;
use chrono::{Duration, NaiveDate};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// Distribution histogram buckets: (label, min, max inclusive)
const DISTRIBUTION_BUCKETS: [(&str, i64, Option<i64>); 4] = [
    ("0", 0, Some(0)),
    ("1-5", 1, Some(5)),
    ("6-20", 6, Some(20)),
    ("21+", 21, None),
];

const TOP_ENTITIES: usize = 10;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ViewName {
    Activity,
    Distribution,
    Trend,
    StatusBreakdown,
}

impl ViewName {
    pub const ALL: [ViewName; 4] = [
        ViewName::Activity,
        ViewName::Distribution,
        ViewName::Trend,
        ViewName::StatusBreakdown,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            ViewName::Activity => "activity",
            ViewName::Distribution => "distribution",
            ViewName::Trend => "trend",
            ViewName::StatusBreakdown => "status-breakdown",
        }
    }
}

impl fmt::Display for ViewName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SnapshotWindow {
    #[serde(rename = "1d")]
    Day,
    #[serde(rename = "7d")]
    Week,
    #[serde(rename = "30d")]
    Month,
}

impl SnapshotWindow {
    pub const ALL: [SnapshotWindow; 3] = [
        SnapshotWindow::Day,
        SnapshotWindow::Week,
        SnapshotWindow::Month,
    ];

    pub fn days(&self) -> u32 {
        match self {
            SnapshotWindow::Day => 1,
            SnapshotWindow::Week => 7,
            SnapshotWindow::Month => 30,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            SnapshotWindow::Day => "1d",
            SnapshotWindow::Week => "7d",
            SnapshotWindow::Month => "30d",
        }
    }

    /// The window's dates ending at `today`
    pub fn trailing(&self, today: NaiveDate) -> TrailingWindow {
        TrailingWindow::last_n_days(today, self.days())
    }
}

impl fmt::Display for SnapshotWindow {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("unknown snapshot key: {0}")]
pub struct UnknownSnapshotKey(pub String);

impl FromStr for ViewName {
    type Err = UnknownSnapshotKey;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "activity" => Ok(ViewName::Activity),
            "distribution" => Ok(ViewName::Distribution),
            "trend" => Ok(ViewName::Trend),
            "status-breakdown" | "status_breakdown" | "status" => Ok(ViewName::StatusBreakdown),
            _ => Err(UnknownSnapshotKey(s.to_string())),
        }
    }
}

impl FromStr for SnapshotWindow {
    type Err = UnknownSnapshotKey;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "1d" | "1" => Ok(SnapshotWindow::Day),
            "7d" | "7" => Ok(SnapshotWindow::Week),
            "30d" | "30" => Ok(SnapshotWindow::Month),
            _ => Err(UnknownSnapshotKey(s.to_string())),
        }
    }
}

/// Cache key: one view over one window
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SnapshotKey {
    pub view: ViewName,
    pub window: SnapshotWindow,
}

impl SnapshotKey {
    pub fn new(view: ViewName, window: SnapshotWindow) -> Self {
        Self { view, window }
    }

    /// Every key the cache regenerates, in a fixed order
    pub fn catalog() -> Vec<SnapshotKey> {
        ViewName::ALL
            .iter()
            .flat_map(|view| {
                SnapshotWindow::ALL
                    .iter()
                    .map(move |window| SnapshotKey::new(*view, *window))
            })
            .collect()
    }
}

impl fmt::Display for SnapshotKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}_{}", self.view, self.window)
    }
}

impl FromStr for SnapshotKey {
    type Err = UnknownSnapshotKey;

    /// Parses the `Display` form, e.g. `trend_7d`
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (view, window) = s
            .rsplit_once('_')
            .ok_or_else(|| UnknownSnapshotKey(s.to_string()))?;
        Ok(SnapshotKey::new(view.parse()?, window.parse()?))
    }
}

/// Oldest ledger date any catalog view needs, given `today`
///
/// The trend view compares the window with the one before it, so the
/// longest window is read twice over.
pub fn ledger_since(today: NaiveDate) -> NaiveDate {
    let longest = SnapshotWindow::ALL
        .iter()
        .map(|w| w.days())
        .max()
        .unwrap_or(1);
    today - Duration::days(i64::from(longest) * 2 - 1)
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DailyTotal {
    pub date: NaiveDate,
    pub total: i64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActivityView {
    pub has_data: bool,
    pub start: NaiveDate,
    pub end: NaiveDate,
    pub total: i64,
    pub daily: Vec<DailyTotal>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DistributionBucket {
    pub label: String,
    pub min: i64,
    pub max: Option<i64>,
    pub entities: usize,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EntityTotal {
    pub handle: String,
    pub total: i64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DistributionView {
    pub has_data: bool,
    pub buckets: Vec<DistributionBucket>,
    pub top: Vec<EntityTotal>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrendView {
    pub has_data: bool,
    pub current_total: i64,
    pub previous_total: i64,
    pub delta: i64,
    /// `None` when the previous window had no activity
    pub percent_change: Option<f64>,
    pub current_active_entities: usize,
    pub previous_active_entities: usize,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatusBreakdownView {
    pub has_data: bool,
    pub total_entities: usize,
    pub active: usize,
    pub inactive: usize,
    pub pending_removal: usize,
    /// Entities with a positive count somewhere in the window
    pub active_in_window: usize,
}

/// Aggregated data handed to the renderer
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "kebab-case")]
pub enum ViewData {
    Activity(ActivityView),
    Distribution(DistributionView),
    Trend(TrendView),
    StatusBreakdown(StatusBreakdownView),
}

impl ViewData {
    pub fn has_data(&self) -> bool {
        match self {
            ViewData::Activity(v) => v.has_data,
            ViewData::Distribution(v) => v.has_data,
            ViewData::Trend(v) => v.has_data,
            ViewData::StatusBreakdown(v) => v.has_data,
        }
    }
}

fn records_in<'a>(
    ledger: &'a LedgerView,
    window: TrailingWindow,
) -> impl Iterator<Item = &'a DailyActivityRecord> + 'a {
    ledger.records.iter().filter(move |r| window.contains(r.date))
}

/// Per-entity totals over the window (entities without records included as 0)
fn entity_totals(ledger: &LedgerView, window: TrailingWindow) -> HashMap<i64, i64> {
    let mut totals: HashMap<i64, i64> = ledger.entities.iter().map(|e| (e.id, 0)).collect();
    for record in records_in(ledger, window) {
        *totals.entry(record.entity_id).or_insert(0) += record.count;
    }
    totals
}

fn active_entities(ledger: &LedgerView, window: TrailingWindow) -> usize {
    entity_totals(ledger, window)
        .values()
        .filter(|total| **total > 0)
        .count()
}

fn activity_view(ledger: &LedgerView, window: TrailingWindow) -> ActivityView {
    let mut per_day: HashMap<NaiveDate, i64> = HashMap::new();
    let mut has_data = false;
    for record in records_in(ledger, window) {
        has_data = true;
        *per_day.entry(record.date).or_insert(0) += record.count;
    }

    let daily: Vec<DailyTotal> = window
        .dates()
        .map(|date| DailyTotal {
            date,
            total: per_day.get(&date).copied().unwrap_or(0),
        })
        .collect();

    ActivityView {
        has_data,
        start: window.start(),
        end: window.end(),
        total: daily.iter().map(|d| d.total).sum(),
        daily,
    }
}

fn distribution_view(ledger: &LedgerView, window: TrailingWindow) -> DistributionView {
    let totals = entity_totals(ledger, window);

    let buckets = DISTRIBUTION_BUCKETS
        .iter()
        .map(|(label, min, max)| DistributionBucket {
            label: label.to_string(),
            min: *min,
            max: *max,
            entities: totals
                .values()
                .filter(|t| **t >= *min && max.map_or(true, |m| **t <= m))
                .count(),
        })
        .collect();

    let mut top: Vec<EntityTotal> = ledger
        .entities
        .iter()
        .filter_map(|entity| {
            let total = totals.get(&entity.id).copied().unwrap_or(0);
            (total > 0).then(|| EntityTotal {
                handle: entity.handle.clone(),
                total,
            })
        })
        .collect();
    top.sort_by(|a, b| b.total.cmp(&a.total).then_with(|| a.handle.cmp(&b.handle)));
    top.truncate(TOP_ENTITIES);

    DistributionView {
        has_data: !ledger.entities.is_empty(),
        buckets,
        top,
    }
}

fn trend_view(ledger: &LedgerView, window: TrailingWindow) -> TrendView {
    let previous = window.preceding();
    let current_total = window.sum(&ledger.records);
    let previous_total = previous.sum(&ledger.records);

    let percent_change = (previous_total != 0)
        .then(|| (current_total - previous_total) as f64 / previous_total as f64 * 100.0);

    TrendView {
        has_data: records_in(ledger, window).next().is_some()
            || records_in(ledger, previous).next().is_some(),
        current_total,
        previous_total,
        delta: current_total - previous_total,
        percent_change,
        current_active_entities: active_entities(ledger, window),
        previous_active_entities: active_entities(ledger, previous),
    }
}

fn status_breakdown_view(ledger: &LedgerView, window: TrailingWindow) -> StatusBreakdownView {
    let count = |status: EntityStatus| {
        ledger
            .entities
            .iter()
            .filter(|e| e.status == status)
            .count()
    };

    StatusBreakdownView {
        has_data: !ledger.entities.is_empty(),
        total_entities: ledger.entities.len(),
        active: count(EntityStatus::Active),
        inactive: count(EntityStatus::Inactive),
        pending_removal: count(EntityStatus::PendingRemoval),
        active_in_window: active_entities(ledger, window),
    }
}

/// Compute the aggregated data for one catalog key
pub fn compute_view(key: SnapshotKey, ledger: &LedgerView, today: NaiveDate) -> ViewData {
    let window = key.window.trailing(today);
    match key.view {
        ViewName::Activity => ViewData::Activity(activity_view(ledger, window)),
        ViewName::Distribution => ViewData::Distribution(distribution_view(ledger, window)),
        ViewName::Trend => ViewData::Trend(trend_view(ledger, window)),
        ViewName::StatusBreakdown => {
            ViewData::StatusBreakdown(status_breakdown_view(ledger, window))
        }
    }
}
