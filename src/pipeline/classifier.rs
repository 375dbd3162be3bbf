//! Lifecycle classification from rolling-window sums
//!
//! Stateless: the status is recomputed from the ledger on every sync, so a
//! crashed run cannot leave a stale status behind.
//!
//! The classification deliberately uses fixed trailing windows. A single
//! contribution just outside a window boundary flips the status.

use super::config::SyncConfig;
use super::types::EntityStatus;
use super::windows::TrailingWindow;
use chrono::NaiveDate;

/// Classify an entity from its two window sums
///
/// - pending-removal window sum is zero → `PendingRemoval`
/// - otherwise inactive window sum is zero → `Inactive`
/// - otherwise → `Active`
pub fn classify(sum_pending_window: i64, sum_inactive_window: i64) -> EntityStatus {
    if sum_pending_window == 0 {
        EntityStatus::PendingRemoval
    } else if sum_inactive_window == 0 {
        EntityStatus::Inactive
    } else {
        EntityStatus::Active
    }
}

/// The two trailing windows used for classification
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ClassificationThresholds {
    inactive_days: u32,
    pending_removal_days: u32,
}

impl ClassificationThresholds {
    /// Thresholds from a validated config
    pub fn from_config(config: &SyncConfig) -> Self {
        Self {
            inactive_days: config.inactive_days,
            pending_removal_days: config.pending_removal_days,
        }
    }

    pub fn inactive_days(&self) -> u32 {
        self.inactive_days
    }

    pub fn pending_removal_days(&self) -> u32 {
        self.pending_removal_days
    }

    pub fn inactive_window(&self, today: NaiveDate) -> TrailingWindow {
        TrailingWindow::last_n_days(today, self.inactive_days)
    }

    pub fn pending_removal_window(&self, today: NaiveDate) -> TrailingWindow {
        TrailingWindow::last_n_days(today, self.pending_removal_days)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_classification_table() {
        assert_eq!(classify(0, 0), EntityStatus::PendingRemoval);
        assert_eq!(classify(3, 0), EntityStatus::Inactive);
        assert_eq!(classify(3, 1), EntityStatus::Active);
    }

    #[test]
    fn test_pending_window_dominates() {
        // An inconsistent pair still resolves by the pending window first
        assert_eq!(classify(0, 5), EntityStatus::PendingRemoval);
    }

    #[test]
    fn test_thresholds_follow_config() {
        let config = SyncConfig {
            inactive_days: 7,
            pending_removal_days: 21,
            ..SyncConfig::default()
        };
        let thresholds = ClassificationThresholds::from_config(&config);
        let today = NaiveDate::from_ymd_opt(2024, 6, 30).unwrap();

        assert_eq!(thresholds.inactive_days(), 7);
        assert_eq!(thresholds.pending_removal_days(), 21);
        assert_eq!(
            thresholds.inactive_window(today).start(),
            NaiveDate::from_ymd_opt(2024, 6, 24).unwrap()
        );
        assert_eq!(
            thresholds.pending_removal_window(today).start(),
            NaiveDate::from_ymd_opt(2024, 6, 10).unwrap()
        );

        let defaults = ClassificationThresholds::from_config(&SyncConfig::default());
        assert_eq!(
            defaults.inactive_window(today).start(),
            NaiveDate::from_ymd_opt(2024, 6, 1).unwrap()
        );
        assert_eq!(
            defaults.pending_removal_window(today).start(),
            NaiveDate::from_ymd_opt(2024, 5, 2).unwrap()
        );
        assert_eq!(defaults.inactive_window(today).len_days(), 30);
    }
}
