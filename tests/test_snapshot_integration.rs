//! Integration tests for the snapshot cache reading a store written by the
//! sync engine through a separate read-only connection

#[cfg(test)]
mod snapshot_integration_tests {
    use activity_pulse::pipeline::{
        ActivityCalendar, ActivityDay, ActivitySource, EntityStore, FetchError, NewEntity,
        SqliteEntityStore, SyncConfig, SyncEngine,
    };
    use activity_pulse::snapshot::{JsonRenderer, SnapshotCache, SnapshotKey};
    use async_trait::async_trait;
    use chrono::{DateTime, Duration as ChronoDuration, NaiveDate, TimeZone, Utc};
    use std::sync::Arc;
    use tokio_util::sync::CancellationToken;

    fn fixed_now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 6, 30, 12, 0, 0).unwrap()
    }

    fn days_ago(n: i64) -> NaiveDate {
        fixed_now().date_naive() - ChronoDuration::days(n)
    }

    /// Every handle gets the same calendar
    struct UniformSource {
        days: Vec<ActivityDay>,
    }

    #[async_trait]
    impl ActivitySource for UniformSource {
        async fn fetch(
            &self,
            _handle: &str,
            _cancel: &CancellationToken,
        ) -> Result<ActivityCalendar, FetchError> {
            Ok(ActivityCalendar::from_days(self.days.clone()))
        }

        fn source_name(&self) -> &'static str {
            "uniform"
        }
    }

    fn json(blob: &[u8]) -> serde_json::Value {
        serde_json::from_slice(blob).unwrap()
    }

    #[tokio::test]
    async fn test_trend_snapshot_lifecycle() {
        let dir = tempfile::tempdir().unwrap();
        let db_path = dir.path().join("activity.db");

        let writer = Arc::new(SqliteEntityStore::open(&db_path).unwrap());
        for handle in ["alice", "bob", "carol"] {
            writer.insert_entity(&NewEntity::new(handle)).unwrap();
        }

        let reader: Arc<dyn EntityStore> = Arc::new(SqliteEntityStore::open_reader(&db_path).unwrap());
        let cache = SnapshotCache::new(reader, Arc::new(JsonRenderer::new()))
            .with_now_fn(Box::new(fixed_now));

        // never generated
        assert!(cache.get_snapshot("trend", "7d").is_none());

        let source = Arc::new(UniformSource {
            days: vec![
                ActivityDay::new(days_ago(1), 2),
                ActivityDay::new(days_ago(9), 1),
            ],
        });
        let config = SyncConfig {
            batch_delay_ms: 0,
            ..SyncConfig::default()
        };
        SyncEngine::new(writer, source, config)
            .unwrap()
            .with_now_fn(Box::new(fixed_now))
            .run_full_sync(&CancellationToken::new())
            .await
            .unwrap();

        let report = cache.regenerate(&CancellationToken::new()).await.unwrap();
        assert_eq!(report.generated, SnapshotKey::catalog().len());
        assert_eq!(report.failed, 0);

        let first = cache.get_snapshot("trend", "7d").unwrap();
        assert!(!first.is_empty());
        let second = cache.get_snapshot("trend", "7d").unwrap();
        assert_eq!(first, second);

        let trend = json(&first);
        assert_eq!(trend["has_data"], true);
        assert_eq!(trend["data"]["current_total"], 6);
        assert_eq!(trend["data"]["previous_total"], 3);
        assert_eq!(trend["data"]["current_active_entities"], 3);

        let status = json(&cache.get_snapshot("status", "30d").unwrap());
        assert_eq!(status["data"]["active"], 3);
        assert_eq!(status["data"]["total_entities"], 3);
    }

    #[tokio::test]
    async fn test_reader_cannot_write() {
        let dir = tempfile::tempdir().unwrap();
        let db_path = dir.path().join("activity.db");
        SqliteEntityStore::open(&db_path).unwrap();

        let reader = SqliteEntityStore::open_reader(&db_path).unwrap();
        assert!(reader.insert_entity(&NewEntity::new("mallory")).is_err());
    }

    #[tokio::test]
    async fn test_persisted_snapshots_survive_restart() {
        let dir = tempfile::tempdir().unwrap();
        let db_path = dir.path().join("activity.db");
        let snapshot_dir = dir.path().join("snapshots");

        let writer = SqliteEntityStore::open(&db_path).unwrap();
        writer.insert_entity(&NewEntity::new("alice")).unwrap();

        let reader: Arc<dyn EntityStore> = Arc::new(SqliteEntityStore::open_reader(&db_path).unwrap());
        let cache = SnapshotCache::new(reader.clone(), Arc::new(JsonRenderer::pretty()))
            .with_persist_dir(&snapshot_dir)
            .with_now_fn(Box::new(fixed_now));
        cache.regenerate(&CancellationToken::new()).await.unwrap();

        let files = std::fs::read_dir(&snapshot_dir).unwrap().count();
        assert_eq!(files, 12);

        let restarted = SnapshotCache::new(reader, Arc::new(JsonRenderer::pretty()))
            .with_persist_dir(&snapshot_dir);
        assert_eq!(restarted.warm_from_dir().unwrap(), 12);
        assert_eq!(
            restarted.get_snapshot("distribution", "30d"),
            cache.get_snapshot("distribution", "30d")
        );
    }
}
