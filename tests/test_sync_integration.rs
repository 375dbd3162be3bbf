//! Integration tests for the sync engine against a file-backed SQLite store
//!
//! Tests drive `SyncEngine::run_full_sync` end to end with scripted
//! in-process activity sources:
//! - Classification of the reference scenarios
//! - Partial failure isolation across batches
//! - Idempotence of repeated runs
//! - Cancellation between batches and during a stalled fetch
//! - Store failure rollback of the in-flight batch
//! - Rejection of a concurrent run

#[cfg(test)]
mod sync_integration_tests {
    use activity_pulse::pipeline::{
        ActivityCalendar, ActivityDay, ActivitySource, EntityStatus, EntityStore, FetchError,
        NewEntity, SqliteEntityStore, SyncConfig, SyncEngine, SyncError,
    };
    use async_trait::async_trait;
    use chrono::{DateTime, Duration as ChronoDuration, NaiveDate, TimeZone, Utc};
    use rusqlite::Connection;
    use std::collections::HashMap;
    use std::sync::{Arc, Mutex};
    use std::time::Duration;
    use tempfile::TempDir;
    use tokio::sync::Notify;
    use tokio_util::sync::CancellationToken;

    fn fixed_now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 6, 30, 12, 0, 0).unwrap()
    }

    fn days_ago(n: i64) -> NaiveDate {
        fixed_now().date_naive() - ChronoDuration::days(n)
    }

    /// Scripted source: fixed calendars, unknown handles fail, and optionally
    /// cancels a token when a given handle is fetched
    struct ScriptedSource {
        calendars: HashMap<String, ActivityCalendar>,
        calls: Mutex<Vec<String>>,
        cancel_on: Option<(String, CancellationToken)>,
    }

    impl ScriptedSource {
        fn new(entries: Vec<(&str, Vec<ActivityDay>)>) -> Self {
            Self {
                calendars: entries
                    .into_iter()
                    .map(|(h, days)| (h.to_string(), ActivityCalendar::from_days(days)))
                    .collect(),
                calls: Mutex::new(Vec::new()),
                cancel_on: None,
            }
        }

        fn cancelling_on(mut self, handle: &str, token: CancellationToken) -> Self {
            self.cancel_on = Some((handle.to_string(), token));
            self
        }

        fn calls(&self) -> Vec<String> {
            self.calls.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl ActivitySource for ScriptedSource {
        async fn fetch(
            &self,
            handle: &str,
            _cancel: &CancellationToken,
        ) -> Result<ActivityCalendar, FetchError> {
            self.calls.lock().unwrap().push(handle.to_string());
            if let Some((trigger, token)) = &self.cancel_on {
                if trigger == handle {
                    token.cancel();
                }
            }
            self.calendars
                .get(handle)
                .cloned()
                .ok_or_else(|| FetchError::NotFound(handle.to_string()))
        }

        fn source_name(&self) -> &'static str {
            "scripted"
        }
    }

    fn temp_store() -> (TempDir, Arc<SqliteEntityStore>) {
        let dir = tempfile::tempdir().unwrap();
        let store = SqliteEntityStore::open(dir.path().join("activity.db")).unwrap();
        (dir, Arc::new(store))
    }

    fn seed(store: &SqliteEntityStore, handles: &[&str]) {
        for handle in handles {
            store.insert_entity(&NewEntity::new(*handle)).unwrap();
        }
    }

    fn engine(
        store: Arc<SqliteEntityStore>,
        source: Arc<dyn ActivitySource>,
        batch_size: usize,
    ) -> SyncEngine {
        let config = SyncConfig {
            batch_size,
            batch_delay_ms: 0,
            ..SyncConfig::default()
        };
        SyncEngine::new(store, source, config)
            .unwrap()
            .with_now_fn(Box::new(fixed_now))
    }

    fn status_of(store: &SqliteEntityStore, handle: &str) -> EntityStatus {
        store.find_entity_by_handle(handle).unwrap().unwrap().status
    }

    #[tokio::test]
    async fn test_reference_scenarios_classified() {
        let (_dir, store) = temp_store();
        seed(&store, &["alice", "bob", "carol"]);

        let source = Arc::new(ScriptedSource::new(vec![
            ("alice", vec![ActivityDay::new(days_ago(65), 1)]),
            ("bob", vec![ActivityDay::new(days_ago(45), 3)]),
            ("carol", vec![ActivityDay::new(days_ago(1), 1)]),
        ]));

        let report = engine(store.clone(), source, 50)
            .run_full_sync(&CancellationToken::new())
            .await
            .unwrap();

        assert_eq!(report.processed, 3);
        assert_eq!(report.failed, 0);
        assert!(!report.cancelled);

        assert_eq!(status_of(&store, "alice"), EntityStatus::PendingRemoval);
        assert_eq!(status_of(&store, "bob"), EntityStatus::Inactive);
        assert_eq!(status_of(&store, "carol"), EntityStatus::Active);

        let carol = store.find_entity_by_handle("carol").unwrap().unwrap();
        assert_eq!(
            carol.last_active.map(|t| t.date_naive()),
            Some(days_ago(1))
        );
    }

    #[tokio::test]
    async fn test_one_failed_fetch_is_isolated() {
        let (_dir, store) = temp_store();
        let handles = ["e1", "e2", "e3", "e4", "e5"];
        seed(&store, &handles);

        // e3 is unknown to the source
        let source = Arc::new(ScriptedSource::new(
            handles
                .iter()
                .filter(|h| **h != "e3")
                .map(|h| (*h, vec![ActivityDay::new(days_ago(2), 4)]))
                .collect(),
        ));

        let report = engine(store.clone(), source.clone(), 2)
            .run_full_sync(&CancellationToken::new())
            .await
            .unwrap();

        assert_eq!(report.processed, 4);
        assert_eq!(report.failed, 1);
        assert_eq!(source.calls(), handles.to_vec());

        for handle in ["e1", "e2", "e4", "e5"] {
            let entity = store.find_entity_by_handle(handle).unwrap().unwrap();
            assert_eq!(store.daily_records(entity.id).unwrap().len(), 1, "{}", handle);
        }
        let e3 = store.find_entity_by_handle("e3").unwrap().unwrap();
        assert!(store.daily_records(e3.id).unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_repeated_sync_is_idempotent() {
        let (_dir, store) = temp_store();
        seed(&store, &["alice", "bob"]);

        let source = Arc::new(ScriptedSource::new(vec![
            (
                "alice",
                vec![
                    ActivityDay::new(days_ago(3), 2),
                    ActivityDay::new(days_ago(2), 0),
                    ActivityDay::new(days_ago(1), 5),
                ],
            ),
            ("bob", vec![ActivityDay::new(days_ago(40), 1)]),
        ]));
        let engine = engine(store.clone(), source, 1);

        engine.run_full_sync(&CancellationToken::new()).await.unwrap();
        let entities_first = store.list_entities().unwrap();
        let ledger_first = store.load_ledger(days_ago(365)).unwrap();

        engine.run_full_sync(&CancellationToken::new()).await.unwrap();
        assert_eq!(store.list_entities().unwrap(), entities_first);
        assert_eq!(store.load_ledger(days_ago(365)).unwrap(), ledger_first);
        assert_eq!(ledger_first.records.len(), 4);
    }

    #[tokio::test]
    async fn test_negative_counts_stored_as_zero() {
        let (_dir, store) = temp_store();
        seed(&store, &["alice"]);

        let source = Arc::new(ScriptedSource::new(vec![(
            "alice",
            vec![ActivityDay::new(days_ago(1), -3)],
        )]));
        engine(store.clone(), source, 10)
            .run_full_sync(&CancellationToken::new())
            .await
            .unwrap();

        let alice = store.find_entity_by_handle("alice").unwrap().unwrap();
        let record = store.find_daily_record(alice.id, days_ago(1)).unwrap().unwrap();
        assert_eq!(record.count, 0);
        assert_eq!(alice.status, EntityStatus::PendingRemoval);
        assert_eq!(alice.last_active, None);
    }

    #[tokio::test]
    async fn test_cancellation_between_batches() {
        let (_dir, store) = temp_store();
        seed(&store, &["a1", "a2", "a3", "a4"]);

        let cancel = CancellationToken::new();
        let source = Arc::new(
            ScriptedSource::new(
                ["a1", "a2", "a3", "a4"]
                    .iter()
                    .map(|h| (*h, vec![ActivityDay::new(days_ago(1), 1)]))
                    .collect(),
            )
            .cancelling_on("a2", cancel.clone()),
        );

        let report = engine(store.clone(), source.clone(), 2)
            .run_full_sync(&cancel)
            .await
            .unwrap();

        assert!(report.cancelled);
        assert_eq!(report.processed, 2);
        assert_eq!(source.calls(), vec!["a1", "a2"]);

        // first batch committed intact, later batches untouched
        let a2 = store.find_entity_by_handle("a2").unwrap().unwrap();
        assert_eq!(store.daily_records(a2.id).unwrap().len(), 1);
        let a3 = store.find_entity_by_handle("a3").unwrap().unwrap();
        assert!(store.daily_records(a3.id).unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_cancellation_during_batch_pause() {
        let (_dir, store) = temp_store();
        seed(&store, &["a1", "a2"]);

        let source = Arc::new(ScriptedSource::new(vec![
            ("a1", vec![ActivityDay::new(days_ago(1), 1)]),
            ("a2", vec![ActivityDay::new(days_ago(1), 1)]),
        ]));
        let config = SyncConfig {
            batch_size: 1,
            batch_delay_ms: 60_000,
            ..SyncConfig::default()
        };
        let engine = SyncEngine::new(store, source.clone(), config)
            .unwrap()
            .with_now_fn(Box::new(fixed_now));

        let cancel = CancellationToken::new();
        let canceller = {
            let cancel = cancel.clone();
            tokio::spawn(async move {
                tokio::time::sleep(Duration::from_millis(50)).await;
                cancel.cancel();
            })
        };

        let report = tokio::time::timeout(Duration::from_secs(5), engine.run_full_sync(&cancel))
            .await
            .expect("pause should end on cancellation")
            .unwrap();
        canceller.await.unwrap();

        assert!(report.cancelled);
        assert_eq!(report.processed, 1);
        assert_eq!(source.calls(), vec!["a1"]);
    }

    /// Source whose fetch never completes, recording each handle it was asked for
    struct StalledSource {
        calls: Mutex<Vec<String>>,
    }

    #[async_trait]
    impl ActivitySource for StalledSource {
        async fn fetch(
            &self,
            handle: &str,
            _cancel: &CancellationToken,
        ) -> Result<ActivityCalendar, FetchError> {
            self.calls.lock().unwrap().push(handle.to_string());
            std::future::pending().await
        }

        fn source_name(&self) -> &'static str {
            "stalled"
        }
    }

    #[tokio::test]
    async fn test_cancellation_interrupts_stalled_fetch() {
        let (_dir, store) = temp_store();
        seed(&store, &["a1", "a2", "a3"]);

        let source = Arc::new(StalledSource {
            calls: Mutex::new(Vec::new()),
        });
        let engine = engine(store.clone(), source.clone(), 10);

        let cancel = CancellationToken::new();
        let canceller = {
            let cancel = cancel.clone();
            tokio::spawn(async move {
                tokio::time::sleep(Duration::from_millis(50)).await;
                cancel.cancel();
            })
        };

        let report = tokio::time::timeout(Duration::from_secs(5), engine.run_full_sync(&cancel))
            .await
            .expect("stalled fetch should end on cancellation")
            .unwrap();
        canceller.await.unwrap();

        assert!(report.cancelled);
        assert_eq!(report.failed, 1);
        assert_eq!(report.processed, 0);
        assert_eq!(source.calls.lock().unwrap().clone(), vec!["a1"]);

        let a1 = store.find_entity_by_handle("a1").unwrap().unwrap();
        assert!(store.daily_records(a1.id).unwrap().is_empty());
        assert!(!engine.guard().is_running());
    }

    #[tokio::test]
    async fn test_store_failure_rolls_back_in_flight_batch() {
        let (dir, store) = temp_store();
        seed(&store, &["alice", "bob", "carol", "dave", "erin"]);

        // Make every status update of dave fail
        let conn = Connection::open(dir.path().join("activity.db")).unwrap();
        conn.execute_batch(
            r#"
            CREATE TRIGGER reject_dave BEFORE UPDATE ON tracked_entities
            WHEN NEW.handle = 'dave'
            BEGIN
                SELECT RAISE(ABORT, 'dave is read-only');
            END;
            "#,
        )
        .unwrap();
        drop(conn);

        let source = Arc::new(ScriptedSource::new(
            ["alice", "bob", "carol", "dave", "erin"]
                .iter()
                .map(|h| (*h, vec![ActivityDay::new(days_ago(1), 2)]))
                .collect(),
        ));

        let err = engine(store.clone(), source.clone(), 2)
            .run_full_sync(&CancellationToken::new())
            .await
            .unwrap_err();

        let partial = *err.partial_report().expect("store failure carries a partial report");
        assert!(matches!(err, SyncError::StoreWrite { .. }));
        assert_eq!(partial.processed, 2);
        assert_eq!(partial.failed, 0);
        assert!(!source.calls().contains(&"erin".to_string()));

        // batch 1 durable
        let bob = store.find_entity_by_handle("bob").unwrap().unwrap();
        assert_eq!(store.daily_records(bob.id).unwrap().len(), 1);
        assert!(bob.last_active.is_some());

        // batch 2 (carol, dave) rolled back as a whole
        let carol = store.find_entity_by_handle("carol").unwrap().unwrap();
        assert!(store.daily_records(carol.id).unwrap().is_empty());
        assert!(carol.last_active.is_none());
    }

    /// Source that blocks every fetch until released
    struct GatedSource {
        started: Notify,
        release: Notify,
    }

    #[async_trait]
    impl ActivitySource for GatedSource {
        async fn fetch(
            &self,
            _handle: &str,
            _cancel: &CancellationToken,
        ) -> Result<ActivityCalendar, FetchError> {
            self.started.notify_one();
            self.release.notified().await;
            Ok(ActivityCalendar::default())
        }

        fn source_name(&self) -> &'static str {
            "gated"
        }
    }

    #[tokio::test]
    async fn test_concurrent_run_rejected() {
        let (_dir, store) = temp_store();
        seed(&store, &["alice"]);

        let source = Arc::new(GatedSource {
            started: Notify::new(),
            release: Notify::new(),
        });
        let engine = Arc::new(engine(store, source.clone(), 10));

        let first = {
            let engine = engine.clone();
            tokio::spawn(async move { engine.run_full_sync(&CancellationToken::new()).await })
        };
        source.started.notified().await;

        let second = engine.run_full_sync(&CancellationToken::new()).await;
        assert!(matches!(second, Err(SyncError::AlreadyRunning)));
        assert!(engine.guard().is_running());

        source.release.notify_one();
        let report = first.await.unwrap().unwrap();
        assert_eq!(report.processed, 1);
        assert!(!engine.guard().is_running());
    }
}
