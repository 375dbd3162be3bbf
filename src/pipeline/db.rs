//! Entity store: tracked entities plus the per-day activity ledger
//!
//! Tables (see `/sql/` directory):
//! - `tracked_entities` - one row per entity, UPDATE only from the sync engine
//! - `daily_activity` - UPSERT on (entity_id, date), last write wins
//!
//! The sync engine is the only writer. Every batch of entities is written
//! through one `BatchWriter`, which is a single SQLite transaction: commit makes
//! the whole batch durable, dropping it uncommitted rolls the whole batch back.

use super::types::{
    from_unix, DailyActivityRecord, EntityStatus, NewEntity, TrackedEntity,
};
use crate::sqlite_pragma::apply_optimized_pragmas;
use chrono::{NaiveDate, Utc};
use rusqlite::{params, Connection, OptionalExtension, Row};
use std::collections::HashMap;
use std::fs;
use std::path::Path;
use std::sync::{Mutex, MutexGuard};
use thiserror::Error;

/// Schema bundled into the binary, identical to the files under `/sql/`
const EMBEDDED_SCHEMA: [(&str, &str); 2] = [
    (
        "00_tracked_entities.sql",
        include_str!("../../sql/00_tracked_entities.sql"),
    ),
    (
        "01_daily_activity.sql",
        include_str!("../../sql/01_daily_activity.sql"),
    ),
];

const ENTITY_COLUMNS: &str =
    "id, handle, display_name, contact, last_active, status, created_at, updated_at";

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Schema directory not found: {0}")]
    SchemaNotFound(String),

    #[error("Entity {0} does not exist")]
    EntityNotFound(i64),

    #[error("Database connection lock poisoned")]
    LockPoisoned,
}

/// Point-in-time read of the store used by the snapshot cache
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LedgerView {
    /// All entities, ordered by handle
    pub entities: Vec<TrackedEntity>,
    /// Ledger rows on or after the requested date
    pub records: Vec<DailyActivityRecord>,
}

impl LedgerView {
    pub fn is_empty(&self) -> bool {
        self.entities.is_empty() && self.records.is_empty()
    }
}

/// One transaction's worth of writes
///
/// Reads issued through the writer see its own uncommitted rows.
pub trait BatchWriter {
    /// Insert the record, or overwrite the count of the existing (entity_id, date) row
    fn upsert_daily_record(
        &mut self,
        entity_id: i64,
        date: NaiveDate,
        count: i64,
    ) -> Result<(), StoreError>;

    fn find_daily_record(
        &mut self,
        entity_id: i64,
        date: NaiveDate,
    ) -> Result<Option<DailyActivityRecord>, StoreError>;

    /// Sum of counts for the entity between `from` and `to`, both inclusive
    fn activity_sum(
        &mut self,
        entity_id: i64,
        from: NaiveDate,
        to: NaiveDate,
    ) -> Result<i64, StoreError>;

    /// Persist status, last_active and updated_at of an existing entity
    fn save_entity(&mut self, entity: &TrackedEntity) -> Result<(), StoreError>;

    /// Make every write of this batch durable
    fn commit(self: Box<Self>) -> Result<(), StoreError>;
}

/// Storage contract used by the sync engine and the snapshot cache
pub trait EntityStore: Send + Sync {
    /// All entities ordered by handle
    fn list_entities(&self) -> Result<Vec<TrackedEntity>, StoreError>;

    fn find_daily_record(
        &self,
        entity_id: i64,
        date: NaiveDate,
    ) -> Result<Option<DailyActivityRecord>, StoreError>;

    /// Open a write transaction
    fn begin_batch(&self) -> Result<Box<dyn BatchWriter + '_>, StoreError>;

    /// Entities plus ledger rows dated on or after `since`, read as one consistent view
    fn load_ledger(&self, since: NaiveDate) -> Result<LedgerView, StoreError>;

    /// Single upsert committed on its own
    fn upsert_daily_record(
        &self,
        entity_id: i64,
        date: NaiveDate,
        count: i64,
    ) -> Result<(), StoreError> {
        let mut batch = self.begin_batch()?;
        batch.upsert_daily_record(entity_id, date, count)?;
        batch.commit()
    }

    /// Single entity save committed on its own
    fn save_entity(&self, entity: &TrackedEntity) -> Result<(), StoreError> {
        let mut batch = self.begin_batch()?;
        batch.save_entity(entity)?;
        batch.commit()
    }
}

/// Run schema migrations from SQL files
///
/// Reads all .sql files from the specified directory and executes them in
/// filename order. All SQL files must use "IF NOT EXISTS" clauses for
/// idempotency; only additive migrations belong there.
pub fn run_schema_migrations(conn: &mut Connection, schema_dir: &str) -> Result<(), StoreError> {
    let schema_path = Path::new(schema_dir);

    if !schema_path.exists() {
        return Err(StoreError::SchemaNotFound(schema_dir.to_string()));
    }

    let mut sql_files: Vec<_> = fs::read_dir(schema_path)?
        .filter_map(|entry| entry.ok())
        .filter(|entry| entry.path().extension().and_then(|s| s.to_str()) == Some("sql"))
        .collect();

    sql_files.sort_by_key(|entry| entry.file_name());

    log::info!("🔧 Running schema migrations from: {}", schema_dir);

    for entry in sql_files {
        let path = entry.path();
        let filename = entry.file_name().to_string_lossy().into_owned();

        log::info!("   ├─ Executing: {}", filename);
        let sql_content = fs::read_to_string(&path)?;
        conn.execute_batch(&sql_content)?;
    }

    log::info!("✅ All schema migrations completed successfully");

    Ok(())
}

fn apply_embedded_schema(conn: &Connection) -> Result<(), StoreError> {
    for (name, sql) in EMBEDDED_SCHEMA {
        log::debug!("Applying embedded schema {}", name);
        conn.execute_batch(sql)?;
    }
    Ok(())
}

fn entity_from_row(row: &Row<'_>) -> rusqlite::Result<TrackedEntity> {
    let status_text: String = row.get(5)?;
    let status = status_text.parse::<EntityStatus>().map_err(|e| {
        rusqlite::Error::FromSqlConversionFailure(5, rusqlite::types::Type::Text, Box::new(e))
    })?;

    Ok(TrackedEntity {
        id: row.get(0)?,
        handle: row.get(1)?,
        display_name: row.get(2)?,
        contact: row.get(3)?,
        last_active: row.get::<_, Option<i64>>(4)?.map(from_unix),
        status,
        created_at: from_unix(row.get(6)?),
        updated_at: from_unix(row.get(7)?),
    })
}

fn record_from_row(row: &Row<'_>) -> rusqlite::Result<DailyActivityRecord> {
    Ok(DailyActivityRecord {
        entity_id: row.get(0)?,
        date: row.get(1)?,
        count: row.get(2)?,
    })
}

fn select_entities(conn: &Connection) -> rusqlite::Result<Vec<TrackedEntity>> {
    let mut stmt = conn.prepare_cached(&format!(
        "SELECT {} FROM tracked_entities ORDER BY handle ASC",
        ENTITY_COLUMNS
    ))?;
    let entities = stmt
        .query_map([], entity_from_row)?
        .collect::<rusqlite::Result<Vec<_>>>()?;
    Ok(entities)
}

fn select_daily_record(
    conn: &Connection,
    entity_id: i64,
    date: NaiveDate,
) -> rusqlite::Result<Option<DailyActivityRecord>> {
    conn.query_row(
        "SELECT entity_id, date, count FROM daily_activity WHERE entity_id = ?1 AND date = ?2",
        params![entity_id, date],
        record_from_row,
    )
    .optional()
}

/// SQLite implementation of `EntityStore`
///
/// The connection sits behind a mutex; a `BatchWriter` holds the lock for the
/// lifetime of its transaction.
pub struct SqliteEntityStore {
    conn: Mutex<Connection>,
}

impl SqliteEntityStore {
    /// Open (or create) the database file and apply the bundled schema
    pub fn open(db_path: impl AsRef<Path>) -> Result<Self, StoreError> {
        if let Some(parent) = db_path.as_ref().parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)?;
            }
        }

        let conn = Connection::open(db_path.as_ref())?;
        apply_optimized_pragmas(&conn)?;
        apply_embedded_schema(&conn)?;

        log::info!("✅ Entity store opened: {}", db_path.as_ref().display());

        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    /// Open a query-only connection for readers such as the snapshot cache
    ///
    /// The schema must already exist.
    pub fn open_reader(db_path: impl AsRef<Path>) -> Result<Self, StoreError> {
        let conn = Connection::open(db_path.as_ref())?;
        apply_optimized_pragmas(&conn)?;
        conn.pragma_update(None, "query_only", "ON")?;

        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    /// Private in-memory database, mostly for tests
    pub fn open_in_memory() -> Result<Self, StoreError> {
        let conn = Connection::open_in_memory()?;
        conn.pragma_update(None, "foreign_keys", "ON")?;
        apply_embedded_schema(&conn)?;

        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    /// Apply the `*.sql` files of `schema_dir` on top of the bundled schema
    pub fn run_migrations(&self, schema_dir: &str) -> Result<(), StoreError> {
        let mut conn = self.lock()?;
        run_schema_migrations(&mut conn, schema_dir)
    }

    fn lock(&self) -> Result<MutexGuard<'_, Connection>, StoreError> {
        self.conn.lock().map_err(|_| StoreError::LockPoisoned)
    }

    /// Register a new entity (import surface, not used by the sync engine)
    ///
    /// New entities start `ACTIVE` with no known activity.
    pub fn insert_entity(&self, entity: &NewEntity) -> Result<TrackedEntity, StoreError> {
        let conn = self.lock()?;
        let now = Utc::now().timestamp();

        conn.execute(
            r#"
            INSERT INTO tracked_entities
                (handle, display_name, contact, last_active, status, created_at, updated_at)
            VALUES (?1, ?2, ?3, NULL, ?4, ?5, ?5)
            "#,
            params![
                entity.handle,
                entity.display_name,
                entity.contact,
                EntityStatus::Active.as_str(),
                now,
            ],
        )?;

        let id = conn.last_insert_rowid();
        let created = conn.query_row(
            &format!("SELECT {} FROM tracked_entities WHERE id = ?1", ENTITY_COLUMNS),
            [id],
            entity_from_row,
        )?;

        Ok(created)
    }

    pub fn find_entity_by_handle(&self, handle: &str) -> Result<Option<TrackedEntity>, StoreError> {
        let conn = self.lock()?;
        let entity = conn
            .query_row(
                &format!("SELECT {} FROM tracked_entities WHERE handle = ?1", ENTITY_COLUMNS),
                [handle],
                entity_from_row,
            )
            .optional()?;
        Ok(entity)
    }

    /// All ledger rows of one entity, oldest first
    pub fn daily_records(&self, entity_id: i64) -> Result<Vec<DailyActivityRecord>, StoreError> {
        let conn = self.lock()?;
        let mut stmt = conn.prepare_cached(
            "SELECT entity_id, date, count FROM daily_activity WHERE entity_id = ?1 ORDER BY date ASC",
        )?;
        let records = stmt
            .query_map([entity_id], record_from_row)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(records)
    }

    /// Number of entities per stored status
    pub fn status_counts(&self) -> Result<HashMap<EntityStatus, i64>, StoreError> {
        let conn = self.lock()?;
        let mut stmt =
            conn.prepare_cached("SELECT status, COUNT(*) FROM tracked_entities GROUP BY status")?;

        let mut counts: HashMap<EntityStatus, i64> =
            EntityStatus::ALL.iter().map(|s| (*s, 0)).collect();

        let rows = stmt.query_map([], |row| Ok((row.get::<_, String>(0)?, row.get::<_, i64>(1)?)))?;
        for row in rows {
            let (status, count) = row?;
            match status.parse::<EntityStatus>() {
                Ok(status) => {
                    counts.insert(status, count);
                }
                Err(e) => log::warn!("⚠️  Skipping {} entities: {}", count, e),
            }
        }

        Ok(counts)
    }
}

impl EntityStore for SqliteEntityStore {
    fn list_entities(&self) -> Result<Vec<TrackedEntity>, StoreError> {
        let conn = self.lock()?;
        Ok(select_entities(&conn)?)
    }

    fn find_daily_record(
        &self,
        entity_id: i64,
        date: NaiveDate,
    ) -> Result<Option<DailyActivityRecord>, StoreError> {
        let conn = self.lock()?;
        Ok(select_daily_record(&conn, entity_id, date)?)
    }

    fn begin_batch(&self) -> Result<Box<dyn BatchWriter + '_>, StoreError> {
        let conn = self.lock()?;
        conn.execute_batch("BEGIN IMMEDIATE")?;
        Ok(Box::new(SqliteBatch {
            conn,
            finished: false,
        }))
    }

    fn load_ledger(&self, since: NaiveDate) -> Result<LedgerView, StoreError> {
        let conn = self.lock()?;

        // One read transaction so entities and records come from the same snapshot
        conn.execute_batch("BEGIN DEFERRED")?;
        let read = (|| -> rusqlite::Result<LedgerView> {
            let entities = select_entities(&conn)?;
            let mut stmt = conn.prepare_cached(
                "SELECT entity_id, date, count FROM daily_activity WHERE date >= ?1 ORDER BY date ASC, entity_id ASC",
            )?;
            let records = stmt
                .query_map([since], record_from_row)?
                .collect::<rusqlite::Result<Vec<_>>>()?;
            Ok(LedgerView { entities, records })
        })();

        match read {
            Ok(view) => {
                conn.execute_batch("COMMIT")?;
                Ok(view)
            }
            Err(e) => {
                let _ = conn.execute_batch("ROLLBACK");
                Err(e.into())
            }
        }
    }
}

/// Open `BEGIN IMMEDIATE` transaction on the locked connection
struct SqliteBatch<'a> {
    conn: MutexGuard<'a, Connection>,
    finished: bool,
}

impl BatchWriter for SqliteBatch<'_> {
    fn upsert_daily_record(
        &mut self,
        entity_id: i64,
        date: NaiveDate,
        count: i64,
    ) -> Result<(), StoreError> {
        self.conn.execute(
            r#"
            INSERT INTO daily_activity (entity_id, date, count)
            VALUES (?1, ?2, ?3)
            ON CONFLICT(entity_id, date) DO UPDATE SET
                count = excluded.count
            "#,
            params![entity_id, date, count],
        )?;
        Ok(())
    }

    fn find_daily_record(
        &mut self,
        entity_id: i64,
        date: NaiveDate,
    ) -> Result<Option<DailyActivityRecord>, StoreError> {
        Ok(select_daily_record(&self.conn, entity_id, date)?)
    }

    fn activity_sum(
        &mut self,
        entity_id: i64,
        from: NaiveDate,
        to: NaiveDate,
    ) -> Result<i64, StoreError> {
        let sum = self.conn.query_row(
            "SELECT COALESCE(SUM(count), 0) FROM daily_activity WHERE entity_id = ?1 AND date BETWEEN ?2 AND ?3",
            params![entity_id, from, to],
            |row| row.get(0),
        )?;
        Ok(sum)
    }

    fn save_entity(&mut self, entity: &TrackedEntity) -> Result<(), StoreError> {
        let updated = self.conn.execute(
            r#"
            UPDATE tracked_entities SET
                status = ?2,
                last_active = ?3,
                updated_at = ?4
            WHERE id = ?1
            "#,
            params![
                entity.id,
                entity.status.as_str(),
                entity.last_active.map(|ts| ts.timestamp()),
                entity.updated_at.timestamp(),
            ],
        )?;

        if updated == 0 {
            return Err(StoreError::EntityNotFound(entity.id));
        }
        Ok(())
    }

    fn commit(mut self: Box<Self>) -> Result<(), StoreError> {
        self.finished = true;
        if let Err(e) = self.conn.execute_batch("COMMIT") {
            let _ = self.conn.execute_batch("ROLLBACK");
            return Err(e.into());
        }
        Ok(())
    }
}

impl Drop for SqliteBatch<'_> {
    fn drop(&mut self) {
        if !self.finished {
            if let Err(e) = self.conn.execute_batch("ROLLBACK") {
                log::error!("❌ Failed to roll back batch: {}", e);
            } else {
                log::debug!("Batch rolled back");
            }
        }
    }
}
