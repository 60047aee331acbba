//! SQLite-backed [`Store`]: a single-writer/multi-reader durable table for
//! [`MemoryRecord`], plus a `state` key/value namespace.
//!
//! A `writer: Mutex<Connection>` / `reader: Mutex<Connection>` split with
//! WAL journaling, rather than an async pool — every caller (Retrieval,
//! Ingestion, Batch) opens its own handle against the same file and
//! correctness comes entirely from SQLite's own MVCC, not an in-process
//! lock.

use std::collections::BTreeSet;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use std::time::{Duration, Instant};

use chrono::{DateTime, FixedOffset};
use directories::ProjectDirs;
use rusqlite::{params, Connection, OptionalExtension, Row};
use thiserror::Error;

use crate::memory::{Category, MemoryRecord, Relation, Valence};

use super::migrations::apply_migrations;

pub type Result<T> = std::result::Result<T, StorageError>;

#[derive(Debug, Error)]
#[non_exhaustive]
pub enum StorageError {
    #[error("database error: {0}")]
    Database(#[from] rusqlite::Error),
    #[error("record not found: {0}")]
    NotFound(String),
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("invalid timestamp in stored record: {0}")]
    InvalidTimestamp(String),
    #[error("failed to initialize store: {0}")]
    Init(String),
    #[error("store locked: timed out waiting for the writer after {0:?}")]
    Locked(Duration),
    #[error("store corrupt: {0}")]
    Corrupt(String),
    #[error("record id already exists: {0}")]
    DuplicateId(String),
}

/// Budget for the writer-lock retry loop (the concurrency model waits up
/// to 30 seconds with exponential backoff before failing).
const BUSY_WAIT_BUDGET: Duration = Duration::from_secs(30);
const BUSY_WAIT_INITIAL_BACKOFF: Duration = Duration::from_millis(25);

/// A whitelisted, typed value for [`Store::update`]. Keeping this a closed
/// enum (rather than accepting raw SQL fragments) means the set of
/// updatable columns is fixed at compile time.
#[derive(Debug, Clone)]
pub enum FieldValue {
    MemoryDays(f64),
    RecalledSinceLastBatch(bool),
    RecallCount(u32),
    DecayCoefficient(f64),
    Keywords(Vec<String>),
    CurrentLevel(u8),
    Trigger(String),
    Content(String),
    Embedding(Vec<f32>),
    Relations(Vec<Relation>),
    RetentionScore(f64),
    ArchivedAt(Option<DateTime<FixedOffset>>),
    Protected(bool),
    RevivalRequested(bool),
    RevivalRequestedAt(Option<DateTime<FixedOffset>>),
}

impl FieldValue {
    fn column(&self) -> &'static str {
        match self {
            FieldValue::MemoryDays(_) => "memory_days",
            FieldValue::RecalledSinceLastBatch(_) => "recalled_since_last_batch",
            FieldValue::RecallCount(_) => "recall_count",
            FieldValue::DecayCoefficient(_) => "decay_coefficient",
            FieldValue::Keywords(_) => "keywords",
            FieldValue::CurrentLevel(_) => "current_level",
            FieldValue::Trigger(_) => "\"trigger\"",
            FieldValue::Content(_) => "content",
            FieldValue::Embedding(_) => "embedding",
            FieldValue::Relations(_) => "relations",
            FieldValue::RetentionScore(_) => "retention_score",
            FieldValue::ArchivedAt(_) => "archived_at",
            FieldValue::Protected(_) => "protected",
            FieldValue::RevivalRequested(_) => "revival_requested",
            FieldValue::RevivalRequestedAt(_) => "revival_requested_at",
        }
    }

    fn to_sql(&self) -> rusqlite::types::ToSqlOutput<'_> {
        use rusqlite::types::{ToSqlOutput, Value};
        match self {
            FieldValue::MemoryDays(v)
            | FieldValue::DecayCoefficient(v)
            | FieldValue::RetentionScore(v) => ToSqlOutput::Owned(Value::Real(*v)),
            FieldValue::RecalledSinceLastBatch(v)
            | FieldValue::Protected(v)
            | FieldValue::RevivalRequested(v) => ToSqlOutput::Owned(Value::Integer(*v as i64)),
            FieldValue::RecallCount(v) => ToSqlOutput::Owned(Value::Integer(*v as i64)),
            FieldValue::CurrentLevel(v) => ToSqlOutput::Owned(Value::Integer(*v as i64)),
            FieldValue::Keywords(v) => {
                ToSqlOutput::Owned(Value::Text(serde_json::to_string(v).unwrap_or_default()))
            }
            FieldValue::Trigger(v) | FieldValue::Content(v) => {
                ToSqlOutput::Owned(Value::Text(v.clone()))
            }
            FieldValue::Embedding(v) => {
                ToSqlOutput::Owned(Value::Blob(crate::embeddings::to_bytes(v)))
            }
            FieldValue::Relations(v) => {
                ToSqlOutput::Owned(Value::Text(serde_json::to_string(v).unwrap_or_default()))
            }
            FieldValue::ArchivedAt(v) | FieldValue::RevivalRequestedAt(v) => match v {
                Some(ts) => ToSqlOutput::Owned(Value::Text(ts.to_rfc3339())),
                None => ToSqlOutput::Owned(Value::Null),
            },
        }
    }
}

pub struct Store {
    writer: Mutex<Connection>,
    reader: Mutex<Connection>,
}

impl Store {
    /// Opens (creating if needed) the database at `path`, applying
    /// migrations and configuring WAL + busy_timeout.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let writer = Connection::open(path)?;
        configure_connection(&writer)?;
        apply_migrations(&writer).map_err(|e| StorageError::Init(e.to_string()))?;

        #[cfg(unix)]
        if path.exists() {
            use std::os::unix::fs::PermissionsExt;
            let perms = std::fs::Permissions::from_mode(0o600);
            let _ = std::fs::set_permissions(path, perms);
        }

        let reader = Connection::open(path)?;
        configure_connection(&reader)?;

        Ok(Self {
            writer: Mutex::new(writer),
            reader: Mutex::new(reader),
        })
    }

    /// Opens the database at the platform-specific default data directory
    /// resolved by [`default_db_path`].
    pub fn open_default() -> Result<Self> {
        Self::open(default_db_path()?)
    }

    /// Runs `f` inside a single write transaction; rolls back on error.
    /// Opening the transaction and committing it each retry on
    /// `SQLITE_BUSY` with capped exponential backoff up to
    /// [`BUSY_WAIT_BUDGET`] before surfacing [`StorageError::Locked`] — a
    /// concurrent writer (another process's batch or ingestion) holding the
    /// file does not fail this call outright.
    pub fn transaction<F, T>(&self, f: F) -> Result<T>
    where
        F: FnOnce(&rusqlite::Transaction<'_>) -> Result<T>,
    {
        let mut conn = self.lock_writer()?;
        let tx = retry_on_busy(|| conn.transaction())?;
        let result = f(&tx)?;
        tx.commit()?;
        Ok(result)
    }

    pub fn insert(&self, record: &MemoryRecord) -> Result<()> {
        self.transaction(|tx| insert_record(tx, record))
    }

    /// Partial, atomic update of a subset of columns.
    pub fn update(&self, id: &str, fields: &[FieldValue]) -> Result<()> {
        self.transaction(|tx| update_record(tx, id, fields))
    }

    /// Applies every `(id, fields)` update in one transaction — the shape
    /// the batch engine's phases need so a phase commits or rolls back as
    /// a whole rather than record-by-record.
    pub fn update_many(&self, updates: &[(String, Vec<FieldValue>)]) -> Result<()> {
        self.transaction(|tx| {
            for (id, fields) in updates {
                update_record(tx, id, fields)?;
            }
            Ok(())
        })
    }

    /// Deletes every id in `ids` in one transaction.
    pub fn delete_many(&self, ids: &[String]) -> Result<()> {
        self.transaction(|tx| {
            for id in ids {
                tx.execute("DELETE FROM memory_records WHERE id = ?1", params![id])?;
            }
            Ok(())
        })
    }

    /// Sets `recalled_since_last_batch = true` for every non-archived id
    /// in one transaction.
    pub fn mark_recalled(&self, ids: &[String]) -> Result<()> {
        self.transaction(|tx| {
            for id in ids {
                tx.execute(
                    "UPDATE memory_records SET recalled_since_last_batch = 1, updated_at = ?1 \
                     WHERE id = ?2 AND archived_at IS NULL",
                    params![now_rfc3339(), id],
                )?;
            }
            Ok(())
        })
    }

    pub fn get(&self, id: &str) -> Result<MemoryRecord> {
        let conn = self.lock_reader()?;
        conn.query_row(
            &format!("{SELECT_COLUMNS} FROM memory_records WHERE id = ?1"),
            params![id],
            row_to_record,
        )
        .optional()?
        .ok_or_else(|| StorageError::NotFound(id.to_string()))
    }

    pub fn get_active(&self) -> Result<Vec<MemoryRecord>> {
        self.query_records(&format!(
            "{SELECT_COLUMNS} FROM memory_records WHERE archived_at IS NULL"
        ))
    }

    pub fn get_archived(&self) -> Result<Vec<MemoryRecord>> {
        self.query_records(&format!(
            "{SELECT_COLUMNS} FROM memory_records WHERE archived_at IS NOT NULL"
        ))
    }

    pub fn delete(&self, id: &str) -> Result<()> {
        self.transaction(|tx| {
            tx.execute("DELETE FROM memory_records WHERE id = ?1", params![id])?;
            Ok(())
        })
    }

    pub fn get_state(&self, key: &str) -> Result<Option<String>> {
        let conn = self.lock_reader()?;
        let value = conn
            .query_row("SELECT value FROM state WHERE key = ?1", params![key], |row| {
                row.get(0)
            })
            .optional()?;
        Ok(value)
    }

    pub fn set_state(&self, key: &str, value: &str) -> Result<()> {
        self.transaction(|tx| {
            tx.execute(
                "INSERT INTO state (key, value) VALUES (?1, ?2) \
                 ON CONFLICT(key) DO UPDATE SET value = excluded.value",
                params![key, value],
            )?;
            Ok(())
        })
    }

    fn query_records(&self, sql: &str) -> Result<Vec<MemoryRecord>> {
        let conn = self.lock_reader()?;
        let mut stmt = conn.prepare(sql)?;
        let rows = stmt.query_map([], row_to_record)?;
        let mut records = Vec::new();
        for row in rows {
            records.push(row?);
        }
        Ok(records)
    }

    fn lock_writer(&self) -> Result<std::sync::MutexGuard<'_, Connection>> {
        wait_for_lock(&self.writer)
    }

    fn lock_reader(&self) -> Result<std::sync::MutexGuard<'_, Connection>> {
        wait_for_lock(&self.reader)
    }
}

/// Waits for the in-process mutex; only relevant when two `Store` callers
/// share one process and one handle. Cross-process contention is handled
/// by SQLite's own `busy_timeout` plus [`retry_on_busy`] below.
fn wait_for_lock(mutex: &Mutex<Connection>) -> Result<std::sync::MutexGuard<'_, Connection>> {
    match mutex.lock() {
        Ok(guard) => Ok(guard),
        Err(poisoned) => {
            tracing::warn!("store mutex was poisoned by a panicking holder; recovering");
            Ok(poisoned.into_inner())
        }
    }
}

fn configure_connection(conn: &Connection) -> Result<()> {
    conn.pragma_update(None, "journal_mode", "WAL")?;
    conn.pragma_update(None, "busy_timeout", 5_000i64)?;
    conn.pragma_update(None, "foreign_keys", true)?;
    Ok(())
}

/// Retries a fallible SQLite operation on `SQLITE_BUSY` with capped
/// exponential backoff, surfacing [`StorageError::Locked`] once
/// [`BUSY_WAIT_BUDGET`] elapses.
pub fn retry_on_busy<F, T>(mut op: F) -> Result<T>
where
    F: FnMut() -> rusqlite::Result<T>,
{
    let start = Instant::now();
    let mut backoff = BUSY_WAIT_INITIAL_BACKOFF;
    loop {
        match op() {
            Ok(value) => return Ok(value),
            Err(rusqlite::Error::SqliteFailure(e, _))
                if e.code == rusqlite::ErrorCode::DatabaseBusy =>
            {
                if start.elapsed() >= BUSY_WAIT_BUDGET {
                    return Err(StorageError::Locked(BUSY_WAIT_BUDGET));
                }
                tracing::debug!(?backoff, "store busy, backing off");
                std::thread::sleep(backoff);
                backoff = (backoff * 2).min(Duration::from_secs(1));
            }
            Err(e) => return Err(e.into()),
        }
    }
}

fn now_rfc3339() -> String {
    chrono::Utc::now().fixed_offset().to_rfc3339()
}

/// The platform-specific default database path, creating the containing
/// directory (owner-only permissions on Unix) if it doesn't exist yet.
pub fn default_db_path() -> Result<PathBuf> {
    let proj_dirs = ProjectDirs::from("com", "recall-engine", "recall-engine")
        .ok_or_else(|| StorageError::Init("could not determine project directories".into()))?;

    let data_dir = proj_dirs.data_dir();
    std::fs::create_dir_all(data_dir)?;
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        let perms = std::fs::Permissions::from_mode(0o700);
        let _ = std::fs::set_permissions(data_dir, perms);
    }
    Ok(data_dir.join("memory.sqlite3"))
}

const SELECT_COLUMNS: &str = "SELECT id, created, updated_at, memory_days, \
    recalled_since_last_batch, recall_count, emotional_intensity, emotional_valence, \
    emotional_arousal, emotional_tags, decay_coefficient, category, keywords, current_level, \
    \"trigger\", content, embedding, relations, retention_score, archived_at, protected, \
    revival_requested, revival_requested_at";

fn insert_record(tx: &rusqlite::Transaction<'_>, record: &MemoryRecord) -> Result<()> {
    let existing: Option<String> = tx
        .query_row(
            "SELECT id FROM memory_records WHERE id = ?1",
            params![record.id],
            |row| row.get(0),
        )
        .optional()?;
    if existing.is_some() {
        return Err(StorageError::DuplicateId(record.id.clone()));
    }

    let tags_json = serde_json::to_string(&record.emotional_tags).unwrap_or_default();
    let keywords_json = serde_json::to_string(&record.keywords).unwrap_or_default();
    let relations_json = serde_json::to_string(&record.relations).unwrap_or_default();
    let embedding_bytes = record.embedding.as_deref().map(crate::embeddings::to_bytes);

    tx.execute(
        "INSERT INTO memory_records (
            id, created, updated_at, memory_days, recalled_since_last_batch, recall_count,
            emotional_intensity, emotional_valence, emotional_arousal, emotional_tags,
            decay_coefficient, category, keywords, current_level, \"trigger\", content,
            embedding, relations, retention_score, archived_at, protected,
            revival_requested, revival_requested_at
        ) VALUES (?1,?2,?3,?4,?5,?6,?7,?8,?9,?10,?11,?12,?13,?14,?15,?16,?17,?18,?19,?20,?21,?22,?23)",
        params![
            record.id,
            record.created.to_rfc3339(),
            record.updated_at.to_rfc3339(),
            record.memory_days,
            record.recalled_since_last_batch,
            record.recall_count,
            record.emotional_intensity,
            record.emotional_valence.as_str(),
            record.emotional_arousal,
            tags_json,
            record.decay_coefficient,
            record.category.as_str(),
            keywords_json,
            record.current_level,
            record.trigger,
            record.content,
            embedding_bytes,
            relations_json,
            record.retention_score,
            record.archived_at.map(|t| t.to_rfc3339()),
            record.protected,
            record.revival_requested,
            record.revival_requested_at.map(|t| t.to_rfc3339()),
        ],
    )?;
    Ok(())
}

fn update_record(tx: &rusqlite::Transaction<'_>, id: &str, fields: &[FieldValue]) -> Result<()> {
    if fields.is_empty() {
        return Ok(());
    }
    let mut set_clauses: Vec<String> = fields
        .iter()
        .map(|f| format!("{} = ?", f.column()))
        .collect();
    set_clauses.push("updated_at = ?".to_string());

    let sql = format!(
        "UPDATE memory_records SET {} WHERE id = ?",
        set_clauses.join(", ")
    );

    let mut stmt = tx.prepare(&sql)?;
    let mut idx = 1;
    for field in fields {
        stmt.raw_bind_parameter(idx, field.to_sql())?;
        idx += 1;
    }
    stmt.raw_bind_parameter(idx, now_rfc3339())?;
    idx += 1;
    stmt.raw_bind_parameter(idx, id)?;

    let changed = stmt.raw_execute()?;
    if changed == 0 {
        return Err(StorageError::NotFound(id.to_string()));
    }
    Ok(())
}

fn row_to_record(row: &Row<'_>) -> rusqlite::Result<MemoryRecord> {
    let parse_ts = |s: &str| -> rusqlite::Result<DateTime<FixedOffset>> {
        DateTime::parse_from_rfc3339(s).map_err(|e| {
            rusqlite::Error::FromSqlConversionFailure(0, rusqlite::types::Type::Text, Box::new(e))
        })
    };

    let created_s: String = row.get("created")?;
    let updated_s: String = row.get("updated_at")?;
    let archived_s: Option<String> = row.get("archived_at")?;
    let revival_s: Option<String> = row.get("revival_requested_at")?;

    let tags_json: String = row.get("emotional_tags")?;
    let keywords_json: String = row.get("keywords")?;
    let relations_json: String = row.get("relations")?;
    let valence_s: String = row.get("emotional_valence")?;
    let category_s: String = row.get("category")?;
    let embedding_bytes: Option<Vec<u8>> = row.get("embedding")?;

    let tags: BTreeSet<String> = serde_json::from_str(&tags_json).unwrap_or_default();
    let keywords: Vec<String> = serde_json::from_str(&keywords_json).unwrap_or_default();
    let relations: Vec<Relation> = serde_json::from_str(&relations_json).unwrap_or_default();
    let embedding = match embedding_bytes {
        Some(bytes) => crate::embeddings::from_bytes(&bytes).ok(),
        None => None,
    };

    Ok(MemoryRecord {
        id: row.get("id")?,
        created: parse_ts(&created_s)?,
        updated_at: parse_ts(&updated_s)?,
        memory_days: row.get("memory_days")?,
        recalled_since_last_batch: row.get("recalled_since_last_batch")?,
        recall_count: row.get("recall_count")?,
        emotional_intensity: row.get("emotional_intensity")?,
        emotional_valence: Valence::parse_name(&valence_s).unwrap_or(Valence::Neutral),
        emotional_arousal: row.get("emotional_arousal")?,
        emotional_tags: tags,
        decay_coefficient: row.get("decay_coefficient")?,
        category: Category::parse_name(&category_s).unwrap_or(Category::Casual),
        keywords,
        current_level: row.get("current_level")?,
        trigger: row.get("trigger")?,
        content: row.get("content")?,
        embedding,
        relations,
        retention_score: row.get("retention_score")?,
        archived_at: archived_s.map(|s| parse_ts(&s)).transpose()?,
        protected: row.get("protected")?,
        revival_requested: row.get("revival_requested")?,
        revival_requested_at: revival_s.map(|s| parse_ts(&s)).transpose()?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::tests::test_record;

    fn temp_store() -> (tempfile::TempDir, Store) {
        let dir = tempfile::tempdir().unwrap();
        let store = Store::open(dir.path().join("memory.sqlite3")).unwrap();
        (dir, store)
    }

    #[test]
    fn insert_then_get_roundtrips_every_field() {
        let (_dir, store) = temp_store();
        let mut record = test_record("mem_20260101_001");
        record.emotional_tags = ["a", "b"].iter().map(|s| s.to_string()).collect();
        record.keywords = vec!["alpha".into(), "beta".into()];
        record.relations = vec![Relation::new(
            "mem_20260101_002",
            crate::memory::RelationType::Continues,
        )];
        store.insert(&record).unwrap();

        let fetched = store.get(&record.id).unwrap();
        assert_eq!(fetched.id, record.id);
        assert_eq!(fetched.emotional_tags, record.emotional_tags);
        assert_eq!(fetched.keywords, record.keywords);
        assert_eq!(fetched.relations, record.relations);
        assert_eq!(fetched.embedding, record.embedding);
    }

    #[test]
    fn duplicate_insert_is_rejected() {
        let (_dir, store) = temp_store();
        let record = test_record("mem_20260101_001");
        store.insert(&record).unwrap();
        let err = store.insert(&record).unwrap_err();
        assert!(matches!(err, StorageError::DuplicateId(_)));
    }

    #[test]
    fn update_then_get_reads_back_new_value() {
        let (_dir, store) = temp_store();
        let record = test_record("mem_20260101_001");
        store.insert(&record).unwrap();

        store
            .update(&record.id, &[FieldValue::MemoryDays(12.5)])
            .unwrap();

        let fetched = store.get(&record.id).unwrap();
        assert_eq!(fetched.memory_days, 12.5);
    }

    #[test]
    fn update_of_missing_id_is_not_found() {
        let (_dir, store) = temp_store();
        let err = store
            .update("mem_missing", &[FieldValue::MemoryDays(1.0)])
            .unwrap_err();
        assert!(matches!(err, StorageError::NotFound(_)));
    }

    #[test]
    fn mark_recalled_skips_archived_records() {
        let (_dir, store) = temp_store();
        let mut archived = test_record("mem_20260101_001");
        archived.archived_at = Some(chrono::Utc::now().fixed_offset());
        store.insert(&archived).unwrap();
        let active = test_record("mem_20260101_002");
        store.insert(&active).unwrap();

        store
            .mark_recalled(&[archived.id.clone(), active.id.clone()])
            .unwrap();

        assert!(!store.get(&archived.id).unwrap().recalled_since_last_batch);
        assert!(store.get(&active.id).unwrap().recalled_since_last_batch);
    }

    #[test]
    fn get_active_and_get_archived_partition_by_archived_at() {
        let (_dir, store) = temp_store();
        let active = test_record("mem_20260101_001");
        let mut archived = test_record("mem_20260101_002");
        archived.archived_at = Some(chrono::Utc::now().fixed_offset());
        store.insert(&active).unwrap();
        store.insert(&archived).unwrap();

        assert_eq!(store.get_active().unwrap().len(), 1);
        assert_eq!(store.get_archived().unwrap().len(), 1);
    }

    #[test]
    fn delete_removes_the_record() {
        let (_dir, store) = temp_store();
        let record = test_record("mem_20260101_001");
        store.insert(&record).unwrap();
        store.delete(&record.id).unwrap();
        assert!(matches!(store.get(&record.id), Err(StorageError::NotFound(_))));
    }

    #[test]
    fn state_roundtrips_and_upserts() {
        let (_dir, store) = temp_store();
        assert_eq!(store.get_state("last_compression_run").unwrap(), None);
        store
            .set_state("last_compression_run", "2026-01-01T03:00:00+00:00")
            .unwrap();
        assert_eq!(
            store.get_state("last_compression_run").unwrap(),
            Some("2026-01-01T03:00:00+00:00".to_string())
        );
        store
            .set_state("last_compression_run", "2026-01-02T03:00:00+00:00")
            .unwrap();
        assert_eq!(
            store.get_state("last_compression_run").unwrap(),
            Some("2026-01-02T03:00:00+00:00".to_string())
        );
    }

    #[test]
    fn update_many_applies_all_updates_in_one_transaction() {
        let (_dir, store) = temp_store();
        let a = test_record("mem_20260101_001");
        let b = test_record("mem_20260101_002");
        store.insert(&a).unwrap();
        store.insert(&b).unwrap();

        store
            .update_many(&[
                (a.id.clone(), vec![FieldValue::RetentionScore(10.0)]),
                (b.id.clone(), vec![FieldValue::RetentionScore(20.0)]),
            ])
            .unwrap();

        assert_eq!(store.get(&a.id).unwrap().retention_score, 10.0);
        assert_eq!(store.get(&b.id).unwrap().retention_score, 20.0);
    }

    #[test]
    fn update_many_rolls_back_entirely_if_any_id_is_missing() {
        let (_dir, store) = temp_store();
        let a = test_record("mem_20260101_001");
        store.insert(&a).unwrap();

        let err = store
            .update_many(&[
                (a.id.clone(), vec![FieldValue::RetentionScore(10.0)]),
                ("mem_missing".to_string(), vec![FieldValue::RetentionScore(20.0)]),
            ])
            .unwrap_err();
        assert!(matches!(err, StorageError::NotFound(_)));
        assert_eq!(store.get(&a.id).unwrap().retention_score, a.retention_score);
    }

    #[test]
    fn delete_many_removes_every_id() {
        let (_dir, store) = temp_store();
        let a = test_record("mem_20260101_001");
        let b = test_record("mem_20260101_002");
        store.insert(&a).unwrap();
        store.insert(&b).unwrap();

        store.delete_many(&[a.id.clone(), b.id.clone()]).unwrap();

        assert!(matches!(store.get(&a.id), Err(StorageError::NotFound(_))));
        assert!(matches!(store.get(&b.id), Err(StorageError::NotFound(_))));
    }

    #[test]
    fn transaction_rolls_back_on_error() {
        let (_dir, store) = temp_store();
        let record = test_record("mem_20260101_001");
        let result: Result<()> = store.transaction(|tx| {
            insert_record(tx, &record)?;
            Err(StorageError::Corrupt("forced rollback for the test".into()))
        });
        assert!(result.is_err());
        assert!(matches!(store.get(&record.id), Err(StorageError::NotFound(_))));
    }
}
