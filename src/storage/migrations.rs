//! Database migrations — a versioned array of SQL blocks tracked via a
//! `schema_version` table.

/// Migration definitions.
pub const MIGRATIONS: &[Migration] = &[Migration {
    version: 1,
    description: "Initial schema: memory_records table and the state key/value namespace",
    up: MIGRATION_V1_UP,
}];

/// A single database migration.
#[derive(Debug, Clone)]
pub struct Migration {
    pub version: u32,
    pub description: &'static str,
    pub up: &'static str,
}

const MIGRATION_V1_UP: &str = r#"
CREATE TABLE IF NOT EXISTS memory_records (
    id TEXT PRIMARY KEY,
    created TEXT NOT NULL,
    updated_at TEXT NOT NULL,

    memory_days REAL NOT NULL,
    recalled_since_last_batch INTEGER NOT NULL DEFAULT 0,
    recall_count INTEGER NOT NULL DEFAULT 0,

    emotional_intensity INTEGER NOT NULL,
    emotional_valence TEXT NOT NULL,
    emotional_arousal INTEGER NOT NULL,
    emotional_tags TEXT NOT NULL DEFAULT '[]',

    decay_coefficient REAL NOT NULL,
    category TEXT NOT NULL,
    keywords TEXT NOT NULL DEFAULT '[]',
    current_level INTEGER NOT NULL,

    "trigger" TEXT NOT NULL,
    content TEXT NOT NULL,
    embedding BLOB,

    relations TEXT NOT NULL DEFAULT '[]',

    retention_score REAL NOT NULL,
    archived_at TEXT,
    protected INTEGER NOT NULL DEFAULT 0,

    revival_requested INTEGER NOT NULL DEFAULT 0,
    revival_requested_at TEXT
);

CREATE INDEX IF NOT EXISTS idx_memory_records_retention_score ON memory_records(retention_score);
CREATE INDEX IF NOT EXISTS idx_memory_records_current_level ON memory_records(current_level);
CREATE INDEX IF NOT EXISTS idx_memory_records_archived_at ON memory_records(archived_at);
CREATE INDEX IF NOT EXISTS idx_memory_records_created ON memory_records(created);

CREATE TABLE IF NOT EXISTS state (
    key TEXT PRIMARY KEY,
    value TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS schema_version (
    version INTEGER PRIMARY KEY,
    applied_at TEXT NOT NULL
);

INSERT OR IGNORE INTO schema_version (version, applied_at) VALUES (1, datetime('now'));
"#;

/// Current schema version recorded in the database, 0 if unmigrated.
pub fn get_current_version(conn: &rusqlite::Connection) -> rusqlite::Result<u32> {
    conn.query_row(
        "SELECT COALESCE(MAX(version), 0) FROM schema_version",
        [],
        |row| row.get(0),
    )
    .or(Ok(0))
}

/// Applies every migration newer than the current schema version.
pub fn apply_migrations(conn: &rusqlite::Connection) -> rusqlite::Result<u32> {
    let current_version = get_current_version(conn)?;
    let mut applied = 0;

    for migration in MIGRATIONS {
        if migration.version > current_version {
            tracing::info!(
                version = migration.version,
                description = migration.description,
                "applying migration"
            );
            conn.execute_batch(migration.up)?;
            applied += 1;
        }
    }

    Ok(applied)
}
