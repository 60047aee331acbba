//! Storage layer: durable record persistence with single-writer,
//! multi-reader ACID semantics, and the `state` key/value namespace.

mod migrations;
mod sqlite;

pub use migrations::{Migration, MIGRATIONS};
pub use sqlite::{default_db_path, retry_on_busy, FieldValue, Result, Store, StorageError};
