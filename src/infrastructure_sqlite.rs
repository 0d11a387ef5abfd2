//! SQLite-backed `LockStore` implementation.
//!
//! Every precondition rides inside a single `INSERT`/`UPDATE`/`DELETE`
//! statement, so SQLite's statement atomicity gives the conditional-write
//! guarantees the protocol needs. Reads against the same connection are
//! strongly consistent by construction.
//!
//! Enable with the `sqlite` feature flag:
//! ```toml
//! leaselock = { version = "0.1", features = ["sqlite"] }
//! ```

use std::sync::{Mutex, MutexGuard, PoisonError};

use rusqlite::{Connection, OptionalExtension, params};

use crate::infrastructure::{LockSchema, LockStore, WriteOutcome};
use crate::types::{LockRecord, StoreError};

/// A persistent lock store backed by SQLite.
///
/// Uses WAL mode for concurrent read performance. Table and column names
/// come from the supplied [`LockSchema`].
pub struct SqliteLockStore {
    conn: Mutex<Connection>,
    sql: SchemaSql,
}

/// Statements are rendered once at open time; only values are bound later.
struct SchemaSql {
    read: String,
    create: String,
    compare_and_swap: String,
    delete: String,
}

impl SchemaSql {
    fn render(schema: &LockSchema) -> Self {
        let LockSchema {
            table_name: t,
            name: n,
            owner: o,
            version: v,
            is_locked: l,
            duration: d,
            acquired_at: a,
            payload: p,
        } = schema;
        Self {
            read: format!("SELECT {n}, {o}, {v}, {l}, {d}, {a}, {p} FROM {t} WHERE {n} = ?1"),
            create: format!(
                "INSERT INTO {t} ({n}, {o}, {v}, {l}, {d}, {a}, {p}) \
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)"
            ),
            compare_and_swap: format!(
                "UPDATE {t} SET {o} = ?1, {v} = ?2, {l} = ?3, {d} = ?4, {a} = ?5, {p} = ?6 \
                 WHERE {n} = ?7 AND {v} = ?8"
            ),
            delete: format!("DELETE FROM {t} WHERE {n} = ?1 AND {v} = ?2 AND {o} = ?3"),
        }
    }
}

impl SqliteLockStore {
    /// Open (or create) a lock table at the given path with the default
    /// schema. `":memory:"` works for tests.
    pub fn open(path: &str) -> Result<Self, StoreError> {
        Self::open_with_schema(path, LockSchema::default())
    }

    /// Open with caller-supplied table and column names.
    pub fn open_with_schema(path: &str, schema: LockSchema) -> Result<Self, StoreError> {
        let conn = Connection::open(path)?;

        conn.pragma_update(None, "journal_mode", "WAL")?;
        conn.pragma_update(None, "synchronous", "NORMAL")?;

        conn.execute_batch(&format!(
            "CREATE TABLE IF NOT EXISTS {t} (
                {n} TEXT PRIMARY KEY,
                {o} TEXT NOT NULL,
                {v} TEXT NOT NULL,
                {l} INTEGER NOT NULL,
                {d} INTEGER NOT NULL,
                {a} INTEGER NOT NULL,
                {p} BLOB
            );",
            t = schema.table_name,
            n = schema.name,
            o = schema.owner,
            v = schema.version,
            l = schema.is_locked,
            d = schema.duration,
            a = schema.acquired_at,
            p = schema.payload,
        ))?;

        Ok(Self {
            conn: Mutex::new(conn),
            sql: SchemaSql::render(&schema),
        })
    }

    fn conn(&self) -> MutexGuard<'_, Connection> {
        self.conn.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn row_to_record(row: &rusqlite::Row) -> rusqlite::Result<LockRecord> {
        Ok(LockRecord {
            name: row.get(0)?,
            owner: row.get(1)?,
            version: row.get(2)?,
            is_locked: row.get(3)?,
            duration_ms: row.get(4)?,
            acquired_at_ms: row.get(5)?,
            payload: row.get(6)?,
        })
    }
}

impl LockStore for SqliteLockStore {
    fn read(&self, name: &str) -> Result<Option<LockRecord>, StoreError> {
        let conn = self.conn();
        let record = conn
            .query_row(&self.sql.read, params![name], |row| Self::row_to_record(row))
            .optional()?;
        Ok(record)
    }

    fn create(&self, record: &LockRecord) -> Result<WriteOutcome, StoreError> {
        let conn = self.conn();
        let result = conn.execute(
            &self.sql.create,
            params![
                record.name,
                record.owner,
                record.version,
                record.is_locked,
                record.duration_ms,
                record.acquired_at_ms,
                record.payload,
            ],
        );
        match result {
            Ok(_) => Ok(WriteOutcome::Applied),
            // Primary-key collision: someone else created the record first
            Err(rusqlite::Error::SqliteFailure(err, _))
                if err.code == rusqlite::ErrorCode::ConstraintViolation =>
            {
                Ok(WriteOutcome::Rejected)
            }
            Err(err) => Err(err.into()),
        }
    }

    fn compare_and_swap(
        &self,
        name: &str,
        expected_version: &str,
        record: &LockRecord,
    ) -> Result<WriteOutcome, StoreError> {
        let conn = self.conn();
        let rows = conn.execute(
            &self.sql.compare_and_swap,
            params![
                record.owner,
                record.version,
                record.is_locked,
                record.duration_ms,
                record.acquired_at_ms,
                record.payload,
                name,
                expected_version,
            ],
        )?;
        if rows > 0 {
            Ok(WriteOutcome::Applied)
        } else {
            Ok(WriteOutcome::Rejected)
        }
    }

    fn delete(
        &self,
        name: &str,
        expected_version: &str,
        expected_owner: &str,
    ) -> Result<WriteOutcome, StoreError> {
        let conn = self.conn();
        let rows = conn.execute(
            &self.sql.delete,
            params![name, expected_version, expected_owner],
        )?;
        if rows > 0 {
            Ok(WriteOutcome::Applied)
        } else {
            Ok(WriteOutcome::Rejected)
        }
    }
}
