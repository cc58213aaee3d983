//! SQLite-backed record store.

use super::{RecordStore, RetryPolicy};
use crate::{
    error::{EngineError, EngineResult},
    snapshot::CustomerSnapshot,
    types::{CustomerId, FieldMap},
};
use rusqlite::{params, Connection, OpenFlags};
use std::sync::{Mutex, MutexGuard};

const UPSERT_FIELD: &str = "INSERT INTO customer_field (customer_id, field, value, updated_at)
     VALUES (?1, ?2, ?3, datetime('now'))
     ON CONFLICT (customer_id, field)
     DO UPDATE SET value = excluded.value, updated_at = excluded.updated_at";

pub struct SqliteStore {
    conn: Mutex<Connection>,
    path: Option<String>, // None for :memory:
}

impl SqliteStore {
    /// Open (or create) the store at `target`. `:memory:` opens a private
    /// in-memory database.
    pub fn open(target: &str) -> EngineResult<Self> {
        if target == ":memory:" {
            return Self::in_memory();
        }
        let conn = Connection::open_with_flags(
            target,
            OpenFlags::SQLITE_OPEN_READ_WRITE
                | OpenFlags::SQLITE_OPEN_CREATE
                | OpenFlags::SQLITE_OPEN_URI,
        )?;
        // WAL mode only for real files (shared-memory URIs ignore it).
        let _ = conn.execute_batch("PRAGMA journal_mode=WAL;");
        conn.execute_batch("PRAGMA busy_timeout=2000;")?;
        Ok(Self {
            conn: Mutex::new(conn),
            path: Some(target.to_string()),
        })
    }

    /// Open an in-memory database (used in tests).
    pub fn in_memory() -> EngineResult<Self> {
        let conn = Connection::open_in_memory()?;
        Ok(Self {
            conn: Mutex::new(conn),
            path: None,
        })
    }

    pub fn path(&self) -> Option<&str> {
        self.path.as_deref()
    }

    /// Apply all schema migrations in order.
    pub fn migrate(&self) -> EngineResult<()> {
        self.conn()?
            .execute_batch(include_str!("../../../migrations/001_customer_fields.sql"))?;
        Ok(())
    }

    /// Open and migrate, retrying transient failures (busy, locked, cannot
    /// open) with the policy's backoff. Permanent errors return at once.
    pub fn open_with_retry(target: &str, policy: &RetryPolicy) -> EngineResult<Self> {
        let mut attempt = 1;
        loop {
            let opened = Self::open(target).and_then(|store| {
                store.migrate()?;
                Ok(store)
            });
            match opened {
                Ok(store) => return Ok(store),
                Err(e) if e.is_transient() && attempt < policy.max_attempts => {
                    let delay = policy.backoff_for(attempt);
                    log::warn!(
                        "store {target} unavailable (attempt {attempt}/{}): {e}; retrying in {delay:?}",
                        policy.max_attempts
                    );
                    std::thread::sleep(delay);
                    attempt += 1;
                }
                Err(e) => return Err(e),
            }
        }
    }

    fn conn(&self) -> EngineResult<MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|_| EngineError::StoreUnavailable("connection mutex poisoned".into()))
    }

    // ── Feeder side ────────────────────────────────────────────

    /// Upsert fields, creating the record if needed.
    pub fn put_fields(&self, id: &str, fields: &[(String, String)]) -> EngineResult<()> {
        let mut conn = self.conn()?;
        let tx = conn.transaction()?;
        {
            let mut stmt = tx.prepare_cached(UPSERT_FIELD)?;
            for (field, value) in fields {
                stmt.execute(params![id, field, value])?;
            }
        }
        tx.commit()?;
        Ok(())
    }

    pub fn put_snapshot(&self, id: &str, snapshot: &CustomerSnapshot) -> EngineResult<()> {
        self.put_fields(id, &snapshot.to_fields())
    }

    /// Delete every field of a record. Returns the number of fields removed.
    pub fn remove_record(&self, id: &str) -> EngineResult<usize> {
        let removed = self.conn()?.execute(
            "DELETE FROM customer_field WHERE customer_id = ?1",
            params![id],
        )?;
        Ok(removed)
    }

    pub fn customer_count(&self) -> EngineResult<i64> {
        let count = self.conn()?.query_row(
            "SELECT COUNT(DISTINCT customer_id) FROM customer_field",
            [],
            |row| row.get(0),
        )?;
        Ok(count)
    }

    /// Count records whose `risk_level` field currently equals `level`.
    pub fn risk_level_count(&self, level: &str) -> EngineResult<i64> {
        let count = self.conn()?.query_row(
            "SELECT COUNT(*) FROM customer_field WHERE field = 'risk_level' AND value = ?1",
            params![level],
            |row| row.get(0),
        )?;
        Ok(count)
    }
}

impl RecordStore for SqliteStore {
    fn list_identifiers(&self) -> EngineResult<Vec<CustomerId>> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare("SELECT DISTINCT customer_id FROM customer_field")?;
        let ids = stmt
            .query_map([], |row| row.get(0))?
            .collect::<Result<Vec<String>, _>>()?;
        Ok(ids)
    }

    fn read_fields(&self, id: &str) -> EngineResult<Option<FieldMap>> {
        let conn = self.conn()?;
        let mut stmt =
            conn.prepare_cached("SELECT field, value FROM customer_field WHERE customer_id = ?1")?;
        let fields = stmt
            .query_map(params![id], |row| {
                Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?))
            })?
            .collect::<Result<FieldMap, _>>()?;
        if fields.is_empty() {
            Ok(None)
        } else {
            Ok(Some(fields))
        }
    }

    fn write_fields(&self, id: &str, fields: &[(String, String)]) -> EngineResult<bool> {
        let mut conn = self.conn()?;
        let tx = conn.transaction()?;
        let exists: bool = tx.query_row(
            "SELECT EXISTS(SELECT 1 FROM customer_field WHERE customer_id = ?1)",
            params![id],
            |row| row.get(0),
        )?;
        if !exists {
            return Ok(false);
        }
        {
            let mut stmt = tx.prepare_cached(UPSERT_FIELD)?;
            for (field, value) in fields {
                stmt.execute(params![id, field, value])?;
            }
        }
        tx.commit()?;
        Ok(true)
    }
}
