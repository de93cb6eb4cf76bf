//! SQLite backend for the hit store.
//!
//! One SQLite file per queue. `synchronous = FULL` makes every committed
//! append durable before `append` returns.

use crate::{HitRecord, HitStore, StoreError, StoreResult};
use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension};
use std::path::Path;
use std::sync::{Mutex, MutexGuard};
use tracing::debug;

/// Durable hit store backed by a single SQLite connection.
///
/// [`HitStore::close`] releases the connection; later calls fail with
/// [`StoreError::Closed`].
pub struct SqliteHitStore {
    conn: Mutex<Option<Connection>>,
}

impl SqliteHitStore {
    /// Opens (or creates) a store at the given path.
    pub fn open(path: impl AsRef<Path>) -> StoreResult<Self> {
        let path = path.as_ref();
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }

        let conn = Connection::open(path)?;
        conn.execute_batch(
            "
            PRAGMA journal_mode = WAL;
            PRAGMA synchronous = FULL;
            PRAGMA busy_timeout = 5000;
        ",
        )?;
        init_schema(&conn)?;

        debug!(path = %path.display(), "Opened hit store");
        Ok(Self {
            conn: Mutex::new(Some(conn)),
        })
    }

    /// Creates an in-memory SQLite store.
    ///
    /// Useful for testing.
    pub fn in_memory() -> StoreResult<Self> {
        let conn = Connection::open_in_memory()?;
        init_schema(&conn)?;
        Ok(Self {
            conn: Mutex::new(Some(conn)),
        })
    }

    fn lock(&self) -> StoreResult<MutexGuard<'_, Option<Connection>>> {
        self.conn
            .lock()
            .map_err(|e| StoreError::LockPoisoned(e.to_string()))
    }

    fn with_conn<R>(&self, f: impl FnOnce(&Connection) -> StoreResult<R>) -> StoreResult<R> {
        let guard = self.lock()?;
        let conn = guard.as_ref().ok_or(StoreError::Closed)?;
        f(conn)
    }
}

fn init_schema(conn: &Connection) -> StoreResult<()> {
    conn.execute_batch(
        r#"
        CREATE TABLE IF NOT EXISTS hits (
            sequence INTEGER PRIMARY KEY AUTOINCREMENT,
            id TEXT NOT NULL UNIQUE,
            kind TEXT NOT NULL,
            payload TEXT NOT NULL,
            created_at TEXT NOT NULL
        );
        "#,
    )?;
    Ok(())
}

fn row_to_record(row: &rusqlite::Row<'_>) -> rusqlite::Result<HitRecord> {
    Ok(HitRecord {
        sequence: row.get(0)?,
        id: row.get(1)?,
        kind: row.get(2)?,
        payload: row.get(3)?,
        created_at: parse_datetime(row.get::<_, String>(4)?),
    })
}

fn parse_datetime(s: String) -> DateTime<Utc> {
    DateTime::parse_from_rfc3339(&s)
        .map(|dt| dt.with_timezone(&Utc))
        .unwrap_or_else(|_| Utc::now())
}

impl HitStore for SqliteHitStore {
    fn append(&self, kind: &str, payload: &str) -> StoreResult<String> {
        let id = uuid::Uuid::new_v4().to_string();
        let now = Utc::now().to_rfc3339();
        self.with_conn(|conn| {
            conn.execute(
                "INSERT INTO hits (id, kind, payload, created_at) VALUES (?1, ?2, ?3, ?4)",
                params![id, kind, payload, now],
            )?;
            Ok(())
        })?;
        Ok(id)
    }

    fn peek_oldest(&self) -> StoreResult<Option<HitRecord>> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare_cached(
                "SELECT sequence, id, kind, payload, created_at FROM hits ORDER BY sequence LIMIT 1",
            )?;
            Ok(stmt.query_row([], row_to_record).optional()?)
        })
    }

    fn peek_batch(&self, limit: usize) -> StoreResult<Vec<HitRecord>> {
        let limit = i64::try_from(limit).unwrap_or(i64::MAX);
        self.with_conn(|conn| {
            let mut stmt = conn.prepare_cached(
                "SELECT sequence, id, kind, payload, created_at FROM hits ORDER BY sequence LIMIT ?1",
            )?;
            let rows = stmt.query_map(params![limit], row_to_record)?;

            let mut records = Vec::new();
            for row in rows {
                records.push(row?);
            }
            Ok(records)
        })
    }

    fn update_payload(&self, id: &str, payload: &str) -> StoreResult<()> {
        let affected = self.with_conn(|conn| {
            Ok(conn.execute(
                "UPDATE hits SET payload = ?1 WHERE id = ?2",
                params![payload, id],
            )?)
        })?;
        if affected == 0 {
            return Err(StoreError::NotFound(id.to_string()));
        }
        Ok(())
    }

    fn remove_oldest(&self) -> StoreResult<()> {
        self.with_conn(|conn| {
            conn.execute(
                "DELETE FROM hits WHERE sequence = (SELECT MIN(sequence) FROM hits)",
                [],
            )?;
            Ok(())
        })
    }

    fn clear(&self) -> StoreResult<()> {
        self.with_conn(|conn| {
            conn.execute("DELETE FROM hits", [])?;
            Ok(())
        })
    }

    fn count(&self) -> StoreResult<usize> {
        let count: i64 =
            self.with_conn(|conn| Ok(conn.query_row("SELECT COUNT(*) FROM hits", [], |row| row.get(0))?))?;
        Ok(usize::try_from(count).unwrap_or_default())
    }

    fn close(&self) -> StoreResult<()> {
        let conn = self.lock()?.take();
        if let Some(conn) = conn {
            conn.close().map_err(|(_, e)| StoreError::Sqlite(e))?;
            debug!("Closed hit store");
        }
        Ok(())
    }
}
