//! SQLite history store.
//!
//! Runtime defaults:
//! - `journal_mode = WAL` so the reader connection sees committed state
//!   while the writer holds a batch open
//! - `busy_timeout` from config (5s by default)
//! - `foreign_keys = ON` so participants, room info and attachments follow
//!   their parent rows

pub mod migrations;
pub mod query;
pub mod schema;
pub mod write;

use anyhow::{Context, Result, bail};
use rusqlite::Connection;
use std::{path::Path, time::Duration};

/// Busy timeout used when the config does not override it.
pub const DEFAULT_BUSY_TIMEOUT: Duration = Duration::from_secs(5);

/// Open (or create) the store database, apply runtime pragmas, and migrate
/// the schema to the latest version.
///
/// # Errors
///
/// Returns an error if opening, configuring or migrating the database fails.
pub fn open_store(path: &Path, busy_timeout: Duration) -> Result<Connection> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("create store directory {}", parent.display()))?;
    }

    let mut conn =
        Connection::open(path).with_context(|| format!("open store {}", path.display()))?;

    configure_connection(&conn, busy_timeout).context("configure sqlite pragmas")?;
    migrations::migrate(&mut conn).context("apply store migrations")?;

    Ok(conn)
}

/// Open a second connection for reads. It never writes and only observes
/// committed transactions of the writer.
///
/// # Errors
///
/// Returns an error if the database cannot be opened or configured.
pub fn open_reader(path: &Path, busy_timeout: Duration) -> Result<Connection> {
    let conn = Connection::open(path)
        .with_context(|| format!("open store reader {}", path.display()))?;
    configure_connection(&conn, busy_timeout).context("configure reader pragmas")?;
    conn.pragma_update(None, "query_only", "ON")
        .context("set reader query_only")?;
    Ok(conn)
}

/// Migrated in-memory database for tests and scratch use.
///
/// # Errors
///
/// Returns an error if migration fails.
pub fn open_in_memory() -> Result<Connection> {
    let mut conn = Connection::open_in_memory().context("open in-memory store")?;
    conn.pragma_update(None, "foreign_keys", "ON")
        .context("enable foreign keys")?;
    migrations::migrate(&mut conn).context("apply store migrations")?;
    Ok(conn)
}

fn configure_connection(conn: &Connection, busy_timeout: Duration) -> rusqlite::Result<()> {
    conn.pragma_update(None, "foreign_keys", "ON")?;
    conn.pragma_update(None, "synchronous", "NORMAL")?;
    let _journal_mode: String =
        conn.query_row("PRAGMA journal_mode = WAL", [], |row| row.get(0))?;
    conn.busy_timeout(busy_timeout)?;
    Ok(())
}

/// The writer connection plus its batch state.
///
/// Every mutation between [`Store::begin_batch_operation`] and
/// [`Store::end_batch_operation`] commits as one unit;
/// [`Store::rollback_batch_operation`] restores the pre-begin state.
#[derive(Debug)]
pub struct Store {
    conn: Connection,
    in_batch: bool,
}

impl Store {
    #[must_use]
    pub const fn new(conn: Connection) -> Self {
        Self {
            conn,
            in_batch: false,
        }
    }

    /// # Errors
    ///
    /// See [`open_store`].
    pub fn open(path: &Path, busy_timeout: Duration) -> Result<Self> {
        open_store(path, busy_timeout).map(Self::new)
    }

    #[must_use]
    pub const fn conn(&self) -> &Connection {
        &self.conn
    }

    #[must_use]
    pub const fn in_batch(&self) -> bool {
        self.in_batch
    }

    /// # Errors
    ///
    /// Returns an error if a batch is already open or `BEGIN` fails.
    pub fn begin_batch_operation(&mut self) -> Result<()> {
        if self.in_batch {
            bail!("batch operation already in progress");
        }
        self.conn
            .execute_batch("BEGIN IMMEDIATE")
            .context("begin batch transaction")?;
        self.in_batch = true;
        Ok(())
    }

    /// # Errors
    ///
    /// Returns an error if no batch is open or `COMMIT` fails. A failed
    /// commit leaves the batch open so the caller can roll back.
    pub fn end_batch_operation(&mut self) -> Result<()> {
        if !self.in_batch {
            bail!("no batch operation in progress");
        }
        self.conn
            .execute_batch("COMMIT")
            .context("commit batch transaction")?;
        self.in_batch = false;
        Ok(())
    }

    /// Roll back the open batch. A no-op when no batch is open.
    ///
    /// # Errors
    ///
    /// Returns an error if `ROLLBACK` fails.
    pub fn rollback_batch_operation(&mut self) -> Result<()> {
        if !self.in_batch {
            return Ok(());
        }
        self.in_batch = false;
        if self.conn.is_autocommit() {
            // SQLite already rolled back on its own (e.g. SQLITE_FULL).
            return Ok(());
        }
        self.conn
            .execute_batch("ROLLBACK")
            .context("roll back batch transaction")
    }
}

#[cfg(test)]
mod tests {
    use super::{DEFAULT_BUSY_TIMEOUT, Store, open_reader, open_store};
    use crate::db::migrations;
    use tempfile::TempDir;

    fn temp_db_path() -> (TempDir, std::path::PathBuf) {
        let dir = tempfile::tempdir().expect("create temp dir");
        let path = dir.path().join("threadline.sqlite3");
        (dir, path)
    }

    #[test]
    fn open_store_sets_wal_busy_timeout_and_fk() {
        let (_dir, path) = temp_db_path();
        let conn = open_store(&path, DEFAULT_BUSY_TIMEOUT).expect("open store");

        let journal_mode: String = conn
            .pragma_query_value(None, "journal_mode", |row| row.get(0))
            .expect("query journal_mode");
        assert_eq!(journal_mode.to_ascii_lowercase(), "wal");

        let busy_timeout_ms: u64 = conn
            .pragma_query_value(None, "busy_timeout", |row| row.get(0))
            .expect("query busy_timeout");
        assert_eq!(u128::from(busy_timeout_ms), DEFAULT_BUSY_TIMEOUT.as_millis());

        let foreign_keys: i64 = conn
            .pragma_query_value(None, "foreign_keys", |row| row.get(0))
            .expect("query foreign_keys");
        assert_eq!(foreign_keys, 1);

        let version = migrations::current_schema_version(&conn).expect("schema version");
        assert_eq!(version, migrations::LATEST_SCHEMA_VERSION);
    }

    #[test]
    fn reader_sees_only_committed_batches() {
        let (_dir, path) = temp_db_path();
        let mut store = Store::open(&path, DEFAULT_BUSY_TIMEOUT).expect("open store");
        let reader = open_reader(&path, DEFAULT_BUSY_TIMEOUT).expect("open reader");

        let count = |conn: &rusqlite::Connection| -> i64 {
            conn.query_row("SELECT COUNT(*) FROM threads", [], |row| row.get(0))
                .expect("count threads")
        };

        store.begin_batch_operation().expect("begin");
        store
            .conn()
            .execute(
                "INSERT INTO threads (account_id, thread_id, type) VALUES ('a', 't', 0)",
                [],
            )
            .expect("insert thread");
        assert_eq!(count(&reader), 0);

        store.end_batch_operation().expect("commit");
        assert_eq!(count(&reader), 1);
    }

    #[test]
    fn rollback_restores_pre_batch_state() {
        let (_dir, path) = temp_db_path();
        let mut store = Store::open(&path, DEFAULT_BUSY_TIMEOUT).expect("open store");

        store.begin_batch_operation().expect("begin");
        store
            .conn()
            .execute(
                "INSERT INTO threads (account_id, thread_id, type) VALUES ('a', 't', 0)",
                [],
            )
            .expect("insert thread");
        store.rollback_batch_operation().expect("rollback");
        assert!(!store.in_batch());

        let rows: i64 = store
            .conn()
            .query_row("SELECT COUNT(*) FROM threads", [], |row| row.get(0))
            .expect("count threads");
        assert_eq!(rows, 0);
        store.rollback_batch_operation().expect("second rollback is a no-op");
    }

    #[test]
    fn nested_begin_is_rejected() {
        let (_dir, path) = temp_db_path();
        let mut store = Store::open(&path, DEFAULT_BUSY_TIMEOUT).expect("open store");
        store.begin_batch_operation().expect("begin");
        assert!(store.begin_batch_operation().is_err());
        store.end_batch_operation().expect("commit");
        assert!(store.end_batch_operation().is_err());
    }
}
