//! SQLite persistence for everything the importer keeps between requests.
//!
//! One database file holds:
//! - `settings`: key/value options (mapping configuration, import tunables),
//! - `runs` and `run_log`: import run state with an explicit expiry, plus the
//!   textual log the status endpoint tails,
//! - `queue`: the durable work queue drained by the background worker,
//! - `products`, `product_meta` and `assets`: the default catalog backend.
//!
//! Like the rest of the service, callers open a short-lived connection per
//! operation through [`Store::connect`]; WAL mode plus a busy timeout lets the
//! CSV reader and the worker write concurrently.

pub mod queue;
pub mod runs;
pub mod settings;

use crate::error::ImportResult;
use rusqlite::Connection;
use std::path::{Path, PathBuf};
use std::time::Duration;

const BUSY_TIMEOUT: Duration = Duration::from_secs(5);

const SCHEMA: &str = "
    CREATE TABLE IF NOT EXISTS settings (
        key TEXT PRIMARY KEY,
        value TEXT NOT NULL,
        updated_at TEXT NOT NULL
    );

    CREATE TABLE IF NOT EXISTS runs (
        run_id TEXT PRIMARY KEY,
        status TEXT NOT NULL,
        message TEXT,
        file_path TEXT NOT NULL,
        file_md5 TEXT,
        total_rows INTEGER NOT NULL DEFAULT 0,
        processed_rows INTEGER NOT NULL DEFAULT 0,
        skipped_rows INTEGER NOT NULL DEFAULT 0,
        error_rows INTEGER NOT NULL DEFAULT 0,
        dispatch_complete INTEGER NOT NULL DEFAULT 0,
        settings TEXT NOT NULL,
        started_at TEXT NOT NULL,
        completed_at TEXT,
        expires_at INTEGER NOT NULL
    );

    CREATE TABLE IF NOT EXISTS run_log (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        run_id TEXT NOT NULL,
        level TEXT NOT NULL,
        message TEXT NOT NULL,
        logged_at TEXT NOT NULL
    );
    CREATE INDEX IF NOT EXISTS idx_run_log_run ON run_log(run_id, id);

    CREATE TABLE IF NOT EXISTS queue (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        run_id TEXT NOT NULL,
        payload TEXT NOT NULL,
        state TEXT NOT NULL DEFAULT 'queued',
        enqueued_at TEXT NOT NULL,
        claimed_at TEXT
    );
    CREATE INDEX IF NOT EXISTS idx_queue_state ON queue(state, id);
    CREATE INDEX IF NOT EXISTS idx_queue_run ON queue(run_id);

    CREATE TABLE IF NOT EXISTS products (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        name TEXT NOT NULL,
        description TEXT NOT NULL DEFAULT '',
        sku TEXT NOT NULL DEFAULT '',
        regular_price TEXT,
        sale_price TEXT,
        manage_stock INTEGER NOT NULL DEFAULT 1,
        stock_quantity INTEGER,
        stock_status TEXT NOT NULL DEFAULT 'instock',
        weight REAL,
        length REAL,
        width REAL,
        height REAL,
        tax_status TEXT NOT NULL DEFAULT 'taxable',
        status TEXT NOT NULL DEFAULT 'publish',
        categories TEXT NOT NULL DEFAULT '[]',
        tags TEXT NOT NULL DEFAULT '[]',
        attributes TEXT NOT NULL DEFAULT '[]',
        image_id INTEGER,
        created_at TEXT NOT NULL,
        updated_at TEXT NOT NULL
    );

    CREATE TABLE IF NOT EXISTS product_meta (
        product_id INTEGER NOT NULL,
        meta_key TEXT NOT NULL,
        meta_value TEXT NOT NULL,
        PRIMARY KEY (product_id, meta_key)
    );
    CREATE INDEX IF NOT EXISTS idx_product_meta_lookup ON product_meta(meta_key, meta_value);
    CREATE UNIQUE INDEX IF NOT EXISTS idx_product_meta_raw_id
        ON product_meta(meta_value) WHERE meta_key = '_raw_id';

    CREATE TABLE IF NOT EXISTS assets (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        path TEXT NOT NULL UNIQUE,
        title TEXT NOT NULL,
        mime_type TEXT NOT NULL,
        parent_id INTEGER,
        width INTEGER NOT NULL,
        height INTEGER NOT NULL,
        created_at TEXT NOT NULL,
        updated_at TEXT NOT NULL
    );
";

/// Handle to the importer database. Cheap to clone; holds only the path.
#[derive(Debug, Clone)]
pub struct Store {
    path: PathBuf,
}

impl Store {
    /// Opens (creating if needed) the database and applies the schema.
    pub fn open(path: impl AsRef<Path>) -> ImportResult<Self> {
        let store = Self {
            path: path.as_ref().to_path_buf(),
        };
        let conn = store.connect()?;
        conn.pragma_update_and_check(None, "journal_mode", "WAL", |_| Ok(()))?;
        conn.execute_batch(SCHEMA)?;
        Ok(store)
    }

    pub fn connect(&self) -> ImportResult<Connection> {
        let conn = Connection::open(&self.path)?;
        conn.busy_timeout(BUSY_TIMEOUT)?;
        Ok(conn)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}


#[cfg(test)]
mod tests {
    use super::testing::temp_store;
    use super::Store;

    #[test]
    fn reopening_an_existing_database_keeps_the_schema() {
        let (_dir, store) = temp_store();
        let reopened = Store::open(store.path()).unwrap();
        let conn = reopened.connect().unwrap();
        let tables: i64 = conn
            .query_row(
                "SELECT COUNT(*) FROM sqlite_master WHERE type = 'table' AND name IN ('runs', 'queue', 'products')",
                [],
                |row| row.get(0),
            )
            .unwrap();
        assert_eq!(tables, 3);
    }
}
