use std::path::Path;
use std::sync::Arc;

use anyhow::{Context, Result};
use rusqlite::Connection;
use tokio::sync::Mutex;
use tracing::info;

use cadence_core::CadenceError;

use crate::events::EventStore;
use crate::rules::RuleStore;

const SCHEMA: &str = "
    CREATE TABLE IF NOT EXISTS rules (
        rule_id       INTEGER PRIMARY KEY AUTOINCREMENT,
        server_id     INTEGER NOT NULL,
        time_period   INTEGER NOT NULL,
        role_id       INTEGER NOT NULL,
        message_count INTEGER NOT NULL,
        all_channels  INTEGER NOT NULL,
        created_at    INTEGER NOT NULL
    );
    CREATE TABLE IF NOT EXISTS rule_channels (
        rule_id    INTEGER NOT NULL REFERENCES rules(rule_id),
        channel_id INTEGER NOT NULL,
        PRIMARY KEY (rule_id, channel_id)
    );
    CREATE TABLE IF NOT EXISTS events (
        channel_id INTEGER NOT NULL,
        user_id    INTEGER NOT NULL,
        timestamp  INTEGER NOT NULL,
        server_id  INTEGER NOT NULL
    );
    CREATE INDEX IF NOT EXISTS idx_events_server_time ON events(server_id, timestamp);
    CREATE INDEX IF NOT EXISTS idx_rules_server ON rules(server_id);
";

pub(crate) type SharedConnection = Arc<Mutex<Connection>>;

/// Handle to the cadence SQLite database.
///
/// Cheap to clone; every clone shares the same connection.
#[derive(Clone)]
pub struct Database {
    conn: SharedConnection,
}

impl Database {
    /// Open or create the database at the given path.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let conn = Connection::open(path.as_ref()).context("Failed to open SQLite database")?;
        conn.execute_batch("PRAGMA journal_mode=WAL;")
            .context("Failed to enable WAL journal")?;
        conn.execute_batch(SCHEMA)
            .context("Failed to initialize cadence schema")?;
        info!(path = %path.as_ref().display(), "Database opened");
        Ok(Self::from_connection(conn))
    }

    /// Create an in-memory database (for testing).
    pub fn in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory().context("Failed to open in-memory SQLite")?;
        conn.execute_batch(SCHEMA)
            .context("Failed to initialize cadence schema")?;
        Ok(Self::from_connection(conn))
    }

    fn from_connection(conn: Connection) -> Self {
        Self {
            conn: Arc::new(Mutex::new(conn)),
        }
    }

    pub fn events(&self) -> EventStore {
        EventStore::new(Arc::clone(&self.conn))
    }

    pub fn rules(&self) -> RuleStore {
        RuleStore::new(Arc::clone(&self.conn))
    }
}

pub(crate) fn read_err(e: rusqlite::Error) -> CadenceError {
    CadenceError::StorageRead(e.to_string())
}

pub(crate) fn write_err(e: rusqlite::Error) -> CadenceError {
    CadenceError::StorageWrite(e.to_string())
}

/// Discord snowflakes fit in 63 bits; SQLite integers are signed.
pub(crate) fn to_sql_id(id: u64) -> i64 {
    id as i64
}

pub(crate) fn from_sql_id(raw: i64) -> u64 {
    raw as u64
}
