use std::path::Path;

use anyhow::{Context, Result};
use rusqlite::{params, Connection};
use tokio::sync::Mutex;
use tracing::info;

use cadence_core::Alert;

/// SQLite-backed store of operational alerts.
pub struct AlertStore {
    conn: Mutex<Connection>,
}

impl AlertStore {
    /// Open or create the alert store at the given path.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let conn =
            Connection::open(path.as_ref()).context("Failed to open SQLite database")?;
        conn.execute_batch("PRAGMA journal_mode=WAL;")
            .context("Failed to enable WAL journal")?;
        Self::init_schema(&conn)?;
        info!(path = %path.as_ref().display(), "Alert store opened");
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    /// Create an in-memory store (for testing).
    pub fn in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory().context("Failed to open in-memory SQLite")?;
        Self::init_schema(&conn)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    fn init_schema(conn: &Connection) -> Result<()> {
        conn.execute_batch(
            "CREATE TABLE IF NOT EXISTS alerts (
                id TEXT PRIMARY KEY,
                cycle_id TEXT,
                timestamp TEXT NOT NULL,
                kind TEXT NOT NULL,
                payload TEXT NOT NULL
            );
            CREATE INDEX IF NOT EXISTS idx_alerts_timestamp ON alerts(timestamp);
            CREATE INDEX IF NOT EXISTS idx_alerts_kind ON alerts(kind);",
        )
        .context("Failed to initialize alert schema")?;
        Ok(())
    }

    pub async fn insert(&self, alert: &Alert) -> Result<()> {
        let payload = serde_json::to_string(&alert.payload)?;
        let conn = self.conn.lock().await;
        conn.execute(
            "INSERT INTO alerts (id, cycle_id, timestamp, kind, payload)
             VALUES (?1, ?2, ?3, ?4, ?5)",
            params![
                alert.id.to_string(),
                alert.cycle_id.map(|id| id.to_string()),
                alert.timestamp.to_rfc3339(),
                alert.kind.to_string(),
                payload,
            ],
        )?;
        Ok(())
    }

    /// Most recent alerts first.
    pub async fn recent(&self, limit: usize) -> Result<Vec<Alert>> {
        let conn = self.conn.lock().await;
        let mut stmt = conn.prepare(
            "SELECT id, cycle_id, timestamp, kind, payload
             FROM alerts ORDER BY timestamp DESC LIMIT ?1",
        )?;

        let alerts = stmt
            .query_map(params![limit as i64], |row| {
                let id: String = row.get(0)?;
                let cycle_id: Option<String> = row.get(1)?;
                let timestamp: String = row.get(2)?;
                let kind: String = row.get(3)?;
                let payload: String = row.get(4)?;
                Ok((id, cycle_id, timestamp, kind, payload))
            })?
            .filter_map(|r| r.ok())
            .filter_map(|(id, cycle_id, timestamp, kind, payload)| {
                Some(Alert {
                    id: uuid::Uuid::parse_str(&id).ok()?,
                    cycle_id: match cycle_id {
                        Some(raw) => Some(uuid::Uuid::parse_str(&raw).ok()?),
                        None => None,
                    },
                    timestamp: chrono::DateTime::parse_from_rfc3339(&timestamp)
                        .ok()?
                        .with_timezone(&chrono::Utc),
                    kind: kind.parse().ok()?,
                    payload: serde_json::from_str(&payload).ok()?,
                })
            })
            .collect();

        Ok(alerts)
    }

    pub async fn count(&self) -> Result<usize> {
        let conn = self.conn.lock().await;
        let count: i64 = conn.query_row("SELECT COUNT(*) FROM alerts", [], |row| row.get(0))?;
        Ok(count as usize)
    }
}
