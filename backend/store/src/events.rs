use async_trait::async_trait;
use rusqlite::{params, params_from_iter};
use tracing::debug;

use cadence_core::{ActivityEvent, ActivityLog, CadenceError, ChannelScope, ServerId, UserId};

use crate::database::{from_sql_id, read_err, to_sql_id, write_err, SharedConnection};

/// Append-only store of per-message activity events.
#[derive(Clone)]
pub struct EventStore {
    conn: SharedConnection,
}

impl EventStore {
    pub(crate) fn new(conn: SharedConnection) -> Self {
        Self { conn }
    }

    /// Count all events in the store.
    pub async fn count(&self) -> Result<usize, CadenceError> {
        let conn = self.conn.lock().await;
        let count: i64 = conn
            .query_row("SELECT COUNT(*) FROM events", [], |row| row.get(0))
            .map_err(read_err)?;
        Ok(count as usize)
    }

    /// Timestamp of the oldest retained event.
    pub async fn oldest_timestamp(&self) -> Result<Option<i64>, CadenceError> {
        let conn = self.conn.lock().await;
        let oldest: Option<i64> = conn
            .query_row("SELECT MIN(timestamp) FROM events", [], |row| row.get(0))
            .map_err(read_err)?;
        Ok(oldest)
    }
}

#[async_trait]
impl ActivityLog for EventStore {
    async fn append(&self, event: ActivityEvent) -> Result<(), CadenceError> {
        let conn = self.conn.lock().await;
        conn.execute(
            "INSERT INTO events (channel_id, user_id, timestamp, server_id)
             VALUES (?1, ?2, ?3, ?4)",
            params![
                to_sql_id(event.channel_id.get()),
                to_sql_id(event.user_id.get()),
                event.timestamp,
                to_sql_id(event.server_id.get()),
            ],
        )
        .map_err(write_err)?;
        Ok(())
    }

    async fn activity_counts(
        &self,
        server: ServerId,
        scope: &ChannelScope,
        since: i64,
        until: i64,
    ) -> Result<Vec<(UserId, u64)>, CadenceError> {
        let mut sql = String::from(
            "SELECT user_id, COUNT(*) FROM events
             WHERE server_id = ?1 AND timestamp >= ?2 AND timestamp <= ?3",
        );
        let mut values: Vec<i64> = vec![to_sql_id(server.get()), since, until];

        if let ChannelScope::Explicit(channels) = scope {
            if channels.is_empty() {
                return Ok(Vec::new());
            }
            let placeholders: Vec<String> = (0..channels.len())
                .map(|i| format!("?{}", i + 4))
                .collect();
            sql.push_str(&format!(" AND channel_id IN ({})", placeholders.join(", ")));
            values.extend(channels.iter().map(|c| to_sql_id(c.get())));
        }
        sql.push_str(" GROUP BY user_id");

        let conn = self.conn.lock().await;
        let mut stmt = conn.prepare(&sql).map_err(read_err)?;
        let rows = stmt
            .query_map(params_from_iter(values.iter()), |row| {
                Ok((row.get::<_, i64>(0)?, row.get::<_, i64>(1)?))
            })
            .map_err(read_err)?;

        let mut counts = Vec::new();
        for row in rows {
            let (user, count) = row.map_err(read_err)?;
            counts.push((UserId(from_sql_id(user)), count.max(0) as u64));
        }
        debug!(
            server_id = %server,
            scope = %scope,
            since,
            until,
            users = counts.len(),
            "Activity counts loaded"
        );
        Ok(counts)
    }

    async fn prune_before(&self, cutoff: i64) -> Result<usize, CadenceError> {
        let conn = self.conn.lock().await;
        let n = conn
            .execute("DELETE FROM events WHERE timestamp < ?1", params![cutoff])
            .map_err(write_err)?;
        Ok(n)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Database;
    use cadence_core::ChannelId;

    fn event(channel: u64, user: u64, ts: i64) -> ActivityEvent {
        ActivityEvent::new(ServerId(1), ChannelId(channel), UserId(user), ts)
    }

    async fn store_with(events: &[ActivityEvent]) -> EventStore {
        let store = Database::in_memory().unwrap().events();
        for e in events {
            store.append(*e).await.unwrap();
        }
        store
    }

    fn sorted(mut counts: Vec<(UserId, u64)>) -> Vec<(UserId, u64)> {
        counts.sort();
        counts
    }

    #[tokio::test]
    async fn test_append_and_count() {
        let store = store_with(&[event(10, 1, 0), event(10, 1, 5)]).await;
        assert_eq!(store.count().await.unwrap(), 2);
        assert_eq!(store.oldest_timestamp().await.unwrap(), Some(0));
    }

    #[tokio::test]
    async fn test_counts_group_by_user() {
        let store = store_with(&[
            event(10, 1, 0),
            event(10, 1, 10),
            event(11, 2, 20),
        ])
        .await;
        let counts = store
            .activity_counts(ServerId(1), &ChannelScope::AllChannels, 0, 100)
            .await
            .unwrap();
        assert_eq!(sorted(counts), vec![(UserId(1), 2), (UserId(2), 1)]);
    }

    #[tokio::test]
    async fn test_window_bounds_are_inclusive() {
        let store = store_with(&[event(10, 1, 99), event(10, 1, 100), event(10, 1, 200), event(10, 1, 201)]).await;
        let counts = store
            .activity_counts(ServerId(1), &ChannelScope::AllChannels, 100, 200)
            .await
            .unwrap();
        assert_eq!(counts, vec![(UserId(1), 2)]);
    }

    #[tokio::test]
    async fn test_explicit_scope_filters_channels() {
        let store = store_with(&[event(10, 1, 0), event(11, 1, 1), event(12, 1, 2)]).await;
        let scope = ChannelScope::explicit([ChannelId(10), ChannelId(12)]).unwrap();
        let counts = store
            .activity_counts(ServerId(1), &scope, 0, 10)
            .await
            .unwrap();
        assert_eq!(counts, vec![(UserId(1), 2)]);
    }

    #[tokio::test]
    async fn test_other_servers_are_ignored() {
        let store = store_with(&[event(10, 1, 0)]).await;
        store
            .append(ActivityEvent::new(ServerId(2), ChannelId(10), UserId(1), 0))
            .await
            .unwrap();
        let counts = store
            .activity_counts(ServerId(2), &ChannelScope::AllChannels, 0, 10)
            .await
            .unwrap();
        assert_eq!(counts, vec![(UserId(1), 1)]);
    }

    #[tokio::test]
    async fn test_prune_before() {
        let store = store_with(&[event(10, 1, 0), event(10, 1, 50), event(10, 1, 100)]).await;
        assert_eq!(store.prune_before(100).await.unwrap(), 2);
        assert_eq!(store.count().await.unwrap(), 1);
        assert_eq!(store.prune_before(100).await.unwrap(), 0);
    }
}
