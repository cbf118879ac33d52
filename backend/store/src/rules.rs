use std::collections::{BTreeSet, HashMap};

use async_trait::async_trait;
use rusqlite::params;
use tracing::{info, warn};

use cadence_core::{
    ActivityRule, CadenceError, ChannelId, ChannelScope, NewRule, RoleId, RuleId, RuleSource,
    ServerId,
};

use crate::database::{from_sql_id, read_err, to_sql_id, write_err, SharedConnection};

/// Raw `rules` row before its channel scope is attached.
struct RuleRow {
    rule_id: i64,
    server_id: i64,
    time_period: i64,
    role_id: i64,
    message_count: i64,
    all_channels: bool,
}

/// Durable store of activity rules and their channel scopes.
///
/// "All channels" is stored as the `all_channels` flag, never as the absence
/// of `rule_channels` rows.
#[derive(Clone)]
pub struct RuleStore {
    conn: SharedConnection,
}

impl RuleStore {
    pub(crate) fn new(conn: SharedConnection) -> Self {
        Self { conn }
    }

    /// Validate and insert a rule together with its channel rows.
    pub async fn create_rule(&self, rule: NewRule) -> Result<ActivityRule, CadenceError> {
        rule.validate()?;
        let time_period = i64::try_from(rule.time_period)
            .map_err(|_| CadenceError::InvalidRule("time_period is too large".to_string()))?;

        let mut conn = self.conn.lock().await;
        let tx = conn.transaction().map_err(write_err)?;
        tx.execute(
            "INSERT INTO rules (server_id, time_period, role_id, message_count, all_channels, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            params![
                to_sql_id(rule.server_id.get()),
                time_period,
                to_sql_id(rule.role_id.get()),
                rule.message_count,
                rule.channel_scope.is_all(),
                chrono::Utc::now().timestamp(),
            ],
        )
        .map_err(write_err)?;
        let rule_id = tx.last_insert_rowid();

        if let ChannelScope::Explicit(channels) = &rule.channel_scope {
            let mut stmt = tx
                .prepare("INSERT INTO rule_channels (rule_id, channel_id) VALUES (?1, ?2)")
                .map_err(write_err)?;
            for channel in channels {
                stmt.execute(params![rule_id, to_sql_id(channel.get())])
                    .map_err(write_err)?;
            }
        }
        tx.commit().map_err(write_err)?;

        info!(
            rule_id,
            server_id = %rule.server_id,
            role_id = %rule.role_id,
            scope = %rule.channel_scope,
            "Activity rule created"
        );
        Ok(rule.into_rule(RuleId(rule_id)))
    }

    /// Delete a rule and its channel rows. Returns `false` if it did not exist.
    pub async fn delete_rule(&self, rule_id: RuleId) -> Result<bool, CadenceError> {
        let mut conn = self.conn.lock().await;
        let tx = conn.transaction().map_err(write_err)?;
        tx.execute(
            "DELETE FROM rule_channels WHERE rule_id = ?1",
            params![rule_id.0],
        )
        .map_err(write_err)?;
        let removed = tx
            .execute("DELETE FROM rules WHERE rule_id = ?1", params![rule_id.0])
            .map_err(write_err)?;
        tx.commit().map_err(write_err)?;

        if removed > 0 {
            info!(rule_id = %rule_id, "Activity rule deleted");
        }
        Ok(removed > 0)
    }

    pub async fn get_rule(&self, rule_id: RuleId) -> Result<Option<ActivityRule>, CadenceError> {
        let rules = self.load(None).await?;
        Ok(rules.into_iter().find(|r| r.rule_id == rule_id))
    }

    pub async fn list_rules_for_server(
        &self,
        server_id: ServerId,
    ) -> Result<Vec<ActivityRule>, CadenceError> {
        self.load(Some(server_id)).await
    }

    async fn load(&self, server: Option<ServerId>) -> Result<Vec<ActivityRule>, CadenceError> {
        let conn = self.conn.lock().await;

        let mut stmt = conn
            .prepare(
                "SELECT rule_id, server_id, time_period, role_id, message_count, all_channels
                 FROM rules WHERE (?1 IS NULL OR server_id = ?1) ORDER BY rule_id ASC",
            )
            .map_err(read_err)?;
        let server_filter = server.map(|s| to_sql_id(s.get()));
        let rows = stmt
            .query_map(params![server_filter], |row| {
                Ok(RuleRow {
                    rule_id: row.get(0)?,
                    server_id: row.get(1)?,
                    time_period: row.get(2)?,
                    role_id: row.get(3)?,
                    message_count: row.get(4)?,
                    all_channels: row.get(5)?,
                })
            })
            .map_err(read_err)?;
        let mut raw = Vec::new();
        for row in rows {
            raw.push(row.map_err(read_err)?);
        }

        let mut channel_stmt = conn
            .prepare("SELECT rule_id, channel_id FROM rule_channels")
            .map_err(read_err)?;
        let channel_rows = channel_stmt
            .query_map([], |row| Ok((row.get::<_, i64>(0)?, row.get::<_, i64>(1)?)))
            .map_err(read_err)?;
        let mut channels: HashMap<i64, BTreeSet<ChannelId>> = HashMap::new();
        for row in channel_rows {
            let (rule_id, channel_id) = row.map_err(read_err)?;
            channels
                .entry(rule_id)
                .or_default()
                .insert(ChannelId(from_sql_id(channel_id)));
        }

        Ok(raw
            .into_iter()
            .filter_map(|row| {
                let scoped = channels.remove(&row.rule_id);
                build_rule(row, scoped)
            })
            .collect())
    }
}

/// Assemble a rule from its row and channel set, skipping malformed rows.
fn build_rule(row: RuleRow, channels: Option<BTreeSet<ChannelId>>) -> Option<ActivityRule> {
    if row.time_period <= 0 || row.message_count <= 0 {
        warn!(
            rule_id = row.rule_id,
            time_period = row.time_period,
            message_count = row.message_count,
            "Skipping rule with non-positive period or count"
        );
        return None;
    }

    let channel_scope = if row.all_channels {
        ChannelScope::AllChannels
    } else {
        match channels {
            Some(set) if !set.is_empty() => ChannelScope::Explicit(set),
            _ => {
                warn!(
                    rule_id = row.rule_id,
                    "Skipping rule with an explicit channel scope but no channels"
                );
                return None;
            }
        }
    };

    Some(ActivityRule {
        rule_id: RuleId(row.rule_id),
        server_id: ServerId(from_sql_id(row.server_id)),
        time_period: row.time_period as u64,
        role_id: RoleId(from_sql_id(row.role_id)),
        message_count: u32::try_from(row.message_count).unwrap_or(u32::MAX),
        channel_scope,
    })
}

#[async_trait]
impl RuleSource for RuleStore {
    async fn list_rules(&self) -> Result<Vec<ActivityRule>, CadenceError> {
        self.load(None).await
    }
}
