use std::sync::Arc;

use async_trait::async_trait;
use serenity::http::Http;
use serenity::model::channel::Message as DiscordMessage;
use serenity::model::gateway::Ready;
use serenity::model::id::{GuildId, RoleId as DiscordRoleId, UserId as DiscordUserId};
use serenity::prelude::*;
use tracing::{debug, error, info, warn};

use cadence_core::{ActivityEvent, ActivityLog, ChannelId, GrantAction, GrantError, GrantKey, ServerId, UserId};
use cadence_logging::redact_sensitive_data;

use crate::ChannelAdapter;

/// Build the activity event for a message, or `None` if it does not count:
/// bot authors and direct messages are ignored.
pub(crate) fn activity_event(
    guild_id: Option<u64>,
    channel_id: u64,
    author_id: u64,
    author_is_bot: bool,
    timestamp: i64,
) -> Option<ActivityEvent> {
    if author_is_bot {
        return None;
    }
    let guild_id = guild_id?;
    Some(ActivityEvent::new(
        ServerId(guild_id),
        ChannelId(channel_id),
        UserId(author_id),
        timestamp,
    ))
}

struct Handler {
    activity: Arc<dyn ActivityLog>,
}

#[async_trait]
impl EventHandler for Handler {
    async fn message(&self, _ctx: Context, msg: DiscordMessage) {
        let Some(event) = activity_event(
            msg.guild_id.map(|g| g.get()),
            msg.channel_id.get(),
            msg.author.id.get(),
            msg.author.bot,
            msg.timestamp.unix_timestamp(),
        ) else {
            return;
        };

        if let Err(e) = self.activity.append(event).await {
            error!(
                server_id = %event.server_id,
                channel_id = %event.channel_id,
                error = %e,
                "Failed to record message activity"
            );
        } else {
            debug!(server_id = %event.server_id, user_id = %event.user_id, "Activity recorded");
        }
    }

    async fn ready(&self, _: Context, ready: Ready) {
        info!(user = %ready.user.name, guilds = ready.guilds.len(), "Discord gateway connected");
    }
}

/// Gateway connection that records one activity event per guild message.
pub struct DiscordAdapter {
    token: String,
    activity: Arc<dyn ActivityLog>,
}

impl DiscordAdapter {
    pub fn new(token: String, activity: Arc<dyn ActivityLog>) -> Self {
        Self { token, activity }
    }
}

#[async_trait]
impl ChannelAdapter for DiscordAdapter {
    fn name(&self) -> &str {
        "discord"
    }

    async fn start(&self) -> anyhow::Result<()> {
        info!("Starting Discord adapter");

        // Message metadata only; content is never read.
        let intents = GatewayIntents::GUILDS | GatewayIntents::GUILD_MESSAGES;

        let mut client = Client::builder(&self.token, intents)
            .event_handler(Handler {
                activity: Arc::clone(&self.activity),
            })
            .await?;

        if let Err(why) = client.start().await {
            let reason = redact_sensitive_data(&why.to_string());
            error!(error = %reason, "Discord client error");
            anyhow::bail!("Discord client error: {reason}");
        }

        Ok(())
    }
}

/// Map a Discord REST status to the grant outcome taxonomy.
///
/// 401 is a rejected bot token, 403 a missing permission (or a role above the
/// bot's). Both are permanent. 404 is an unknown guild, member or role. Everything else, including 429 and 5xx, is worth
/// retrying.
pub fn classify_status(status: Option<u16>, message: String) -> GrantError {
    match status {
        Some(401) | Some(403) => GrantError::PermissionDenied(message),
        Some(404) => GrantError::TargetNotFound(message),
        _ => GrantError::Transient(message),
    }
}

fn classify_error(err: serenity::Error) -> GrantError {
    let message = redact_sensitive_data(&err.to_string());
    match &err {
        serenity::Error::Http(http_err) => {
            classify_status(http_err.status_code().map(|s| s.as_u16()), message)
        }
        _ => GrantError::Transient(message),
    }
}

/// Grants roles through Discord's REST API.
pub struct DiscordGrantAction {
    http: Arc<Http>,
    audit_reason: String,
}

impl DiscordGrantAction {
    pub fn new(token: &str, audit_reason: impl Into<String>) -> Self {
        Self {
            http: Arc::new(Http::new(token)),
            audit_reason: audit_reason.into(),
        }
    }
}

#[async_trait]
impl GrantAction for DiscordGrantAction {
    fn name(&self) -> &str {
        "discord"
    }

    async fn grant(&self, key: &GrantKey) -> Result<(), GrantError> {
        // Discord ids are never zero; serenity refuses to build them.
        if key.server_id.get() == 0 || key.user_id.get() == 0 || key.role_id.get() == 0 {
            warn!(key = %key, "Grant key has a zero id");
            return Err(GrantError::TargetNotFound(format!("invalid id in {key}")));
        }

        self.http
            .add_member_role(
                GuildId::new(key.server_id.get()),
                DiscordUserId::new(key.user_id.get()),
                DiscordRoleId::new(key.role_id.get()),
                Some(self.audit_reason.as_str()),
            )
            .await
            .map_err(classify_error)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use cadence_core::RoleId;

    #[test]
    fn test_status_classification() {
        assert!(matches!(
            classify_status(Some(403), "Missing Permissions".into()),
            GrantError::PermissionDenied(_)
        ));
        assert!(matches!(
            classify_status(Some(401), "401: Unauthorized".into()),
            GrantError::PermissionDenied(_)
        ));
        assert!(matches!(
            classify_status(Some(404), "Unknown Member".into()),
            GrantError::TargetNotFound(_)
        ));
        for status in [Some(429), Some(500), Some(502), None] {
            assert!(classify_status(status, "x".into()).is_transient());
        }
    }

    #[test]
    fn test_bots_and_direct_messages_are_ignored() {
        assert!(activity_event(Some(1), 2, 3, true, 100).is_none());
        assert!(activity_event(None, 2, 3, false, 100).is_none());

        let event = activity_event(Some(1), 2, 3, false, 100).unwrap();
        assert_eq!(event.server_id, ServerId(1));
        assert_eq!(event.channel_id, ChannelId(2));
        assert_eq!(event.user_id, UserId(3));
        assert_eq!(event.timestamp, 100);
    }

    #[tokio::test]
    async fn test_zero_ids_are_target_not_found() {
        let action = DiscordGrantAction::new("token", "test");
        let key = GrantKey::new(RoleId(0), UserId(5), ServerId(1));
        let err = action.grant(&key).await.unwrap_err();
        assert!(matches!(err, GrantError::TargetNotFound(_)));
    }
}
