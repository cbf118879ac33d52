use anyhow::Result;
use async_trait::async_trait;
use tokio::sync::mpsc;

use crate::error::{CadenceError, GrantError};
use crate::message::Message;
use crate::types::{ActivityEvent, ActivityRule, ChannelScope, GrantKey, ServerId, UserId};

/// Trait for long-running cadence components (scheduler, supervisor).
///
/// Each component receives messages from its channel and runs in its own Tokio task.
#[async_trait]
pub trait Component: Send + Sync + 'static {
    /// Human-readable name of this component.
    fn name(&self) -> &str;

    /// Start the component's event loop, consuming from the given receiver.
    async fn start(&self, rx: mpsc::Receiver<Message>) -> Result<()>;
}

/// Read access to the configured activity rules.
#[async_trait]
pub trait RuleSource: Send + Sync {
    async fn list_rules(&self) -> Result<Vec<ActivityRule>, CadenceError>;
}

/// The append-only activity log.
#[async_trait]
pub trait ActivityLog: Send + Sync {
    /// Persist one event. Returns once the event is durable.
    async fn append(&self, event: ActivityEvent) -> Result<(), CadenceError>;

    /// Per-user message counts in `server` within `scope`, for events with
    /// `since <= timestamp <= until`. Users without events are absent.
    async fn activity_counts(
        &self,
        server: ServerId,
        scope: &ChannelScope,
        since: i64,
        until: i64,
    ) -> Result<Vec<(UserId, u64)>, CadenceError>;

    /// Delete events with `timestamp < cutoff`, returning how many were removed.
    async fn prune_before(&self, cutoff: i64) -> Result<usize, CadenceError>;
}

/// The external role-grant action.
#[async_trait]
pub trait GrantAction: Send + Sync {
    /// Action name for logging (e.g., "discord").
    fn name(&self) -> &str;

    /// Resolve the server, member, and role of `key` and assign the role.
    async fn grant(&self, key: &GrantKey) -> Result<(), GrantError>;
}
