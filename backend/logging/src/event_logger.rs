//! Grant Event Logger
//!
//! One structured record per grant outcome, emitted under the `grant_events`
//! target so it can be filtered into its own stream.

use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::info;

use crate::redact::redact_sensitive_data;

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum GrantEvent {
    Granted {
        key: String,
        attempts: u32,
    },
    /// The server, member, or role no longer exists.
    Vanished {
        key: String,
        reason: String,
    },
    Denied {
        key: String,
        reason: String,
    },
    Retrying {
        key: String,
        attempt: u32,
        delay_ms: u64,
        reason: String,
    },
    TransientExhausted {
        key: String,
        attempts: u32,
        reason: String,
    },
    Suppressed {
        key: String,
        failures: u32,
        cooldown_secs: u64,
    },
}

impl GrantEvent {
    fn redact(&mut self) {
        match self {
            Self::Vanished { reason, .. }
            | Self::Denied { reason, .. }
            | Self::Retrying { reason, .. }
            | Self::TransientExhausted { reason, .. } => {
                *reason = redact_sensitive_data(reason);
            }
            Self::Granted { .. } | Self::Suppressed { .. } => {}
        }
    }
}

#[derive(Debug, Serialize)]
pub struct GrantEventEntry {
    pub cycle_id: String,
    pub timestamp: DateTime<Utc>,
    pub event: GrantEvent,
}

pub struct GrantEventLogger;

impl GrantEventLogger {
    /// Redact and emit one grant event for the given poll cycle.
    pub fn log_event(cycle_id: &str, mut event: GrantEvent) -> GrantEventEntry {
        event.redact();
        let entry = GrantEventEntry {
            cycle_id: cycle_id.into(),
            timestamp: Utc::now(),
            event,
        };
        let json = serde_json::to_string(&entry).unwrap_or_default();
        info!(target: "grant_events", event = %json, "Grant event");
        entry
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_reasons_are_redacted() {
        let entry = GrantEventLogger::log_event(
            "c1",
            GrantEvent::Denied {
                key: "role=1 user=2 server=3".into(),
                reason: "Bot secret.token.value refused".into(),
            },
        );
        match entry.event {
            GrantEvent::Denied { reason, .. } => assert!(!reason.contains("secret.token.value")),
            other => panic!("unexpected event {other:?}"),
        }
    }

    #[test]
    fn test_entry_serializes_with_tag() {
        let entry = GrantEventLogger::log_event(
            "c2",
            GrantEvent::Granted {
                key: "role=1 user=2 server=3".into(),
                attempts: 1,
            },
        );
        let json = serde_json::to_value(&entry).unwrap();
        assert_eq!(json["event"]["type"], "granted");
        assert_eq!(json["cycle_id"], "c2");
    }
}
