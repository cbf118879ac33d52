use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// An operational alert raised by the core for the alerting collaborator.
///
/// The core never renders human-facing text; `payload` carries the
/// structured details.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Alert {
    pub id: Uuid,
    /// The poll cycle that raised the alert, if any.
    pub cycle_id: Option<Uuid>,
    pub timestamp: DateTime<Utc>,
    pub kind: AlertKind,
    pub payload: serde_json::Value,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum AlertKind {
    /// The grant action was refused for lack of permission.
    PermissionDenied,
    /// A grant key hit the consecutive failure limit and is cooling down.
    GrantSuppressed,
    /// Rules or events could not be read; the cycle was skipped.
    StorageReadFailed,
    /// Retention pruning failed.
    RetentionFailed,
}

impl AlertKind {
    /// Alerts an operator must act on, as opposed to informational ones.
    pub fn is_critical(self) -> bool {
        matches!(self, Self::PermissionDenied | Self::StorageReadFailed)
    }
}

impl Alert {
    pub fn new(cycle_id: Option<Uuid>, kind: AlertKind, payload: serde_json::Value) -> Self {
        Self {
            id: Uuid::new_v4(),
            cycle_id,
            timestamp: Utc::now(),
            kind,
            payload,
        }
    }
}

impl std::fmt::Display for AlertKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = serde_json::to_value(self)
            .ok()
            .and_then(|v| v.as_str().map(String::from))
            .unwrap_or_else(|| format!("{:?}", self));
        write!(f, "{}", s)
    }
}

impl std::str::FromStr for AlertKind {
    type Err = serde_json::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        serde_json::from_value(serde_json::Value::String(s.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_alert_creation() {
        let cycle_id = Uuid::new_v4();
        let alert = Alert::new(
            Some(cycle_id),
            AlertKind::PermissionDenied,
            serde_json::json!({"role_id": 7}),
        );
        assert_eq!(alert.cycle_id, Some(cycle_id));
        assert_eq!(alert.kind, AlertKind::PermissionDenied);
        assert_eq!(alert.payload["role_id"], 7);
    }

    #[test]
    fn test_alert_kind_display_and_parse() {
        assert_eq!(AlertKind::StorageReadFailed.to_string(), "storage_read_failed");
        assert_eq!(
            "grant_suppressed".parse::<AlertKind>().unwrap(),
            AlertKind::GrantSuppressed
        );
        assert!("nonsense".parse::<AlertKind>().is_err());
    }

    #[test]
    fn test_critical_kinds() {
        assert!(AlertKind::PermissionDenied.is_critical());
        assert!(!AlertKind::GrantSuppressed.is_critical());
    }
}
