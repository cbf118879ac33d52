use serde::{Deserialize, Serialize};

use crate::alert::Alert;

/// Messages exchanged between components via the [`CadenceBus`](crate::CadenceBus).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Message {
    /// Any → Scheduler: run a cycle at the next idle boundary
    PollNow(PollRequest),
    /// Any → Scheduler: stop at the next idle boundary
    Shutdown,
    /// Any → Supervisor: raise an operational alert
    Alert(AlertPayload),
}

/// Request for an out-of-schedule poll cycle.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PollRequest {
    pub reason: String,
}

/// Alert payload for the supervisor.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AlertPayload {
    pub alert: Alert,
}

impl Message {
    pub fn alert(alert: Alert) -> Self {
        Message::Alert(AlertPayload { alert })
    }

    pub fn kind(&self) -> &'static str {
        match self {
            Message::PollNow(_) => "poll_now",
            Message::Shutdown => "shutdown",
            Message::Alert(_) => "alert",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::alert::AlertKind;

    #[test]
    fn test_message_serialization_roundtrip() {
        let msg = Message::alert(Alert::new(
            None,
            AlertKind::StorageReadFailed,
            serde_json::json!({"error": "disk I/O error"}),
        ));
        let json = serde_json::to_string(&msg).unwrap();
        assert!(json.contains("\"type\":\"alert\""));
        let deserialized: Message = serde_json::from_str(&json).unwrap();
        match deserialized {
            Message::Alert(payload) => assert_eq!(payload.alert.kind, AlertKind::StorageReadFailed),
            other => panic!("unexpected message: {:?}", other),
        }
    }

    #[test]
    fn test_unit_variant_roundtrip() {
        let json = serde_json::to_string(&Message::Shutdown).unwrap();
        assert_eq!(json, r#"{"type":"shutdown"}"#);
        let msg: Message = serde_json::from_str(&json).unwrap();
        assert_eq!(msg.kind(), "shutdown");
    }
}
