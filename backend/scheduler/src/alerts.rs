use tokio::sync::mpsc;
use tracing::warn;
use uuid::Uuid;

use cadence_core::{Alert, AlertKind, Message};

/// Sends alerts to the supervisor over the bus.
#[derive(Clone, Default)]
pub struct AlertSink {
    tx: Option<mpsc::Sender<Message>>,
}

impl AlertSink {
    pub fn new(tx: mpsc::Sender<Message>) -> Self {
        Self { tx: Some(tx) }
    }

    /// A sink that drops every alert.
    pub fn disabled() -> Self {
        Self { tx: None }
    }

    pub async fn raise(&self, cycle_id: Option<Uuid>, kind: AlertKind, payload: serde_json::Value) {
        let Some(tx) = &self.tx else {
            return;
        };
        let alert = Alert::new(cycle_id, kind, payload);
        if let Err(e) = tx.send(Message::alert(alert)).await {
            warn!(kind = %kind, error = %e, "Failed to deliver alert to supervisor");
        }
    }
}
