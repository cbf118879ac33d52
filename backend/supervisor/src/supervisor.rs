use anyhow::Result;
use async_trait::async_trait;
use tokio::sync::{broadcast, mpsc, RwLock};
use tracing::{debug, error, info, warn};

use cadence_core::{Alert, Component, Message};

use crate::store::AlertStore;

/// The Supervisor component records operational alerts raised by the
/// scheduler, rebroadcasts them and logs them.
pub struct Supervisor {
    alert_store: AlertStore,
    broadcast_tx: RwLock<Option<broadcast::Sender<Alert>>>,
}

impl Supervisor {
    pub fn new(alert_store: AlertStore) -> Self {
        Self {
            alert_store,
            broadcast_tx: RwLock::new(None),
        }
    }

    pub async fn set_broadcast_tx(&self, tx: broadcast::Sender<Alert>) {
        let mut guard = self.broadcast_tx.write().await;
        *guard = Some(tx);
    }

    pub async fn recent_alerts(&self, limit: usize) -> Result<Vec<Alert>> {
        self.alert_store.recent(limit).await
    }

    pub async fn alert_count(&self) -> Result<usize> {
        self.alert_store.count().await
    }

    async fn record(&self, alert: &Alert) {
        if alert.kind.is_critical() {
            error!(
                alert_id = %alert.id,
                kind = %alert.kind,
                payload = %alert.payload,
                "Operational alert"
            );
        } else {
            warn!(
                alert_id = %alert.id,
                kind = %alert.kind,
                payload = %alert.payload,
                "Operational alert"
            );
        }

        if let Err(e) = self.alert_store.insert(alert).await {
            error!(error = %e, "Failed to persist alert");
            return;
        }

        let tx = self.broadcast_tx.read().await;
        if let Some(tx) = &*tx {
            // No receivers is fine.
            let _ = tx.send(alert.clone());
        }
    }
}

#[async_trait]
impl Component for Supervisor {
    fn name(&self) -> &str {
        "supervisor"
    }

    async fn start(&self, mut rx: mpsc::Receiver<Message>) -> Result<()> {
        info!("Supervisor started");

        while let Some(msg) = rx.recv().await {
            match msg {
                Message::Alert(payload) => self.record(&payload.alert).await,
                Message::Shutdown => {
                    info!("Supervisor received shutdown");
                    break;
                }
                other => {
                    debug!(msg_type = other.kind(), "Supervisor ignoring non-alert message");
                }
            }
        }

        info!("Supervisor stopped");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use cadence_core::AlertKind;
    use std::sync::Arc;
    use std::time::Duration;

    #[tokio::test]
    async fn test_alerts_are_persisted_and_broadcast() {
        let supervisor = Arc::new(Supervisor::new(AlertStore::in_memory().unwrap()));
        let (btx, mut brx) = broadcast::channel(8);
        supervisor.set_broadcast_tx(btx).await;

        let (tx, rx) = mpsc::channel(8);
        let runner = supervisor.clone();
        let handle = tokio::spawn(async move { runner.start(rx).await });

        let alert = Alert::new(None, AlertKind::PermissionDenied, serde_json::json!({"key": "x"}));
        tx.send(Message::alert(alert.clone())).await.unwrap();

        let received = tokio::time::timeout(Duration::from_secs(2), brx.recv())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(received.id, alert.id);
        assert_eq!(supervisor.alert_count().await.unwrap(), 1);

        drop(tx);
        let result = tokio::time::timeout(Duration::from_secs(2), handle)
            .await
            .unwrap()
            .unwrap();
        assert!(result.is_ok());
    }

    #[tokio::test]
    async fn test_shutdown_stops_supervisor() {
        let supervisor = Supervisor::new(AlertStore::in_memory().unwrap());
        let (tx, rx) = mpsc::channel(8);
        tx.send(Message::Shutdown).await.unwrap();
        let result = tokio::time::timeout(Duration::from_secs(2), supervisor.start(rx))
            .await
            .unwrap();
        assert!(result.is_ok());
        assert!(supervisor.recent_alerts(5).await.unwrap().is_empty());
    }
}
