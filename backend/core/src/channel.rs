use tokio::sync::mpsc;
use tracing::{debug, info};

use crate::message::Message;

/// Default channel buffer size for inter-component messaging.
const DEFAULT_BUFFER_SIZE: usize = 256;

/// The message bus connecting the scheduler and the supervisor.
///
/// Each component gets a `Sender` to push messages and a `Receiver` to consume them.
pub struct CadenceBus {
    pub scheduler_tx: mpsc::Sender<Message>,
    pub scheduler_rx: Option<mpsc::Receiver<Message>>,

    pub supervisor_tx: mpsc::Sender<Message>,
    pub supervisor_rx: Option<mpsc::Receiver<Message>>,
}

impl CadenceBus {
    /// Create a new bus with default buffer sizes.
    pub fn new() -> Self {
        Self::with_buffer_size(DEFAULT_BUFFER_SIZE)
    }

    /// Create a new bus with a custom buffer size.
    pub fn with_buffer_size(buffer: usize) -> Self {
        let (scheduler_tx, scheduler_rx) = mpsc::channel(buffer);
        let (supervisor_tx, supervisor_rx) = mpsc::channel(buffer);

        info!(buffer_size = buffer, "CadenceBus initialized");

        Self {
            scheduler_tx,
            scheduler_rx: Some(scheduler_rx),
            supervisor_tx,
            supervisor_rx: Some(supervisor_rx),
        }
    }

    /// Take the scheduler receiver (can only be called once).
    pub fn take_scheduler_rx(&mut self) -> Option<mpsc::Receiver<Message>> {
        debug!("Scheduler receiver taken");
        self.scheduler_rx.take()
    }

    /// Take the supervisor receiver (can only be called once).
    pub fn take_supervisor_rx(&mut self) -> Option<mpsc::Receiver<Message>> {
        debug!("Supervisor receiver taken");
        self.supervisor_rx.take()
    }
}

impl Default for CadenceBus {
    fn default() -> Self {
        Self::new()
    }
}
