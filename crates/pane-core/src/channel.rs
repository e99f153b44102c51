use thiserror::Error;
use tokio::sync::{broadcast, mpsc};

use crate::types::{PaneCommand, PaneEvent};

/// Broadcast event stream type used by rendering-boundary subscribers.
pub type EventStream = broadcast::Receiver<PaneEvent>;

/// Errors returned by pane channel operations.
#[derive(Debug, Error)]
pub enum PaneChannelError {
    /// The command receiver side is closed.
    #[error("command channel is closed")]
    CommandChannelClosed,
}

/// Command/event channel pair used by the coordinator and its callers.
#[derive(Clone, Debug)]
pub struct PaneChannels {
    command_tx: mpsc::Sender<PaneCommand>,
    event_tx: broadcast::Sender<PaneEvent>,
}

impl PaneChannels {
    /// Create a new channel set and return it with the command receiver.
    pub fn new(command_buffer: usize, event_buffer: usize) -> (Self, mpsc::Receiver<PaneCommand>) {
        let (command_tx, command_rx) = mpsc::channel(command_buffer.max(1));
        let (event_tx, _) = broadcast::channel(event_buffer.max(1));

        (
            Self {
                command_tx,
                event_tx,
            },
            command_rx,
        )
    }

    /// Clone the command sender.
    pub fn command_sender(&self) -> mpsc::Sender<PaneCommand> {
        self.command_tx.clone()
    }

    /// Clone the event sender.
    pub fn event_sender(&self) -> broadcast::Sender<PaneEvent> {
        self.event_tx.clone()
    }

    /// Subscribe to emitted pane events.
    pub fn subscribe(&self) -> EventStream {
        self.event_tx.subscribe()
    }

    /// Send one command to the coordinator.
    pub async fn send_command(&self, command: PaneCommand) -> Result<(), PaneChannelError> {
        self.command_tx
            .send(command)
            .await
            .map_err(|_| PaneChannelError::CommandChannelClosed)
    }

    /// Emit an event to all subscribers.
    ///
    /// Emission is best-effort; lagged subscribers are handled by `broadcast`.
    pub fn emit(&self, event: PaneEvent) {
        let _ = self.event_tx.send(event);
    }
}
