use tokio::{
    sync::{broadcast, mpsc},
    task::JoinHandle,
};
use tokio_util::sync::CancellationToken;
use tracing::{trace, warn};

use crate::collaborators::StoreChange;

#[derive(Debug)]
struct RunningListener {
    stop: CancellationToken,
    task: JoinHandle<()>,
}

/// Forwards the local store's change notifications for one conversation
/// until explicitly stopped.
///
/// [`stop`](Self::stop) is idempotent, safe without a prior start, and
/// guarantees that no batch is forwarded after it returns.
#[derive(Debug, Default)]
pub struct LiveUpdateListener {
    running: Option<RunningListener>,
}

impl LiveUpdateListener {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start forwarding changes for `room_id` into `batch_tx`.
    ///
    /// A listener that is already running is cancelled and replaced.
    pub fn start(
        &mut self,
        room_id: impl Into<String>,
        mut changes: broadcast::Receiver<StoreChange>,
        batch_tx: mpsc::Sender<StoreChange>,
    ) {
        if let Some(previous) = self.running.take() {
            previous.stop.cancel();
            previous.task.abort();
        }

        let room_id = room_id.into();
        let stop = CancellationToken::new();
        let stop_child = stop.child_token();
        let task = tokio::spawn(async move {
            loop {
                let change = tokio::select! {
                    _ = stop_child.cancelled() => break,
                    change = changes.recv() => change,
                };

                match change {
                    Ok(change) if change.room_id == room_id => {
                        if change.records.is_empty() {
                            continue;
                        }
                        // Cancellation must win over a congested receiver.
                        tokio::select! {
                            _ = stop_child.cancelled() => break,
                            sent = batch_tx.send(change) => {
                                if sent.is_err() {
                                    break;
                                }
                            }
                        }
                    }
                    Ok(change) => {
                        trace!(
                            room_id = %room_id,
                            other = %change.room_id,
                            "ignoring change for another room"
                        );
                    }
                    Err(broadcast::error::RecvError::Lagged(skipped)) => {
                        warn!(room_id = %room_id, skipped, "live update stream lagged");
                    }
                    Err(broadcast::error::RecvError::Closed) => break,
                }
            }
        });

        self.running = Some(RunningListener { stop, task });
    }

    /// Stop the listener; after this returns no further batch is forwarded.
    pub async fn stop(&mut self) {
        let Some(running) = self.running.take() else {
            return;
        };

        running.stop.cancel();
        let _ = running.task.await;
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use pane_core::MessageRecord;
    use tokio::time::timeout;

    use super::*;

    fn change(room_id: &str, ids: &[&str]) -> StoreChange {
        StoreChange {
            room_id: room_id.to_owned(),
            records: ids
                .iter()
                .map(|id| MessageRecord {
                    id: (*id).to_owned(),
                    room_id: room_id.to_owned(),
                    created_at_ms: Some(1_000),
                    payload: serde_json::Value::Null,
                })
                .collect(),
        }
    }

    #[tokio::test]
    async fn forwards_only_matching_room_batches() {
        let (changes_tx, changes_rx) = broadcast::channel(16);
        let (batch_tx, mut batch_rx) = mpsc::channel(16);

        let mut listener = LiveUpdateListener::new();
        listener.start("!general", changes_rx, batch_tx);

        changes_tx.send(change("!other", &["x1"])).expect("send");
        changes_tx.send(change("!general", &["m1"])).expect("send");

        let batch = timeout(Duration::from_secs(2), batch_rx.recv())
            .await
            .expect("batch timeout")
            .expect("batch");
        assert_eq!(batch.room_id, "!general");
        assert_eq!(batch.records[0].id, "m1");

        listener.stop().await;
    }

    #[tokio::test]
    async fn drops_empty_batches() {
        let (changes_tx, changes_rx) = broadcast::channel(16);
        let (batch_tx, mut batch_rx) = mpsc::channel(16);

        let mut listener = LiveUpdateListener::new();
        listener.start("!general", changes_rx, batch_tx);

        changes_tx.send(change("!general", &[])).expect("send");
        changes_tx.send(change("!general", &["m1"])).expect("send");

        let batch = timeout(Duration::from_secs(2), batch_rx.recv())
            .await
            .expect("batch timeout")
            .expect("batch");
        assert_eq!(batch.records.len(), 1);

        listener.stop().await;
    }

    #[tokio::test]
    async fn no_batch_is_forwarded_after_stop() {
        let (changes_tx, changes_rx) = broadcast::channel(16);
        let (batch_tx, mut batch_rx) = mpsc::channel(16);

        let mut listener = LiveUpdateListener::new();
        listener.start("!general", changes_rx, batch_tx);
        listener.stop().await;

        changes_tx.send(change("!general", &["m1"])).expect("send");

        // The forwarding task is gone, so the channel closes without a batch.
        let received = timeout(Duration::from_secs(2), batch_rx.recv())
            .await
            .expect("recv timeout");
        assert!(received.is_none());
    }

    #[tokio::test]
    async fn stop_is_idempotent_and_safe_without_start() {
        let mut listener = LiveUpdateListener::new();
        listener.stop().await;

        let (_changes_tx, changes_rx) = broadcast::channel::<StoreChange>(4);
        let (batch_tx, _batch_rx) = mpsc::channel(4);
        listener.start("!general", changes_rx, batch_tx);

        listener.stop().await;
        listener.stop().await;
    }
}
