use std::sync::Arc;

use chrono::Utc;
use pane_core::{
    ConversationMeta, EventStream, MessageRecord, PaneChannelError, PaneChannels, PaneCommand,
    PaneError, PaneEvent, PaneLifecycleState, PaneStateMachine, ScrollAnchor, SendOutcome,
    SharedPresentationIndex, UpdateInstruction, normalize_fatal_error, normalize_records,
    normalize_send_outcome,
};
use tokio::sync::mpsc;
use tracing::{debug, error, trace, warn};

use crate::{
    collaborators::{LocalStore, RemoteTransport, StoreChange},
    fetcher::HistoryFetcher,
    listener::LiveUpdateListener,
};

/// Runtime tuning for the coordinator.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CoordinatorConfig {
    /// Command channel buffer size.
    pub command_buffer: usize,
    /// Event broadcast buffer size.
    pub event_buffer: usize,
    /// Internal completion/live channel buffer size.
    pub completion_buffer: usize,
    /// Fire a read-mark notification whenever a conversation is selected.
    pub mark_read_on_select: bool,
}

impl Default for CoordinatorConfig {
    fn default() -> Self {
        Self {
            command_buffer: 64,
            event_buffer: 256,
            completion_buffer: 64,
            mark_read_on_select: true,
        }
    }
}

/// Handle used by the rendering boundary to drive the coordinator.
#[derive(Clone)]
pub struct SyncCoordinatorHandle {
    channels: PaneChannels,
    index: SharedPresentationIndex,
}

impl SyncCoordinatorHandle {
    /// Send one command to the coordinator.
    pub async fn send(&self, command: PaneCommand) -> Result<(), PaneChannelError> {
        self.channels.send_command(command).await
    }

    /// Subscribe to emitted pane events.
    pub fn subscribe(&self) -> EventStream {
        self.channels.subscribe()
    }

    /// Shared read access to the projected list.
    ///
    /// Reads are consistent: they never observe a partially applied merge.
    pub fn index(&self) -> SharedPresentationIndex {
        self.index.clone()
    }
}

/// Spawn a coordinator over the given collaborators and return its handle.
pub fn spawn_coordinator(
    store: Arc<dyn LocalStore>,
    transport: Arc<dyn RemoteTransport>,
    config: CoordinatorConfig,
) -> SyncCoordinatorHandle {
    let (channels, command_rx) = PaneChannels::new(config.command_buffer, config.event_buffer);
    let (fetch_tx, fetch_rx) = mpsc::channel(config.completion_buffer.max(1));
    let (live_tx, live_rx) = mpsc::channel(config.completion_buffer.max(1));
    let index = SharedPresentationIndex::new();

    let coordinator = SyncCoordinator {
        channels: channels.clone(),
        command_rx,
        fetch_tx,
        fetch_rx,
        live_tx,
        live_rx,
        state_machine: PaneStateMachine::default(),
        index: index.clone(),
        fetcher: HistoryFetcher::new(Arc::clone(&transport)),
        listener: LiveUpdateListener::new(),
        store,
        transport,
        config,
        active: None,
        epoch: 0,
        initial_fetch_in_flight: false,
        pagination_in_flight: false,
    };
    tokio::spawn(async move {
        coordinator.run().await;
    });

    SyncCoordinatorHandle { channels, index }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum FetchKind {
    Initial,
    Pagination,
}

#[derive(Debug)]
struct FetchCompletion {
    epoch: u64,
    kind: FetchKind,
    room_id: String,
    result: Result<Vec<MessageRecord>, PaneError>,
}

struct SyncCoordinator {
    channels: PaneChannels,
    command_rx: mpsc::Receiver<PaneCommand>,
    fetch_tx: mpsc::Sender<FetchCompletion>,
    fetch_rx: mpsc::Receiver<FetchCompletion>,
    live_tx: mpsc::Sender<StoreChange>,
    live_rx: mpsc::Receiver<StoreChange>,
    state_machine: PaneStateMachine,
    index: SharedPresentationIndex,
    fetcher: HistoryFetcher,
    listener: LiveUpdateListener,
    store: Arc<dyn LocalStore>,
    transport: Arc<dyn RemoteTransport>,
    config: CoordinatorConfig,
    active: Option<ConversationMeta>,
    epoch: u64,
    initial_fetch_in_flight: bool,
    pagination_in_flight: bool,
}

impl SyncCoordinator {
    /// Serialized processing loop: exactly one command, fetch completion, or
    /// live batch is handled at a time. Fetches and read-marks run on
    /// spawned tasks and report back here, so the loop never blocks on
    /// network I/O.
    async fn run(mut self) {
        loop {
            tokio::select! {
                command = self.command_rx.recv() => {
                    let Some(command) = command else { break };
                    self.handle_command(command).await;
                }
                completion = self.fetch_rx.recv() => {
                    if let Some(completion) = completion {
                        self.handle_fetch_completion(completion);
                    }
                }
                change = self.live_rx.recv() => {
                    if let Some(change) = change {
                        self.handle_live_batch(change);
                    }
                }
            }

            if self.state_machine.state() == PaneLifecycleState::Terminated {
                break;
            }
        }

        self.listener.stop().await;
    }

    async fn handle_command(&mut self, command: PaneCommand) {
        if let Err(err) = self.dispatch_command(command).await {
            let recoverable = err.is_transient();
            self.channels.emit(normalize_fatal_error(err, recoverable));
        }
    }

    async fn dispatch_command(&mut self, command: PaneCommand) -> Result<(), PaneError> {
        match command {
            PaneCommand::SelectConversation { room_id } => self.handle_select(room_id).await,
            PaneCommand::RequestOlderMessages { before_ms } => {
                self.handle_request_older(before_ms)
            }
            PaneCommand::RetryHistoryFetch => self.handle_retry(),
            PaneCommand::SendTextMessage {
                client_txn_id,
                body,
            } => {
                self.handle_send(client_txn_id, body);
                Ok(())
            }
            PaneCommand::MarkAsRead => self.handle_mark_read(),
            PaneCommand::Shutdown => self.handle_shutdown().await,
        }
    }

    async fn handle_select(&mut self, room_id: String) -> Result<(), PaneError> {
        let (candidate, transition_events) =
            self.validate_transition(&PaneCommand::SelectConversation {
                room_id: String::new(),
            })?;

        // The previous conversation's listener must be silent before any of
        // the new conversation's state is touched.
        self.listener.stop().await;
        self.epoch += 1;
        self.initial_fetch_in_flight = false;
        self.pagination_in_flight = false;
        self.commit_transition(candidate, transition_events);

        let meta = match self.store.load_conversation(&room_id).await? {
            Some(meta) => meta,
            None => {
                debug!(room_id = %room_id, "conversation unknown to the store, using defaults");
                ConversationMeta {
                    room_id: room_id.clone(),
                    name: None,
                    is_joined: true,
                    last_read_at_ms: None,
                }
            }
        };
        self.channels.emit(PaneEvent::ConversationOpened {
            room_id: room_id.clone(),
            name: meta.name.clone(),
            is_joined: meta.is_joined,
        });
        self.active = Some(meta);

        // Replace the projection with whatever the cache already has; the
        // whole swap is one remove+insert instruction without animation.
        let removed = self.index.clear();
        let cached = self.store.query_messages(&room_id).await?;
        let cached = normalize_records(&room_id, cached);
        let inserted = self.index.merge(&cached);
        self.emit_update(removed, inserted, ScrollAnchor::FollowToBottom, false);
        self.channels.emit(PaneEvent::ActivityChanged { busy: true });

        self.listener.start(
            room_id.as_str(),
            self.store.subscribe_changes(),
            self.live_tx.clone(),
        );
        self.spawn_history_fetch(room_id.clone(), None, FetchKind::Initial);
        if self.config.mark_read_on_select {
            self.spawn_mark_read(room_id);
        }
        Ok(())
    }

    fn handle_request_older(&mut self, before_ms: u64) -> Result<(), PaneError> {
        // Scroll events fire faster than network latency; repeated triggers
        // are dropped here instead of bouncing off the fetcher's guard.
        if self.pagination_in_flight || self.state_machine.state() != PaneLifecycleState::Live {
            debug!(
                before_ms,
                state = ?self.state_machine.state(),
                "ignoring pagination request"
            );
            return Ok(());
        }

        let (candidate, transition_events) =
            self.validate_transition(&PaneCommand::RequestOlderMessages { before_ms })?;
        let Some(room_id) = self.active.as_ref().map(|meta| meta.room_id.clone()) else {
            return Ok(());
        };

        self.commit_transition(candidate, transition_events);
        self.spawn_history_fetch(room_id, Some(before_ms), FetchKind::Pagination);
        Ok(())
    }

    fn handle_retry(&mut self) -> Result<(), PaneError> {
        let (candidate, transition_events) =
            self.validate_transition(&PaneCommand::RetryHistoryFetch)?;
        if self.initial_fetch_in_flight {
            debug!("ignoring retry, initial fetch already in flight");
            return Ok(());
        }
        let Some(room_id) = self.active.as_ref().map(|meta| meta.room_id.clone()) else {
            return Ok(());
        };

        self.commit_transition(candidate, transition_events);
        self.spawn_history_fetch(room_id, None, FetchKind::Initial);
        Ok(())
    }

    fn handle_send(&mut self, client_txn_id: String, body: String) {
        let validation = self.validate_transition(&PaneCommand::SendTextMessage {
            client_txn_id: String::new(),
            body: String::new(),
        });
        if let Err(err) = validation {
            self.channels.emit(normalize_send_outcome(
                client_txn_id,
                SendOutcome::Failure { error: err },
            ));
            return;
        }
        let Some(room_id) = self.active.as_ref().map(|meta| meta.room_id.clone()) else {
            self.channels.emit(normalize_send_outcome(
                client_txn_id,
                SendOutcome::Failure {
                    error: PaneError::invalid_state(self.state_machine.state(), "send_text_message"),
                },
            ));
            return;
        };

        // The stored echo arrives through the live path and deduplicates.
        let transport = Arc::clone(&self.transport);
        let channels = self.channels.clone();
        tokio::spawn(async move {
            let outcome = match transport.send_text_message(&room_id, &body).await {
                Ok(message_id) => SendOutcome::Success { message_id },
                Err(error) => SendOutcome::Failure { error },
            };
            channels.emit(normalize_send_outcome(client_txn_id, outcome));
        });
    }

    fn handle_mark_read(&mut self) -> Result<(), PaneError> {
        self.validate_transition(&PaneCommand::MarkAsRead)?;
        let Some(meta) = self.active.as_mut() else {
            return Ok(());
        };

        meta.last_read_at_ms = u64::try_from(Utc::now().timestamp_millis()).ok();
        let room_id = meta.room_id.clone();
        self.spawn_mark_read(room_id);
        Ok(())
    }

    async fn handle_shutdown(&mut self) -> Result<(), PaneError> {
        let (candidate, transition_events) = self.validate_transition(&PaneCommand::Shutdown)?;

        self.listener.stop().await;
        self.epoch += 1;
        self.initial_fetch_in_flight = false;
        self.pagination_in_flight = false;
        self.active = None;
        self.index.clear();
        self.commit_transition(candidate, transition_events);
        Ok(())
    }

    fn handle_fetch_completion(&mut self, completion: FetchCompletion) {
        if completion.epoch != self.epoch {
            trace!(
                room_id = %completion.room_id,
                "discarding fetch result for a stale conversation"
            );
            return;
        }

        match completion.kind {
            FetchKind::Initial => self.initial_fetch_in_flight = false,
            FetchKind::Pagination => self.pagination_in_flight = false,
        }

        match completion.result {
            Ok(records) => {
                let records = normalize_records(&completion.room_id, records);
                let inserted = self.index.merge(&records);
                let anchor = match completion.kind {
                    FetchKind::Initial => ScrollAnchor::FollowToBottom,
                    FetchKind::Pagination => anchor_for_insertions(&inserted, self.index.len()),
                };
                self.emit_update(Vec::new(), inserted, anchor, true);

                match self.state_machine.on_history_fetched() {
                    Ok(event) => self.channels.emit(event),
                    Err(err) => warn!(error = %err, "unexpected fetch completion"),
                }
                if completion.kind == FetchKind::Initial {
                    self.channels.emit(PaneEvent::ActivityChanged { busy: false });
                }
            }
            Err(err) if err.is_fatal() => {
                error!(room_id = %completion.room_id, error = %err, "history fetch failed fatally");
                self.channels.emit(normalize_fatal_error(err, false));
                self.terminate();
            }
            Err(err) => {
                if err.code == "fetch_in_progress" {
                    // Own guard should have prevented this; not user-visible.
                    warn!(room_id = %completion.room_id, "fetch raced its single-flight guard");
                    if completion.kind == FetchKind::Pagination
                        && let Ok(event) = self.state_machine.on_history_fetched()
                    {
                        self.channels.emit(event);
                    }
                    return;
                }

                warn!(room_id = %completion.room_id, error = %err, "history fetch failed");
                match completion.kind {
                    // Activity stays engaged while Loading; the caller owns
                    // the retry policy and re-triggers explicitly.
                    FetchKind::Initial => {
                        self.channels.emit(normalize_fatal_error(err, true));
                    }
                    FetchKind::Pagination => {
                        match self.state_machine.on_history_fetched() {
                            Ok(event) => self.channels.emit(event),
                            Err(state_err) => warn!(error = %state_err, "pagination failure in unexpected state"),
                        }
                        self.channels.emit(normalize_fatal_error(err, true));
                    }
                }
            }
        }
    }

    fn handle_live_batch(&mut self, change: StoreChange) {
        let Some(active_room) = self.active.as_ref().map(|meta| meta.room_id.clone()) else {
            return;
        };
        if active_room != change.room_id {
            trace!(room_id = %change.room_id, "dropping live batch for inactive room");
            return;
        }
        // Live records merge immediately even while a history fetch is
        // outstanding; suppressing them would lose messages that arrive
        // during the fetch.
        if !self.state_machine.state().is_conversation_active() {
            return;
        }

        let records = normalize_records(&change.room_id, change.records);
        let inserted = self.index.merge(&records);
        let anchor = anchor_for_insertions(&inserted, self.index.len());
        self.emit_update(Vec::new(), inserted, anchor, true);
    }

    fn spawn_history_fetch(&mut self, room_id: String, before_ms: Option<u64>, kind: FetchKind) {
        match kind {
            FetchKind::Initial => self.initial_fetch_in_flight = true,
            FetchKind::Pagination => self.pagination_in_flight = true,
        }

        let fetcher = self.fetcher.clone();
        let fetch_tx = self.fetch_tx.clone();
        let epoch = self.epoch;
        tokio::spawn(async move {
            let result = fetcher.fetch_page(&room_id, before_ms).await;
            let _ = fetch_tx
                .send(FetchCompletion {
                    epoch,
                    kind,
                    room_id,
                    result,
                })
                .await;
        });
    }

    fn spawn_mark_read(&self, room_id: String) {
        let transport = Arc::clone(&self.transport);
        tokio::spawn(async move {
            if let Err(err) = transport.mark_as_read(&room_id).await {
                warn!(room_id = %room_id, error = %err, "mark-as-read notification failed");
            }
        });
    }

    fn emit_update(
        &self,
        removed_positions: Vec<usize>,
        inserted_positions: Vec<usize>,
        anchor: ScrollAnchor,
        animated: bool,
    ) {
        if removed_positions.is_empty() && inserted_positions.is_empty() {
            return;
        }
        let Some(room_id) = self.active.as_ref().map(|meta| meta.room_id.clone()) else {
            return;
        };

        self.channels.emit(PaneEvent::Update(UpdateInstruction {
            room_id,
            removed_positions,
            inserted_positions,
            anchor,
            animated,
        }));
    }

    fn terminate(&mut self) {
        self.epoch += 1;
        self.initial_fetch_in_flight = false;
        self.pagination_in_flight = false;
        self.active = None;
        self.index.clear();
        let event = self.state_machine.on_fatal();
        self.channels.emit(event);
        // run() stops the listener on its way out.
    }

    fn validate_transition(
        &self,
        command: &PaneCommand,
    ) -> Result<(PaneStateMachine, Vec<PaneEvent>), PaneError> {
        let mut candidate = self.state_machine.clone();
        let events = candidate.apply(command)?;
        Ok((candidate, events))
    }

    fn commit_transition(&mut self, candidate: PaneStateMachine, events: Vec<PaneEvent>) {
        self.state_machine = candidate;
        for event in events {
            self.channels.emit(event);
        }
    }
}

/// Anchor policy: an insert batch forming a contiguous suffix at the tail
/// follows the newest content (the renderer only moves when the viewer is
/// already at the absolute bottom); any other insert keeps the visual
/// bottom offset fixed.
fn anchor_for_insertions(inserted: &[usize], total_len: usize) -> ScrollAnchor {
    let (Some(&first), Some(&last)) = (inserted.first(), inserted.last()) else {
        return ScrollAnchor::PreserveFromBottom;
    };

    let contiguous = last - first + 1 == inserted.len();
    if contiguous && last + 1 == total_len {
        ScrollAnchor::FollowToBottom
    } else {
        ScrollAnchor::PreserveFromBottom
    }
}
