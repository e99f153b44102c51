use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

/// Lifecycle state of the conversation pane reported to the frontend.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum PaneLifecycleState {
    /// No active conversation.
    Idle,
    /// A conversation was selected; cached messages are shown while the
    /// initial history fetch is outstanding.
    Loading,
    /// Initial history loaded; live updates flow into the projection.
    Live,
    /// A backward-pagination fetch is outstanding (live updates still flow).
    Paginating,
    /// Deliberate shutdown; no further commands are accepted.
    Terminated,
}

impl PaneLifecycleState {
    /// Whether a conversation is currently bound to the pane.
    pub fn is_conversation_active(self) -> bool {
        matches!(self, Self::Loading | Self::Live | Self::Paginating)
    }
}

/// Canonical representation of one chat message as cached locally.
///
/// Records are never mutated by this crate; an edit arrives as a new live
/// event carrying the same `id` and is absorbed by deduplication.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct MessageRecord {
    /// Globally unique identifier, stable across fetch/push/cache.
    pub id: String,
    /// Owning conversation identifier.
    pub room_id: String,
    /// Creation timestamp in milliseconds since Unix epoch.
    ///
    /// `None` marks an incomplete record; such records are dropped during
    /// normalization and never projected.
    pub created_at_ms: Option<u64>,
    /// Opaque message content (text, attachments); not interpreted here.
    pub payload: serde_json::Value,
}

/// Session state for the conversation currently bound to the pane.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ConversationMeta {
    /// Conversation identifier.
    pub room_id: String,
    /// Best-effort display name.
    pub name: Option<String>,
    /// Whether the viewer has write access (`false` means preview-only).
    pub is_joined: bool,
    /// Last read-marker timestamp in milliseconds, when known.
    pub last_read_at_ms: Option<u64>,
}

/// One renderable row of the projected message list.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub enum PresentationEntry {
    /// A projected message, referenced by record id.
    Message {
        /// Id of the backing `MessageRecord`.
        message_id: String,
        /// Record timestamp used for ordering.
        timestamp_ms: u64,
    },
    /// Calendar-day boundary marker.
    DaySeparator {
        /// The UTC calendar day this separator heads.
        day: NaiveDate,
        /// UTC start of `day` in milliseconds; sorts the separator before
        /// the day's first message.
        timestamp_ms: u64,
    },
}

impl PresentationEntry {
    /// Ordering timestamp of the entry.
    pub fn timestamp_ms(&self) -> u64 {
        match self {
            Self::Message { timestamp_ms, .. } | Self::DaySeparator { timestamp_ms, .. } => {
                *timestamp_ms
            }
        }
    }

    /// Whether the entry is a day separator.
    pub fn is_separator(&self) -> bool {
        matches!(self, Self::DaySeparator { .. })
    }
}

/// Scroll behavior the rendering boundary must apply with an update.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum ScrollAnchor {
    /// Keep the distance from the top of the content fixed.
    PreserveFromTop,
    /// Keep the visual bottom offset fixed while content is inserted above.
    PreserveFromBottom,
    /// Scroll to the newest content, but only when the viewer is already at
    /// the absolute bottom.
    FollowToBottom,
}

/// Incremental list mutation consumed by the rendering boundary.
///
/// Positions refer to the projected list after the whole instruction is
/// applied; removed positions refer to the list before it.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct UpdateInstruction {
    /// Conversation the instruction belongs to.
    pub room_id: String,
    /// Positions removed from the previous projection, ascending.
    pub removed_positions: Vec<usize>,
    /// Final positions of all inserted entries, ascending.
    pub inserted_positions: Vec<usize>,
    /// Scroll policy for this mutation.
    pub anchor: ScrollAnchor,
    /// `false` marks a full conversation replacement (no animation).
    pub animated: bool,
}

/// Acknowledgement for a text-message send.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct SendAck {
    /// Caller-provided transaction id echoed back.
    pub client_txn_id: String,
    /// Id of the stored message on success.
    pub message_id: Option<String>,
    /// Stable error code on failure.
    pub error_code: Option<String>,
}

/// Command channel input accepted by the sync coordinator.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub enum PaneCommand {
    /// Bind the pane to a conversation, replacing any previous one.
    SelectConversation {
        /// Target conversation id.
        room_id: String,
    },
    /// Load a page of older messages (viewer approached the top).
    RequestOlderMessages {
        /// Fetch messages created strictly before this timestamp.
        before_ms: u64,
    },
    /// Re-issue the initial history fetch after a transient failure.
    RetryHistoryFetch,
    /// Send a text message into the active conversation.
    SendTextMessage {
        /// Caller-provided transaction id echoed in `SendAck`.
        client_txn_id: String,
        /// Message body.
        body: String,
    },
    /// Notify the read-tracking collaborator; fire-and-forget.
    MarkAsRead,
    /// Tear down the pane: stop listeners, orphan pending work.
    Shutdown,
}

/// Event channel output emitted by the sync coordinator.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub enum PaneEvent {
    /// Lifecycle transition.
    StateChanged {
        /// New lifecycle state.
        state: PaneLifecycleState,
    },
    /// A conversation was bound to the pane.
    ConversationOpened {
        /// Conversation id.
        room_id: String,
        /// Display name when known.
        name: Option<String>,
        /// Whether the viewer may write (preview mode otherwise).
        is_joined: bool,
    },
    /// Incremental projection mutation for the rendering boundary.
    Update(UpdateInstruction),
    /// Activity-indicator toggle (initial load in progress).
    ActivityChanged {
        /// `true` while the initial history fetch is outstanding.
        busy: bool,
    },
    /// Send acknowledgement.
    SendAck(SendAck),
    /// Runtime failure.
    FatalError {
        /// Stable error code.
        code: String,
        /// Human-readable message.
        message: String,
        /// `true` when the caller may retry (transient failures).
        recoverable: bool,
    },
}
