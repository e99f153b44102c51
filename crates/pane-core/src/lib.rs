//! Core contract for the chat message-pane synchronization engine.
//!
//! This crate defines the message/presentation data model, the ordered
//! day-grouped presentation index, the pane lifecycle state machine, and the
//! common error/channel abstractions shared by the coordinator runtime and
//! its frontend consumers.

/// Async command/event channel primitives.
pub mod channel;
/// Stable pane error types and HTTP classification helpers.
pub mod error;
/// Ordered, deduplicated, day-grouped presentation index.
pub mod index;
/// Record filtering and send-acknowledgement normalization helpers.
pub mod normalization;
/// Pane lifecycle state machine.
pub mod state_machine;
/// Frontend-facing protocol types (commands, events, payloads).
pub mod types;

pub use channel::{EventStream, PaneChannelError, PaneChannels};
pub use error::{PaneError, PaneErrorCategory, classify_http_status};
pub use index::{PresentationIndex, SharedPresentationIndex};
pub use normalization::{
    SendOutcome, normalize_fatal_error, normalize_records, normalize_send_outcome,
};
pub use state_machine::PaneStateMachine;
pub use types::{
    ConversationMeta, MessageRecord, PaneCommand, PaneEvent, PaneLifecycleState, PresentationEntry,
    ScrollAnchor, SendAck, UpdateInstruction,
};
