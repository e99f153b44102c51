use async_trait::async_trait;
use pane_core::{ConversationMeta, MessageRecord, PaneError};
use tokio::sync::broadcast;

/// Change notification published by the local store after records land in it.
///
/// Delivery is at-least-once; downstream dedup makes replays safe.
#[derive(Debug, Clone)]
pub struct StoreChange {
    /// Conversation the records belong to.
    pub room_id: String,
    /// New or changed records.
    pub records: Vec<MessageRecord>,
}

/// Durable local message store consumed by the coordinator.
///
/// The store is assumed to already expose query/notify primitives; its
/// persistence internals are out of scope here.
#[async_trait]
pub trait LocalStore: Send + Sync + 'static {
    /// All cached records for a conversation, any order.
    async fn query_messages(&self, room_id: &str) -> Result<Vec<MessageRecord>, PaneError>;

    /// Session metadata for a conversation, when the store has it.
    async fn load_conversation(
        &self,
        room_id: &str,
    ) -> Result<Option<ConversationMeta>, PaneError>;

    /// Subscribe to change notifications across all conversations.
    fn subscribe_changes(&self) -> broadcast::Receiver<StoreChange>;
}

/// Remote source of truth for message history and outbound operations.
#[async_trait]
pub trait RemoteTransport: Send + Sync + 'static {
    /// Fetch a page of messages created strictly before `before_ms`;
    /// `None` means the most recent page.
    async fn fetch_history(
        &self,
        room_id: &str,
        before_ms: Option<u64>,
    ) -> Result<Vec<MessageRecord>, PaneError>;

    /// Send a text message, returning the stored message id.
    async fn send_text_message(&self, room_id: &str, body: &str) -> Result<String, PaneError>;

    /// Advance the remote read marker for a conversation.
    async fn mark_as_read(&self, room_id: &str) -> Result<(), PaneError>;
}
