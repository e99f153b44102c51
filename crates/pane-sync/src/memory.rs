use std::collections::HashMap;

use async_trait::async_trait;
use pane_core::{ConversationMeta, MessageRecord, PaneError};
use parking_lot::RwLock;
use tokio::sync::broadcast;

use crate::collaborators::{LocalStore, StoreChange};

const CHANGE_BUFFER: usize = 64;

#[derive(Debug, Default)]
struct RoomState {
    meta: Option<ConversationMeta>,
    records: Vec<MessageRecord>,
}

/// In-memory [`LocalStore`] reference implementation.
///
/// Backs the smoke binary and tests; inserting records publishes a
/// [`StoreChange`] to every subscriber, mirroring a persistence layer's
/// change-notification primitive.
#[derive(Debug)]
pub struct InMemoryLocalStore {
    rooms: RwLock<HashMap<String, RoomState>>,
    changes: broadcast::Sender<StoreChange>,
}

impl Default for InMemoryLocalStore {
    fn default() -> Self {
        let (changes, _) = broadcast::channel(CHANGE_BUFFER);
        Self {
            rooms: RwLock::new(HashMap::new()),
            changes,
        }
    }
}

impl InMemoryLocalStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create or replace a conversation's session metadata.
    pub fn upsert_conversation(&self, meta: ConversationMeta) {
        let mut rooms = self.rooms.write();
        let room_id = meta.room_id.clone();
        rooms.entry(room_id).or_default().meta = Some(meta);
    }

    /// Cache records for a room and notify subscribers.
    ///
    /// Records whose id is already cached replace the stored copy (an edit
    /// arriving as a new event with the same id); every submitted record is
    /// included in the published change.
    pub fn insert_records(&self, room_id: &str, records: Vec<MessageRecord>) {
        if records.is_empty() {
            return;
        }

        {
            let mut rooms = self.rooms.write();
            let room = rooms.entry(room_id.to_owned()).or_default();
            for record in &records {
                match room.records.iter_mut().find(|stored| stored.id == record.id) {
                    Some(stored) => *stored = record.clone(),
                    None => room.records.push(record.clone()),
                }
            }
        }

        let _ = self.changes.send(StoreChange {
            room_id: room_id.to_owned(),
            records,
        });
    }
}

#[async_trait]
impl LocalStore for InMemoryLocalStore {
    async fn query_messages(&self, room_id: &str) -> Result<Vec<MessageRecord>, PaneError> {
        let rooms = self.rooms.read();
        Ok(rooms
            .get(room_id)
            .map(|room| room.records.clone())
            .unwrap_or_default())
    }

    async fn load_conversation(
        &self,
        room_id: &str,
    ) -> Result<Option<ConversationMeta>, PaneError> {
        let rooms = self.rooms.read();
        Ok(rooms.get(room_id).and_then(|room| room.meta.clone()))
    }

    fn subscribe_changes(&self) -> broadcast::Receiver<StoreChange> {
        self.changes.subscribe()
    }
}
