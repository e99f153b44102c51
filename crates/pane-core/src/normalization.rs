use tracing::debug;

use crate::{
    error::PaneError,
    types::{MessageRecord, PaneEvent, SendAck},
};

/// Internal helper describing send command success/failure before normalization.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SendOutcome {
    /// Send succeeded and produced a stored message id.
    Success { message_id: String },
    /// Send failed with error details.
    Failure { error: PaneError },
}

/// Filter a batch down to well-formed records belonging to `room_id`.
///
/// Malformed records (no creation timestamp) and records for other rooms are
/// dropped silently; the drop is logged, never surfaced as an error.
pub fn normalize_records(room_id: &str, records: Vec<MessageRecord>) -> Vec<MessageRecord> {
    let total = records.len();
    let kept: Vec<MessageRecord> = records
        .into_iter()
        .filter(|record| record.room_id == room_id && record.created_at_ms.is_some())
        .collect();

    let dropped = total - kept.len();
    if dropped > 0 {
        debug!(room_id, dropped, "dropped malformed or foreign records");
    }
    kept
}

/// Convert a send command outcome to a stable `PaneEvent::SendAck`.
pub fn normalize_send_outcome(client_txn_id: impl Into<String>, outcome: SendOutcome) -> PaneEvent {
    let client_txn_id = client_txn_id.into();
    match outcome {
        SendOutcome::Success { message_id } => PaneEvent::SendAck(SendAck {
            client_txn_id,
            message_id: Some(message_id),
            error_code: None,
        }),
        SendOutcome::Failure { error } => PaneEvent::SendAck(SendAck {
            client_txn_id,
            message_id: None,
            error_code: Some(error.code),
        }),
    }
}

/// Convert an error into a `FatalError` pane event.
pub fn normalize_fatal_error(error: PaneError, recoverable: bool) -> PaneEvent {
    PaneEvent::FatalError {
        code: error.code,
        message: error.message,
        recoverable,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::PaneErrorCategory;

    fn record(id: &str, room_id: &str, created_at_ms: Option<u64>) -> MessageRecord {
        MessageRecord {
            id: id.to_owned(),
            room_id: room_id.to_owned(),
            created_at_ms,
            payload: serde_json::Value::Null,
        }
    }

    #[test]
    fn drops_malformed_and_foreign_records() {
        let kept = normalize_records(
            "!general",
            vec![
                record("m1", "!general", Some(1_000)),
                record("broken", "!general", None),
                record("m2", "!other", Some(2_000)),
            ],
        );

        assert_eq!(kept.len(), 1);
        assert_eq!(kept[0].id, "m1");
    }

    #[test]
    fn maps_success_to_send_ack() {
        let event = normalize_send_outcome(
            "txn-1",
            SendOutcome::Success {
                message_id: "m-42".into(),
            },
        );

        match event {
            PaneEvent::SendAck(ack) => {
                assert_eq!(ack.client_txn_id, "txn-1");
                assert_eq!(ack.message_id.as_deref(), Some("m-42"));
                assert_eq!(ack.error_code, None);
            }
            other => panic!("unexpected event: {other:?}"),
        }
    }

    #[test]
    fn maps_failure_to_send_ack_with_stable_error_code() {
        let event = normalize_send_outcome(
            "txn-2",
            SendOutcome::Failure {
                error: PaneError::new(PaneErrorCategory::Network, "send_failed", "offline"),
            },
        );

        match event {
            PaneEvent::SendAck(ack) => {
                assert_eq!(ack.client_txn_id, "txn-2");
                assert_eq!(ack.message_id, None);
                assert_eq!(ack.error_code.as_deref(), Some("send_failed"));
            }
            other => panic!("unexpected event: {other:?}"),
        }
    }

    #[test]
    fn maps_error_to_fatal_event() {
        let event = normalize_fatal_error(PaneError::not_authenticated("token expired"), false);
        match event {
            PaneEvent::FatalError {
                code, recoverable, ..
            } => {
                assert_eq!(code, "not_authenticated");
                assert!(!recoverable);
            }
            other => panic!("unexpected event: {other:?}"),
        }
    }
}
