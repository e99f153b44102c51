use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::types::PaneLifecycleState;

/// Broad error category used for user-facing handling and retry behavior.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum PaneErrorCategory {
    /// Invalid input, unsupported state, or other configuration issue.
    Config,
    /// Authentication/authorization failure; fatal to the session.
    Auth,
    /// Transient network or transport failure.
    Network,
    /// Rate-limited by the remote.
    RateLimited,
    /// Local persistence failure.
    Storage,
    /// Serialization/deserialization failure.
    Serialization,
    /// Internal bug or invariant break.
    Internal,
}

/// Stable error payload emitted across the command/event boundary.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Error)]
#[error("{category:?}:{code}: {message}")]
pub struct PaneError {
    /// High-level error category.
    pub category: PaneErrorCategory,
    /// Stable machine-readable error code.
    pub code: String,
    /// Human-readable message.
    pub message: String,
    /// Optional retry hint in milliseconds, surfaced to the caller; this
    /// crate never retries internally.
    pub retry_after_ms: Option<u64>,
}

impl PaneError {
    /// Construct a new error.
    pub fn new(
        category: PaneErrorCategory,
        code: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        Self {
            category,
            code: code.into(),
            message: message.into(),
            retry_after_ms: None,
        }
    }

    /// Attach a retry hint to the error.
    pub fn with_retry_after(mut self, retry_after: Duration) -> Self {
        self.retry_after_ms = Some(retry_after.as_millis() as u64);
        self
    }

    /// Build a standard invalid-state-transition error.
    pub fn invalid_state(current: PaneLifecycleState, action: impl Into<String>) -> Self {
        let action = action.into();
        Self::new(
            PaneErrorCategory::Internal,
            "invalid_state_transition",
            format!("cannot run '{action}' while the pane is in state {current:?}"),
        )
    }

    /// Guard rejection for a second concurrent fetch on the same room.
    pub fn fetch_in_progress(room_id: &str) -> Self {
        Self::new(
            PaneErrorCategory::Internal,
            "fetch_in_progress",
            format!("a history fetch is already in flight for room '{room_id}'"),
        )
    }

    /// Authentication failure; must propagate to the session owner.
    pub fn not_authenticated(message: impl Into<String>) -> Self {
        Self::new(PaneErrorCategory::Auth, "not_authenticated", message)
    }

    /// Whether the caller may reasonably retry.
    pub fn is_transient(&self) -> bool {
        matches!(
            self.category,
            PaneErrorCategory::Network | PaneErrorCategory::RateLimited
        )
    }

    /// Whether the error ends the session (reauthentication required).
    pub fn is_fatal(&self) -> bool {
        matches!(self.category, PaneErrorCategory::Auth)
    }
}

/// Map HTTP status codes to error categories, for transport implementations.
pub fn classify_http_status(status: u16) -> PaneErrorCategory {
    match status {
        401 | 403 => PaneErrorCategory::Auth,
        408 | 429 => PaneErrorCategory::RateLimited,
        400..=499 => PaneErrorCategory::Config,
        500..=599 => PaneErrorCategory::Network,
        _ => PaneErrorCategory::Internal,
    }
}
