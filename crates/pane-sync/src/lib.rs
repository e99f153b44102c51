//! Conversation synchronization runtime for the message pane.
//!
//! Reconciles a locally cached message history against a remote source of
//! truth, paginates backward on demand, folds live store notifications into
//! the shared presentation index, and emits scroll-preserving update
//! instructions for the rendering boundary.

/// Local store and remote transport contracts.
pub mod collaborators;
/// Conversation-owning runtime and its spawn/handle API.
pub mod coordinator;
/// Single-flight backward history fetches.
pub mod fetcher;
/// Cancellable live-update forwarding.
pub mod listener;
/// In-memory local store reference implementation.
pub mod memory;

pub use collaborators::{LocalStore, RemoteTransport, StoreChange};
pub use coordinator::{CoordinatorConfig, SyncCoordinatorHandle, spawn_coordinator};
pub use fetcher::HistoryFetcher;
pub use listener::LiveUpdateListener;
pub use memory::InMemoryLocalStore;
