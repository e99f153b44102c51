use std::{collections::HashSet, sync::Arc};

use pane_core::{MessageRecord, PaneError};
use parking_lot::Mutex;

use crate::collaborators::RemoteTransport;

/// Paginated backward history fetch with a single-flight-per-room guarantee.
///
/// A second `fetch_page` for a room whose fetch is still outstanding fails
/// immediately with code `fetch_in_progress`; calls are never queued.
#[derive(Clone)]
pub struct HistoryFetcher {
    transport: Arc<dyn RemoteTransport>,
    in_flight: Arc<Mutex<HashSet<String>>>,
}

impl HistoryFetcher {
    pub fn new(transport: Arc<dyn RemoteTransport>) -> Self {
        Self {
            transport,
            in_flight: Arc::new(Mutex::new(HashSet::new())),
        }
    }

    /// Fetch one page of older messages; `before_ms = None` means the most
    /// recent page.
    pub async fn fetch_page(
        &self,
        room_id: &str,
        before_ms: Option<u64>,
    ) -> Result<Vec<MessageRecord>, PaneError> {
        let _guard = self.claim(room_id)?;
        self.transport.fetch_history(room_id, before_ms).await
    }

    fn claim(&self, room_id: &str) -> Result<InFlightGuard, PaneError> {
        let mut in_flight = self.in_flight.lock();
        if !in_flight.insert(room_id.to_owned()) {
            return Err(PaneError::fetch_in_progress(room_id));
        }

        Ok(InFlightGuard {
            in_flight: Arc::clone(&self.in_flight),
            room_id: room_id.to_owned(),
        })
    }
}

// Releases the room slot on every exit path, including transport errors.
struct InFlightGuard {
    in_flight: Arc<Mutex<HashSet<String>>>,
    room_id: String,
}

impl Drop for InFlightGuard {
    fn drop(&mut self) {
        self.in_flight.lock().remove(&self.room_id);
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use async_trait::async_trait;
    use pane_core::PaneErrorCategory;
    use tokio::sync::Semaphore;

    use super::*;

    struct GatedTransport {
        gate: Semaphore,
        calls: AtomicUsize,
        fail: bool,
    }

    impl GatedTransport {
        fn new(fail: bool) -> Self {
            Self {
                gate: Semaphore::new(0),
                calls: AtomicUsize::new(0),
                fail,
            }
        }
    }

    #[async_trait]
    impl RemoteTransport for GatedTransport {
        async fn fetch_history(
            &self,
            _room_id: &str,
            _before_ms: Option<u64>,
        ) -> Result<Vec<MessageRecord>, PaneError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            let _permit = self.gate.acquire().await.expect("gate open");
            if self.fail {
                Err(PaneError::new(
                    PaneErrorCategory::Network,
                    "network_error",
                    "connection reset",
                ))
            } else {
                Ok(Vec::new())
            }
        }

        async fn send_text_message(
            &self,
            _room_id: &str,
            _body: &str,
        ) -> Result<String, PaneError> {
            unimplemented!("not used by fetcher tests")
        }

        async fn mark_as_read(&self, _room_id: &str) -> Result<(), PaneError> {
            unimplemented!("not used by fetcher tests")
        }
    }

    #[tokio::test]
    async fn rejects_second_fetch_for_same_room_immediately() {
        let transport = Arc::new(GatedTransport::new(false));
        let fetcher = HistoryFetcher::new(transport.clone());

        let outstanding = {
            let fetcher = fetcher.clone();
            tokio::spawn(async move { fetcher.fetch_page("!general", None).await })
        };
        while transport.calls.load(Ordering::SeqCst) < 1 {
            tokio::task::yield_now().await;
        }

        let err = fetcher
            .fetch_page("!general", Some(1_000))
            .await
            .expect_err("second fetch must be rejected");
        assert_eq!(err.code, "fetch_in_progress");

        transport.gate.add_permits(1);
        outstanding
            .await
            .expect("task join")
            .expect("first fetch succeeds");
        assert_eq!(transport.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn different_rooms_fetch_concurrently() {
        let transport = Arc::new(GatedTransport::new(false));
        let fetcher = HistoryFetcher::new(transport.clone());

        let first = {
            let fetcher = fetcher.clone();
            tokio::spawn(async move { fetcher.fetch_page("!a", None).await })
        };
        let second = {
            let fetcher = fetcher.clone();
            tokio::spawn(async move { fetcher.fetch_page("!b", None).await })
        };
        while transport.calls.load(Ordering::SeqCst) < 2 {
            tokio::task::yield_now().await;
        }

        transport.gate.add_permits(2);
        first.await.expect("join").expect("fetch a");
        second.await.expect("join").expect("fetch b");
    }

    #[tokio::test]
    async fn releases_slot_after_completion_and_after_failure() {
        let failing = Arc::new(GatedTransport::new(true));
        failing.gate.add_permits(8);
        let fetcher = HistoryFetcher::new(failing);

        let err = fetcher
            .fetch_page("!general", None)
            .await
            .expect_err("transport failure surfaces");
        assert_eq!(err.code, "network_error");

        // The slot must be free again for a follow-up call.
        let err = fetcher
            .fetch_page("!general", None)
            .await
            .expect_err("second call reaches the transport");
        assert_eq!(err.code, "network_error");
    }
}
