//! Status publishing
//!
//! Actions and the dispatcher publish through [`StatusPublisher`] and never
//! learn whether the event went to a socket, a table or both. Publishing never
//! fails from the caller's point of view.

use super::StatusEvent;
use crate::services::StatusRepository;
use async_trait::async_trait;
use std::sync::Arc;
use tracing::warn;

#[async_trait]
pub trait StatusPublisher: Send + Sync {
    async fn publish(&self, event: StatusEvent);
}

/// Persist each event, then hand it to a downstream publisher
///
/// A persistence failure is logged and the event is still forwarded, so the
/// UI keeps updating while the store is degraded.
#[derive(Clone)]
pub struct PersistingStatusPublisher {
    repository: Arc<dyn StatusRepository>,
    downstream: Arc<dyn StatusPublisher>,
}

impl std::fmt::Debug for PersistingStatusPublisher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PersistingStatusPublisher").finish_non_exhaustive()
    }
}

impl PersistingStatusPublisher {
    pub fn new(repository: Arc<dyn StatusRepository>, downstream: Arc<dyn StatusPublisher>) -> Self {
        Self {
            repository,
            downstream,
        }
    }
}

#[async_trait]
impl StatusPublisher for PersistingStatusPublisher {
    async fn publish(&self, event: StatusEvent) {
        if let Err(e) = self.repository.record_status(&event).await {
            warn!(
                import_id = %event.import_id,
                status = %event.status,
                error = %e,
                "Failed to persist status event"
            );
        }
        self.downstream.publish(event).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::constants::ImportStatus;
    use parking_lot::Mutex;

    #[derive(Default)]
    struct Recorder {
        events: Mutex<Vec<StatusEvent>>,
    }

    #[async_trait]
    impl StatusPublisher for Recorder {
        async fn publish(&self, event: StatusEvent) {
            self.events.lock().push(event);
        }
    }

    struct Store {
        fail: bool,
        saved: Mutex<usize>,
    }

    #[async_trait]
    impl StatusRepository for Store {
        async fn record_status(&self, _event: &StatusEvent) -> anyhow::Result<()> {
            if self.fail {
                anyhow::bail!("connection refused");
            }
            *self.saved.lock() += 1;
            Ok(())
        }
    }

    #[tokio::test]
    async fn test_persists_then_forwards() {
        let store = Arc::new(Store {
            fail: false,
            saved: Mutex::new(0),
        });
        let recorder = Arc::new(Recorder::default());
        let publisher = PersistingStatusPublisher::new(store.clone(), recorder.clone());

        publisher
            .publish(StatusEvent::new("imp-1", ImportStatus::Completed))
            .await;

        assert_eq!(*store.saved.lock(), 1);
        assert_eq!(recorder.events.lock().len(), 1);
    }

    #[tokio::test]
    async fn test_store_failure_still_forwards() {
        let store = Arc::new(Store {
            fail: true,
            saved: Mutex::new(0),
        });
        let recorder = Arc::new(Recorder::default());
        let publisher = PersistingStatusPublisher::new(store, recorder.clone());

        publisher
            .publish(StatusEvent::new("imp-1", ImportStatus::Failed))
            .await;

        assert_eq!(recorder.events.lock().len(), 1);
    }
}
