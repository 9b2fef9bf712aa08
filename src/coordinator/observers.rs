//! Best-effort multicast to observers
//!
//! Observers (in-page widgets, popup, dashboard) only render state. The
//! coordinator pushes every state change to all of them; a failed delivery
//! is logged and never stops delivery to the rest.

use futures::future::join_all;
use std::sync::{Arc, RwLock};
use thiserror::Error;
use tracing::{debug, warn};

use super::CoordinatorEvent;

#[derive(Debug, Error)]
pub enum ObserverError {
    #[error("observer {0} is gone")]
    Disconnected(String),
}

/// A target that receives coordinator broadcasts
#[async_trait::async_trait]
pub trait Observer: Send + Sync {
    /// Stable identifier of the target (e.g. `tab:42`, `popup`)
    fn id(&self) -> &str;

    async fn deliver(&self, event: &CoordinatorEvent) -> Result<(), ObserverError>;
}

/// Outcome of one broadcast
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct BroadcastReport {
    pub delivered: usize,
    pub failed: Vec<String>,
}

/// Set of known observer targets
#[derive(Default)]
pub struct ObserverRegistry {
    observers: RwLock<Vec<Arc<dyn Observer>>>,
}

impl ObserverRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add an observer, replacing any previous one with the same id
    pub fn register(&self, observer: Arc<dyn Observer>) {
        let mut observers = match self.observers.write() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        observers.retain(|existing| existing.id() != observer.id());
        debug!("Registered observer {}", observer.id());
        observers.push(observer);
    }

    pub fn contains(&self, id: &str) -> bool {
        self.snapshot().iter().any(|observer| observer.id() == id)
    }

    pub fn remove(&self, id: &str) -> bool {
        let mut observers = match self.observers.write() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        let before = observers.len();
        observers.retain(|observer| observer.id() != id);
        before != observers.len()
    }

    #[cfg(test)]
    pub fn len(&self) -> usize {
        self.snapshot().len()
    }

    #[cfg(test)]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn snapshot(&self) -> Vec<Arc<dyn Observer>> {
        match self.observers.read() {
            Ok(guard) => guard.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }

    /// Deliver `event` to every registered observer
    pub async fn broadcast(&self, event: &CoordinatorEvent) -> BroadcastReport {
        let observers = self.snapshot();
        let results = join_all(observers.iter().map(|observer| observer.deliver(event))).await;

        let mut report = BroadcastReport::default();
        for (observer, result) in observers.iter().zip(results) {
            match result {
                Ok(()) => report.delivered += 1,
                Err(e) => {
                    warn!("Broadcast to {} failed: {}", observer.id(), e);
                    report.failed.push(observer.id().to_string());
                }
            }
        }
        report
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{FailingObserver, RecordingObserver};

    #[tokio::test]
    async fn test_failed_observer_does_not_block_others() {
        let registry = ObserverRegistry::new();
        let first = Arc::new(RecordingObserver::new("tab:1"));
        let broken = Arc::new(FailingObserver::new("tab:2"));
        let last = Arc::new(RecordingObserver::new("popup"));
        registry.register(first.clone());
        registry.register(broken);
        registry.register(last.clone());

        let report = registry.broadcast(&CoordinatorEvent::Paused).await;

        assert_eq!(report.delivered, 2);
        assert_eq!(report.failed, vec!["tab:2".to_string()]);
        assert_eq!(first.events(), vec![CoordinatorEvent::Paused]);
        assert_eq!(last.events(), vec![CoordinatorEvent::Paused]);
    }

    #[tokio::test]
    async fn test_register_replaces_same_id() {
        let registry = ObserverRegistry::new();
        let old = Arc::new(RecordingObserver::new("tab:1"));
        let new = Arc::new(RecordingObserver::new("tab:1"));
        registry.register(old.clone());
        registry.register(new.clone());
        assert_eq!(registry.len(), 1);

        registry.broadcast(&CoordinatorEvent::Stopped).await;
        assert!(old.events().is_empty());
        assert_eq!(new.events(), vec![CoordinatorEvent::Stopped]);

        assert!(registry.remove("tab:1"));
        assert!(!registry.contains("tab:1"));
        assert!(registry.is_empty());
    }

    #[tokio::test]
    async fn test_each_observer_sees_events_in_send_order() {
        let registry = ObserverRegistry::new();
        let observer = Arc::new(RecordingObserver::new("tab:9"));
        registry.register(observer.clone());

        registry.broadcast(&CoordinatorEvent::Paused).await;
        registry.broadcast(&CoordinatorEvent::Resumed).await;
        registry.broadcast(&CoordinatorEvent::Stopped).await;

        assert_eq!(
            observer.events(),
            vec![
                CoordinatorEvent::Paused,
                CoordinatorEvent::Resumed,
                CoordinatorEvent::Stopped
            ]
        );
    }
}
