//! The latest published fleet snapshot, gated by generation.
//!
//! Backed by a `tokio::sync::watch` channel: readers clone an
//! `Arc<FleetSnapshot>` and subscribers are woken on every accepted publish.
//! A candidate is accepted only if its generation is strictly newer than the
//! stored one, so a slow refresh can never overwrite a faster, later one.

use std::sync::Arc;

use tokio::sync::watch;
use tokio_stream::wrappers::WatchStream;
use tracing::debug;

use super::types::{FleetSnapshot, Generation};

pub struct SnapshotStore {
    tx: watch::Sender<Arc<FleetSnapshot>>,
}

impl SnapshotStore {
    pub fn new() -> Self {
        let (tx, _rx) = watch::channel(Arc::new(FleetSnapshot::loading()));
        Self { tx }
    }

    /// Latest committed snapshot.
    pub fn read(&self) -> Arc<FleetSnapshot> {
        self.tx.borrow().clone()
    }

    pub fn generation(&self) -> Generation {
        self.tx.borrow().generation
    }

    /// Replace the stored snapshot iff `generation` is newer. Returns whether
    /// the candidate was accepted.
    pub fn publish(&self, mut candidate: FleetSnapshot, generation: Generation) -> bool {
        let accepted = self.tx.send_if_modified(|current| {
            if generation <= current.generation {
                return false;
            }
            candidate.generation = generation;
            *current = Arc::new(candidate);
            true
        });
        if !accepted {
            debug!(
                generation,
                current = self.generation(),
                "discarding snapshot from an older generation"
            );
        }
        accepted
    }

    /// Clear the stale-data banner, provided `generation` is still current.
    pub fn dismiss_failure(&self, generation: Generation) -> bool {
        self.tx.send_if_modified(|current| {
            if current.generation != generation || current.failure.is_none() {
                return false;
            }
            *current = Arc::new(current.without_failure());
            true
        })
    }

    /// Stream yielding the current snapshot, then every accepted publish.
    pub fn subscribe(&self) -> WatchStream<Arc<FleetSnapshot>> {
        WatchStream::new(self.tx.subscribe())
    }
}

impl Default for SnapshotStore {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::error::ErrorKind;
    use crate::domain::types::{FleetState, PartialFleetFailure};
    use futures_util::StreamExt;

    #[test]
    fn starts_loading_at_generation_zero() {
        let store = SnapshotStore::new();
        let snapshot = store.read();
        assert_eq!(snapshot.state, FleetState::Loading);
        assert_eq!(snapshot.generation, 0);
    }

    #[test]
    fn accepts_only_strictly_newer_generations() {
        let store = SnapshotStore::new();
        assert!(store.publish(FleetSnapshot::ready(2, Vec::new()), 2));
        assert!(!store.publish(FleetSnapshot::ready(1, Vec::new()), 1));
        assert!(!store.publish(FleetSnapshot::ready(2, Vec::new()), 2));
        assert_eq!(store.generation(), 2);
        assert!(store.publish(FleetSnapshot::ready(3, Vec::new()), 3));
        assert_eq!(store.read().generation, 3);
    }

    #[test]
    fn publish_stamps_the_given_generation() {
        let store = SnapshotStore::new();
        assert!(store.publish(FleetSnapshot::loading(), 5));
        assert_eq!(store.read().generation, 5);
    }

    #[test]
    fn dismiss_only_touches_the_current_generation() {
        let store = SnapshotStore::new();
        let failure = PartialFleetFailure::new(ErrorKind::Unreachable, "registry down");
        store.publish(FleetSnapshot::degraded(&store.read(), 1, failure), 1);

        assert!(!store.dismiss_failure(0));
        assert!(store.read().is_stale());
        assert!(store.dismiss_failure(1));
        assert!(!store.read().is_stale());
        assert!(!store.dismiss_failure(1));
    }

    #[tokio::test]
    async fn subscribers_see_current_then_accepted_publishes() {
        let store = SnapshotStore::new();
        let mut stream = store.subscribe();

        let first = stream.next().await.unwrap();
        assert_eq!(first.generation, 0);

        store.publish(FleetSnapshot::ready(1, Vec::new()), 1);
        let second = stream.next().await.unwrap();
        assert_eq!(second.generation, 1);
        assert_eq!(second.state, FleetState::Empty);
    }
}
