//! Fleet aggregation: one refresh cycle over the whole registry.
//!
//! 1. List the registry. On failure, republish the previous node data
//!    flagged as stale instead of blanking the fleet.
//! 2. Aggregate every node, at most `concurrency` at a time, keeping
//!    registry order.
//! 3. Publish the assembled snapshot under this cycle's generation. Nothing
//!    is published until every node has settled.

use std::collections::HashSet;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use futures_util::{stream, StreamExt};
use tokio::time::Instant;
use tracing::{info, warn};

use crate::client::{self, NodeAgent};

use super::error::ErrorKind;
use super::node_aggregator::NodeAggregator;
use super::snapshot_store::SnapshotStore;
use super::types::{FleetSnapshot, Generation, Node, NodeView, PartialFleetFailure};

#[derive(Debug, Clone)]
pub struct AggregationSettings {
    pub concurrency: usize,
    pub call_timeout: Duration,
    pub registry_timeout: Duration,
    pub refresh_budget: Duration,
}

impl Default for AggregationSettings {
    fn default() -> Self {
        Self {
            concurrency: 8,
            call_timeout: Duration::from_secs(5),
            registry_timeout: Duration::from_secs(5),
            refresh_budget: Duration::from_secs(20),
        }
    }
}

/// What one refresh did.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RefreshOutcome {
    pub generation: Generation,
    /// Whether the store accepted this generation's snapshot.
    pub published: bool,
    pub node_count: usize,
    pub registry_error: Option<ErrorKind>,
}

pub struct FleetAggregator {
    agent: Arc<dyn NodeAgent>,
    nodes: NodeAggregator,
    store: Arc<SnapshotStore>,
    settings: AggregationSettings,
    generation: AtomicU64,
}

impl FleetAggregator {
    pub fn new(
        agent: Arc<dyn NodeAgent>,
        store: Arc<SnapshotStore>,
        settings: AggregationSettings,
    ) -> Self {
        Self {
            nodes: NodeAggregator::new(agent.clone(), settings.call_timeout),
            agent,
            store,
            settings,
            generation: AtomicU64::new(0),
        }
    }

    pub fn store(&self) -> &Arc<SnapshotStore> {
        &self.store
    }

    fn next_generation(&self) -> Generation {
        self.generation.fetch_add(1, Ordering::SeqCst) + 1
    }

    /// Run one full refresh cycle and publish its result.
    pub async fn refresh(&self) -> RefreshOutcome {
        let generation = self.next_generation();
        let deadline = Instant::now() + self.settings.refresh_budget;
        let registry_deadline = deadline.min(Instant::now() + self.settings.registry_timeout);

        let listed = client::with_deadline(
            registry_deadline,
            self.agent.list_nodes(self.settings.registry_timeout),
        )
        .await;

        let nodes = match listed {
            Ok(nodes) => dedupe(nodes),
            Err(e) => {
                warn!(generation, error = %e, "registry listing failed, keeping previous fleet data");
                let previous = self.store.read();
                let snapshot = FleetSnapshot::degraded(
                    &previous,
                    generation,
                    PartialFleetFailure::new(e.kind, e.message),
                );
                let node_count = snapshot.nodes.len();
                return RefreshOutcome {
                    generation,
                    published: self.store.publish(snapshot, generation),
                    node_count,
                    registry_error: Some(e.kind),
                };
            }
        };

        let views: Vec<NodeView> = stream::iter(nodes)
            .map(|node| self.nodes.aggregate(node, deadline))
            .buffered(self.settings.concurrency.max(1))
            .collect()
            .await;

        let node_count = views.len();
        let failed_calls: usize = views.iter().map(NodeView::failed_calls).sum();
        let live = views.iter().filter(|v| v.live).count();

        let snapshot = FleetSnapshot::ready(generation, views);
        let changed = !self.store.read().same_content(&snapshot);
        let published = self.store.publish(snapshot, generation);

        info!(
            generation,
            nodes = node_count,
            live,
            failed_calls,
            changed,
            published,
            "fleet refresh completed"
        );

        RefreshOutcome {
            generation,
            published,
            node_count,
            registry_error: None,
        }
    }
}

/// Keep the first occurrence of each node id, preserving registry order.
fn dedupe(nodes: Vec<Node>) -> Vec<Node> {
    let mut seen = HashSet::new();
    nodes
        .into_iter()
        .filter(|n| {
            let fresh = seen.insert(n.node_id.clone());
            if !fresh {
                warn!(node_id = %n.node_id, "registry listed node twice, keeping first entry");
            }
            fresh
        })
        .collect()
}
