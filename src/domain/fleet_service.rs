//! Fleet service: the one handle callers hold.
//!
//! Wires the agent, snapshot store, aggregator and scheduler together.
//! Reads never block on a refresh; they return whatever snapshot was last
//! committed.

use std::sync::Arc;
use std::time::Duration;

use tokio::time::Instant;
use tokio_stream::wrappers::WatchStream;
use tracing::{info, warn};

use crate::client::{self, AgentError, NodeAgent};

use super::fleet_aggregator::{AggregationSettings, FleetAggregator, RefreshOutcome};
use super::scheduler::{RefreshScheduler, RefreshTrigger, SchedulerState};
use super::snapshot_store::SnapshotStore;
use super::types::FleetSnapshot;

pub struct FleetService {
    agent: Arc<dyn NodeAgent>,
    aggregator: Arc<FleetAggregator>,
    scheduler: RefreshScheduler,
    mutation_timeout: Duration,
}

impl FleetService {
    pub fn new(agent: Arc<dyn NodeAgent>, settings: AggregationSettings) -> Self {
        let mutation_timeout = settings.registry_timeout;
        let store = Arc::new(SnapshotStore::new());
        let aggregator = Arc::new(FleetAggregator::new(agent.clone(), store, settings));
        Self {
            scheduler: RefreshScheduler::new(aggregator.clone()),
            agent,
            aggregator,
            mutation_timeout,
        }
    }

    fn store(&self) -> &SnapshotStore {
        self.aggregator.store()
    }

    pub fn read(&self) -> Arc<FleetSnapshot> {
        self.store().read()
    }

    pub fn subscribe(&self) -> WatchStream<Arc<FleetSnapshot>> {
        self.store().subscribe()
    }

    pub fn scheduler(&self) -> &RefreshScheduler {
        &self.scheduler
    }

    pub fn scheduler_state(&self) -> SchedulerState {
        self.scheduler.state()
    }

    /// Ask the scheduler for a refresh; coalesced with any in flight.
    pub fn trigger_refresh(&self) -> SchedulerState {
        self.scheduler.trigger(RefreshTrigger::Manual)
    }

    /// Run one refresh inline, outside the scheduler.
    pub async fn refresh_once(&self) -> RefreshOutcome {
        self.aggregator.refresh().await
    }

    /// Delete a node from the registry. The outcome is returned directly;
    /// the snapshot only changes with the follow-up refresh.
    pub async fn request_delete(&self, node_id: &str) -> Result<(), AgentError> {
        let deadline = Instant::now() + self.mutation_timeout;
        let result = client::with_deadline(
            deadline,
            self.agent.delete_node(node_id, self.mutation_timeout),
        )
        .await;

        match &result {
            Ok(()) => {
                info!(node_id, "node removed from registry");
                self.scheduler.trigger(RefreshTrigger::PostMutation);
            }
            Err(e) => warn!(node_id, error = %e, "node deletion failed"),
        }
        result
    }

    /// Clear the stale-data banner on the current snapshot.
    pub fn dismiss_failure(&self) -> bool {
        self.store().dismiss_failure(self.store().generation())
    }

    /// Start periodic refreshes; the first one runs immediately.
    pub fn start(&self, interval: Duration) {
        self.scheduler.start_periodic(interval);
    }

    pub fn reset(&self) {
        self.scheduler.reset();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::mock::{Reply, ScriptedAgent};
    use crate::domain::error::ErrorKind;
    use crate::domain::types::FleetState;

    fn service(agent: &Arc<ScriptedAgent>) -> FleetService {
        FleetService::new(agent.clone(), AggregationSettings::default())
    }

    #[tokio::test(start_paused = true)]
    async fn reads_loading_before_first_refresh() {
        let agent = Arc::new(ScriptedAgent::with_nodes(&["n1"]));
        let fleet = service(&agent);
        assert_eq!(fleet.read().state, FleetState::Loading);
        assert_eq!(fleet.scheduler_state(), SchedulerState::Idle);
    }

    #[tokio::test(start_paused = true)]
    async fn delete_triggers_refresh_that_drops_the_node() {
        let agent = Arc::new(ScriptedAgent::with_nodes(&["n1", "n2"]));
        let fleet = service(&agent);
        fleet.refresh_once().await;
        assert_eq!(fleet.read().node_ids(), vec!["n1", "n2"]);

        fleet.request_delete("n1").await.unwrap();
        assert_eq!(fleet.scheduler_state(), SchedulerState::Refreshing);
        // Still the pre-delete snapshot until the refresh lands.
        assert_eq!(fleet.read().node_ids(), vec!["n1", "n2"]);

        fleet.scheduler().wait_idle().await;
        assert_eq!(fleet.read().node_ids(), vec!["n2"]);
    }

    #[tokio::test(start_paused = true)]
    async fn delete_failure_is_returned_and_triggers_nothing() {
        let agent = Arc::new(ScriptedAgent::with_nodes(&["n1"]));
        agent.fail_deletes(ErrorKind::Unreachable);
        let fleet = service(&agent);

        let err = fleet.request_delete("n1").await.unwrap_err();
        assert_eq!(err.kind, ErrorKind::Unreachable);
        assert_eq!(fleet.scheduler_state(), SchedulerState::Idle);
        assert_eq!(agent.list_calls(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn deleting_an_unknown_node_is_not_found() {
        let agent = Arc::new(ScriptedAgent::with_nodes(&["n1"]));
        let fleet = service(&agent);
        let err = fleet.request_delete("ghost").await.unwrap_err();
        assert_eq!(err.kind, ErrorKind::NotFound);
    }

    #[tokio::test(start_paused = true)]
    async fn dismiss_clears_registry_failure_banner() {
        let agent = Arc::new(ScriptedAgent::with_nodes(&["n1"]));
        let fleet = service(&agent);
        fleet.refresh_once().await;

        agent.push_registry_step(Reply::Err(ErrorKind::Timeout));
        fleet.refresh_once().await;
        assert!(fleet.read().is_stale());

        assert!(fleet.dismiss_failure());
        let snapshot = fleet.read();
        assert!(!snapshot.is_stale());
        assert_eq!(snapshot.node_ids(), vec!["n1"]);
    }

    #[tokio::test(start_paused = true)]
    async fn subscribers_see_scheduled_refreshes() {
        use futures_util::StreamExt;

        let agent = Arc::new(ScriptedAgent::with_nodes(&["n1"]));
        let fleet = service(&agent);
        let mut updates = fleet.subscribe();
        assert_eq!(updates.next().await.unwrap().state, FleetState::Loading);

        fleet.start(Duration::from_secs(30));
        let first = updates.next().await.unwrap();
        assert_eq!(first.generation, 1);
        assert_eq!(first.state, FleetState::Ready);

        fleet.reset();
    }
}
