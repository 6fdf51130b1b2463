//! Per-node aggregation: diagnostics, ping and container stats for one node.
//!
//! The three calls are independent reads and run concurrently. Each is
//! bounded by the node deadline; whatever has not settled by then is recorded
//! as `Timeout` for that field alone. The `NodeView` is built once, after all
//! three have settled.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tokio::time::Instant;
use tracing::debug;

use crate::client::{self, AgentError, NodeAgent};

use super::error::ErrorKind;
use super::types::{Node, NodeView};

pub struct NodeAggregator {
    agent: Arc<dyn NodeAgent>,
    call_timeout: Duration,
}

impl NodeAggregator {
    pub fn new(agent: Arc<dyn NodeAgent>, call_timeout: Duration) -> Self {
        Self {
            agent,
            call_timeout,
        }
    }

    /// Aggregate one node. `refresh_deadline` caps the per-call timeout so a
    /// node started late in a refresh cannot overrun the refresh budget.
    pub async fn aggregate(&self, node: Node, refresh_deadline: Instant) -> NodeView {
        let deadline = refresh_deadline.min(Instant::now() + self.call_timeout);
        let timeout = client::remaining(deadline);

        let (diagnostics, ping, containers) = tokio::join!(
            client::with_deadline(deadline, self.agent.get_diagnostics(&node, timeout)),
            client::with_deadline(deadline, self.agent.ping(&node, timeout)),
            client::with_deadline(deadline, self.agent.get_container_stats(&node, timeout)),
        );

        let (live, ping_error) = match ping {
            Ok(live) => (live, None),
            Err(e) => (false, Some(field_error(&node, "ping", e))),
        };

        NodeView {
            diagnostics: diagnostics.map_err(|e| field_error(&node, "diagnostics", e)),
            containers: containers.map_err(|e| field_error(&node, "containers", e)),
            live,
            ping_error,
            last_updated: Utc::now(),
            node,
        }
    }
}

fn field_error(node: &Node, field: &'static str, err: AgentError) -> ErrorKind {
    debug!(
        node_id = %node.node_id,
        field,
        kind = %err.kind,
        error = %err.message,
        "node call failed"
    );
    err.kind
}
