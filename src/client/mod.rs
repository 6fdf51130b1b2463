//! Remote client adapter: typed access to the node registry and the
//! per-node agents.
//!
//! Every failure, whatever its transport shape, is surfaced as an
//! [`AgentError`] carrying one [`ErrorKind`].

pub mod http;
#[cfg(test)]
pub mod mock;
pub mod table;

use std::future::Future;
use std::time::Duration;

use async_trait::async_trait;
use tokio::time::Instant;

use crate::domain::error::ErrorKind;
use crate::domain::types::{ContainerStats, Node, NodeDiagnostics};

pub use http::HttpNodeAgent;

/// A failed remote call.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{kind}: {message}")]
pub struct AgentError {
    pub kind: ErrorKind,
    pub message: String,
}

impl AgentError {
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }

    pub fn timeout(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Timeout, message)
    }

    pub fn unreachable(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Unreachable, message)
    }

    pub fn protocol(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Protocol, message)
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::NotFound, message)
    }
}

/// Registry and agent operations consumed by the aggregators.
///
/// Implementations must give up after `timeout` and report
/// [`ErrorKind::Timeout`]; callers additionally bound each call with
/// [`with_deadline`].
#[async_trait]
pub trait NodeAgent: Send + Sync {
    /// Current set of registered nodes, in registry order.
    async fn list_nodes(&self, timeout: Duration) -> Result<Vec<Node>, AgentError>;

    async fn get_diagnostics(
        &self,
        node: &Node,
        timeout: Duration,
    ) -> Result<NodeDiagnostics, AgentError>;

    /// `Ok(true)` when the agent answered healthy.
    async fn ping(&self, node: &Node, timeout: Duration) -> Result<bool, AgentError>;

    async fn get_container_stats(
        &self,
        node: &Node,
        timeout: Duration,
    ) -> Result<Vec<ContainerStats>, AgentError>;

    /// Remove a node from the registry.
    async fn delete_node(&self, node_id: &str, timeout: Duration) -> Result<(), AgentError>;
}

/// Run a remote call, abandoning it once `deadline` passes.
pub async fn with_deadline<T, F>(deadline: Instant, call: F) -> Result<T, AgentError>
where
    F: Future<Output = Result<T, AgentError>>,
{
    match tokio::time::timeout_at(deadline, call).await {
        Ok(result) => result,
        Err(_) => Err(AgentError::timeout("deadline elapsed before the call settled")),
    }
}

/// Time left until `deadline`, never negative.
pub fn remaining(deadline: Instant) -> Duration {
    deadline.saturating_duration_since(Instant::now())
}
