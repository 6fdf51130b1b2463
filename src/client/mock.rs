//! Scripted in-memory [`NodeAgent`] for aggregation tests.

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;

use super::{AgentError, NodeAgent};
use crate::domain::error::ErrorKind;
use crate::domain::types::{ContainerStats, Node, NodeDiagnostics, RegistryStatus};

/// How one scripted call answers.
#[derive(Debug, Clone)]
pub enum Reply<T> {
    Ok(T),
    Err(ErrorKind),
    /// Answer `Ok` after the delay.
    Delay(Duration, T),
    /// Never answer.
    Hang,
}

impl<T> Reply<T> {
    async fn resolve(self, what: &str) -> Result<T, AgentError> {
        match self {
            Reply::Ok(v) => Ok(v),
            Reply::Err(kind) => Err(AgentError::new(kind, format!("scripted {what} failure"))),
            Reply::Delay(delay, v) => {
                tokio::time::sleep(delay).await;
                Ok(v)
            }
            Reply::Hang => std::future::pending().await,
        }
    }
}

#[derive(Debug, Clone)]
pub struct NodeScript {
    pub diagnostics: Reply<NodeDiagnostics>,
    pub ping: Reply<bool>,
    pub containers: Reply<Vec<ContainerStats>>,
}

impl Default for NodeScript {
    fn default() -> Self {
        Self {
            diagnostics: Reply::Ok(NodeDiagnostics::default()),
            ping: Reply::Ok(true),
            containers: Reply::Ok(Vec::new()),
        }
    }
}

#[derive(Default)]
pub struct ScriptedAgent {
    registry: Mutex<Vec<Node>>,
    registry_steps: Mutex<VecDeque<Reply<()>>>,
    scripts: Mutex<HashMap<String, NodeScript>>,
    delete_failure: Mutex<Option<ErrorKind>>,
    list_calls: AtomicUsize,
    active_pings: AtomicUsize,
    peak_pings: AtomicUsize,
}

impl ScriptedAgent {
    pub fn with_nodes(ids: &[&str]) -> Self {
        let agent = Self::default();
        agent.set_nodes(ids);
        agent
    }

    pub fn make_node(id: &str) -> Node {
        Node {
            node_id: id.to_string(),
            name: format!("node-{id}"),
            address: format!("{id}.fleet.lan"),
            registry_status: RegistryStatus::Active,
        }
    }

    pub fn container(id: &str) -> ContainerStats {
        ContainerStats {
            container_id: id.to_string(),
            image: "nginx:1.25".to_string(),
            status: "Up 5 minutes".to_string(),
            ..ContainerStats::default()
        }
    }

    pub fn set_nodes(&self, ids: &[&str]) {
        *self.registry.lock().unwrap() = ids.iter().map(|id| Self::make_node(id)).collect();
    }

    pub fn node(&self, id: &str) -> Node {
        self.registry
            .lock()
            .unwrap()
            .iter()
            .find(|n| n.node_id == id)
            .cloned()
            .unwrap_or_else(|| Self::make_node(id))
    }

    /// Adjust the script of one node, starting from the healthy default.
    pub fn script(&self, id: &str, f: impl FnOnce(&mut NodeScript)) {
        let mut scripts = self.scripts.lock().unwrap();
        f(scripts.entry(id.to_string()).or_default());
    }

    /// Queue how the next registry listing behaves. Unqueued calls succeed
    /// immediately.
    pub fn push_registry_step(&self, step: Reply<()>) {
        self.registry_steps.lock().unwrap().push_back(step);
    }

    pub fn fail_deletes(&self, kind: ErrorKind) {
        *self.delete_failure.lock().unwrap() = Some(kind);
    }

    pub fn list_calls(&self) -> usize {
        self.list_calls.load(Ordering::SeqCst)
    }

    /// Most pings in flight at the same time.
    pub fn peak_concurrent_pings(&self) -> usize {
        self.peak_pings.load(Ordering::SeqCst)
    }

    fn script_for(&self, id: &str) -> NodeScript {
        self.scripts
            .lock()
            .unwrap()
            .get(id)
            .cloned()
            .unwrap_or_default()
    }
}

#[async_trait]
impl NodeAgent for ScriptedAgent {
    async fn list_nodes(&self, _timeout: Duration) -> Result<Vec<Node>, AgentError> {
        self.list_calls.fetch_add(1, Ordering::SeqCst);
        let nodes = self.registry.lock().unwrap().clone();
        let step = self.registry_steps.lock().unwrap().pop_front();
        if let Some(step) = step {
            step.resolve("registry").await?;
        }
        Ok(nodes)
    }

    async fn get_diagnostics(
        &self,
        node: &Node,
        _timeout: Duration,
    ) -> Result<NodeDiagnostics, AgentError> {
        let reply = self.script_for(&node.node_id).diagnostics;
        reply.resolve("diagnostics").await
    }

    async fn ping(&self, node: &Node, _timeout: Duration) -> Result<bool, AgentError> {
        let reply = self.script_for(&node.node_id).ping;
        let active = self.active_pings.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak_pings.fetch_max(active, Ordering::SeqCst);
        let result = reply.resolve("ping").await;
        self.active_pings.fetch_sub(1, Ordering::SeqCst);
        result
    }

    async fn get_container_stats(
        &self,
        node: &Node,
        _timeout: Duration,
    ) -> Result<Vec<ContainerStats>, AgentError> {
        let reply = self.script_for(&node.node_id).containers;
        reply.resolve("containers").await
    }

    async fn delete_node(&self, node_id: &str, _timeout: Duration) -> Result<(), AgentError> {
        if let Some(kind) = *self.delete_failure.lock().unwrap() {
            return Err(AgentError::new(kind, "scripted delete failure"));
        }
        let mut registry = self.registry.lock().unwrap();
        let before = registry.len();
        registry.retain(|n| n.node_id != node_id);
        if registry.len() == before {
            return Err(AgentError::not_found(format!("node {node_id} is not registered")));
        }
        Ok(())
    }
}
