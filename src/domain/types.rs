//! Fleet data model: registry nodes, merged per-node views and the
//! published fleet snapshot.
//!
//! A `FleetSnapshot` is immutable once built. The store hands out
//! `Arc<FleetSnapshot>` so consumers never observe a half-assembled fleet.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use super::error::ErrorKind;

/// Monotonic counter identifying one fleet refresh cycle.
pub type Generation = u64;

// ── Registry ───────────────────────────────────────────────

/// Identity record of a node as reported by the registry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Node {
    pub node_id: String,
    pub name: String,
    #[serde(alias = "addr")]
    pub address: String,
    #[serde(default, alias = "status")]
    pub registry_status: RegistryStatus,
}

/// Coarse status as reported by the registry, independent of live ping.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RegistryStatus {
    Active,
    #[serde(other)]
    Inactive,
}

impl Default for RegistryStatus {
    fn default() -> Self {
        Self::Inactive
    }
}

// ── Agent payloads ─────────────────────────────────────────

/// Point-in-time hardware facts reported by a node agent.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct NodeDiagnostics {
    #[serde(default)]
    pub node_id: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub manufacturer: Option<String>,
    #[serde(default, alias = "cpu")]
    pub cpu_model: Option<String>,
    #[serde(default, alias = "cpu_arc")]
    pub cpu_architecture: Option<String>,
    #[serde(default)]
    pub hardware_threads: Option<String>,
    #[serde(default)]
    pub l1_cache_d: Option<String>,
    #[serde(default)]
    pub l1_cache_i: Option<String>,
    #[serde(default)]
    pub l2_cache: Option<String>,
    #[serde(default)]
    pub l3_cache: Option<String>,
    #[serde(default)]
    pub mem_total: Option<String>,
    #[serde(default)]
    pub mem_free: Option<String>,
}

/// One running container on a node. Values are the agent's display strings.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContainerStats {
    pub container_id: String,
    pub image: String,
    pub command: String,
    pub created_at: String,
    pub status: String,
    pub ports: String,
    pub names: String,
    #[serde(default)]
    pub cpu_percent: Option<String>,
    #[serde(default)]
    pub mem_percent: Option<String>,
    #[serde(default)]
    pub mem_usage_limit: Option<String>,
    #[serde(default)]
    pub net_io: Option<String>,
    #[serde(default)]
    pub block_io: Option<String>,
    #[serde(default)]
    pub pid_count: Option<String>,
}

// ── Views ──────────────────────────────────────────────────

/// Merged result of the three per-node calls. Each field succeeds or fails
/// on its own.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NodeView {
    pub node: Node,
    pub live: bool,
    pub ping_error: Option<ErrorKind>,
    pub diagnostics: Result<NodeDiagnostics, ErrorKind>,
    pub containers: Result<Vec<ContainerStats>, ErrorKind>,
    pub last_updated: DateTime<Utc>,
}

impl NodeView {
    pub fn node_id(&self) -> &str {
        &self.node.node_id
    }

    /// Number of the three calls that did not produce a value.
    pub fn failed_calls(&self) -> usize {
        usize::from(self.ping_error.is_some())
            + usize::from(self.diagnostics.is_err())
            + usize::from(self.containers.is_err())
    }
}

/// Overall lifecycle of the published fleet picture.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FleetState {
    Loading,
    Ready,
    Empty,
}

/// The registry could not be listed; the snapshot carries stale node data.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PartialFleetFailure {
    pub kind: ErrorKind,
    pub message: String,
    pub failed_at: DateTime<Utc>,
}

impl PartialFleetFailure {
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
            failed_at: Utc::now(),
        }
    }
}

/// Fully assembled fleet result, published atomically.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FleetSnapshot {
    pub generation: Generation,
    pub state: FleetState,
    pub nodes: Vec<NodeView>,
    /// Time of the last successful registry fetch backing `nodes`.
    pub fetched_at: Option<DateTime<Utc>>,
    pub failure: Option<PartialFleetFailure>,
    /// SHA-256 over the content, timestamps and generation excluded: "sha256:<hex>"
    pub checksum: String,
}

impl FleetSnapshot {
    /// Initial snapshot before any refresh has completed.
    pub fn loading() -> Self {
        Self::build(0, FleetState::Loading, Vec::new(), None, None)
    }

    /// Snapshot for a successful registry fetch. `Empty` iff there are no nodes.
    pub fn ready(generation: Generation, nodes: Vec<NodeView>) -> Self {
        let state = if nodes.is_empty() {
            FleetState::Empty
        } else {
            FleetState::Ready
        };
        Self::build(generation, state, nodes, Some(Utc::now()), None)
    }

    /// Keep the previous snapshot's node data but flag it as stale.
    ///
    /// Always `Ready`; `Empty` is only for a successful empty listing.
    pub fn degraded(
        previous: &FleetSnapshot,
        generation: Generation,
        failure: PartialFleetFailure,
    ) -> Self {
        Self::build(
            generation,
            FleetState::Ready,
            previous.nodes.clone(),
            previous.fetched_at,
            Some(failure),
        )
    }

    /// Copy of this snapshot with the stale-data banner removed.
    pub fn without_failure(&self) -> Self {
        Self::build(
            self.generation,
            self.state,
            self.nodes.clone(),
            self.fetched_at,
            None,
        )
    }

    pub fn get(&self, node_id: &str) -> Option<&NodeView> {
        self.nodes.iter().find(|v| v.node.node_id == node_id)
    }

    pub fn node_ids(&self) -> Vec<&str> {
        self.nodes.iter().map(NodeView::node_id).collect()
    }

    pub fn is_stale(&self) -> bool {
        self.failure.is_some()
    }

    /// Whether two snapshots hold the same fleet content, ignoring timestamps.
    pub fn same_content(&self, other: &FleetSnapshot) -> bool {
        self.checksum == other.checksum
    }

    fn build(
        generation: Generation,
        state: FleetState,
        nodes: Vec<NodeView>,
        fetched_at: Option<DateTime<Utc>>,
        failure: Option<PartialFleetFailure>,
    ) -> Self {
        let checksum = content_checksum(state, &nodes, failure.as_ref());
        Self {
            generation,
            state,
            nodes,
            fetched_at,
            failure,
            checksum,
        }
    }
}

#[derive(Serialize)]
struct NodeContent<'a> {
    node: &'a Node,
    live: bool,
    ping_error: Option<ErrorKind>,
    diagnostics: &'a Result<NodeDiagnostics, ErrorKind>,
    containers: &'a Result<Vec<ContainerStats>, ErrorKind>,
}

#[derive(Serialize)]
struct FleetContent<'a> {
    state: FleetState,
    nodes: Vec<NodeContent<'a>>,
    failure: Option<ErrorKind>,
}

fn content_checksum(
    state: FleetState,
    nodes: &[NodeView],
    failure: Option<&PartialFleetFailure>,
) -> String {
    let content = FleetContent {
        state,
        nodes: nodes
            .iter()
            .map(|v| NodeContent {
                node: &v.node,
                live: v.live,
                ping_error: v.ping_error,
                diagnostics: &v.diagnostics,
                containers: &v.containers,
            })
            .collect(),
        failure: failure.map(|f| f.kind),
    };
    let serialized = serde_json::to_string(&content).unwrap_or_default();
    let hash = Sha256::digest(serialized.as_bytes());
    format!("sha256:{:x}", hash)
}
