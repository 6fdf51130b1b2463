//! Typed HTTP client for the node registry and the node agents.

use std::time::Duration;

use anyhow::Context;
use async_trait::async_trait;
use reqwest::{Client, IntoUrl, Method, RequestBuilder, Response, StatusCode, Url};
use serde::de::DeserializeOwned;
use tracing::{debug, warn};

use super::table;
use super::{AgentError, NodeAgent};
use crate::config::{AgentConfig, RegistryConfig};
use crate::domain::types::{ContainerStats, Node, NodeDiagnostics};

pub const DEFAULT_AGENT_PORT: u16 = 7462;

/// Agents are often reached through ngrok tunnels, which interpose a
/// browser warning page unless this header is present.
const TUNNEL_WARNING_HEADER: &str = "ngrok-skip-browser-warning";

pub struct HttpNodeAgent {
    registry_url: String,
    api_key: Option<String>,
    api_key_header: String,
    default_port: u16,
    http: Client,
}

impl HttpNodeAgent {
    pub fn new(registry: &RegistryConfig, agent: &AgentConfig) -> anyhow::Result<Self> {
        let http = Client::builder()
            .danger_accept_invalid_certs(agent.accept_invalid_certs)
            .build()
            .context("building HTTP client")?;
        Ok(Self {
            registry_url: registry.url.trim_end_matches('/').to_string(),
            api_key: registry.api_key.clone(),
            api_key_header: agent.api_key_header.clone(),
            default_port: agent.default_port,
            http,
        })
    }

    fn agent_url(&self, node: &Node, path: &str) -> Result<String, AgentError> {
        let base = agent_base_url(&node.address, self.default_port)?;
        Ok(format!("{}{}", base, path))
    }

    fn registry_nodes_url(&self, node_id: Option<&str>) -> Result<Url, AgentError> {
        let mut url = Url::parse(&self.registry_url)
            .map_err(|e| AgentError::protocol(format!("invalid registry url: {e}")))?;
        {
            let mut segments = url
                .path_segments_mut()
                .map_err(|_| AgentError::protocol("registry url cannot carry a path"))?;
            segments.pop_if_empty().extend(["api", "v1", "nodes"]);
            if let Some(id) = node_id {
                segments.push(id);
            }
        }
        Ok(url)
    }

    fn request(&self, method: Method, url: impl IntoUrl, timeout: Duration) -> RequestBuilder {
        let req = self
            .http
            .request(method, url)
            .timeout(timeout)
            .header(TUNNEL_WARNING_HEADER, "true");
        match &self.api_key {
            Some(key) => req.header(self.api_key_header.as_str(), key.as_str()),
            None => req,
        }
    }

    async fn send(&self, req: RequestBuilder, what: &str) -> Result<Response, AgentError> {
        let resp = req.send().await.map_err(|e| transport_error(e, what))?;
        if !resp.status().is_success() {
            return Err(status_error(resp.status(), what));
        }
        Ok(resp)
    }

    async fn get_json<T: DeserializeOwned>(
        &self,
        url: impl IntoUrl,
        timeout: Duration,
        what: &str,
    ) -> Result<T, AgentError> {
        let resp = self.send(self.request(Method::GET, url, timeout), what).await?;
        resp.json()
            .await
            .map_err(|e| AgentError::protocol(format!("parsing {what} response: {e}")))
    }

    async fn get_text(&self, url: &str, timeout: Duration, what: &str) -> Result<String, AgentError> {
        let resp = self.send(self.request(Method::GET, url, timeout), what).await?;
        resp.text().await.map_err(|e| transport_error(e, what))
    }
}

#[async_trait]
impl NodeAgent for HttpNodeAgent {
    async fn list_nodes(&self, timeout: Duration) -> Result<Vec<Node>, AgentError> {
        let url = self.registry_nodes_url(None)?;
        self.get_json(url, timeout, "list nodes").await
    }

    async fn get_diagnostics(
        &self,
        node: &Node,
        timeout: Duration,
    ) -> Result<NodeDiagnostics, AgentError> {
        let url = self.agent_url(node, "/diags/get-diags")?;
        let mut diags: NodeDiagnostics = self.get_json(url, timeout, "diagnostics").await?;
        if diags.node_id.is_empty() {
            diags.node_id = node.node_id.clone();
        }
        if diags.name.is_empty() {
            diags.name = node.name.clone();
        }
        Ok(diags)
    }

    async fn ping(&self, node: &Node, timeout: Duration) -> Result<bool, AgentError> {
        let url = self.agent_url(node, "/")?;
        let resp = self
            .request(Method::GET, url, timeout)
            .send()
            .await
            .map_err(|e| transport_error(e, "ping"))?;
        let healthy = resp.status().is_success();
        if !healthy {
            debug!(node_id = %node.node_id, status = %resp.status(), "agent answered ping unhealthy");
        }
        Ok(healthy)
    }

    async fn get_container_stats(
        &self,
        node: &Node,
        timeout: Duration,
    ) -> Result<Vec<ContainerStats>, AgentError> {
        let list_url = self.agent_url(node, "/docker/proj/list-containers")?;
        let usage_url = self.agent_url(node, "/docker/proj/list-container-stats")?;

        let (list, usage) = tokio::join!(
            self.get_text(&list_url, timeout, "list containers"),
            self.get_text(&usage_url, timeout, "container stats"),
        );

        let mut containers = table::parse_containers(&list?);
        match usage {
            Ok(text) => table::merge_usage(&mut containers, table::parse_usage(&text)),
            Err(e) => {
                warn!(node_id = %node.node_id, error = %e, "container usage unavailable, listing without stats");
            }
        }
        Ok(containers)
    }

    async fn delete_node(&self, node_id: &str, timeout: Duration) -> Result<(), AgentError> {
        let url = self.registry_nodes_url(Some(node_id))?;
        self.send(self.request(Method::DELETE, url, timeout), "delete node")
            .await?;
        Ok(())
    }
}

/// Resolve a registry address to the agent's base URL.
///
/// - `http://…` / `https://…`: used as given
/// - bare host or IPv4: `https://<host>:<default_port>`
/// - `host:port`: `https://host:port`
pub fn agent_base_url(address: &str, default_port: u16) -> Result<String, AgentError> {
    let address = address.trim();
    if address.starts_with("http://") || address.starts_with("https://") {
        return Ok(address.trim_end_matches('/').to_string());
    }

    if is_host(address) {
        return Ok(format!("https://{}:{}", address, default_port));
    }

    if let Some((host, port)) = address.rsplit_once(':') {
        if is_host(host) && port.parse::<u16>().is_ok() {
            return Ok(format!("https://{}", address));
        }
    }

    Err(AgentError::protocol(format!(
        "address `{}` is in an unexpected format",
        address
    )))
}

fn is_host(s: &str) -> bool {
    !s.is_empty()
        && s
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '.' || c == '-')
}

fn transport_error(err: reqwest::Error, what: &str) -> AgentError {
    if err.is_timeout() {
        AgentError::timeout(format!("{what}: {err}"))
    } else if let Some(status) = err.status() {
        status_error(status, what)
    } else if err.is_decode() || err.is_body() {
        AgentError::protocol(format!("{what}: {err}"))
    } else {
        AgentError::unreachable(format!("{what}: {err}"))
    }
}

fn status_error(status: StatusCode, what: &str) -> AgentError {
    if status == StatusCode::NOT_FOUND {
        AgentError::not_found(format!("{what} returned {status}"))
    } else {
        AgentError::protocol(format!("{what} returned {status}"))
    }
}
