//! `fleetview delete`: remove a node from the registry.

use std::time::Duration;

use anyhow::{Context, Result};
use colored::Colorize;
use tokio::time::Instant;

use crate::client::{self, HttpNodeAgent, NodeAgent};
use crate::config;

pub fn run(node_id: &str, config_path: Option<&str>) -> Result<()> {
    super::init_cli_tracing();
    let cfg = config::load(config_path)?;
    let timeout = Duration::from_secs(cfg.registry.timeout_secs);
    let rt = tokio::runtime::Runtime::new()?;
    rt.block_on(async {
        let agent = HttpNodeAgent::new(&cfg.registry, &cfg.agent)?;
        remove(&agent, node_id, timeout).await
    })?;
    println!("  {} node {} removed from registry", "ok".green().bold(), node_id.bold());
    Ok(())
}

/// One registry delete and nothing else; there is no fleet to refresh here.
async fn remove(agent: &dyn NodeAgent, node_id: &str, timeout: Duration) -> Result<()> {
    client::with_deadline(Instant::now() + timeout, agent.delete_node(node_id, timeout))
        .await
        .with_context(|| format!("deleting node {node_id}"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::mock::ScriptedAgent;
    use crate::domain::error::ErrorKind;

    #[tokio::test(start_paused = true)]
    async fn removes_node_without_listing_the_registry() {
        let agent = ScriptedAgent::with_nodes(&["n1", "n2"]);
        remove(&agent, "n1", Duration::from_secs(5)).await.unwrap();

        assert_eq!(agent.list_calls(), 0);
        let err = remove(&agent, "n1", Duration::from_secs(5)).await.unwrap_err();
        let cause = err.downcast_ref::<client::AgentError>().unwrap();
        assert_eq!(cause.kind, ErrorKind::NotFound);
    }

    #[tokio::test(start_paused = true)]
    async fn delete_failure_carries_its_kind() {
        let agent = ScriptedAgent::with_nodes(&["n1"]);
        agent.fail_deletes(ErrorKind::Timeout);
        let err = remove(&agent, "n1", Duration::from_secs(5)).await.unwrap_err();
        assert!(err.to_string().contains("deleting node n1"));
        assert_eq!(
            err.downcast_ref::<client::AgentError>().unwrap().kind,
            ErrorKind::Timeout
        );
    }
}
