//! `fleetview status`: run one refresh against the registry and print it.

use std::sync::Arc;

use anyhow::{bail, Result};
use colored::Colorize;

use crate::client::HttpNodeAgent;
use crate::config;
use crate::domain::fleet_service::FleetService;
use crate::domain::types::{FleetSnapshot, FleetState, NodeView};

pub fn run(format: &str, config_path: Option<&str>) -> Result<()> {
    if !matches!(format, "table" | "json") {
        bail!("unknown output format {format:?} (expected table or json)");
    }
    super::init_cli_tracing();
    let cfg = config::load(config_path)?;

    let rt = tokio::runtime::Runtime::new()?;
    let snapshot = rt.block_on(async {
        let agent = HttpNodeAgent::new(&cfg.registry, &cfg.agent)?;
        let fleet = FleetService::new(Arc::new(agent), cfg.aggregation_settings());
        fleet.refresh_once().await;
        anyhow::Ok(fleet.read())
    })?;

    match format {
        "json" => println!("{}", serde_json::to_string_pretty(&*snapshot)?),
        _ => print_table(&snapshot),
    }
    Ok(())
}

fn print_table(snapshot: &FleetSnapshot) {
    println!("{}", "Fleet Status".bold());
    println!();

    if let Some(failure) = &snapshot.failure {
        println!(
            "  {} registry {}: {} (showing last known data)",
            "!!".red().bold(),
            failure.kind.label(),
            failure.message
        );
        println!();
    }

    if let Some(notice) = empty_notice(snapshot) {
        println!("{} {}", "::".blue().bold(), notice);
        return;
    }

    for view in &snapshot.nodes {
        let icon = if view.live {
            "ok".green().bold()
        } else {
            "!!".red().bold()
        };
        println!(
            "  {} {} ({}) {}",
            icon,
            view.node.name.bold(),
            view.node.address.dimmed(),
            liveness(view)
        );
        println!("     hardware:   {}", hardware(view));
        println!("     containers: {}", containers(view));
    }

    println!();
    let live = snapshot.nodes.iter().filter(|v| v.live).count();
    println!("  {}/{} nodes live", live, snapshot.nodes.len());
}

/// What to print instead of the node list when there are no views. Only a
/// successful empty listing means the registry has no nodes.
fn empty_notice(snapshot: &FleetSnapshot) -> Option<&'static str> {
    if !snapshot.nodes.is_empty() {
        return None;
    }
    Some(match snapshot.state {
        FleetState::Empty => "No nodes registered",
        FleetState::Loading | FleetState::Ready => "No node data available",
    })
}

fn liveness(view: &NodeView) -> String {
    match view.ping_error {
        Some(kind) => format!("ping {}", kind.label()),
        None if view.live => "live".to_string(),
        None => "unhealthy".to_string(),
    }
}

fn hardware(view: &NodeView) -> String {
    match &view.diagnostics {
        Ok(d) => {
            let cpu = d.cpu_model.as_deref().unwrap_or("?");
            let threads = d.hardware_threads.as_deref().unwrap_or("?");
            let mem = d.mem_total.as_deref().unwrap_or("?");
            format!("{cpu}, {threads} threads, {mem} GB")
        }
        Err(kind) => format!("unavailable ({})", kind.label()),
    }
}

fn containers(view: &NodeView) -> String {
    match &view.containers {
        Ok(list) if list.is_empty() => "none".to_string(),
        Ok(list) => list
            .iter()
            .map(|c| match &c.cpu_percent {
                Some(cpu) => format!("{} [{} cpu]", c.names, cpu),
                None => c.names.clone(),
            })
            .collect::<Vec<_>>()
            .join(", "),
        Err(kind) => format!("unavailable ({})", kind.label()),
    }
}
