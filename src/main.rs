mod api;
mod client;
mod commands;
mod config;
mod domain;
mod server;

use clap::{Parser, Subcommand};

#[derive(Parser)]
#[command(
    name = "fleetview",
    version,
    about = "Live fleet status: diagnostics, liveness and container stats from node agents"
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the fleetview daemon (periodic refresh + REST/SSE API)
    Serve {
        /// HTTP listen address (overrides config)
        #[arg(long)]
        http_addr: Option<String>,

        /// Log level (overrides config)
        #[arg(long)]
        log_level: Option<String>,

        /// Path to config file (default: ~/.config/fleetview/config.yaml)
        #[arg(long)]
        config: Option<String>,
    },

    /// Refresh the fleet once and print it
    Status {
        /// Output format (table or json)
        #[arg(long, default_value = "table")]
        format: String,

        /// Path to config file
        #[arg(long)]
        config: Option<String>,
    },

    /// Remove a node from the registry
    Delete {
        /// Registry id of the node
        node_id: String,

        /// Path to config file
        #[arg(long)]
        config: Option<String>,
    },
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Commands::Serve {
            http_addr,
            log_level,
            config,
        } => commands::serve::run(http_addr, log_level, config),
        Commands::Status { format, config } => commands::status::run(&format, config.as_deref()),
        Commands::Delete { node_id, config } => {
            commands::delete::run(&node_id, config.as_deref())
        }
    }
}
