use anyhow::Result;

use crate::config;

pub fn run(
    http_addr: Option<String>,
    log_level: Option<String>,
    config_path: Option<String>,
) -> Result<()> {
    let mut cfg = config::load(config_path.as_deref())?;

    // CLI flags override config values
    if let Some(addr) = http_addr {
        cfg.daemon.http_addr = addr;
    }
    if let Some(level) = log_level {
        cfg.daemon.log_level = level;
    }

    // Build tokio runtime explicitly (no #[tokio::main] on fn main)
    let runtime = tokio::runtime::Runtime::new()?;
    runtime.block_on(crate::server::run(cfg))
}
