//! Layered configuration: built-in defaults ← YAML file ← `FLEETVIEW_*` env.

use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{bail, Context, Result};
use figment::providers::{Env, Format, Serialized, Yaml};
use figment::Figment;
use serde::{Deserialize, Serialize};

use crate::client::http::DEFAULT_AGENT_PORT;
use crate::domain::fleet_aggregator::AggregationSettings;

pub const ENV_PREFIX: &str = "FLEETVIEW_";

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub registry: RegistryConfig,
    pub agent: AgentConfig,
    pub refresh: RefreshConfig,
    pub daemon: DaemonConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RegistryConfig {
    pub url: String,
    /// Capability token forwarded to the registry and every agent.
    pub api_key: Option<String>,
    pub timeout_secs: u64,
}

impl Default for RegistryConfig {
    fn default() -> Self {
        Self {
            url: "http://127.0.0.1:9200".to_string(),
            api_key: None,
            timeout_secs: 5,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AgentConfig {
    pub default_port: u16,
    pub api_key_header: String,
    /// Agents ship self-signed certificates.
    pub accept_invalid_certs: bool,
    pub call_timeout_ms: u64,
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            default_port: DEFAULT_AGENT_PORT,
            api_key_header: "tyb-apikey".to_string(),
            accept_invalid_certs: true,
            call_timeout_ms: 5_000,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RefreshConfig {
    /// Periodic refresh cadence; 0 disables the timer.
    pub interval_secs: u64,
    /// Overall budget for one fleet refresh.
    pub budget_secs: u64,
    /// Nodes aggregated at the same time.
    pub concurrency: usize,
}

impl Default for RefreshConfig {
    fn default() -> Self {
        Self {
            interval_secs: 15,
            budget_secs: 20,
            concurrency: 8,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DaemonConfig {
    pub http_addr: String,
    pub log_level: String,
    /// `json` or `pretty`
    pub log_format: String,
}

impl Default for DaemonConfig {
    fn default() -> Self {
        Self {
            http_addr: "127.0.0.1:9300".to_string(),
            log_level: "info".to_string(),
            log_format: "json".to_string(),
        }
    }
}

impl Config {
    pub fn path() -> Result<PathBuf> {
        let config_dir = dirs::config_dir().context("could not determine config directory")?;
        Ok(config_dir.join("fleetview").join("config.yaml"))
    }

    /// Refresh interval, `None` when periodic refresh is disabled.
    pub fn refresh_interval(&self) -> Option<Duration> {
        match self.refresh.interval_secs {
            0 => None,
            secs => Some(Duration::from_secs(secs)),
        }
    }

    pub fn aggregation_settings(&self) -> AggregationSettings {
        AggregationSettings {
            concurrency: self.refresh.concurrency,
            call_timeout: Duration::from_millis(self.agent.call_timeout_ms),
            registry_timeout: Duration::from_secs(self.registry.timeout_secs),
            refresh_budget: Duration::from_secs(self.refresh.budget_secs),
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.refresh.concurrency == 0 {
            bail!("refresh.concurrency must be at least 1");
        }
        if self.agent.call_timeout_ms == 0 {
            bail!("agent.call_timeout_ms must be greater than 0");
        }
        if self.registry.timeout_secs == 0 {
            bail!("registry.timeout_secs must be greater than 0");
        }
        if self.refresh.budget_secs == 0 {
            bail!("refresh.budget_secs must be greater than 0");
        }
        if self.registry.url.trim().is_empty() {
            bail!("registry.url must be set");
        }
        Ok(())
    }
}

/// Load from an explicit file, or the default location when `None`.
/// A missing default file is not an error; a missing explicit file is.
pub fn load(path: Option<&str>) -> Result<Config> {
    let path = match path {
        Some(p) => {
            let p = PathBuf::from(p);
            if !p.exists() {
                bail!("config file {} does not exist", p.display());
            }
            p
        }
        None => Config::path()?,
    };
    load_from(&path)
}

pub fn load_from(path: &Path) -> Result<Config> {
    let config: Config = Figment::from(Serialized::defaults(Config::default()))
        .merge(Yaml::file(path))
        .merge(Env::prefixed(ENV_PREFIX).split("__"))
        .extract()
        .with_context(|| format!("parsing configuration from {}", path.display()))?;
    config.validate()?;
    Ok(config)
}
