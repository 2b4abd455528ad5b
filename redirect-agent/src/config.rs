//! Agent configuration
//!
//! Loaded from an optional TOML file, then overridden by command-line flags.

use crate::logging::{levels, LoggingConfig};
use crate::Args;
use anyhow::{bail, Context};
use redirect_core::ServiceConfig;
use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::path::PathBuf;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AgentConfig {
    pub listen_address: String,
    pub listen_port: u16,
    /// JSON file holding redirects, switch state and captured tokens
    pub store_path: PathBuf,
    /// Cap on installed rules, unlimited when unset
    pub rule_limit: Option<usize>,
    pub logging: LoggingConfig,
    pub service: ServiceConfig,
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            listen_address: "127.0.0.1".to_string(),
            listen_port: 9097,
            store_path: PathBuf::from("redirect-state.json"),
            rule_limit: None,
            logging: LoggingConfig::default(),
            service: ServiceConfig::default(),
        }
    }
}

impl AgentConfig {
    /// Parse a TOML document
    pub fn from_toml(content: &str) -> anyhow::Result<Self> {
        toml::from_str(content).context("Failed to parse agent config")
    }

    /// Resolve the configuration for `args`
    pub fn load(args: &Args) -> anyhow::Result<Self> {
        let mut config = match &args.config {
            Some(path) => {
                let content = std::fs::read_to_string(path)
                    .with_context(|| format!("Failed to read config {}", path.display()))?;
                Self::from_toml(&content)?
            }
            None => Self::default(),
        };
        config.apply_args(args);
        config.validate()?;
        Ok(config)
    }

    fn apply_args(&mut self, args: &Args) {
        if let Some(addr) = &args.listen_addr {
            self.listen_address = addr.clone();
        }
        if let Some(port) = args.listen_port {
            self.listen_port = port;
        }
        if let Some(path) = &args.store_path {
            self.store_path = path.clone();
        }
        if let Some(level) = &args.log_level {
            self.logging.level = level.clone();
        }
        if args.json_logs {
            self.logging.json_format = true;
        }
        if args.no_examples {
            self.service.seed_examples = false;
        }
    }

    pub fn validate(&self) -> anyhow::Result<()> {
        if !levels::is_valid_level(&self.logging.level) {
            bail!("Invalid log level: {}", self.logging.level);
        }
        if self.service.channel_capacity == 0 {
            bail!("service.channel_capacity must be positive");
        }
        if self.rule_limit == Some(0) {
            bail!("rule_limit must be positive when set");
        }
        self.socket_addr()?;
        Ok(())
    }

    pub fn socket_addr(&self) -> anyhow::Result<SocketAddr> {
        format!("{}:{}", self.listen_address, self.listen_port)
            .parse()
            .with_context(|| {
                format!(
                    "Invalid listen address {}:{}",
                    self.listen_address, self.listen_port
                )
            })
    }
}
