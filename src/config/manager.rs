//! Configuration Manager

use super::Config;
use crate::relay::engine::MIN_BUFFER_SIZE;
use crate::Result;
use anyhow::{bail, Context};
use std::path::Path;

const LOG_LEVELS: [&str; 5] = ["trace", "debug", "info", "warn", "error"];

/// Manages configuration loading and validation
pub struct ConfigManager;

impl ConfigManager {
    /// Load configuration from file
    pub fn load_from_file(path: &Path) -> Result<Config> {
        if path.exists() {
            tracing::info!("Loading configuration from: {}", path.display());
            let content = std::fs::read_to_string(path)
                .with_context(|| format!("Failed to read config file: {}", path.display()))?;

            let config: Config = toml::from_str(&content)
                .with_context(|| format!("Failed to parse config file: {}", path.display()))?;

            config
                .validate()
                .with_context(|| "Configuration validation failed")?;

            Ok(config)
        } else {
            tracing::warn!(
                "Configuration file not found at {}, using defaults",
                path.display()
            );
            let config = Config::default();
            config.validate()?;
            Ok(config)
        }
    }

    /// Load configuration from environment variables
    pub fn load_from_env() -> Result<Config> {
        Self::load_from_lookup(|key| std::env::var(key).ok())
    }

    /// Build a configuration from defaults overridden by whatever `lookup`
    /// returns for the `PORTFWD_*` keys
    pub fn load_from_lookup<F>(lookup: F) -> Result<Config>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = Config::default();

        if let Some(port) = lookup("PORTFWD_LPORT") {
            config.forward.local_port = port
                .parse::<u16>()
                .with_context(|| format!("Invalid PORTFWD_LPORT: {}", port))?;
        }

        if let Some(host) = lookup("PORTFWD_RHOST") {
            config.forward.remote_host = host;
        }

        if let Some(port) = lookup("PORTFWD_RPORT") {
            config.forward.remote_port = port
                .parse::<u16>()
                .with_context(|| format!("Invalid PORTFWD_RPORT: {}", port))?;
        }

        if let Some(buffer_size) = lookup("PORTFWD_BUFFER_SIZE") {
            config.forward.buffer_size = buffer_size
                .parse::<usize>()
                .with_context(|| format!("Invalid PORTFWD_BUFFER_SIZE: {}", buffer_size))?;
        }

        if let Some(level) = lookup("PORTFWD_LOG_LEVEL") {
            config.logging.level = level;
        }

        config.validate()?;
        Ok(config)
    }
}

impl Config {
    /// Validate the configuration
    pub fn validate(&self) -> Result<()> {
        self.validate_forward_config()
            .with_context(|| "Forward configuration validation failed")?;

        if !LOG_LEVELS.contains(&self.logging.level.as_str()) {
            bail!(
                "logging.level must be one of {}, got '{}'",
                LOG_LEVELS.join(", "),
                self.logging.level
            );
        }

        Ok(())
    }

    fn validate_forward_config(&self) -> Result<()> {
        if self.forward.remote_host.trim().is_empty() {
            bail!("remote_host must not be empty");
        }

        if self.forward.remote_port == 0 {
            bail!("remote_port must be greater than 0");
        }

        if self.forward.buffer_size < MIN_BUFFER_SIZE {
            bail!("buffer_size must be at least {} bytes", MIN_BUFFER_SIZE);
        }

        if self.forward.buffer_size > 1048576 {
            bail!("buffer_size cannot exceed 1MB");
        }

        Ok(())
    }

    /// Apply command-line overrides, which take precedence over everything else
    pub fn merge_with_cli_args(
        &mut self,
        local_port: Option<u16>,
        remote_host: Option<&str>,
        remote_port: Option<u16>,
        log_level: Option<&str>,
    ) {
        if let Some(port) = local_port {
            self.forward.local_port = port;
        }

        if let Some(host) = remote_host {
            self.forward.remote_host = host.to_string();
        }

        if let Some(port) = remote_port {
            self.forward.remote_port = port;
        }

        if let Some(level) = log_level {
            self.logging.level = level.to_string();
        }
    }
}
