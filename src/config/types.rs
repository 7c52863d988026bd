//! Configuration Types

use serde::{Deserialize, Serialize};
use std::net::{IpAddr, SocketAddr};

/// Main configuration structure
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(default)]
pub struct Config {
    pub forward: ForwardConfig,
    pub logging: LoggingConfig,
}

/// Listen and target settings for the forwarder
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ForwardConfig {
    pub bind_ip: IpAddr,
    pub local_port: u16,
    pub remote_host: String,
    pub remote_port: u16,
    /// Size of the in-flight copy buffer held by each relay leg
    pub buffer_size: usize,
}

/// Logging configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct LoggingConfig {
    pub level: String,
}

impl Config {
    /// Address the listener binds to, `<bind_ip>:<local_port>`
    pub fn listen_addr(&self) -> String {
        SocketAddr::new(self.forward.bind_ip, self.forward.local_port).to_string()
    }

    /// Address every session dials, `<remote_host>:<remote_port>`
    pub fn target_addr(&self) -> String {
        format!("{}:{}", self.forward.remote_host, self.forward.remote_port)
    }
}

impl Default for ForwardConfig {
    fn default() -> Self {
        Self {
            bind_ip: IpAddr::from([0, 0, 0, 0]),
            local_port: 8001,
            remote_host: "127.0.0.1".to_string(),
            remote_port: 80,
            buffer_size: 8192,
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_addresses() {
        let config = Config::default();
        assert_eq!(config.listen_addr(), "0.0.0.0:8001");
        assert_eq!(config.target_addr(), "127.0.0.1:80");
    }

    #[test]
    fn test_partial_toml_keeps_defaults() {
        let config: Config = toml::from_str(
            r#"
            [forward]
            remote_host = "backend.internal"
            remote_port = 5432
            "#,
        )
        .unwrap();

        assert_eq!(config.forward.local_port, 8001);
        assert_eq!(config.forward.buffer_size, 8192);
        assert_eq!(config.logging.level, "info");
        assert_eq!(config.target_addr(), "backend.internal:5432");
    }

    #[test]
    fn test_ipv6_bind_ip() {
        let mut config = Config::default();
        config.forward.bind_ip = "::1".parse().unwrap();
        config.forward.local_port = 9000;
        assert_eq!(config.listen_addr(), "[::1]:9000");
    }
}
