use crate::{env_or_default, env_parse, ConfigError, FromEnv};
use std::net::Ipv4Addr;

/// Listener configuration for an HTTP server
#[derive(Clone, Debug)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    /// Route serving the Prometheus exposition
    pub metrics_path: String,
}

impl ServerConfig {
    /// Get the server address as "host:port"
    pub fn address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

impl FromEnv for ServerConfig {
    /// Reads from environment variables:
    /// - HOST: defaults to 0.0.0.0
    /// - PORT: defaults to 8080
    /// - METRICS_PATH: defaults to /metrics
    fn from_env() -> Result<Self, ConfigError> {
        Ok(Self {
            host: env_or_default("HOST", &Ipv4Addr::UNSPECIFIED.to_string()),
            port: env_parse("PORT", 8080)?,
            metrics_path: env_or_default("METRICS_PATH", "/metrics"),
        })
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: Ipv4Addr::UNSPECIFIED.to_string(),
            port: 8080,
            metrics_path: "/metrics".to_string(),
        }
    }
}
