use core_config::ConfigError;
use metrics_exporter_prometheus::BuildError;
use thiserror::Error;

pub type Result<T, E = Error> = std::result::Result<T, E>;

/// Errors raised while setting up HTTP metrics.
///
/// Measuring a request never fails; these only come from configuration and
/// exporter installation.
#[derive(Error, Debug)]
pub enum Error {
    /// Metrics configuration could not be loaded
    #[error("Invalid metrics configuration: {0}")]
    Config(#[from] ConfigError),

    /// Prometheus exporter could not be built or installed
    #[error("Failed to install Prometheus exporter: {0}")]
    ExporterInstall(#[from] BuildError),

    /// The exporter is already installed with other metric names or buckets
    #[error("Prometheus exporter already installed for '{installed}' with a different configuration")]
    AlreadyInstalled { installed: String },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_error_message() {
        let err: Error = ConfigError::ParseError {
            key: "METRICS_GROUPED_STATUS".to_string(),
            details: "expected a boolean".to_string(),
        }
        .into();

        let message = err.to_string();
        assert!(message.starts_with("Invalid metrics configuration"));
        assert!(message.contains("METRICS_GROUPED_STATUS"));
    }
}
