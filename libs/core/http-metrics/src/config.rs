use std::sync::Arc;

use core_config::{ConfigError, FromEnv, env_flag, env_or_default};

use crate::middleware::Config;
use crate::recorder::Recorder;

/// HTTP metrics settings loaded from the environment.
///
/// | variable | default |
/// |---|---|
/// | `METRICS_SERVICE` | empty |
/// | `METRICS_GROUPED_STATUS` | `false` |
/// | `METRICS_DISABLE_MEASURE_SIZE` | `false` |
/// | `METRICS_DISABLE_MEASURE_INFLIGHT` | `false` |
/// | `METRICS_PREFIX` | empty |
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct MetricsConfig {
    pub service: String,
    pub grouped_status: bool,
    pub disable_measure_size: bool,
    pub disable_measure_inflight: bool,
    /// Metric name prefix for the Prometheus recorder
    pub prefix: String,
}

impl MetricsConfig {
    /// Middleware configuration using `recorder` as backend.
    pub fn into_middleware_config(self, recorder: Option<Arc<dyn Recorder>>) -> Config {
        Config {
            recorder,
            service: self.service,
            grouped_status: self.grouped_status,
            disable_measure_size: self.disable_measure_size,
            disable_measure_inflight: self.disable_measure_inflight,
        }
    }
}

impl FromEnv for MetricsConfig {
    fn from_env() -> Result<Self, ConfigError> {
        Ok(Self {
            service: env_or_default("METRICS_SERVICE", ""),
            grouped_status: env_flag("METRICS_GROUPED_STATUS", false)?,
            disable_measure_size: env_flag("METRICS_DISABLE_MEASURE_SIZE", false)?,
            disable_measure_inflight: env_flag("METRICS_DISABLE_MEASURE_INFLIGHT", false)?,
            prefix: env_or_default("METRICS_PREFIX", ""),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const VARS: [&str; 5] = [
        "METRICS_SERVICE",
        "METRICS_GROUPED_STATUS",
        "METRICS_DISABLE_MEASURE_SIZE",
        "METRICS_DISABLE_MEASURE_INFLIGHT",
        "METRICS_PREFIX",
    ];

    #[test]
    fn test_metrics_config_defaults() {
        temp_env::with_vars_unset(VARS, || {
            let config = MetricsConfig::from_env().unwrap();
            assert_eq!(config, MetricsConfig::default());
        });
    }

    #[test]
    fn test_metrics_config_from_env() {
        temp_env::with_vars(
            [
                ("METRICS_SERVICE", Some("api")),
                ("METRICS_GROUPED_STATUS", Some("true")),
                ("METRICS_DISABLE_MEASURE_SIZE", Some("1")),
                ("METRICS_DISABLE_MEASURE_INFLIGHT", Some("no")),
                ("METRICS_PREFIX", Some("shop")),
            ],
            || {
                let config = MetricsConfig::from_env().unwrap();
                assert_eq!(config.service, "api");
                assert!(config.grouped_status);
                assert!(config.disable_measure_size);
                assert!(!config.disable_measure_inflight);
                assert_eq!(config.prefix, "shop");
            },
        );
    }

    #[test]
    fn test_metrics_config_invalid_flag() {
        temp_env::with_var("METRICS_GROUPED_STATUS", Some("sometimes"), || {
            let err = MetricsConfig::from_env().unwrap_err();
            assert!(err.to_string().contains("METRICS_GROUPED_STATUS"));
        });
    }

    #[test]
    fn test_into_middleware_config() {
        let config = MetricsConfig {
            service: "api".to_string(),
            grouped_status: true,
            ..Default::default()
        }
        .into_middleware_config(None);

        assert_eq!(config.service, "api");
        assert!(config.grouped_status);
        assert!(!config.disable_measure_size);
        assert!(config.recorder.is_none());
    }
}
