//! [`Recorder`] backed by the `metrics` facade and exported for Prometheus.
//!
//! Metrics:
//! - `http_request_duration_seconds` - Histogram with service, handler, method, code labels
//! - `http_response_size_bytes` - Histogram with service, handler, method, code labels
//! - `http_requests_inflight` - Gauge with service, handler labels
//!
//! # Example
//!
//! ```rust,ignore
//! use http_metrics::{Config, Middleware, PrometheusRecorder};
//!
//! let recorder = PrometheusRecorder::with_prefix("api");
//! let handle = recorder.install()?;
//!
//! let mdlw = Middleware::new(Config {
//!     recorder: Some(Arc::new(recorder)),
//!     ..Default::default()
//! });
//!
//! let app = Router::new().route("/metrics", get(move || async move { handle.render() }));
//! ```

use std::time::Duration;

use metrics::{Unit, describe_gauge, describe_histogram, gauge, histogram};
use metrics_exporter_prometheus::{Matcher, PrometheusBuilder, PrometheusHandle};
use once_cell::sync::OnceCell;
use tracing::{Span, info, warn};

use crate::error::{Error, Result};
use crate::recorder::{HttpProperties, HttpReqProperties, Recorder};

pub const HTTP_REQUEST_DURATION_SECONDS: &str = "http_request_duration_seconds";
pub const HTTP_RESPONSE_SIZE_BYTES: &str = "http_response_size_bytes";
pub const HTTP_REQUESTS_INFLIGHT: &str = "http_requests_inflight";

/// Request duration buckets, in seconds.
pub const DEFAULT_DURATION_BUCKETS: &[f64] = &[
    0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0,
];

/// Response size buckets, in bytes (100B up to 1GB).
pub const DEFAULT_SIZE_BUCKETS: &[f64] = &[
    100.0,
    1_000.0,
    10_000.0,
    100_000.0,
    1_000_000.0,
    10_000_000.0,
    100_000_000.0,
    1_000_000_000.0,
];

/// The recorder configuration that installed the exporter, and its handle.
static INSTALLED: OnceCell<(PrometheusRecorder, PrometheusHandle)> = OnceCell::new();

/// Records HTTP observations through the global `metrics` recorder.
#[derive(Clone, Debug, PartialEq)]
pub struct PrometheusRecorder {
    duration_metric: String,
    size_metric: String,
    inflight_metric: String,
    duration_buckets: Vec<f64>,
    size_buckets: Vec<f64>,
}

impl Default for PrometheusRecorder {
    fn default() -> Self {
        Self::with_prefix("")
    }
}

impl PrometheusRecorder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Prefix every metric name with `<prefix>_`. An empty prefix is ignored.
    pub fn with_prefix(prefix: &str) -> Self {
        let name = |metric: &str| {
            if prefix.is_empty() {
                metric.to_string()
            } else {
                format!("{prefix}_{metric}")
            }
        };

        Self {
            duration_metric: name(HTTP_REQUEST_DURATION_SECONDS),
            size_metric: name(HTTP_RESPONSE_SIZE_BYTES),
            inflight_metric: name(HTTP_REQUESTS_INFLIGHT),
            duration_buckets: DEFAULT_DURATION_BUCKETS.to_vec(),
            size_buckets: DEFAULT_SIZE_BUCKETS.to_vec(),
        }
    }

    pub fn with_duration_buckets(mut self, buckets: &[f64]) -> Self {
        self.duration_buckets = buckets.to_vec();
        self
    }

    pub fn with_size_buckets(mut self, buckets: &[f64]) -> Self {
        self.size_buckets = buckets.to_vec();
        self
    }

    pub fn duration_metric(&self) -> &str {
        &self.duration_metric
    }

    pub fn size_metric(&self) -> &str {
        &self.size_metric
    }

    pub fn inflight_metric(&self) -> &str {
        &self.inflight_metric
    }

    /// Builder with this recorder's histogram buckets.
    pub fn builder(&self) -> Result<PrometheusBuilder> {
        let builder = PrometheusBuilder::new()
            .set_buckets_for_metric(
                Matcher::Full(self.duration_metric.clone()),
                &self.duration_buckets,
            )?
            .set_buckets_for_metric(Matcher::Full(self.size_metric.clone()), &self.size_buckets)?;
        Ok(builder)
    }

    /// Install the Prometheus exporter as the global `metrics` recorder.
    ///
    /// Only the first call installs. Later calls with the same names and
    /// buckets return the same handle; any other configuration fails with
    /// [`Error::AlreadyInstalled`], since its buckets could not be applied.
    pub fn install(&self) -> Result<&'static PrometheusHandle> {
        let (installed, handle) =
            INSTALLED.get_or_try_init(|| -> Result<(PrometheusRecorder, PrometheusHandle)> {
                let handle = self.builder()?.install_recorder()?;

                info!(
                    duration_metric = %self.duration_metric,
                    size_metric = %self.size_metric,
                    inflight_metric = %self.inflight_metric,
                    "Prometheus HTTP metrics recorder installed"
                );

                self.describe();
                Ok((self.clone(), handle))
            })?;

        if installed != self {
            warn!(
                installed = %installed.duration_metric,
                requested = %self.duration_metric,
                "Prometheus exporter already installed with another configuration"
            );
            return Err(Error::AlreadyInstalled {
                installed: installed.duration_metric.clone(),
            });
        }

        Ok(handle)
    }

    /// Register metric descriptions for documentation
    pub fn describe(&self) {
        describe_histogram!(
            self.duration_metric.clone(),
            Unit::Seconds,
            "The latency of the HTTP requests."
        );
        describe_histogram!(
            self.size_metric.clone(),
            Unit::Bytes,
            "The size of the HTTP responses."
        );
        describe_gauge!(
            self.inflight_metric.clone(),
            "The number of inflight requests being handled at the same time."
        );
    }
}

impl Recorder for PrometheusRecorder {
    fn add_inflight_requests(&self, ctx: &Span, props: &HttpProperties, quantity: i64) {
        ctx.in_scope(|| {
            gauge!(
                self.inflight_metric.clone(),
                "service" => props.service.clone(),
                "handler" => props.id.clone()
            )
            .increment(quantity as f64);
        });
    }

    fn observe_http_request_duration(
        &self,
        ctx: &Span,
        props: &HttpReqProperties,
        duration: Duration,
    ) {
        ctx.in_scope(|| {
            histogram!(
                self.duration_metric.clone(),
                "service" => props.service.clone(),
                "handler" => props.id.clone(),
                "method" => props.method.clone(),
                "code" => props.code.clone()
            )
            .record(duration.as_secs_f64());
        });
    }

    fn observe_http_response_size(&self, ctx: &Span, props: &HttpReqProperties, size: i64) {
        ctx.in_scope(|| {
            histogram!(
                self.size_metric.clone(),
                "service" => props.service.clone(),
                "handler" => props.id.clone(),
                "method" => props.method.clone(),
                "code" => props.code.clone()
            )
            .record(size as f64);
        });
    }
}

/// Get the metrics handle (must call [`PrometheusRecorder::install`] first)
pub fn prometheus_handle() -> Option<&'static PrometheusHandle> {
    INSTALLED.get().map(|(_, handle)| handle)
}

/// Render metrics in Prometheus format
pub fn render_metrics() -> String {
    match prometheus_handle() {
        Some(handle) => handle.render(),
        None => "# Metrics not initialized\n".to_string(),
    }
}
