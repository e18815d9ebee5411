//! HTTP request metrics for any HTTP framework.
//!
//! This crate provides:
//! - A framework-agnostic [`Middleware`] measuring request duration, response
//!   size and inflight requests through a [`Reporter`]
//! - Path normalization keeping handler labels low-cardinality
//! - A pluggable [`Recorder`] backend, with a no-op default and a Prometheus
//!   implementation on top of the `metrics` facade
//! - Axum middleware for automatic request metrics
//!
//! # Example
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use axum::{Router, middleware, routing::get};
//! use http_metrics::{Config, Middleware, PrometheusRecorder};
//! use http_metrics::layer::{MetricsState, track_metrics};
//!
//! let recorder = PrometheusRecorder::new();
//! let handle = recorder.install()?;
//!
//! let mdlw = Middleware::new(Config {
//!     recorder: Some(Arc::new(recorder)),
//!     service: "api".to_string(),
//!     ..Default::default()
//! });
//!
//! let app = Router::new()
//!     .route("/api/v1/brands/{id}", get(handler))
//!     .layer(middleware::from_fn_with_state(MetricsState::new(mdlw), track_metrics))
//!     .route("/metrics", get(move || async move { handle.render() }));
//! ```

pub mod config;
pub mod error;
pub mod layer;
pub mod middleware;
pub mod path;
pub mod prometheus;
pub mod recorder;

pub use config::MetricsConfig;
pub use error::{Error, Result};
pub use middleware::{Config, Middleware, Reporter};
pub use path::normalize_path;
pub use prometheus::PrometheusRecorder;
pub use recorder::{HttpProperties, HttpReqProperties, NoopRecorder, Recorder};
