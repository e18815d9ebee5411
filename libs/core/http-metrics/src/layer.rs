//! Axum integration: a [`Reporter`] for axum requests and a middleware
//! function measuring every request of a router.
//!
//! # Example
//!
//! ```rust,ignore
//! use axum::{Router, middleware, routing::get};
//! use http_metrics::layer::{MetricsState, track_metrics};
//!
//! let state = MetricsState::new(mdlw);
//!
//! let app = Router::new()
//!     .route("/api/v1/brands/{id}", get(handler))
//!     .layer(middleware::from_fn_with_state(state, track_metrics));
//! ```

use std::sync::atomic::{AtomicI64, AtomicU16, Ordering};

use axum::{
    body::HttpBody,
    extract::{MatchedPath, Request, State},
    http::{Method, Response, header},
    middleware::Next,
    response::Response as AxumResponse,
};
use tracing::Span;

use crate::middleware::{Middleware, Reporter};

/// [`Reporter`] for a single axum request.
///
/// Request facts are captured up front. Status and size are filled in by
/// [`AxumReporter::observe_response`] once the inner service answered.
#[derive(Debug)]
pub struct AxumReporter {
    method: String,
    path: String,
    head: bool,
    span: Span,
    status: AtomicU16,
    bytes_written: AtomicI64,
}

impl AxumReporter {
    pub fn from_request<B>(request: &axum::http::Request<B>) -> Self {
        Self {
            method: request.method().to_string(),
            path: request.uri().path().to_string(),
            head: request.method() == Method::HEAD,
            span: Span::current(),
            status: AtomicU16::new(0),
            bytes_written: AtomicI64::new(0),
        }
    }

    /// Store the status and body size of the response.
    ///
    /// Size comes from `Content-Length`, else from the body's exact size hint.
    /// Streaming bodies of unknown length report 0. A HEAD response writes no
    /// body, so it always reports 0.
    pub fn observe_response<B: HttpBody>(&self, response: &Response<B>) {
        self.status.store(response.status().as_u16(), Ordering::Relaxed);

        if self.head {
            self.bytes_written.store(0, Ordering::Relaxed);
            return;
        }

        let size = response
            .headers()
            .get(header::CONTENT_LENGTH)
            .and_then(|value| value.to_str().ok())
            .and_then(|value| value.parse::<u64>().ok())
            .or_else(|| response.body().size_hint().exact())
            .unwrap_or(0);

        self.bytes_written
            .store(i64::try_from(size).unwrap_or(i64::MAX), Ordering::Relaxed);
    }
}

impl Reporter for AxumReporter {
    fn method(&self) -> String {
        self.method.clone()
    }

    fn context(&self) -> Span {
        self.span.clone()
    }

    fn url_path(&self) -> String {
        self.path.clone()
    }

    fn status_code(&self) -> u16 {
        self.status.load(Ordering::Relaxed)
    }

    fn bytes_written(&self) -> i64 {
        self.bytes_written.load(Ordering::Relaxed)
    }
}

/// State for [`track_metrics`].
#[derive(Clone, Debug)]
pub struct MetricsState {
    middleware: Middleware,
    use_matched_path: bool,
}

impl MetricsState {
    /// Handler identity is the normalized request path.
    pub fn new(middleware: Middleware) -> Self {
        Self {
            middleware,
            use_matched_path: false,
        }
    }

    /// Use the route template (`/users/{id}`) as handler identity when the
    /// request matched a route. Unmatched requests fall back to the
    /// normalized path.
    pub fn with_matched_path(mut self) -> Self {
        self.use_matched_path = true;
        self
    }
}

/// Middleware function measuring each request with the state's [`Middleware`].
///
/// Use with [`axum::middleware::from_fn_with_state`].
pub async fn track_metrics(
    State(state): State<MetricsState>,
    matched_path: Option<MatchedPath>,
    request: Request,
    next: Next,
) -> AxumResponse {
    let reporter = AxumReporter::from_request(&request);

    let handler_id = match matched_path {
        Some(path) if state.use_matched_path => path.as_str().to_string(),
        _ => String::new(),
    };

    state
        .middleware
        .measure_async(&handler_id, &reporter, async {
            let response = next.run(request).await;
            reporter.observe_response(&response);
            response
        })
        .await
}
