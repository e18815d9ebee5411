//! Recorder contract used by the middleware to emit HTTP observations.

use std::sync::Arc;
use std::time::Duration;

use once_cell::sync::Lazy;
use tracing::Span;

/// Labels identifying an endpoint, used for the inflight gauge.
#[derive(Clone, Debug, Default, PartialEq, Eq, Hash)]
pub struct HttpProperties {
    /// Service the endpoint belongs to (may be empty)
    pub service: String,
    /// Handler identity
    pub id: String,
}

/// Labels identifying the outcome of a request, used for duration and size.
#[derive(Clone, Debug, Default, PartialEq, Eq, Hash)]
pub struct HttpReqProperties {
    pub service: String,
    pub id: String,
    pub method: String,
    /// Exact status code (`"418"`) or its class (`"4xx"`)
    pub code: String,
}

/// Backend that records the observations produced by the middleware.
///
/// Implementations are shared between concurrent requests and must handle
/// their own failures: nothing is reported back to the caller.
#[cfg_attr(test, mockall::automock)]
pub trait Recorder: Send + Sync {
    /// Add `quantity` (`1` or `-1`) to the inflight requests of an endpoint.
    fn add_inflight_requests(&self, ctx: &Span, props: &HttpProperties, quantity: i64);

    /// Observe how long a request took.
    fn observe_http_request_duration(
        &self,
        ctx: &Span,
        props: &HttpReqProperties,
        duration: Duration,
    );

    /// Observe the number of bytes written in a response.
    fn observe_http_response_size(&self, ctx: &Span, props: &HttpReqProperties, size: i64);
}

/// Recorder that discards every observation.
#[derive(Clone, Copy, Debug, Default)]
pub struct NoopRecorder;

impl Recorder for NoopRecorder {
    fn add_inflight_requests(&self, _: &Span, _: &HttpProperties, _: i64) {}

    fn observe_http_request_duration(&self, _: &Span, _: &HttpReqProperties, _: Duration) {}

    fn observe_http_response_size(&self, _: &Span, _: &HttpReqProperties, _: i64) {}
}

static NOOP: Lazy<Arc<dyn Recorder>> = Lazy::new(|| Arc::new(NoopRecorder));

/// Shared handle to the process-wide no-op recorder.
///
/// Every call returns the same instance.
pub fn noop() -> Arc<dyn Recorder> {
    Arc::clone(&NOOP)
}
