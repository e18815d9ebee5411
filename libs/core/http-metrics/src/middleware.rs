//! Framework-agnostic HTTP measurement.
//!
//! The [`Middleware`] does not know how a server parses requests. Every
//! framework adapter hands it a [`Reporter`] that exposes the few facts that
//! are measured, and a `next` continuation that runs the wrapped handler.
//!
//! Measured per request:
//! - inflight requests (`+1` before the handler, `-1` after it)
//! - request duration
//! - response size
//!
//! # Example
//!
//! ```rust,ignore
//! use http_metrics::{Config, Middleware};
//!
//! let mdlw = Middleware::new(Config {
//!     service: "api".to_string(),
//!     grouped_status: true,
//!     ..Default::default()
//! });
//!
//! let response = mdlw.measure("", &reporter, || handler(request));
//! ```

use std::fmt;
use std::future::Future;
use std::sync::Arc;
use std::time::Instant;

use tracing::Span;

use crate::path::normalize_path;
use crate::recorder::{self, HttpProperties, HttpReqProperties, Recorder};

/// Per-request facts needed to measure a request.
///
/// `status_code` and `bytes_written` are read after the handler finished.
#[cfg_attr(test, mockall::automock)]
pub trait Reporter: Send + Sync {
    fn method(&self) -> String;

    /// Propagation context handed to every recorder call.
    fn context(&self) -> Span;

    /// Raw request path, only read when no handler id is given.
    fn url_path(&self) -> String;

    fn status_code(&self) -> u16;

    fn bytes_written(&self) -> i64;
}

/// Configuration of the [`Middleware`].
#[derive(Clone, Default)]
pub struct Config {
    /// Backend receiving the observations. Defaults to the no-op recorder.
    pub recorder: Option<Arc<dyn Recorder>>,
    /// Optional service label, useful when one process runs several servers
    /// (API, metrics, health checks).
    pub service: String,
    /// Group status codes by class (`2xx`, `4xx`...) instead of exact codes.
    pub grouped_status: bool,
    /// Skip the response size observation.
    pub disable_measure_size: bool,
    /// Skip the inflight requests observation.
    pub disable_measure_inflight: bool,
}

impl fmt::Debug for Config {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Config")
            .field("recorder", &self.recorder.as_ref().map(|_| "<recorder>"))
            .field("service", &self.service)
            .field("grouped_status", &self.grouped_status)
            .field("disable_measure_size", &self.disable_measure_size)
            .field("disable_measure_inflight", &self.disable_measure_inflight)
            .finish()
    }
}

/// Measures HTTP handlers through a [`Reporter`].
#[derive(Clone)]
pub struct Middleware {
    recorder: Arc<dyn Recorder>,
    service: String,
    grouped_status: bool,
    disable_measure_size: bool,
    disable_measure_inflight: bool,
}

impl Middleware {
    pub fn new(config: Config) -> Self {
        Self {
            recorder: config.recorder.unwrap_or_else(recorder::noop),
            service: config.service,
            grouped_status: config.grouped_status,
            disable_measure_size: config.disable_measure_size,
            disable_measure_inflight: config.disable_measure_inflight,
        }
    }

    /// Measure a synchronous handler.
    ///
    /// `next` runs exactly once and its output is returned untouched. The
    /// finishing observations are recorded on every exit path, including a
    /// panic unwinding out of `next`.
    pub fn measure<T>(
        &self,
        handler_id: &str,
        reporter: &dyn Reporter,
        next: impl FnOnce() -> T,
    ) -> T {
        let _measurement = self.start(handler_id, reporter);
        next()
    }

    /// Measure an asynchronous handler.
    ///
    /// Same protocol as [`Middleware::measure`]. If the future is dropped
    /// before completion (client gone, timeout) the request still finishes
    /// its observations with whatever the reporter knows at that point.
    pub async fn measure_async<F>(
        &self,
        handler_id: &str,
        reporter: &dyn Reporter,
        next: F,
    ) -> F::Output
    where
        F: Future,
    {
        let _measurement = self.start(handler_id, reporter);
        next.await
    }

    fn start<'a>(&'a self, handler_id: &str, reporter: &'a dyn Reporter) -> Measurement<'a> {
        let ctx = reporter.context();

        let id = if handler_id.is_empty() {
            normalize_path(&reporter.url_path())
        } else {
            handler_id.to_string()
        };

        let inflight = (!self.disable_measure_inflight).then(|| {
            InflightGuard::new(
                self.recorder.as_ref(),
                ctx.clone(),
                HttpProperties {
                    service: self.service.clone(),
                    id: id.clone(),
                },
            )
        });

        tracing::trace!(target: "http_metrics", handler = %id, "request started");

        Measurement {
            middleware: self,
            reporter,
            ctx,
            id,
            _inflight: inflight,
            start: Instant::now(),
        }
    }

    fn status_label(&self, code: u16) -> String {
        status_label(code, self.grouped_status)
    }
}

impl fmt::Debug for Middleware {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Middleware")
            .field("service", &self.service)
            .field("grouped_status", &self.grouped_status)
            .field("disable_measure_size", &self.disable_measure_size)
            .field("disable_measure_inflight", &self.disable_measure_inflight)
            .finish_non_exhaustive()
    }
}

/// Status code label: `"418"`, or `"4xx"` when grouped.
pub fn status_label(code: u16, grouped: bool) -> String {
    if grouped {
        format!("{}xx", code / 100)
    } else {
        code.to_string()
    }
}

/// Decrements the inflight gauge when dropped.
struct InflightGuard<'a> {
    recorder: &'a dyn Recorder,
    ctx: Span,
    props: HttpProperties,
}

impl<'a> InflightGuard<'a> {
    fn new(recorder: &'a dyn Recorder, ctx: Span, props: HttpProperties) -> Self {
        recorder.add_inflight_requests(&ctx, &props, 1);
        Self { recorder, ctx, props }
    }
}

impl Drop for InflightGuard<'_> {
    fn drop(&mut self) {
        self.recorder.add_inflight_requests(&self.ctx, &self.props, -1);
    }
}

/// A request being measured. Records duration and size when dropped.
///
/// The inflight guard is a field, so it is released after `drop` ran.
struct Measurement<'a> {
    middleware: &'a Middleware,
    reporter: &'a dyn Reporter,
    ctx: Span,
    id: String,
    _inflight: Option<InflightGuard<'a>>,
    start: Instant,
}

impl Drop for Measurement<'_> {
    fn drop(&mut self) {
        let duration = self.start.elapsed();
        let mdlw = self.middleware;

        let code = self.reporter.status_code();
        let props = HttpReqProperties {
            service: mdlw.service.clone(),
            id: std::mem::take(&mut self.id),
            method: self.reporter.method(),
            code: mdlw.status_label(code),
        };

        mdlw.recorder.observe_http_request_duration(&self.ctx, &props, duration);

        if !mdlw.disable_measure_size {
            mdlw.recorder
                .observe_http_response_size(&self.ctx, &props, self.reporter.bytes_written());
        }

        tracing::trace!(
            target: "http_metrics",
            handler = %props.id,
            method = %props.method,
            code = %props.code,
            duration_ms = duration.as_millis() as u64,
            "request finished"
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::recorder::MockRecorder;
    use mockall::Sequence;
    use mockall::predicate::{always, eq};
    use std::panic::{self, AssertUnwindSafe};
    use std::sync::atomic::{AtomicBool, Ordering};

    fn reporter(status: u16, method: &str, bytes: Option<i64>) -> MockReporter {
        let mut mrep = MockReporter::new();
        mrep.expect_context().times(1).return_const(Span::none());
        mrep.expect_status_code().times(1).return_const(status);
        mrep.expect_method().times(1).return_const(method.to_string());
        if let Some(bytes) = bytes {
            mrep.expect_bytes_written().times(1).return_const(bytes);
        }
        mrep
    }

    fn req_props(service: &str, id: &str, code: &str) -> HttpReqProperties {
        HttpReqProperties {
            service: service.to_string(),
            id: id.to_string(),
            method: "PATCH".to_string(),
            code: code.to_string(),
        }
    }

    fn middleware(mrec: MockRecorder, config: Config) -> Middleware {
        Middleware::new(Config {
            recorder: Some(Arc::new(mrec)),
            ..config
        })
    }

    #[test]
    fn test_measure_with_service() {
        let mrep = reporter(418, "PATCH", Some(42));

        let exp_props = HttpProperties {
            service: "svc1".to_string(),
            id: "test01".to_string(),
        };
        let exp_req_props = req_props("svc1", "test01", "418");

        let mut mrec = MockRecorder::new();
        mrec.expect_add_inflight_requests()
            .with(always(), eq(exp_props.clone()), eq(1))
            .times(1)
            .return_const(());
        mrec.expect_add_inflight_requests()
            .with(always(), eq(exp_props), eq(-1))
            .times(1)
            .return_const(());
        mrec.expect_observe_http_request_duration()
            .with(always(), eq(exp_req_props.clone()), always())
            .times(1)
            .return_const(());
        mrec.expect_observe_http_response_size()
            .with(always(), eq(exp_req_props), eq(42))
            .times(1)
            .return_const(());

        let mdlw = middleware(
            mrec,
            Config {
                service: "svc1".to_string(),
                ..Default::default()
            },
        );

        let mut called_next = false;
        mdlw.measure("test01", &mrep, || called_next = true);

        assert!(called_next);
    }

    #[test]
    fn test_measure_without_handler_id_uses_path() {
        let mut mrep = reporter(418, "PATCH", Some(42));
        mrep.expect_url_path().times(1).return_const("/test/01".to_string());

        let exp_req_props = req_props("", "/test/01", "418");

        let mut mrec = MockRecorder::new();
        mrec.expect_add_inflight_requests().times(2).return_const(());
        mrec.expect_observe_http_request_duration()
            .with(always(), eq(exp_req_props.clone()), always())
            .times(1)
            .return_const(());
        mrec.expect_observe_http_response_size()
            .with(always(), eq(exp_req_props), always())
            .times(1)
            .return_const(());

        let mdlw = middleware(mrec, Config::default());

        let mut called_next = false;
        mdlw.measure("", &mrep, || called_next = true);

        assert!(called_next);
    }

    #[test]
    fn test_measure_normalizes_long_paths() {
        let mut mrep = reporter(200, "PATCH", Some(0));
        mrep.expect_url_path()
            .times(1)
            .return_const("/api/v1/coupons/2220".to_string());

        let exp_props = HttpProperties {
            service: String::new(),
            id: "/api/v1/coupons/detail".to_string(),
        };

        let mut mrec = MockRecorder::new();
        mrec.expect_add_inflight_requests()
            .with(always(), eq(exp_props), always())
            .times(2)
            .return_const(());
        mrec.expect_observe_http_request_duration()
            .with(always(), eq(req_props("", "/api/v1/coupons/detail", "200")), always())
            .times(1)
            .return_const(());
        mrec.expect_observe_http_response_size().times(1).return_const(());

        middleware(mrec, Config::default()).measure("", &mrep, || ());
    }

    #[test]
    fn test_measure_grouped_status() {
        let mrep = reporter(418, "PATCH", Some(42));

        let exp_req_props = req_props("", "test01", "4xx");

        let mut mrec = MockRecorder::new();
        mrec.expect_add_inflight_requests().times(2).return_const(());
        mrec.expect_observe_http_request_duration()
            .with(always(), eq(exp_req_props.clone()), always())
            .times(1)
            .return_const(());
        mrec.expect_observe_http_response_size()
            .with(always(), eq(exp_req_props), always())
            .times(1)
            .return_const(());

        let mdlw = middleware(
            mrec,
            Config {
                grouped_status: true,
                ..Default::default()
            },
        );

        let mut called_next = false;
        mdlw.measure("test01", &mrep, || called_next = true);

        assert!(called_next);
    }

    #[test]
    fn test_measure_inflight_disabled() {
        let mrep = reporter(418, "PATCH", Some(42));

        let exp_req_props = req_props("", "test01", "418");

        let mut mrec = MockRecorder::new();
        mrec.expect_add_inflight_requests().never();
        mrec.expect_observe_http_request_duration()
            .with(always(), eq(exp_req_props.clone()), always())
            .times(1)
            .return_const(());
        mrec.expect_observe_http_response_size()
            .with(always(), eq(exp_req_props), always())
            .times(1)
            .return_const(());

        let mdlw = middleware(
            mrec,
            Config {
                disable_measure_inflight: true,
                ..Default::default()
            },
        );

        let mut called_next = false;
        mdlw.measure("test01", &mrep, || called_next = true);

        assert!(called_next);
    }

    #[test]
    fn test_measure_size_disabled() {
        // No bytes_written expectation: reading it would fail the test.
        let mrep = reporter(418, "PATCH", None);

        let mut mrec = MockRecorder::new();
        mrec.expect_add_inflight_requests().times(2).return_const(());
        mrec.expect_observe_http_request_duration()
            .with(always(), eq(req_props("", "test01", "418")), always())
            .times(1)
            .return_const(());
        mrec.expect_observe_http_response_size().never();

        let mdlw = middleware(
            mrec,
            Config {
                disable_measure_size: true,
                ..Default::default()
            },
        );

        let mut called_next = false;
        mdlw.measure("test01", &mrep, || called_next = true);

        assert!(called_next);
    }

    #[test]
    fn test_measure_order() {
        let mrep = reporter(200, "PATCH", Some(7));
        let next_ran = Arc::new(AtomicBool::new(false));

        let mut seq = Sequence::new();
        let mut mrec = MockRecorder::new();

        let flag = Arc::clone(&next_ran);
        mrec.expect_add_inflight_requests()
            .withf(move |_, _, quantity| *quantity == 1 && !flag.load(Ordering::SeqCst))
            .times(1)
            .in_sequence(&mut seq)
            .return_const(());
        let flag = Arc::clone(&next_ran);
        mrec.expect_observe_http_request_duration()
            .withf(move |_, _, _| flag.load(Ordering::SeqCst))
            .times(1)
            .in_sequence(&mut seq)
            .return_const(());
        mrec.expect_observe_http_response_size()
            .with(always(), always(), eq(7))
            .times(1)
            .in_sequence(&mut seq)
            .return_const(());
        mrec.expect_add_inflight_requests()
            .with(always(), always(), eq(-1))
            .times(1)
            .in_sequence(&mut seq)
            .return_const(());

        let mdlw = middleware(mrec, Config::default());
        mdlw.measure("test01", &mrep, || next_ran.store(true, Ordering::SeqCst));
    }

    #[test]
    fn test_measure_returns_next_output() {
        let mrep = reporter(500, "GET", Some(0));
        let mut mrec = MockRecorder::new();
        mrec.expect_add_inflight_requests().times(2).return_const(());
        mrec.expect_observe_http_request_duration().times(1).return_const(());
        mrec.expect_observe_http_response_size().times(1).return_const(());

        let mdlw = middleware(mrec, Config::default());
        let result: Result<(), &str> = mdlw.measure("test01", &mrep, || Err("boom"));

        assert_eq!(result, Err("boom"));
    }

    #[test]
    fn test_measure_records_when_next_panics() {
        let mrep = reporter(500, "GET", Some(0));

        let mut mrec = MockRecorder::new();
        mrec.expect_add_inflight_requests()
            .with(always(), always(), eq(1))
            .times(1)
            .return_const(());
        mrec.expect_add_inflight_requests()
            .with(always(), always(), eq(-1))
            .times(1)
            .return_const(());
        mrec.expect_observe_http_request_duration()
            .with(
                always(),
                eq(HttpReqProperties {
                    service: String::new(),
                    id: "test01".to_string(),
                    method: "GET".to_string(),
                    code: "500".to_string(),
                }),
                always(),
            )
            .times(1)
            .return_const(());
        mrec.expect_observe_http_response_size().times(1).return_const(());

        let mdlw = middleware(mrec, Config::default());

        let result = panic::catch_unwind(AssertUnwindSafe(|| {
            let _: () = mdlw.measure("test01", &mrep, || panic!("handler failed"));
        }));

        assert!(result.is_err());
    }

    #[test]
    fn test_measure_with_default_recorder() {
        let mrep = reporter(204, "DELETE", Some(0));
        let mdlw = Middleware::new(Config::default());

        let value = mdlw.measure("test01", &mrep, || 42);

        assert_eq!(value, 42);
    }

    #[tokio::test]
    async fn test_measure_async() {
        let mrep = reporter(201, "PATCH", Some(128));

        let exp_req_props = req_props("svc1", "test01", "2xx");

        let mut mrec = MockRecorder::new();
        mrec.expect_add_inflight_requests().times(2).return_const(());
        mrec.expect_observe_http_request_duration()
            .with(always(), eq(exp_req_props.clone()), always())
            .times(1)
            .return_const(());
        mrec.expect_observe_http_response_size()
            .with(always(), eq(exp_req_props), eq(128))
            .times(1)
            .return_const(());

        let mdlw = middleware(
            mrec,
            Config {
                service: "svc1".to_string(),
                grouped_status: true,
                ..Default::default()
            },
        );

        let value = mdlw
            .measure_async("test01", &mrep, async {
                tokio::task::yield_now().await;
                "done"
            })
            .await;

        assert_eq!(value, "done");
    }

    #[tokio::test]
    async fn test_measure_async_records_when_dropped() {
        let mrep = reporter(0, "GET", Some(0));

        let mut mrec = MockRecorder::new();
        mrec.expect_add_inflight_requests().times(2).return_const(());
        mrec.expect_observe_http_request_duration()
            .with(
                always(),
                eq(HttpReqProperties {
                    service: String::new(),
                    id: "test01".to_string(),
                    method: "GET".to_string(),
                    code: "0".to_string(),
                }),
                always(),
            )
            .times(1)
            .return_const(());
        mrec.expect_observe_http_response_size().times(1).return_const(());

        let mdlw = middleware(mrec, Config::default());

        let timed_out = tokio::time::timeout(
            std::time::Duration::from_millis(10),
            mdlw.measure_async("test01", &mrep, std::future::pending::<()>()),
        )
        .await;

        assert!(timed_out.is_err());
    }

    #[test]
    fn test_status_label() {
        assert_eq!(status_label(418, true), "4xx");
        assert_eq!(status_label(418, false), "418");
        assert_eq!(status_label(200, true), "2xx");
        assert_eq!(status_label(503, false), "503");
    }
}
