//! Request tracing middleware.
//!
//! # Responsibilities
//! - Skip excluded paths entirely (no logs, headers or metrics)
//! - Attach a correlation id to the request, its logs and its response
//! - Log one request-detail line (debug) and one response-summary line
//! - Harden response headers
//! - Feed the latency of every traced request to the metrics aggregator
//!
//! # Design Decisions
//! - Internal faults are logged and the request proceeds untraced
//! - The body is buffered only when body capture is enabled, up to the
//!   listener body limit

use std::sync::Arc;
use std::time::{Duration, Instant};

use axum::{
    body::Body,
    extract::State,
    http::{header, HeaderName, HeaderValue, Request},
    middleware::Next,
    response::Response,
};
use http_body::Body as HttpBody;
use regex::Regex;

use crate::config::{ListenerConfig, TracerConfig};
use crate::http::request::{
    capture_context, original_url, resolve_request_id, CaptureOptions, RequestContext, RequestId,
};
use crate::http::response::HandlerFailed;
use crate::observability::{metrics, MetricsAggregator};
use crate::security::headers::ResponseHardening;
use crate::security::redact::Redactor;

/// Faults inside the tracer itself. Never surfaced to the client.
#[derive(Debug, thiserror::Error)]
pub enum TraceError {
    #[error("invalid tracer configuration: {0}")]
    Config(String),
    #[error("failed to read request body: {0}")]
    Body(#[from] axum::Error),
    #[error("correlation id is not a valid header value")]
    RequestId(#[from] axum::http::header::InvalidHeaderValue),
}

/// Per-request state carried from the request phase to the response phase.
#[derive(Debug)]
pub struct TraceHandle {
    pub context: RequestContext,
    request_id_header: HeaderValue,
    started: Instant,
}

/// Request tracer shared by all requests.
#[derive(Debug)]
pub struct RequestTracer {
    header_name: HeaderName,
    exclude_paths: Vec<String>,
    exclude_patterns: Vec<Regex>,
    redactor: Redactor,
    capture: CaptureOptions,
    hardening: ResponseHardening,
    metrics: Arc<MetricsAggregator>,
    body_limit: usize,
}

impl RequestTracer {
    pub fn new(config: &TracerConfig, metrics: Arc<MetricsAggregator>) -> Result<Self, TraceError> {
        let header_name = HeaderName::from_bytes(config.header_name.as_bytes())
            .map_err(|e| TraceError::Config(format!("header_name: {}", e)))?;
        let exclude_patterns = config
            .exclude_patterns
            .iter()
            .map(|p| Regex::new(p))
            .collect::<Result<Vec<_>, _>>()
            .map_err(|e| TraceError::Config(format!("exclude_patterns: {}", e)))?;
        let hardening = ResponseHardening::new(&config.powered_by, &config.etag)
            .map_err(|e| TraceError::Config(format!("response headers: {}", e)))?;

        Ok(Self {
            header_name,
            exclude_paths: config.exclude_paths.clone(),
            exclude_patterns,
            redactor: Redactor::new(config.sensitive_keys(), config.mask_text.clone()),
            capture: CaptureOptions {
                params: config.log_params,
                headers: config.log_headers,
                body: config.log_body_enabled(),
                max_body_length: config.max_body_length,
            },
            hardening,
            metrics,
            body_limit: ListenerConfig::default().max_body_bytes,
        })
    }

    /// Largest body, in bytes, the tracer buffers for capture.
    pub fn with_body_limit(mut self, limit: usize) -> Self {
        self.body_limit = limit;
        self
    }

    pub fn header_name(&self) -> &HeaderName {
        &self.header_name
    }

    /// Whether a request is excluded from tracing.
    pub fn should_skip(&self, path: &str, original_url: &str) -> bool {
        self.exclude_paths
            .iter()
            .any(|p| path.contains(p.as_str()) || original_url.contains(p.as_str()))
            || self.exclude_patterns.iter().any(|re| re.is_match(path))
    }

    /// Request phase: resolve the correlation id, propagate it into the
    /// request and snapshot the request.
    ///
    /// The request is always handed back, even when preparation fails.
    pub async fn begin(&self, request: Request<Body>) -> (Request<Body>, Result<TraceHandle, TraceError>) {
        let (request_id, _) = resolve_request_id(request.headers(), &self.header_name);
        let request_id_header = match HeaderValue::from_str(&request_id) {
            Ok(v) => v,
            Err(e) => return (request, Err(e.into())),
        };

        let (mut parts, body) = request.into_parts();
        parts.headers.insert(self.header_name.clone(), request_id_header.clone());
        parts.extensions.insert(RequestId(request_id.clone()));

        // Bodies known to exceed the limit are passed through untouched and not captured.
        let oversized = HttpBody::size_hint(&body).lower() > self.body_limit as u64;
        let (request, buffered) = if self.capture.body && !oversized {
            match axum::body::to_bytes(body, self.body_limit).await {
                Ok(bytes) => (Request::from_parts(parts, Body::from(bytes.clone())), Some(bytes)),
                Err(e) => return (Request::from_parts(parts, Body::empty()), Err(e.into())),
            }
        } else {
            (Request::from_parts(parts, body), None)
        };

        let context = capture_context(
            &request,
            &request_id,
            buffered.as_deref(),
            self.capture,
            &self.redactor,
        );
        self.log_request(&context);

        let handle = TraceHandle {
            context,
            request_id_header,
            started: Instant::now(),
        };
        (request, Ok(handle))
    }

    /// Response phase: harden headers, log the summary line and record latency.
    pub fn finish(&self, handle: &TraceHandle, response: &mut Response) -> Duration {
        let elapsed = handle.started.elapsed();

        self.hardening.apply(response.headers_mut());
        response
            .headers_mut()
            .insert(self.header_name.clone(), handle.request_id_header.clone());

        self.log_response(&handle.context, response, elapsed);

        let ctx = &handle.context;
        self.metrics.record_request(&ctx.method, &ctx.path, elapsed);
        metrics::record_request(&ctx.method, response.status().as_u16(), elapsed);
        elapsed
    }

    fn log_request(&self, context: &RequestContext) {
        let any_capture = self.capture.params || self.capture.headers || self.capture.body;
        if !any_capture || !context.has_details() {
            return;
        }
        match serde_json::to_string(context) {
            Ok(details) => tracing::debug!(
                target: "HTTP",
                request_id = %context.request_id,
                details = %details,
                "[{}] Request details:",
                context.request_id
            ),
            Err(e) => tracing::error!(target: "HTTP", error = %e, "Failed to serialize request details"),
        }
    }

    fn log_response(&self, context: &RequestContext, response: &Response, elapsed: Duration) {
        let status = response.status().as_u16();
        let line = summary_line(context, status, response_bytes(response), elapsed);

        if let Some(failed) = response.extensions().get::<HandlerFailed>() {
            tracing::error!(target: "HTTP", request_id = %context.request_id, error = %failed.message, "{}", line);
        } else if status >= 500 {
            tracing::error!(target: "HTTP", request_id = %context.request_id, "{}", line);
        } else if status >= 400 {
            tracing::warn!(target: "HTTP", request_id = %context.request_id, "{}", line);
        } else {
            tracing::info!(target: "HTTP", request_id = %context.request_id, "{}", line);
        }
    }
}

/// `[<id>] <METHOD> <URL> <STATUS> <BYTES>B - <MS>ms`
pub fn summary_line(context: &RequestContext, status: u16, bytes: u64, elapsed: Duration) -> String {
    format!(
        "[{}] {} {} {} {}B - {:.2}ms",
        context.request_id,
        context.method,
        context.original_url,
        status,
        bytes,
        elapsed.as_secs_f64() * 1000.0
    )
}

fn response_bytes(response: &Response) -> u64 {
    response
        .headers()
        .get(header::CONTENT_LENGTH)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.parse().ok())
        .or_else(|| HttpBody::size_hint(response.body()).exact())
        .unwrap_or(0)
}

/// Middleware function wrapping downstream handlers with tracing.
pub async fn trace_middleware(
    State(tracer): State<Arc<RequestTracer>>,
    request: Request<Body>,
    next: Next,
) -> Response {
    if tracer.should_skip(request.uri().path(), &original_url(&request)) {
        return next.run(request).await;
    }

    let (request, handle) = tracer.begin(request).await;
    let handle = match handle {
        Ok(handle) => handle,
        Err(e) => {
            tracing::error!(target: "HTTP", error = %e, "Error in request tracer");
            return next.run(request).await;
        }
    };

    let mut response = next.run(request).await;
    tracer.finish(&handle, &mut response);
    response
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::TracerConfig;

    fn tracer(config: TracerConfig) -> RequestTracer {
        RequestTracer::new(&config, Arc::new(MetricsAggregator::default())).unwrap()
    }

    #[test]
    fn test_default_exclusions() {
        let t = tracer(TracerConfig::default());
        assert!(t.should_skip("/health", "/health"));
        assert!(t.should_skip("/api/health/details", "/api/health/details"));
        assert!(t.should_skip("/", "/?next=/metrics"));
        assert!(!t.should_skip("/users", "/users?id=1"));
    }

    #[test]
    fn test_pattern_exclusions() {
        let t = tracer(TracerConfig {
            exclude_patterns: vec![r"^/static/.*\.css$".into()],
            ..Default::default()
        });
        assert!(t.should_skip("/static/site.css", "/static/site.css"));
        assert!(!t.should_skip("/static/site.js", "/static/site.js"));
    }

    #[test]
    fn test_invalid_config_is_rejected() {
        let err = RequestTracer::new(
            &TracerConfig {
                exclude_patterns: vec!["(".into()],
                ..Default::default()
            },
            Arc::new(MetricsAggregator::default()),
        )
        .unwrap_err();
        assert!(matches!(err, TraceError::Config(_)));
    }

    #[tokio::test]
    async fn test_begin_propagates_generated_id() {
        let t = tracer(TracerConfig::default());
        let request = Request::builder().uri("/x").body(Body::empty()).unwrap();

        let (request, handle) = t.begin(request).await;
        let handle = handle.unwrap();

        let header = request.headers()["x-request-id"].to_str().unwrap();
        assert_eq!(header, handle.context.request_id);
        assert_eq!(request.extensions().get::<RequestId>().unwrap().as_str(), header);
    }

    #[tokio::test]
    async fn test_begin_keeps_body_for_downstream() {
        let t = tracer(TracerConfig {
            log_body: Some(true),
            max_body_length: 5,
            ..Default::default()
        });
        let request = Request::builder()
            .method("POST")
            .uri("/echo")
            .body(Body::from("hello world"))
            .unwrap();

        let (request, handle) = t.begin(request).await;
        assert_eq!(handle.unwrap().context.body.as_deref(), Some("hello... [truncated]"));

        let bytes = axum::body::to_bytes(request.into_body(), usize::MAX).await.unwrap();
        assert_eq!(&bytes[..], b"hello world");
    }

    /// Streaming body of unknown length.
    struct Chunks(std::collections::VecDeque<axum::body::Bytes>);

    impl HttpBody for Chunks {
        type Data = axum::body::Bytes;
        type Error = std::convert::Infallible;

        fn poll_frame(
            mut self: std::pin::Pin<&mut Self>,
            _cx: &mut std::task::Context<'_>,
        ) -> std::task::Poll<Option<Result<http_body::Frame<Self::Data>, Self::Error>>> {
            std::task::Poll::Ready(self.0.pop_front().map(|chunk| Ok(http_body::Frame::data(chunk))))
        }
    }

    fn capturing_tracer(body_limit: usize) -> RequestTracer {
        tracer(TracerConfig {
            log_body: Some(true),
            ..Default::default()
        })
        .with_body_limit(body_limit)
    }

    #[tokio::test]
    async fn test_known_oversized_body_is_not_buffered() {
        let t = capturing_tracer(16);
        let payload = "x".repeat(64);
        let request = Request::builder()
            .method("POST")
            .uri("/upload")
            .body(Body::from(payload.clone()))
            .unwrap();

        let (request, handle) = t.begin(request).await;
        assert_eq!(handle.unwrap().context.body, None);

        let bytes = axum::body::to_bytes(request.into_body(), usize::MAX).await.unwrap();
        assert_eq!(bytes.len(), payload.len());
    }

    #[tokio::test]
    async fn test_streamed_body_over_limit_is_a_trace_error() {
        let t = capturing_tracer(16);
        let chunks = (0..4).map(|_| axum::body::Bytes::from_static(b"0123456789")).collect();
        let request = Request::builder()
            .method("POST")
            .uri("/upload")
            .body(Body::new(Chunks(chunks)))
            .unwrap();

        let (_, handle) = t.begin(request).await;
        assert!(matches!(handle, Err(TraceError::Body(_))));
    }

    #[tokio::test]
    async fn test_streamed_body_under_limit_is_captured() {
        let t = capturing_tracer(64);
        let chunks = (0..2).map(|_| axum::body::Bytes::from_static(b"abc")).collect();
        let request = Request::builder()
            .method("POST")
            .uri("/upload")
            .body(Body::new(Chunks(chunks)))
            .unwrap();

        let (request, handle) = t.begin(request).await;
        assert_eq!(handle.unwrap().context.body.as_deref(), Some("abcabc"));
        let bytes = axum::body::to_bytes(request.into_body(), usize::MAX).await.unwrap();
        assert_eq!(&bytes[..], b"abcabc");
    }

    #[tokio::test]
    async fn test_finish_records_latency_and_headers() {
        let metrics = Arc::new(MetricsAggregator::default());
        let t = RequestTracer::new(&TracerConfig::default(), metrics.clone()).unwrap();
        let request = Request::builder()
            .method("GET")
            .uri("/items?q=1")
            .header("x-request-id", "abc-123")
            .body(Body::empty())
            .unwrap();

        let (_, handle) = t.begin(request).await;
        let handle = handle.unwrap();

        let mut response = Response::new(Body::from("ok"));
        response
            .headers_mut()
            .insert(header::ACCESS_CONTROL_ALLOW_ORIGIN, HeaderValue::from_static("*"));
        t.finish(&handle, &mut response);

        assert_eq!(response.headers()["x-request-id"], "abc-123");
        assert!(response.headers().contains_key("x-powered-by"));
        assert!(response.headers().contains_key(header::ETAG));
        assert!(!response.headers().contains_key(header::ACCESS_CONTROL_ALLOW_ORIGIN));
        assert_eq!(metrics.series("GET:/items").map(|s| s.len()), Some(1));
        assert_eq!(response_bytes(&response), 2);
    }

    #[test]
    fn test_summary_line_format() {
        let ctx = RequestContext {
            request_id: "abc".into(),
            timestamp: String::new(),
            method: "GET".into(),
            original_url: "/a?b=1".into(),
            path: "/a".into(),
            ip: String::new(),
            user_agent: String::new(),
            params: None,
            headers: None,
            body: None,
        };
        let line = summary_line(&ctx, 201, 17, Duration::from_micros(12_346));
        assert_eq!(line, "[abc] GET /a?b=1 201 17B - 12.35ms");
    }
}
