//! Per-client request rate limiting.
//!
//! Each client identity owns a [`RateRecord`]. The window is anchored to the
//! client's most recent request: a gap longer than `window_ms` resets the
//! count to 1, anything shorter increments it.

use std::sync::Arc;
use std::time::{Duration, Instant};

use axum::{
    body::Body,
    extract::State,
    http::{header, HeaderValue, Request, StatusCode},
    middleware::Next,
    response::{IntoResponse, Response},
};
use dashmap::DashMap;

use crate::config::RateLimitConfig;
use crate::http::request::peer_addr;
use crate::http::response::ResponseEnvelope;
use crate::observability::metrics;

/// Counter state for one client identity.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RateRecord {
    pub count: u32,
    pub last_request: Instant,
}

/// Why a request was refused.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RateLimitError {
    #[error("Cannot determine IP address")]
    IdentityIndeterminate,
    #[error("Too many requests, please try again later.")]
    Exceeded { identity: String, retry_after: Duration },
}

impl RateLimitError {
    pub fn status(&self) -> StatusCode {
        match self {
            RateLimitError::IdentityIndeterminate => StatusCode::BAD_REQUEST,
            RateLimitError::Exceeded { .. } => StatusCode::TOO_MANY_REQUESTS,
        }
    }
}

impl IntoResponse for RateLimitError {
    fn into_response(self) -> Response {
        let status = self.status();
        let envelope = ResponseEnvelope::Failure {
            status_code: status,
            error: serde_json::Value::String(self.to_string()),
        };
        let mut response = envelope.into_response();
        if let RateLimitError::Exceeded { retry_after, .. } = &self {
            let secs = retry_after.as_millis().div_ceil(1000);
            if let Ok(value) = HeaderValue::from_str(&secs.to_string()) {
                response.headers_mut().insert(header::RETRY_AFTER, value);
            }
        }
        response
    }
}

/// Process-local rate limiter keyed by client identity.
#[derive(Debug)]
pub struct RateLimiter {
    records: DashMap<String, RateRecord>,
    limit: u32,
    window: Duration,
    exclude_paths: Vec<String>,
    trust_forwarded_for: bool,
}

impl RateLimiter {
    pub fn new(config: &RateLimitConfig) -> Self {
        Self {
            records: DashMap::new(),
            limit: config.limit,
            window: Duration::from_millis(config.window_ms),
            exclude_paths: config.exclude_paths.clone(),
            trust_forwarded_for: config.trust_forwarded_for,
        }
    }

    /// Check a request from `identity` arriving now.
    pub fn check(&self, identity: Option<&str>) -> Result<(), RateLimitError> {
        self.check_at(identity, Instant::now())
    }

    /// Check a request from `identity` arriving at `now`.
    pub fn check_at(&self, identity: Option<&str>, now: Instant) -> Result<(), RateLimitError> {
        let identity = match identity {
            Some(id) if !id.is_empty() => id,
            _ => return Err(RateLimitError::IdentityIndeterminate),
        };

        // The entry guard holds the shard lock, so reset-or-increment is atomic per key.
        let mut record = self
            .records
            .entry(identity.to_string())
            .or_insert(RateRecord { count: 0, last_request: now });

        if record.count == 0 || now.saturating_duration_since(record.last_request) > self.window {
            *record = RateRecord { count: 1, last_request: now };
            return Ok(());
        }

        record.count = record.count.saturating_add(1);
        record.last_request = now;

        if record.count > self.limit {
            tracing::warn!(target: "RateLimit", ip = %identity, count = record.count, "Rate limit exceeded for IP {}", identity);
            return Err(RateLimitError::Exceeded {
                identity: identity.to_string(),
                retry_after: self.window,
            });
        }
        Ok(())
    }

    /// Current record for an identity.
    pub fn record(&self, identity: &str) -> Option<RateRecord> {
        self.records.get(identity).map(|r| *r)
    }

    /// Number of identities tracked.
    pub fn tracked_clients(&self) -> usize {
        self.records.len()
    }

    /// Whether `path` bypasses rate limiting.
    pub fn is_excluded(&self, path: &str) -> bool {
        self.exclude_paths.iter().any(|excluded| {
            path == excluded
                || path
                    .strip_prefix(excluded.as_str())
                    .is_some_and(|rest| rest.starts_with('/'))
        })
    }

    /// Resolve the client identity of a request.
    pub fn identify(&self, request: &Request<Body>) -> Option<String> {
        if self.trust_forwarded_for {
            let forwarded = request
                .headers()
                .get("x-forwarded-for")
                .and_then(|h| h.to_str().ok())
                .and_then(|s| s.split(',').next())
                .map(str::trim)
                .filter(|s| !s.is_empty());
            if let Some(ip) = forwarded {
                return Some(ip.to_string());
            }
        }
        peer_addr(request).map(|addr| addr.ip().to_string())
    }
}

/// Middleware function enforcing the per-client limit.
pub async fn rate_limit_middleware(
    State(limiter): State<Arc<RateLimiter>>,
    request: Request<Body>,
    next: Next,
) -> Response {
    if limiter.is_excluded(request.uri().path()) {
        return next.run(request).await;
    }

    let identity = limiter.identify(&request);
    match limiter.check(identity.as_deref()) {
        Ok(()) => next.run(request).await,
        Err(err) => {
            let reason = match &err {
                RateLimitError::IdentityIndeterminate => "no_identity",
                RateLimitError::Exceeded { .. } => "limit_exceeded",
            };
            metrics::record_rate_limited(reason);
            err.into_response()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn limiter(limit: u32, window_ms: u64) -> RateLimiter {
        RateLimiter::new(&RateLimitConfig {
            limit,
            window_ms,
            ..Default::default()
        })
    }

    #[test]
    fn test_limit_within_window_then_reset() {
        let rl = limiter(3, 1000);
        let t0 = Instant::now();

        assert!(rl.check_at(Some("X"), t0).is_ok());
        assert!(rl.check_at(Some("X"), t0 + Duration::from_millis(100)).is_ok());
        assert!(rl.check_at(Some("X"), t0 + Duration::from_millis(200)).is_ok());

        let err = rl.check_at(Some("X"), t0 + Duration::from_millis(300)).unwrap_err();
        assert!(matches!(err, RateLimitError::Exceeded { ref identity, .. } if identity == "X"));
        assert_eq!(err.status(), StatusCode::TOO_MANY_REQUESTS);

        // More than a full window after the last call.
        let later = t0 + Duration::from_millis(300 + 1001);
        assert!(rl.check_at(Some("X"), later).is_ok());
        assert_eq!(rl.record("X").unwrap().count, 1);
    }

    #[test]
    fn test_window_is_anchored_to_last_request() {
        let rl = limiter(100, 1000);
        let mut now = Instant::now();
        for _ in 0..10 {
            rl.check_at(Some("steady"), now).unwrap();
            now += Duration::from_millis(900);
        }
        assert_eq!(rl.record("steady").unwrap().count, 10);
    }

    #[test]
    fn test_exact_window_gap_does_not_reset() {
        let rl = limiter(1, 1000);
        let t0 = Instant::now();
        rl.check_at(Some("X"), t0).unwrap();
        assert!(rl.check_at(Some("X"), t0 + Duration::from_millis(1000)).is_err());
    }

    #[test]
    fn test_rejected_calls_keep_counting() {
        let rl = limiter(1, 1000);
        let t0 = Instant::now();
        rl.check_at(Some("X"), t0).unwrap();
        assert!(rl.check_at(Some("X"), t0).is_err());
        assert!(rl.check_at(Some("X"), t0).is_err());
        assert_eq!(rl.record("X").unwrap().count, 3);
    }

    #[test]
    fn test_identities_are_independent() {
        let rl = limiter(1, 1000);
        let t0 = Instant::now();
        rl.check_at(Some("a"), t0).unwrap();
        rl.check_at(Some("b"), t0).unwrap();
        assert!(rl.check_at(Some("a"), t0).is_err());
        assert_eq!(rl.tracked_clients(), 2);
    }

    #[test]
    fn test_missing_identity_is_bad_request() {
        let rl = limiter(1, 1000);
        let err = rl.check(None).unwrap_err();
        assert_eq!(err, RateLimitError::IdentityIndeterminate);
        assert_eq!(err.status(), StatusCode::BAD_REQUEST);
        assert_eq!(rl.check(Some("")).unwrap_err(), RateLimitError::IdentityIndeterminate);
        assert_eq!(rl.tracked_clients(), 0);
    }

    #[test]
    fn test_exclusion_matches_path_and_subpaths() {
        let rl = limiter(1, 1000);
        assert!(rl.is_excluded("/health"));
        assert!(rl.is_excluded("/health/details"));
        assert!(!rl.is_excluded("/healthz"));
        assert!(!rl.is_excluded("/api/health"));
    }

    #[test]
    fn test_forwarded_for_identity() {
        let rl = RateLimiter::new(&RateLimitConfig {
            trust_forwarded_for: true,
            ..Default::default()
        });
        let req = Request::builder()
            .header("X-Forwarded-For", "203.0.113.9, 10.0.0.1")
            .body(Body::empty())
            .unwrap();
        assert_eq!(rl.identify(&req).as_deref(), Some("203.0.113.9"));

        let untrusted = limiter(1, 1000);
        assert_eq!(untrusted.identify(&req), None);
    }

    #[test]
    fn test_identity_from_connect_info_and_mock() {
        use axum::extract::{connect_info::MockConnectInfo, ConnectInfo};
        use std::net::SocketAddr;

        let rl = limiter(1, 1000);
        let addr: SocketAddr = "198.51.100.4:5000".parse().unwrap();

        let mut req = Request::builder().body(Body::empty()).unwrap();
        req.extensions_mut().insert(ConnectInfo(addr));
        assert_eq!(rl.identify(&req).as_deref(), Some("198.51.100.4"));

        let mut req = Request::builder().body(Body::empty()).unwrap();
        req.extensions_mut().insert(MockConnectInfo(addr));
        assert_eq!(rl.identify(&req).as_deref(), Some("198.51.100.4"));
    }

    #[test]
    fn test_exceeded_response_carries_retry_after() {
        let err = RateLimitError::Exceeded {
            identity: "X".into(),
            retry_after: Duration::from_millis(1500),
        };
        let response = err.into_response();
        assert_eq!(response.status(), StatusCode::TOO_MANY_REQUESTS);
        assert_eq!(response.headers()[header::RETRY_AFTER], "2");
    }
}
