//! Request metadata capture.
//!
//! # Responsibilities
//! - Resolve the correlation id (inbound header or fresh UUID v4)
//! - Snapshot request metadata into an immutable [`RequestContext`]
//! - Capture query parameters, headers and body, masked and size-bounded
//!
//! # Design Decisions
//! - Correlation id resolved as early as possible for tracing
//! - Repeated query keys and headers become JSON arrays
//! - Body length is bounded in characters, with an explicit truncation marker

use std::net::SocketAddr;

use axum::{
    extract::{connect_info::MockConnectInfo, ConnectInfo},
    http::{header, HeaderMap, HeaderName, Request, Uri},
};
use serde::Serialize;
use serde_json::{Map, Value};
use uuid::Uuid;

use crate::security::redact::Redactor;

/// Suffix appended to captured bodies cut at the length limit.
pub const TRUNCATION_MARKER: &str = "... [truncated]";

/// Correlation id of the current request, available to handlers as an extension.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RequestId(pub String);

impl RequestId {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

/// Immutable snapshot of one inbound request.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RequestContext {
    pub request_id: String,
    /// Creation time, ISO-8601.
    pub timestamp: String,
    pub method: String,
    pub original_url: String,
    pub path: String,
    pub ip: String,
    pub user_agent: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub params: Option<Map<String, Value>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub headers: Option<Map<String, Value>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub body: Option<String>,
}

impl RequestContext {
    /// Whether any optional capture produced data.
    pub fn has_details(&self) -> bool {
        self.params.as_ref().is_some_and(|p| !p.is_empty())
            || self.headers.as_ref().is_some_and(|h| !h.is_empty())
            || self.body.as_ref().is_some_and(|b| !b.is_empty())
    }
}

/// Which optional parts of a request to capture.
#[derive(Debug, Clone, Copy)]
pub struct CaptureOptions {
    pub params: bool,
    pub headers: bool,
    pub body: bool,
    pub max_body_length: usize,
}

/// Read the correlation id from `header_name`, or generate one.
///
/// Returns the id and whether it was generated.
pub fn resolve_request_id(headers: &HeaderMap, header_name: &HeaderName) -> (String, bool) {
    let inbound = headers
        .get(header_name)
        .and_then(|v| v.to_str().ok())
        .map(str::trim)
        .filter(|v| !v.is_empty());

    match inbound {
        Some(id) => (id.to_string(), false),
        None => (Uuid::new_v4().to_string(), true),
    }
}

/// Build the context for `request`. `body` is the already-buffered body, if captured.
pub fn capture_context<B>(
    request: &Request<B>,
    request_id: &str,
    body: Option<&[u8]>,
    options: CaptureOptions,
    redactor: &Redactor,
) -> RequestContext {
    let uri = request.uri();
    let headers = request.headers();

    let mut context = RequestContext {
        request_id: request_id.to_string(),
        timestamp: chrono::Utc::now().to_rfc3339_opts(chrono::SecondsFormat::Millis, true),
        method: request.method().to_string(),
        original_url: original_url(request),
        path: uri.path().to_string(),
        ip: client_ip(request),
        user_agent: headers
            .get(header::USER_AGENT)
            .and_then(|v| v.to_str().ok())
            .unwrap_or_default()
            .to_string(),
        params: None,
        headers: None,
        body: None,
    };

    if options.params {
        context.params = Some(redactor.redact_map(&query_params(uri)));
    }
    if options.headers {
        context.headers = Some(redactor.redact_map(&header_map(headers)));
    }
    if options.body {
        let content_type = headers
            .get(header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .unwrap_or_default();
        context.body = body
            .filter(|b| !b.is_empty())
            .map(|b| truncate_body(render_body(b, content_type, redactor), options.max_body_length));
    }

    context
}

/// Path and query as received, before any router rewriting.
pub fn original_url<B>(request: &Request<B>) -> String {
    let uri = request
        .extensions()
        .get::<axum::extract::OriginalUri>()
        .map(|o| &o.0)
        .unwrap_or_else(|| request.uri());
    uri.path_and_query()
        .map(|pq| pq.as_str().to_string())
        .unwrap_or_else(|| uri.path().to_string())
}

/// Network address of the client.
///
/// Reads the `ConnectInfo` installed by `into_make_service_with_connect_info`,
/// or the `MockConnectInfo` layer used for in-process serving.
pub fn peer_addr<B>(request: &Request<B>) -> Option<SocketAddr> {
    let extensions = request.extensions();
    extensions
        .get::<ConnectInfo<SocketAddr>>()
        .map(|ConnectInfo(addr)| *addr)
        .or_else(|| {
            extensions
                .get::<MockConnectInfo<SocketAddr>>()
                .map(|MockConnectInfo(addr)| *addr)
        })
}

/// Peer address, falling back to the `Host` header.
fn client_ip<B>(request: &Request<B>) -> String {
    if let Some(addr) = peer_addr(request) {
        return addr.ip().to_string();
    }
    request
        .headers()
        .get(header::HOST)
        .and_then(|v| v.to_str().ok())
        .unwrap_or_default()
        .to_string()
}

/// Decode the query string into an object.
pub fn query_params(uri: &Uri) -> Map<String, Value> {
    let mut params = Map::new();
    if let Some(query) = uri.query() {
        for (key, value) in url::form_urlencoded::parse(query.as_bytes()) {
            insert_multi(&mut params, key.into_owned(), value.into_owned());
        }
    }
    params
}

/// Lowercased header names to values.
pub fn header_map(headers: &HeaderMap) -> Map<String, Value> {
    let mut map = Map::new();
    for (name, value) in headers {
        let value = String::from_utf8_lossy(value.as_bytes()).into_owned();
        insert_multi(&mut map, name.as_str().to_string(), value);
    }
    map
}

fn insert_multi(map: &mut Map<String, Value>, key: String, value: String) {
    match map.get_mut(&key) {
        Some(Value::Array(items)) => items.push(Value::String(value)),
        Some(existing) => {
            let first = existing.take();
            *existing = Value::Array(vec![first, Value::String(value)]);
        }
        None => {
            map.insert(key, Value::String(value));
        }
    }
}

/// Render a body for logging: structured bodies are masked and re-serialized,
/// anything else is logged as text.
fn render_body(bytes: &[u8], content_type: &str, redactor: &Redactor) -> String {
    if content_type.starts_with("application/x-www-form-urlencoded") {
        let mut form = Map::new();
        for (key, value) in url::form_urlencoded::parse(bytes) {
            insert_multi(&mut form, key.into_owned(), value.into_owned());
        }
        return Value::Object(redactor.redact_map(&form)).to_string();
    }
    match serde_json::from_slice::<Value>(bytes) {
        Ok(value @ (Value::Object(_) | Value::Array(_))) => redactor.redact(&value).to_string(),
        _ => String::from_utf8_lossy(bytes).into_owned(),
    }
}

/// Cut `body` to `max` characters, marking the cut.
pub fn truncate_body(body: String, max: usize) -> String {
    match body.char_indices().nth(max) {
        Some((cut, _)) => format!("{}{}", &body[..cut], TRUNCATION_MARKER),
        None => body,
    }
}
