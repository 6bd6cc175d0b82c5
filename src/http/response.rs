//! Uniform response envelopes.
//!
//! # Responsibilities
//! - Wrap handler results as `{status: true, statusCode, data}`
//! - Wrap handler errors as `{status: false, statusCode, error}`
//! - Log handler errors under the `Response` target
//!
//! # Design Decisions
//! - The envelope reports the transport status; it never picks a different one
//! - Error payload precedence: structured payload, then message, then a
//!   generic "Internal Server Error"
//! - Failed responses carry a [`HandlerFailed`] extension for the tracer

use std::error::Error as StdError;
use std::fmt;

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::{ser::SerializeStruct, Serialize, Serializer};
use serde_json::Value;

const GENERIC_ERROR: &str = "Internal Server Error";

/// The wire envelope returned for every handled request.
#[derive(Debug, Clone, PartialEq)]
pub enum ResponseEnvelope {
    Success { status_code: StatusCode, data: Value },
    Failure { status_code: StatusCode, error: Value },
}

impl ResponseEnvelope {
    /// Wrap a handler outcome.
    ///
    /// `transport_status` is the status already chosen for the response, or
    /// `None` while it is still the framework default.
    pub fn from_outcome(
        transport_status: Option<StatusCode>,
        outcome: Result<Value, HandlerError>,
    ) -> Self {
        match outcome {
            Ok(data) => ResponseEnvelope::Success {
                status_code: transport_status.unwrap_or(StatusCode::OK),
                data,
            },
            Err(err) => ResponseEnvelope::Failure {
                status_code: transport_status
                    .or(err.status)
                    .unwrap_or(StatusCode::INTERNAL_SERVER_ERROR),
                error: err.payload(),
            },
        }
    }

    pub fn status_code(&self) -> StatusCode {
        match self {
            ResponseEnvelope::Success { status_code, .. }
            | ResponseEnvelope::Failure { status_code, .. } => *status_code,
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self, ResponseEnvelope::Success { .. })
    }
}

impl Serialize for ResponseEnvelope {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut state = serializer.serialize_struct("ResponseEnvelope", 3)?;
        match self {
            ResponseEnvelope::Success { status_code, data } => {
                state.serialize_field("status", &true)?;
                state.serialize_field("statusCode", &status_code.as_u16())?;
                state.serialize_field("data", data)?;
            }
            ResponseEnvelope::Failure { status_code, error } => {
                state.serialize_field("status", &false)?;
                state.serialize_field("statusCode", &status_code.as_u16())?;
                state.serialize_field("error", error)?;
            }
        }
        state.end()
    }
}

impl IntoResponse for ResponseEnvelope {
    fn into_response(self) -> Response {
        (self.status_code(), Json(self)).into_response()
    }
}

/// Marker extension on responses produced from a [`HandlerError`].
#[derive(Debug, Clone)]
pub struct HandlerFailed {
    pub message: String,
}

/// An error raised by a downstream handler.
///
/// Any `std::error::Error` converts into it, so handlers can use `?`.
pub struct HandlerError {
    status: Option<StatusCode>,
    payload: Option<Value>,
    message: String,
    source: Option<Box<dyn StdError + Send + Sync>>,
}

impl HandlerError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            status: None,
            payload: None,
            message: message.into(),
            source: None,
        }
    }

    /// Status carried by the error itself.
    pub fn with_status(mut self, status: StatusCode) -> Self {
        self.status = Some(status);
        self
    }

    /// Structured payload reported to the client instead of the message.
    pub fn with_payload(mut self, payload: Value) -> Self {
        self.payload = Some(payload);
        self
    }

    pub fn status(&self) -> Option<StatusCode> {
        self.status
    }

    pub fn message(&self) -> &str {
        &self.message
    }

    /// What the failure envelope reports as `error`.
    pub fn payload(&self) -> Value {
        match &self.payload {
            Some(payload) => payload.clone(),
            None if !self.message.is_empty() => Value::String(self.message.clone()),
            None => Value::String(GENERIC_ERROR.to_string()),
        }
    }

    /// Message followed by the chain of underlying causes.
    pub fn chain(&self) -> String {
        let mut out = self.message.clone();
        let mut cause: Option<&(dyn StdError + 'static)> =
            self.source.as_deref().map(|e| e as &(dyn StdError + 'static));
        while let Some(err) = cause {
            out.push_str(": ");
            out.push_str(&err.to_string());
            cause = err.source();
        }
        out
    }
}

impl<E> From<E> for HandlerError
where
    E: StdError + Send + Sync + 'static,
{
    fn from(err: E) -> Self {
        Self {
            status: None,
            payload: None,
            message: err.to_string(),
            source: err.source().map(|s| Box::<dyn StdError + Send + Sync>::from(s.to_string())),
        }
    }
}

impl fmt::Debug for HandlerError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HandlerError")
            .field("status", &self.status)
            .field("payload", &self.payload)
            .field("message", &self.message)
            .finish()
    }
}

impl fmt::Display for HandlerError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.chain())
    }
}

impl IntoResponse for HandlerError {
    fn into_response(self) -> Response {
        tracing::error!(
            target: "Response",
            status = ?self.status,
            error = %self.chain(),
            "Handler failed"
        );
        let marker = HandlerFailed {
            message: self.message.clone(),
        };
        let mut response = ResponseEnvelope::from_outcome(None, Err(self)).into_response();
        response.extensions_mut().insert(marker);
        response
    }
}

/// Successful handler result, reported with the status the handler chose.
#[derive(Debug, Clone)]
pub struct Envelope<T> {
    status: StatusCode,
    data: T,
}

impl<T> Envelope<T> {
    pub fn ok(data: T) -> Self {
        Self {
            status: StatusCode::OK,
            data,
        }
    }

    pub fn with_status(status: StatusCode, data: T) -> Self {
        Self { status, data }
    }
}

impl<T: Serialize> IntoResponse for Envelope<T> {
    fn into_response(self) -> Response {
        match serde_json::to_value(&self.data) {
            Ok(data) => ResponseEnvelope::from_outcome(Some(self.status), Ok(data)).into_response(),
            Err(e) => HandlerError::from(e).into_response(),
        }
    }
}
