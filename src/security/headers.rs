//! Response header hardening.
//!
//! # Responsibilities
//! - Add the `X-Powered-By` marker and a fixed `ETag`
//! - Strip CORS allow headers a downstream handler may have set
//!
//! # Design Decisions
//! - Applied after the handler runs so handler-set headers are overridden
//! - Header values are parsed once at startup

use axum::http::{
    header::{
        ACCESS_CONTROL_ALLOW_CREDENTIALS, ACCESS_CONTROL_ALLOW_METHODS,
        ACCESS_CONTROL_ALLOW_ORIGIN, ETAG,
    },
    header::InvalidHeaderValue,
    HeaderMap, HeaderName, HeaderValue,
};

pub const X_POWERED_BY: HeaderName = HeaderName::from_static("x-powered-by");

const STRIPPED: [HeaderName; 3] = [
    ACCESS_CONTROL_ALLOW_ORIGIN,
    ACCESS_CONTROL_ALLOW_CREDENTIALS,
    ACCESS_CONTROL_ALLOW_METHODS,
];

/// Fixed response header policy.
#[derive(Debug, Clone)]
pub struct ResponseHardening {
    powered_by: HeaderValue,
    etag: HeaderValue,
}

impl ResponseHardening {
    pub fn new(powered_by: &str, etag: &str) -> Result<Self, InvalidHeaderValue> {
        Ok(Self {
            powered_by: HeaderValue::from_str(powered_by)?,
            etag: HeaderValue::from_str(etag)?,
        })
    }

    pub fn apply(&self, headers: &mut HeaderMap) {
        headers.insert(X_POWERED_BY, self.powered_by.clone());
        headers.insert(ETAG, self.etag.clone());
        for name in STRIPPED {
            headers.remove(name);
        }
    }
}
