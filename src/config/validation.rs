//! Configuration validation.
//!
//! # Responsibilities
//! - Semantic validation (serde handles syntactic)
//! - Validate value ranges (limits > 0, intervals > 0)
//! - Check that header names/values and exclusion patterns are usable
//!
//! # Design Decisions
//! - Returns all validation errors, not just first
//! - Validation is pure function: PipelineConfig → Result<(), Vec<ValidationError>>
//! - Runs before config is accepted into the system

use axum::http::{HeaderName, HeaderValue};
use regex::Regex;

use crate::config::schema::PipelineConfig;

/// A single semantic problem in the configuration.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{field}: {message}")]
pub struct ValidationError {
    pub field: &'static str,
    pub message: String,
}

impl ValidationError {
    pub fn new(field: &'static str, message: impl Into<String>) -> Self {
        Self {
            field,
            message: message.into(),
        }
    }
}

/// Validate a parsed configuration.
pub fn validate_config(config: &PipelineConfig) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();

    let tracer = &config.tracer;
    if HeaderName::from_bytes(tracer.header_name.as_bytes()).is_err() {
        errors.push(ValidationError::new(
            "tracer.header_name",
            format!("'{}' is not a valid header name", tracer.header_name),
        ));
    }
    for pattern in &tracer.exclude_patterns {
        if let Err(e) = Regex::new(pattern) {
            errors.push(ValidationError::new(
                "tracer.exclude_patterns",
                format!("'{}' does not compile: {}", pattern, e),
            ));
        }
    }
    if tracer.max_body_length == 0 {
        errors.push(ValidationError::new("tracer.max_body_length", "must be greater than 0"));
    }
    if HeaderValue::from_str(&tracer.powered_by).is_err() {
        errors.push(ValidationError::new("tracer.powered_by", "is not a valid header value"));
    }
    if HeaderValue::from_str(&tracer.etag).is_err() {
        errors.push(ValidationError::new("tracer.etag", "is not a valid header value"));
    }

    if config.rate_limit.limit == 0 {
        errors.push(ValidationError::new("rate_limit.limit", "must be greater than 0"));
    }
    if config.rate_limit.window_ms == 0 {
        errors.push(ValidationError::new("rate_limit.window_ms", "must be greater than 0"));
    }

    if config.metrics.series_capacity == 0 {
        errors.push(ValidationError::new("metrics.series_capacity", "must be greater than 0"));
    }
    if config.metrics.report_interval_secs == 0 {
        errors.push(ValidationError::new(
            "metrics.report_interval_secs",
            "must be greater than 0",
        ));
    }

    if config.metrics.performance_interval_secs == 0 {
        errors.push(ValidationError::new(
            "metrics.performance_interval_secs",
            "must be greater than 0",
        ));
    }

    if config.listener.request_timeout_secs == 0 {
        errors.push(ValidationError::new(
            "listener.request_timeout_secs",
            "must be greater than 0",
        ));
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_are_valid() {
        assert!(validate_config(&PipelineConfig::default()).is_ok());
    }

    #[test]
    fn test_collects_every_error() {
        let mut config = PipelineConfig::default();
        config.tracer.header_name = "bad header".into();
        config.tracer.exclude_patterns = vec!["([".into()];
        config.rate_limit.limit = 0;
        config.rate_limit.window_ms = 0;

        let errors = validate_config(&config).unwrap_err();
        let fields: Vec<_> = errors.iter().map(|e| e.field).collect();
        assert_eq!(
            fields,
            vec![
                "tracer.header_name",
                "tracer.exclude_patterns",
                "rate_limit.limit",
                "rate_limit.window_ms",
            ]
        );
    }
}
