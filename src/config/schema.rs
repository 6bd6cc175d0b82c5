//! Configuration schema definitions.
//!
//! This module defines the complete configuration structure for the pipeline.
//! All types derive Serde traits for deserialization from config files.

use serde::{Deserialize, Serialize};

/// Root configuration for the request pipeline.
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
#[serde(default)]
pub struct PipelineConfig {
    /// Listener configuration (bind address, transport limits).
    pub listener: ListenerConfig,

    /// Request tracer settings.
    pub tracer: TracerConfig,

    /// Rate limiting configuration.
    pub rate_limit: RateLimitConfig,

    /// Rolling latency metrics.
    pub metrics: MetricsConfig,

    /// Observability settings.
    pub observability: ObservabilityConfig,

    /// Application metadata.
    pub app: AppConfig,
}

/// Listener configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ListenerConfig {
    /// Bind address (e.g., "0.0.0.0:3000").
    pub bind_address: String,

    /// Request timeout in seconds.
    pub request_timeout_secs: u64,

    /// Maximum accepted request body in bytes.
    pub max_body_bytes: usize,
}

impl Default for ListenerConfig {
    fn default() -> Self {
        Self {
            bind_address: "0.0.0.0:3000".to_string(),
            request_timeout_secs: 30,
            max_body_bytes: 2 * 1024 * 1024, // 2MB
        }
    }
}

/// Request tracer configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct TracerConfig {
    /// Header carrying the correlation id.
    pub header_name: String,

    /// Substrings of the path or full URL that disable tracing.
    pub exclude_paths: Vec<String>,

    /// Regular expressions matched against the path that disable tracing.
    pub exclude_patterns: Vec<String>,

    /// Header names whose values are masked.
    pub sensitive_headers: Vec<String>,

    /// Query / body keys whose values are masked.
    pub sensitive_params: Vec<String>,

    /// Replacement text for masked values.
    pub mask_text: String,

    /// Capture query parameters.
    pub log_params: bool,

    /// Capture request headers.
    pub log_headers: bool,

    /// Capture request body. `None` means "not set in the file", resolved
    /// by the loader from the environment.
    pub log_body: Option<bool>,

    /// Maximum captured body length in characters.
    pub max_body_length: usize,

    /// Value of the `X-Powered-By` response header.
    pub powered_by: String,

    /// Fixed `ETag` response header value.
    pub etag: String,
}

impl TracerConfig {
    /// Whether body capture is on.
    pub fn log_body_enabled(&self) -> bool {
        self.log_body.unwrap_or(false)
    }

    /// Union of sensitive header and parameter names, lowercased.
    pub fn sensitive_keys(&self) -> Vec<String> {
        self.sensitive_headers
            .iter()
            .chain(self.sensitive_params.iter())
            .map(|k| k.to_lowercase())
            .collect()
    }
}

impl Default for TracerConfig {
    fn default() -> Self {
        Self {
            header_name: "X-Request-ID".to_string(),
            exclude_paths: vec![
                "/health".to_string(),
                "/favicon.ico".to_string(),
                "/metrics".to_string(),
            ],
            exclude_patterns: Vec::new(),
            sensitive_headers: vec![
                "authorization".to_string(),
                "cookie".to_string(),
                "set-cookie".to_string(),
            ],
            sensitive_params: vec![
                "password".to_string(),
                "token".to_string(),
                "secret".to_string(),
                "key".to_string(),
            ],
            mask_text: "[REDACTED]".to_string(),
            log_params: true,
            log_headers: false,
            log_body: None,
            max_body_length: 1000,
            powered_by: "request-pipeline".to_string(),
            etag: "W/\"request-pipeline\"".to_string(),
        }
    }
}

/// Rate limiting configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct RateLimitConfig {
    /// Enable rate limiting.
    pub enabled: bool,

    /// Maximum requests per window per client.
    pub limit: u32,

    /// Window length in milliseconds, measured from the client's last request.
    pub window_ms: u64,

    /// Paths exempt from rate limiting (exact match or sub-path).
    pub exclude_paths: Vec<String>,

    /// Use the first `X-Forwarded-For` entry as client identity.
    pub trust_forwarded_for: bool,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            limit: 50,
            window_ms: 60_000,
            exclude_paths: vec!["/health".to_string()],
            trust_forwarded_for: false,
        }
    }
}

/// Rolling latency metrics configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct MetricsConfig {
    /// Summary interval in seconds.
    pub report_interval_secs: u64,

    /// Samples kept per `METHOD:PATH` key.
    pub series_capacity: usize,

    /// Process CPU / memory snapshot interval in seconds.
    pub performance_interval_secs: u64,
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self {
            report_interval_secs: 60,
            series_capacity: 100,
            performance_interval_secs: 300,
        }
    }
}

/// Log output format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Pretty,
    Json,
}

/// Observability configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ObservabilityConfig {
    /// Log level (trace, debug, info, warn, error).
    pub log_level: String,

    /// Output format.
    pub log_format: LogFormat,

    /// Enable Prometheus exporter.
    pub metrics_enabled: bool,

    /// Exporter bind address.
    pub metrics_address: String,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: "debug".to_string(),
            log_format: LogFormat::Pretty,
            metrics_enabled: false,
            metrics_address: "0.0.0.0:9090".to_string(),
        }
    }
}

/// Application metadata.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct AppConfig {
    /// Deployment environment name.
    pub environment: String,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            environment: "development".to_string(),
        }
    }
}

impl AppConfig {
    pub fn is_production(&self) -> bool {
        self.environment.eq_ignore_ascii_case("production")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_partial_file_keeps_defaults() {
        let config: PipelineConfig = toml::from_str(
            r#"
            [rate_limit]
            limit = 3

            [tracer]
            log_headers = true
            "#,
        )
        .unwrap();

        assert_eq!(config.rate_limit.limit, 3);
        assert_eq!(config.rate_limit.window_ms, 60_000);
        assert!(config.tracer.log_headers);
        assert!(config.tracer.log_params);
        assert_eq!(config.tracer.log_body, None);
        assert_eq!(config.tracer.header_name, "X-Request-ID");
        assert_eq!(config.metrics.series_capacity, 100);
    }

    #[test]
    fn test_sensitive_keys_are_lowercased_union() {
        let tracer = TracerConfig {
            sensitive_headers: vec!["X-Api-Token".into()],
            sensitive_params: vec!["PIN".into()],
            ..Default::default()
        };
        assert_eq!(tracer.sensitive_keys(), vec!["x-api-token", "pin"]);
    }

    #[test]
    fn test_log_format_parsing() {
        let config: PipelineConfig = toml::from_str(
            r#"
            [observability]
            log_format = "json"
            "#,
        )
        .unwrap();
        assert_eq!(config.observability.log_format, LogFormat::Json);
    }
}
