//! Configuration loading from disk and the process environment.

use std::fs;
use std::path::Path;

use crate::config::schema::PipelineConfig;
use crate::config::validation::{validate_config, ValidationError};

/// Error type for configuration loading.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Parse error: {0}")]
    Parse(#[from] toml::de::Error),
    #[error("Validation failed: {}", join_errors(.0))]
    Validation(Vec<ValidationError>),
}

fn join_errors(errors: &[ValidationError]) -> String {
    errors
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join(", ")
}

/// Load and validate configuration from a TOML file, then apply environment
/// overrides. Without a path the defaults are used.
pub fn load_config(path: Option<&Path>) -> Result<PipelineConfig, ConfigError> {
    let config = match path {
        Some(path) => {
            let content = fs::read_to_string(path)?;
            toml::from_str(&content)?
        }
        None => PipelineConfig::default(),
    };
    finalize(config, |key| std::env::var(key).ok())
}

/// Apply overrides from `lookup` and validate.
pub fn finalize<F>(mut config: PipelineConfig, lookup: F) -> Result<PipelineConfig, ConfigError>
where
    F: Fn(&str) -> Option<String>,
{
    let mut errors = apply_env_overrides(&mut config, lookup);
    if let Err(invalid) = validate_config(&config) {
        errors.extend(invalid);
    }
    if !errors.is_empty() {
        return Err(ConfigError::Validation(errors));
    }
    Ok(config)
}

/// Parse a numeric override, recording unparsable values against `field`.
fn parse_override<T: std::str::FromStr>(
    raw: Option<String>,
    var: &str,
    field: &'static str,
    errors: &mut Vec<ValidationError>,
) -> Option<T> {
    let raw = raw?;
    match raw.trim().parse() {
        Ok(value) => Some(value),
        Err(_) => {
            errors.push(ValidationError::new(
                field,
                format!("{}='{}' is not a valid number", var, raw),
            ));
            None
        }
    }
}

fn apply_env_overrides<F>(config: &mut PipelineConfig, lookup: F) -> Vec<ValidationError>
where
    F: Fn(&str) -> Option<String>,
{
    let mut errors = Vec::new();
    if let Some(env) = lookup("APP_ENV") {
        config.app.environment = env;
    }
    // Body capture follows the environment unless the file pinned it.
    if config.tracer.log_body.is_none() {
        config.tracer.log_body = Some(!config.app.is_production());
    }

    if let Some(bind) = lookup("PIPELINE_BIND") {
        config.listener.bind_address = bind;
    }
    if let Some(limit) = parse_override(
        lookup("PIPELINE_RATE_LIMIT"),
        "PIPELINE_RATE_LIMIT",
        "rate_limit.limit",
        &mut errors,
    ) {
        config.rate_limit.limit = limit;
    }
    if let Some(window) = parse_override(
        lookup("PIPELINE_RATE_WINDOW_MS"),
        "PIPELINE_RATE_WINDOW_MS",
        "rate_limit.window_ms",
        &mut errors,
    ) {
        config.rate_limit.window_ms = window;
    }
    if let Some(level) = lookup("PIPELINE_LOG_LEVEL") {
        config.observability.log_level = level;
    }
    errors
}
