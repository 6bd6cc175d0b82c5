//! Request pipeline demo server.
//!
//! ```text
//!   Client ──▶ rate limiter ──▶ request tracer ──▶ handler
//!                  │                  │                │
//!                  ▼                  ▼                ▼
//!              400 / 429        logs + latency     response envelope
//!                                   series
//! ```

use std::path::PathBuf;
use std::sync::Arc;

use axum::{
    http::{StatusCode, Uri},
    routing::{get, post},
    Router,
};
use clap::Parser;
use serde_json::{json, Value};
use tokio::net::TcpListener;

use request_pipeline::config::load_config;
use request_pipeline::health::{health_routes, HealthReporter};
use request_pipeline::http::{ApiJson, ApiPath, Envelope, HandlerError, HttpServer};
use request_pipeline::lifecycle::{panic::install_panic_hook, signals, Shutdown};
use request_pipeline::observability::{logging, metrics};
use request_pipeline::Pipeline;

#[derive(Parser)]
#[command(name = "request-pipeline")]
#[command(about = "HTTP service with rate limiting, request tracing and latency metrics", long_about = None)]
struct Cli {
    /// Path to a TOML config file
    #[arg(short, long)]
    config: Option<PathBuf>,
}

async fn echo(ApiJson(body): ApiJson<Value>) -> Envelope<Value> {
    Envelope::with_status(StatusCode::CREATED, json!({ "echo": body }))
}

async fn item(ApiPath(id): ApiPath<u64>) -> Result<Envelope<Value>, HandlerError> {
    if id == 0 {
        return Err(HandlerError::new("Item not found")
            .with_status(StatusCode::NOT_FOUND)
            .with_payload(json!({ "code": "NOT_FOUND", "id": id })));
    }
    Ok(Envelope::ok(json!({ "id": id })))
}

async fn not_found(uri: Uri) -> HandlerError {
    HandlerError::new(format!("Cannot find {}", uri.path())).with_status(StatusCode::NOT_FOUND)
}

fn routes(health: Arc<HealthReporter>) -> Router {
    Router::new()
        .route("/api/echo", post(echo))
        .route("/api/items/{id}", get(item))
        .merge(health_routes(health))
        .fallback(not_found)
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();
    let config = load_config(cli.config.as_deref())?;

    logging::init_logging(&config.observability);
    install_panic_hook();
    tracing::info!(
        version = env!("CARGO_PKG_VERSION"),
        environment = %config.app.environment,
        "request-pipeline starting"
    );
    tracing::info!(
        bind_address = %config.listener.bind_address,
        rate_limit = config.rate_limit.limit,
        rate_window_ms = config.rate_limit.window_ms,
        log_body = config.tracer.log_body_enabled(),
        "Configuration loaded"
    );

    if config.observability.metrics_enabled {
        match config.observability.metrics_address.parse() {
            Ok(addr) => metrics::init_metrics(addr),
            Err(_) => tracing::error!(
                metrics_address = %config.observability.metrics_address,
                "Failed to parse metrics address"
            ),
        }
    }

    let pipeline = Pipeline::from_config(&config)?;
    let health = Arc::new(HealthReporter::new(
        config.app.environment.clone(),
        pipeline.performance.clone(),
    ));
    let server = HttpServer::from_pipeline(&config, pipeline, routes(health));

    let listener = TcpListener::bind(&config.listener.bind_address).await?;
    tracing::info!(address = %listener.local_addr()?, "Listening for connections");

    let shutdown = Shutdown::new();
    let trigger = shutdown.clone();
    tokio::spawn(async move {
        let signal = signals::wait_for_signal().await;
        tracing::info!(signal, "Shutdown signal received, draining connections");
        trigger.trigger();
    });

    server.run(listener, shutdown.subscribe()).await?;

    tracing::info!("Shutdown complete");
    Ok(())
}
