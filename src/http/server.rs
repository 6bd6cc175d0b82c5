//! HTTP server setup.
//!
//! # Responsibilities
//! - Apply transport limits (request timeout, body size) to the routes
//! - Wrap the limited routes with the request pipeline, so timed-out
//!   requests still get a summary line and correlation headers
//! - Serve with client address info and graceful shutdown
//! - Run the latency and performance reporters for the lifetime of the server

use std::net::SocketAddr;
use std::time::Duration;

use axum::{extract::DefaultBodyLimit, Router};
use tokio::net::TcpListener;
use tokio::sync::broadcast;
use tower_http::timeout::TimeoutLayer;

use crate::config::PipelineConfig;
use crate::http::tracer::TraceError;
use crate::pipeline::Pipeline;

/// HTTP server running application routes behind the request pipeline.
pub struct HttpServer {
    router: Router,
    pipeline: Pipeline,
}

impl HttpServer {
    pub fn new(config: &PipelineConfig, routes: Router) -> Result<Self, TraceError> {
        let pipeline = Pipeline::from_config(config)?;
        Ok(Self::from_pipeline(config, pipeline, routes))
    }

    /// Build around an existing pipeline, e.g. one whose state is shared with routes.
    pub fn from_pipeline(config: &PipelineConfig, pipeline: Pipeline, routes: Router) -> Self {
        let router = Self::build_router(config, &pipeline, routes);
        Self { router, pipeline }
    }

    #[allow(deprecated)]
    fn build_router(config: &PipelineConfig, pipeline: &Pipeline, routes: Router) -> Router {
        let limited = routes
            .layer(DefaultBodyLimit::max(config.listener.max_body_bytes))
            .layer(TimeoutLayer::new(Duration::from_secs(
                config.listener.request_timeout_secs,
            )));
        pipeline.apply(limited)
    }

    pub fn pipeline(&self) -> &Pipeline {
        &self.pipeline
    }

    /// The fully layered router, for in-process testing.
    pub fn router(&self) -> Router {
        self.router.clone()
    }

    /// Serve on `listener` until `shutdown` fires.
    pub async fn run(
        self,
        listener: TcpListener,
        mut shutdown: broadcast::Receiver<()>,
    ) -> Result<(), std::io::Error> {
        tracing::info!(address = %listener.local_addr()?, "HTTP server starting");

        let reporters = self.pipeline.spawn_reporters(&shutdown);
        let app = self.router.into_make_service_with_connect_info::<SocketAddr>();

        axum::serve(listener, app)
            .with_graceful_shutdown(async move {
                let _ = shutdown.recv().await;
            })
            .await?;

        for reporter in reporters {
            let _ = reporter.await;
        }
        tracing::info!("HTTP server stopped");
        Ok(())
    }
}
