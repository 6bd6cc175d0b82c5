//! Request pipeline assembly.
//!
//! Owns the process-local state (rate records, latency series, resource
//! sampler) and wires the middleware onto a router in order:
//! rate limiter → request tracer → handlers.

use std::sync::Arc;
use std::time::Duration;

use axum::{middleware, Router};
use tokio::sync::broadcast;
use tokio::task::JoinHandle;

use crate::config::PipelineConfig;
use crate::http::tracer::{trace_middleware, RequestTracer, TraceError};
use crate::observability::{MetricsAggregator, PerformanceMonitor};
use crate::security::rate_limit::{rate_limit_middleware, RateLimiter};

/// Shared pipeline state, built once at startup.
#[derive(Clone)]
pub struct Pipeline {
    pub tracer: Arc<RequestTracer>,
    pub limiter: Arc<RateLimiter>,
    pub metrics: Arc<MetricsAggregator>,
    pub performance: Arc<PerformanceMonitor>,
    rate_limit_enabled: bool,
    report_interval: Duration,
    performance_interval: Duration,
}

impl Pipeline {
    pub fn from_config(config: &PipelineConfig) -> Result<Self, TraceError> {
        let metrics = Arc::new(MetricsAggregator::new(config.metrics.series_capacity));
        let tracer = Arc::new(
            RequestTracer::new(&config.tracer, metrics.clone())?
                .with_body_limit(config.listener.max_body_bytes),
        );
        let limiter = Arc::new(RateLimiter::new(&config.rate_limit));

        Ok(Self {
            tracer,
            limiter,
            metrics,
            performance: Arc::new(PerformanceMonitor::new()),
            rate_limit_enabled: config.rate_limit.enabled,
            report_interval: Duration::from_secs(config.metrics.report_interval_secs),
            performance_interval: Duration::from_secs(config.metrics.performance_interval_secs),
        })
    }

    /// Wrap every route of `router` with the pipeline middleware.
    pub fn apply<S>(&self, router: Router<S>) -> Router<S>
    where
        S: Clone + Send + Sync + 'static,
    {
        // Layers added later run first.
        let router = router.layer(middleware::from_fn_with_state(
            self.tracer.clone(),
            trace_middleware,
        ));
        if self.rate_limit_enabled {
            router.layer(middleware::from_fn_with_state(
                self.limiter.clone(),
                rate_limit_middleware,
            ))
        } else {
            router
        }
    }

    /// Start the periodic latency summarizer and performance snapshots.
    pub fn spawn_reporters(&self, shutdown: &broadcast::Receiver<()>) -> Vec<JoinHandle<()>> {
        vec![
            tokio::spawn(
                self.metrics
                    .clone()
                    .run(self.report_interval, shutdown.resubscribe()),
            ),
            tokio::spawn(
                self.performance
                    .clone()
                    .run(self.performance_interval, shutdown.resubscribe()),
            ),
        ]
    }
}
