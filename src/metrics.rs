use axum::{extract::State, http::header, response::IntoResponse, routing::get, Router};
use prometheus::{Encoder, HistogramOpts, HistogramVec, IntCounterVec, Opts, Registry, TextEncoder};
use std::future::Future;

use crate::{api::AppState, error::ServiceError};

/// Prometheus instruments for the customer service operations.
///
/// - `customers_operations_total{operation, outcome}` counts every call,
///   `outcome` being `success` or `error`
/// - `customers_operation_duration_seconds{operation}` times every call
pub struct CustomerMetrics {
    registry: Registry,
    operations: IntCounterVec,
    duration: HistogramVec,
}

impl CustomerMetrics {
    pub fn new() -> Result<Self, prometheus::Error> {
        let registry = Registry::new();

        let operations = IntCounterVec::new(
            Opts::new("customers_operations_total", "Customer service operations by outcome"),
            &["operation", "outcome"],
        )?;
        registry.register(Box::new(operations.clone()))?;

        let duration = HistogramVec::new(
            HistogramOpts::new(
                "customers_operation_duration_seconds",
                "Customer service operation latency",
            )
            .buckets(vec![0.001, 0.005, 0.01, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0]),
            &["operation"],
        )?;
        registry.register(Box::new(duration.clone()))?;

        Ok(Self { registry, operations, duration })
    }

    /// Runs `fut`, recording its latency and whether it failed.
    pub async fn track<T, E, F>(&self, operation: &'static str, fut: F) -> Result<T, E>
    where
        F: Future<Output = Result<T, E>>,
    {
        let timer = self.duration.with_label_values(&[operation]).start_timer();
        let result = fut.await;
        timer.observe_duration();

        let outcome = if result.is_ok() { "success" } else { "error" };
        self.operations.with_label_values(&[operation, outcome]).inc();
        result
    }

    /// Prometheus text exposition of every registered metric.
    pub fn render(&self) -> Result<String, ServiceError> {
        let mut buffer = Vec::new();
        TextEncoder::new()
            .encode(&self.registry.gather(), &mut buffer)
            .map_err(|e| ServiceError::internal(format!("failed to encode metrics: {e}")))?;
        String::from_utf8(buffer)
            .map_err(|e| ServiceError::internal(format!("metrics were not valid UTF-8: {e}")))
    }

    #[cfg(test)]
    pub(crate) fn count(&self, operation: &str, outcome: &str) -> u64 {
        self.operations.with_label_values(&[operation, outcome]).get()
    }

    #[cfg(test)]
    pub(crate) fn timed(&self, operation: &str) -> u64 {
        self.duration.with_label_values(&[operation]).get_sample_count()
    }
}

pub fn routes() -> Router<AppState> {
    Router::new().route("/metrics", get(scrape))
}

async fn scrape(State(state): State<AppState>) -> Result<impl IntoResponse, ServiceError> {
    let body = state.customers.metrics().render()?;
    Ok(([(header::CONTENT_TYPE, "text/plain; version=0.0.4")], body))
}
