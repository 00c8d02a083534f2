//! Metrics endpoint handler for Prometheus scraping.
//!
//! This module provides the `/metrics` endpoint handler. Every request runs
//! one collection cycle and returns the connection series together with the
//! exporter's own metrics in Prometheus text format.

use axum::{extract::State, http::StatusCode, response::IntoResponse};
use herakles_conntrack_exporter::exposition::to_metric_families;
use herakles_conntrack_exporter::{CollectError, CollectOutcome};
use prometheus::proto::MetricFamily;
use prometheus::{Encoder, TextEncoder};
use std::time::Instant;
use tracing::{debug, error, instrument};

use crate::state::{AppState, SharedState};

/// Buffer capacity for metrics encoding.
const BUFFER_CAP: usize = 64 * 1024;

/// Error type for metrics endpoint failures.
#[derive(Debug)]
pub enum MetricsError {
    EncodingFailed,
}

impl IntoResponse for MetricsError {
    fn into_response(self) -> axum::response::Response {
        (
            StatusCode::INTERNAL_SERVER_ERROR,
            "Failed to encode metrics",
        )
            .into_response()
    }
}

/// Handler for the /metrics endpoint.
#[instrument(skip(state))]
pub async fn metrics_handler(State(state): State<SharedState>) -> Result<String, MetricsError> {
    let start = Instant::now();
    debug!("Processing /metrics request");

    state.health_stats.record_metrics_endpoint_call();
    state.health_stats.record_http_request();

    let connection_families = match state.collector.collect().await {
        Ok(outcome) => {
            let families = to_metric_families(&outcome.samples).map_err(|e| {
                error!("Failed to build connection metrics: {}", e);
                MetricsError::EncodingFailed
            })?;
            record_success(&state, &outcome, start.elapsed().as_secs_f64());
            families
        }
        Err(e) => {
            // No connection series this scrape; the store keeps its previous state.
            error!("Collection cycle failed: {}", e);
            record_failure(&state, &e, start.elapsed().as_secs_f64());
            Vec::new()
        }
    };

    let store_stats = state.collector.store().stats();
    state.metrics.tracked_series.set(store_stats.tracked as i64);
    state.metrics.sync_reaped(state.health_stats.reaped_series());

    let serialize_start = Instant::now();
    let mut families: Vec<MetricFamily> = if state.config.enable_telemetry.unwrap_or(true) {
        state.registry.gather()
    } else {
        Vec::new()
    };
    families.extend(connection_families);

    let mut buffer = Vec::with_capacity(BUFFER_CAP);
    let encoder = TextEncoder::new();

    if encoder.encode(&families, &mut buffer).is_err() {
        error!("Failed to encode Prometheus metrics");
        return Err(MetricsError::EncodingFailed);
    }

    let serialization_ms = serialize_start.elapsed().as_secs_f64() * 1000.0;
    state
        .health_stats
        .record_serialization_duration_ms(serialization_ms);
    state
        .health_stats
        .record_metrics_response_size_kb(buffer.len() as f64 / 1024.0);

    debug!(
        "Metrics request completed: {} series tracked, {} bytes, {:.3}ms",
        store_stats.tracked,
        buffer.len(),
        start.elapsed().as_secs_f64() * 1000.0
    );

    String::from_utf8(buffer).map_err(|_| MetricsError::EncodingFailed)
}

fn record_success(state: &AppState, outcome: &CollectOutcome, duration_s: f64) {
    state.metrics.scrape_duration_seconds.set(duration_s);
    state.metrics.scrape_success.set(1);
    state.metrics.workloads.set(outcome.workloads as i64);
    state.metrics.connections.set(outcome.connections as i64);
    state.health_stats.record_scrape(
        outcome.workloads as u64,
        outcome.connections as u64,
        outcome.samples.len() as u64,
        duration_s,
    );
}

fn record_failure(state: &AppState, err: &CollectError, duration_s: f64) {
    state.metrics.scrape_duration_seconds.set(duration_s);
    state.metrics.scrape_success.set(0);
    if matches!(err, CollectError::Timeout { .. }) {
        state.health_stats.record_fetch_timeout();
    }
    state.health_stats.record_scrape_failure();
}
