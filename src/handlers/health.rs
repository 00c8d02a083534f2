//! Health check endpoint handler.
//!
//! This module provides the `/health` endpoint handler that returns
//! exporter health statistics and the state of the accumulator store.

use axum::{extract::State, http::StatusCode, response::IntoResponse};
use herakles_conntrack_exporter::StoreStats;
use std::fmt::Write as FmtWrite;
use tracing::{debug, instrument};

use crate::state::SharedState;

// Time conversion constants
const SECONDS_PER_HOUR: f64 = 3600.0;
const MINUTES_PER_HOUR: f64 = 60.0;
const HOURS_PER_DAY: f64 = 24.0;

/// Footer text for human-readable HTTP endpoints.
pub const FOOTER_TEXT: &str = "Project: https://github.com/cansp-dev/herakles-conntrack-exporter - More info: https://www.herakles.now - Support: exporter@herakles.now";

/// Handler for the /health endpoint.
#[instrument(skip(state))]
pub async fn health_handler(State(state): State<SharedState>) -> impl IntoResponse {
    debug!("Processing /health request");

    // Track HTTP request for health endpoint
    state.health_stats.record_http_request();

    // Healthy once a collection cycle has completed
    let status = if state.health_stats.has_successful_scrape() {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };

    let message = if status == StatusCode::OK {
        "OK"
    } else {
        "No successful scrape yet"
    };

    // Calculate uptime
    let uptime_seconds = state.health_stats.get_uptime_seconds();
    let uptime_hours = uptime_seconds as f64 / SECONDS_PER_HOUR;
    let uptime_str = if uptime_hours < 1.0 {
        format!("{:.1} minutes", uptime_hours * MINUTES_PER_HOUR)
    } else if uptime_hours < HOURS_PER_DAY {
        format!("{:.1} hours", uptime_hours)
    } else {
        format!("{:.1} days", uptime_hours / HOURS_PER_DAY)
    };

    let table = state.health_stats.render_table();
    let store_section = render_store(&state.collector.store().stats());

    debug!("Health check: {} - {}", status, message);
    (
        status,
        [("Content-Type", "text/plain; charset=utf-8")],
        format!("{message}\n\nUptime: {uptime_str}\n\n{table}\n{store_section}\n{FOOTER_TEXT}"),
    )
}

/// Renders accumulator store sizes as a plain-text table.
fn render_store(stats: &StoreStats) -> String {
    let mut out = String::new();
    writeln!(out, "ACCUMULATOR STORE").ok();
    writeln!(out, "=================").ok();
    writeln!(out).ok();
    writeln!(out, "{:25} | {:>10}", "workloads", stats.workloads).ok();
    writeln!(out, "{:25} | {:>10}", "series", stats.series).ok();
    writeln!(out, "{:25} | {:>10}", "tracked_series", stats.tracked).ok();
    out
}
