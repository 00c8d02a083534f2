//! Configuration display endpoint handler.
//!
//! This module provides the `/config` endpoint handler that displays
//! the effective exporter configuration as YAML.

use axum::{extract::State, http::StatusCode, response::IntoResponse};
use std::fmt::Write as FmtWrite;
use tracing::{debug, error, instrument};

use crate::handlers::health::FOOTER_TEXT;
use crate::state::SharedState;

/// Handler for the /config endpoint.
#[instrument(skip(state))]
pub async fn config_handler(State(state): State<SharedState>) -> impl IntoResponse {
    debug!("Processing /config request");

    // Track HTTP request
    state.health_stats.record_http_request();

    let yaml = match serde_yaml::to_string(state.config.as_ref()) {
        Ok(yaml) => yaml,
        Err(e) => {
            error!("Failed to serialize configuration: {}", e);
            return (
                StatusCode::INTERNAL_SERVER_ERROR,
                [("Content-Type", "text/plain; charset=utf-8")],
                "Failed to serialize configuration".to_string(),
            );
        }
    };

    let mut out = String::new();
    writeln!(out, "# HERAKLES CONNTRACK EXPORTER - CONFIGURATION").ok();
    writeln!(out, "# effective values (CLI > config file > defaults)").ok();
    writeln!(out).ok();
    out.push_str(&yaml);
    writeln!(out).ok();
    writeln!(out, "# {}", FOOTER_TEXT).ok();

    (
        StatusCode::OK,
        [("Content-Type", "text/plain; charset=utf-8")],
        out,
    )
}
