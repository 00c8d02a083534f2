//! Application state management for the exporter.
//!
//! This module defines the shared application state that is passed
//! to HTTP handlers and the wiring that turns a [`Config`] into a collector.

use herakles_conntrack_exporter::{
    AccumulatorStore, ConnectionSource, ConntrackCollector, FileWorkloadLister, HealthStats,
    ProcConntrackSource, StaticWorkloadLister, WorkloadLister,
};
use prometheus::Registry;
use std::sync::Arc;
use std::time::Instant;

use crate::config::Config;
use crate::metrics::ExporterMetrics;

/// Type alias for shared application state.
pub type SharedState = Arc<AppState>;

/// Global application state shared across requests and background tasks.
pub struct AppState {
    pub registry: Registry,
    pub metrics: ExporterMetrics,
    pub collector: ConntrackCollector,
    pub config: Arc<Config>,
    pub health_stats: Arc<HealthStats>,
    /// Server start time for uptime calculation.
    pub start_time: Instant,
}

/// Picks the workload source: a watched file when configured, the inline list otherwise.
pub fn build_lister(config: &Config) -> Arc<dyn WorkloadLister> {
    let kind = config.workload_kind();
    match &config.workloads_file {
        Some(path) => Arc::new(FileWorkloadLister::new(kind, path.clone())),
        None => Arc::new(StaticWorkloadLister::new(
            kind,
            config.workloads.clone().unwrap_or_default(),
        )),
    }
}

pub fn build_source(config: &Config) -> Arc<dyn ConnectionSource> {
    Arc::new(ProcConntrackSource::new(config.conntrack_path()))
}

/// Builds a collector over a fresh store from the effective configuration.
pub fn build_collector(config: &Config) -> ConntrackCollector {
    ConntrackCollector::new(
        build_lister(config),
        build_source(config),
        Arc::new(AccumulatorStore::new()),
        config.workload_labels(),
    )
    .with_fetch_timeout(config.fetch_timeout())
}
