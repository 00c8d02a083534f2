//! Prometheus self metrics for herakles-conntrack-exporter.
//!
//! Connection series are built per scrape from the accumulator store and are
//! not registered here. This registry only carries the exporter's own gauges.

use prometheus::{Gauge, IntCounter, IntGauge, Registry};

/// Exporter self-observation metrics.
#[derive(Clone)]
pub struct ExporterMetrics {
    pub scrape_duration_seconds: Gauge,
    pub scrape_success: IntGauge,
    pub workloads: IntGauge,
    pub connections: IntGauge,
    pub tracked_series: IntGauge,
    pub reaped_series_total: IntCounter,
}

impl ExporterMetrics {
    /// Creates and registers all self metrics with the registry.
    pub fn new(registry: &Registry) -> Result<Self, Box<dyn std::error::Error>> {
        let scrape_duration_seconds = Gauge::new(
            "herakles_conntrack_exporter_scrape_duration_seconds",
            "Duration of the last collection cycle in seconds",
        )?;
        let scrape_success = IntGauge::new(
            "herakles_conntrack_exporter_scrape_success",
            "Whether the last collection cycle succeeded (1) or failed (0)",
        )?;
        let workloads = IntGauge::new(
            "herakles_conntrack_exporter_workloads",
            "Number of workloads returned by the workload source in the last cycle",
        )?;
        let connections = IntGauge::new(
            "herakles_conntrack_exporter_connections",
            "Number of conntrack entries read in the last cycle",
        )?;
        let tracked_series = IntGauge::new(
            "herakles_conntrack_exporter_tracked_series",
            "Number of connection series currently tracked for eviction",
        )?;
        let reaped_series_total = IntCounter::new(
            "herakles_conntrack_exporter_reaped_series_total",
            "Total number of connection series evicted after the retention period",
        )?;

        registry.register(Box::new(scrape_duration_seconds.clone()))?;
        registry.register(Box::new(scrape_success.clone()))?;
        registry.register(Box::new(workloads.clone()))?;
        registry.register(Box::new(connections.clone()))?;
        registry.register(Box::new(tracked_series.clone()))?;
        registry.register(Box::new(reaped_series_total.clone()))?;

        Ok(Self {
            scrape_duration_seconds,
            scrape_success,
            workloads,
            connections,
            tracked_series,
            reaped_series_total,
        })
    }

    /// Brings the reaped-series counter up to `total`, the reaper's running count.
    pub fn sync_reaped(&self, total: u64) {
        let current = self.reaped_series_total.get();
        if total > current {
            self.reaped_series_total.inc_by(total - current);
        }
    }
}
