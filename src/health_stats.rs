//! Health statistics and monitoring for the exporter.
//!
//! This module provides types and functionality for tracking exporter health,
//! including scrape performance, fetch failures, series eviction and HTTP
//! request metrics.

use chrono::{DateTime, Local};
use std::collections::VecDeque;
use std::fmt::Write as FmtWrite;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Mutex, RwLock as StdRwLock};
use std::time::Instant;

/// Running statistics for a single metric.
#[derive(Clone, Copy, Default)]
pub struct RunningStat {
    count: u64,
    sum: f64,
    min: f64,
    max: f64,
    last: f64,
}

impl RunningStat {
    pub fn add(&mut self, value: f64) {
        if self.count == 0 {
            self.min = value;
            self.max = value;
            self.last = value;
            self.sum = value;
            self.count = 1;
            return;
        }
        self.count += 1;
        self.sum += value;
        self.last = value;
        if value < self.min {
            self.min = value;
        }
        if value > self.max {
            self.max = value;
        }
    }

    pub fn avg(&self) -> f64 {
        if self.count == 0 {
            0.0
        } else {
            self.sum / (self.count as f64)
        }
    }
}

/// Thread-safe wrapper for running statistics.
#[derive(Default)]
pub struct Stat {
    inner: Mutex<RunningStat>,
}

impl Stat {
    pub fn add_sample(&self, value: f64) {
        if let Ok(mut s) = self.inner.lock() {
            s.add(value);
        }
    }

    /// Returns `(last, avg, max, min, count)`.
    pub fn snapshot(&self) -> (f64, f64, f64, f64, u64) {
        if let Ok(s) = self.inner.lock() {
            (s.last, s.avg(), s.max, s.min, s.count)
        } else {
            (0.0, 0.0, 0.0, 0.0, 0)
        }
    }
}

/// Thread-safe circular buffer for tracking HTTP request timestamps.
pub struct RequestTimestamps {
    inner: Mutex<VecDeque<Instant>>,
}

impl Default for RequestTimestamps {
    fn default() -> Self {
        Self {
            inner: Mutex::new(VecDeque::with_capacity(1024)),
        }
    }
}

impl RequestTimestamps {
    pub fn record(&self) {
        if let Ok(mut guard) = self.inner.lock() {
            guard.push_back(Instant::now());
            // Keep only last 10 minutes of timestamps to avoid unbounded growth
            let cutoff = Instant::now() - std::time::Duration::from_secs(600);
            while guard.front().is_some_and(|&t| t < cutoff) {
                guard.pop_front();
            }
        }
    }

    pub fn count_last_minute(&self) -> u64 {
        if let Ok(guard) = self.inner.lock() {
            let cutoff = Instant::now() - std::time::Duration::from_secs(60);
            guard.iter().filter(|&&t| t >= cutoff).count() as u64
        } else {
            0
        }
    }
}

/// Exporter self-observation, shared by the HTTP handlers and the reaper.
pub struct HealthStats {
    // Scrape performance
    pub scrape_duration_seconds: Stat,
    pub workloads_listed: Stat,
    pub connections_read: Stat,
    pub exported_series: Stat,
    pub total_scrapes: AtomicU64,
    pub scrape_success_count: AtomicU64,
    pub scrape_failure_count: AtomicU64,
    pub fetch_timeouts: AtomicU64,

    // Eviction
    pub reap_runs: AtomicU64,
    pub reaped_series_total: AtomicU64,

    // HTTP server stats
    pub http_request_timestamps: RequestTimestamps,
    pub metrics_endpoint_calls: AtomicU64,
    pub serialization_duration_ms: Stat,
    pub metrics_response_size_kb: Stat,

    // Timing
    pub start_time: Instant,
    pub last_scrape_time: StdRwLock<Option<DateTime<Local>>>,
}

impl Default for HealthStats {
    fn default() -> Self {
        Self {
            scrape_duration_seconds: Stat::default(),
            workloads_listed: Stat::default(),
            connections_read: Stat::default(),
            exported_series: Stat::default(),
            total_scrapes: AtomicU64::new(0),
            scrape_success_count: AtomicU64::new(0),
            scrape_failure_count: AtomicU64::new(0),
            fetch_timeouts: AtomicU64::new(0),
            reap_runs: AtomicU64::new(0),
            reaped_series_total: AtomicU64::new(0),
            http_request_timestamps: RequestTimestamps::default(),
            metrics_endpoint_calls: AtomicU64::new(0),
            serialization_duration_ms: Stat::default(),
            metrics_response_size_kb: Stat::default(),
            start_time: Instant::now(),
            last_scrape_time: StdRwLock::new(None),
        }
    }
}

impl HealthStats {
    pub fn new() -> Self {
        Default::default()
    }

    /// Records a successful collection cycle.
    pub fn record_scrape(
        &self,
        workloads: u64,
        connections: u64,
        series: u64,
        duration_seconds: f64,
    ) {
        self.workloads_listed.add_sample(workloads as f64);
        self.connections_read.add_sample(connections as f64);
        self.exported_series.add_sample(series as f64);
        self.scrape_duration_seconds.add_sample(duration_seconds);
        self.total_scrapes.fetch_add(1, Ordering::Relaxed);
        self.scrape_success_count.fetch_add(1, Ordering::Relaxed);
        if let Ok(mut guard) = self.last_scrape_time.write() {
            *guard = Some(Local::now());
        }
    }

    pub fn record_scrape_failure(&self) {
        self.total_scrapes.fetch_add(1, Ordering::Relaxed);
        self.scrape_failure_count.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_fetch_timeout(&self) {
        self.fetch_timeouts.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_reap(&self, removed: u64) {
        self.reap_runs.fetch_add(1, Ordering::Relaxed);
        self.reaped_series_total.fetch_add(removed, Ordering::Relaxed);
    }

    pub fn record_http_request(&self) {
        self.http_request_timestamps.record();
    }

    pub fn record_metrics_endpoint_call(&self) {
        self.metrics_endpoint_calls.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_serialization_duration_ms(&self, duration_ms: f64) {
        self.serialization_duration_ms.add_sample(duration_ms);
    }

    pub fn record_metrics_response_size_kb(&self, size_kb: f64) {
        self.metrics_response_size_kb.add_sample(size_kb);
    }

    pub fn reaped_series(&self) -> u64 {
        self.reaped_series_total.load(Ordering::Relaxed)
    }

    pub fn has_successful_scrape(&self) -> bool {
        self.scrape_success_count.load(Ordering::Relaxed) > 0
    }

    pub fn get_scrape_success_rate(&self) -> f64 {
        let success = self.scrape_success_count.load(Ordering::Relaxed);
        let failure = self.scrape_failure_count.load(Ordering::Relaxed);
        let total = success + failure;
        if total == 0 {
            100.0
        } else {
            (success as f64 / total as f64) * 100.0
        }
    }

    pub fn get_uptime_hours(&self) -> f64 {
        self.start_time.elapsed().as_secs_f64() / 3600.0
    }

    pub fn get_uptime_seconds(&self) -> u64 {
        self.start_time.elapsed().as_secs()
    }

    pub fn get_last_scrape_time_str(&self) -> String {
        match self.last_scrape_time.read() {
            Ok(guard) => guard
                .map(|t| t.format("%H:%M:%S").to_string())
                .unwrap_or_else(|| "N/A".to_string()),
            Err(_) => "N/A".to_string(),
        }
    }

    pub fn render_table(&self) -> String {
        let total = self.total_scrapes.load(Ordering::Relaxed);
        let failures = self.scrape_failure_count.load(Ordering::Relaxed);
        let timeouts = self.fetch_timeouts.load(Ordering::Relaxed);
        let reap_runs = self.reap_runs.load(Ordering::Relaxed);
        let reaped = self.reaped_series();
        let success_rate = self.get_scrape_success_rate();
        let http_requests_last_minute = self.http_request_timestamps.count_last_minute();
        let metrics_calls = self.metrics_endpoint_calls.load(Ordering::Relaxed);
        let uptime_hours = self.get_uptime_hours();
        let last_scrape = self.get_last_scrape_time_str();

        let mut out = String::new();

        writeln!(out, "HEALTH ENDPOINT - EXPORTER INTERNAL STATS").ok();
        writeln!(out, "==========================================").ok();
        writeln!(out).ok();

        writeln!(
            out,
            "{:left$} | {:^col$} | {:^col$} | {:^col$} | {:^col$}",
            "",
            "current",
            "average",
            "max",
            "min",
            left = LEFT_COL,
            col = COL_W
        )
        .ok();

        writeln!(out).ok();
        writeln!(out, "SCRAPE PERFORMANCE").ok();
        writeln!(out, "------------------").ok();
        stat_row(&mut out, "workloads", &self.workloads_listed, 0);
        stat_row(&mut out, "connections", &self.connections_read, 0);
        stat_row(&mut out, "exported_series", &self.exported_series, 0);
        stat_row(&mut out, "scrape_duration (s)", &self.scrape_duration_seconds, 3);
        value_row(&mut out, "scrape_success_rate (%)", format!("{:.1}", success_rate));

        writeln!(out).ok();
        writeln!(out, "SERIES EVICTION").ok();
        writeln!(out, "---------------").ok();
        value_row(&mut out, "reaper_runs", reap_runs.to_string());
        value_row(&mut out, "reaped_series_total", reaped.to_string());

        writeln!(out).ok();
        writeln!(out, "HTTP SERVER").ok();
        writeln!(out, "-----------").ok();
        value_row(
            &mut out,
            "http_requests_last_minute",
            http_requests_last_minute.to_string(),
        );
        stat_row(
            &mut out,
            "serialization (ms)",
            &self.serialization_duration_ms,
            2,
        );
        stat_row(&mut out, "response_size (KB)", &self.metrics_response_size_kb, 1);

        writeln!(out).ok();
        writeln!(out, "SUMMARY").ok();
        writeln!(out, "-------").ok();
        writeln!(out, "total_scrapes:           {}", total).ok();
        writeln!(out, "failed_scrapes:          {}", failures).ok();
        writeln!(out, "fetch_timeouts:          {}", timeouts).ok();
        writeln!(out, "metrics_endpoint_calls:  {}", metrics_calls).ok();
        writeln!(out, "last_successful_scrape:  {}", last_scrape).ok();
        writeln!(out, "uptime_hours:            {:.2}", uptime_hours).ok();

        out
    }
}

const LEFT_COL: usize = 26;
const COL_W: usize = 12;

fn stat_row(out: &mut String, name: &str, stat: &Stat, precision: usize) {
    let (cur, avg, max, min, _count) = stat.snapshot();
    writeln!(
        out,
        "{:left$} | {:^col$} | {:^col$} | {:^col$} | {:^col$}",
        name,
        format!("{:.p$}", cur, p = precision),
        format!("{:.p$}", avg, p = precision.max(1)),
        format!("{:.p$}", max, p = precision),
        format!("{:.p$}", min, p = precision),
        left = LEFT_COL,
        col = COL_W
    )
    .ok();
}

fn value_row(out: &mut String, name: &str, value: String) {
    writeln!(
        out,
        "{:left$} | {:^col$} | {:^col$} | {:^col$} | {:^col$}",
        name,
        value,
        "N/A",
        "N/A",
        "N/A",
        left = LEFT_COL,
        col = COL_W
    )
    .ok();
}
