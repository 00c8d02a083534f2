//! CLI arguments and subcommands for herakles-conntrack-exporter.
//!
//! This module defines the command-line interface structure using the clap library,
//! including all flags, options, and subcommands.

use clap::{Parser, Subcommand, ValueEnum};
use std::net::IpAddr;
use std::path::PathBuf;

/// Log level options for CLI parsing
#[derive(Debug, Clone, ValueEnum)]
pub enum LogLevel {
    Off,
    Error,
    Warn,
    Info,
    Debug,
    Trace,
}

/// Configuration format options for output
#[derive(Debug, Clone, ValueEnum)]
pub enum ConfigFormat {
    Yaml,
    Json,
    Toml,
}

/// Main CLI arguments structure
#[derive(Parser, Debug)]
#[command(
    name = "herakles-conntrack-exporter",
    about = "Prometheus exporter for per-workload connection tracking",
    long_about = "Prometheus exporter for per-workload connection tracking.\n\n\
                  Correlates the kernel connection-tracking table with the addresses of \
                  locally running workloads and exports live connection counts by state, \
                  protocol and remote endpoint. Closed connections are reported as zero \
                  once and evicted after a retention period.",
    author = "Michael Moll <exporter@herakles.now> - Herakles",
    version = "0.1.0",
    propagate_version = true,
    after_help = "Project: https://github.com/cansp-dev/herakles-conntrack-exporter - More info: https://www.herakles.now - Support: exporter@herakles.now"
)]
pub struct Args {
    #[command(subcommand)]
    pub command: Option<Commands>,

    /// HTTP listen port
    #[arg(short = 'p', long)]
    pub port: Option<u16>,

    /// Bind to specific interface/IP
    #[arg(long)]
    pub bind: Option<IpAddr>,

    /// Log level (overrides log_level from the config file; default info)
    #[arg(long, value_enum)]
    pub log_level: Option<LogLevel>,

    /// Config file (YAML/JSON/TOML)
    #[arg(short = 'c', long)]
    pub config: Option<PathBuf>,

    /// Disable all config file loading
    #[arg(long)]
    pub no_config: bool,

    /// Print effective merged config and exit
    #[arg(long)]
    pub show_config: bool,

    /// Print only the loaded user config file + full path and exit
    #[arg(long)]
    pub show_user_config: bool,

    /// Output format for --show-config*
    #[arg(long, value_enum, default_value = "yaml")]
    pub config_format: ConfigFormat,

    /// Validate config and exit (return code 1 on error)
    #[arg(long)]
    pub check_config: bool,

    /// Path to the kernel connection-tracking table
    #[arg(long)]
    pub conntrack_path: Option<PathBuf>,

    /// YAML/JSON file listing the workloads, re-read on every scrape
    #[arg(short = 'w', long)]
    pub workloads_file: Option<PathBuf>,

    /// Label name carrying the workload name (e.g. container, pod, vm)
    #[arg(long)]
    pub workload_kind: Option<String>,

    /// Workload metadata keys exported as label_<key> (comma-separated)
    #[arg(long)]
    pub workload_labels: Option<String>,

    /// Timeout in seconds for a single workload or connection fetch
    #[arg(long)]
    pub fetch_timeout: Option<u64>,

    /// Seconds a series may stay at zero before it is evicted
    #[arg(long)]
    pub retention: Option<u64>,

    /// Seconds between eviction sweeps
    #[arg(long)]
    pub reap_interval: Option<u64>,

    /// Disable /health endpoint
    #[arg(long)]
    pub disable_health: bool,

    /// Disable internal herakles_conntrack_exporter_* metrics
    #[arg(long)]
    pub disable_telemetry: bool,

    /// Enable TLS/SSL for HTTPS
    #[arg(long)]
    pub enable_tls: bool,

    /// Path to TLS certificate file (PEM format)
    #[arg(long)]
    pub tls_cert: Option<PathBuf>,

    /// Path to TLS private key file (PEM format)
    #[arg(long)]
    pub tls_key: Option<PathBuf>,
}

/// Subcommands for additional functionality
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Validate configuration and system requirements
    Check {
        /// Check the conntrack table
        #[arg(long)]
        conntrack: bool,

        /// Check the workload source
        #[arg(long)]
        workloads: bool,

        /// Check all system requirements
        #[arg(long)]
        all: bool,
    },

    /// Generate configuration files
    Config {
        /// Output file path
        #[arg(short = 'o', long)]
        output: Option<PathBuf>,

        /// Output format
        #[arg(long, value_enum, default_value = "yaml")]
        format: ConfigFormat,

        /// Include comments and examples
        #[arg(long)]
        commented: bool,
    },

    /// Test metrics collection
    Test {
        /// Number of test iterations
        #[arg(short = 'n', long, default_value_t = 1)]
        iterations: usize,

        /// Seconds to wait between iterations
        #[arg(long, default_value_t = 0)]
        interval: u64,

        /// Print every sample, zero values included
        #[arg(long)]
        verbose: bool,
    },
}

/// Splits a comma-separated CLI list, dropping empty entries.
pub fn split_list(value: &str) -> Vec<String> {
    value
        .split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(String::from)
        .collect()
}
