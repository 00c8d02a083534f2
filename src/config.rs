//! Configuration management for herakles-conntrack-exporter.
//!
//! This module handles loading, merging, and validating configuration from files
//! and CLI arguments. It supports YAML, JSON, and TOML formats.

use crate::cli::{split_list, Args, ConfigFormat, LogLevel};
use clap::ValueEnum;
use herakles_conntrack_exporter::conntrack::DEFAULT_CONNTRACK_PATH;
use herakles_conntrack_exporter::exposition::{sanitize_label_name, ID_LABEL, TUPLE_LABELS};
use herakles_conntrack_exporter::reaper::ReaperConfig;
use herakles_conntrack_exporter::workload::{Workload, DEFAULT_WORKLOAD_KIND};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::info;

// Default configuration constants
pub const DEFAULT_BIND_ADDR: &str = "0.0.0.0";
pub const DEFAULT_PORT: u16 = 9216;
pub const DEFAULT_FETCH_TIMEOUT_SECONDS: u64 = 5;
pub const DEFAULT_RETENTION_SECONDS: u64 = 1800;
pub const DEFAULT_REAP_INTERVAL_SECONDS: u64 = 60;

/// Enhanced configuration structure
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    // Server configuration
    pub port: Option<u16>,
    pub bind: Option<String>,

    // Connection source
    #[serde(alias = "conntrack-path")]
    pub conntrack_path: Option<PathBuf>,

    // Workload source
    /// Label name carrying the workload name
    #[serde(alias = "workload-kind")]
    pub workload_kind: Option<String>,
    /// YAML/JSON file re-read on every scrape
    #[serde(alias = "workloads-file")]
    pub workloads_file: Option<PathBuf>,
    /// Metadata keys surfaced as label_<key>
    #[serde(alias = "workload-labels")]
    pub workload_labels: Option<Vec<String>>,

    // Timing
    #[serde(alias = "fetch-timeout-seconds")]
    pub fetch_timeout_seconds: Option<u64>,
    #[serde(alias = "retention-seconds")]
    pub retention_seconds: Option<u64>,
    #[serde(alias = "reap-interval-seconds")]
    pub reap_interval_seconds: Option<u64>,

    // Feature flags
    pub enable_health: Option<bool>,
    pub enable_telemetry: Option<bool>,

    // Logging
    pub log_level: Option<String>,

    // TLS/SSL Configuration
    #[serde(alias = "enable-tls")]
    pub enable_tls: Option<bool>,
    #[serde(alias = "tls-cert-path")]
    pub tls_cert_path: Option<String>,
    #[serde(alias = "tls-key-path")]
    pub tls_key_path: Option<String>,

    // Inline workloads. Kept last so TOML output places the tables after the values.
    pub workloads: Option<Vec<Workload>>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            bind: Some(DEFAULT_BIND_ADDR.to_string()),
            port: Some(DEFAULT_PORT),
            conntrack_path: Some(PathBuf::from(DEFAULT_CONNTRACK_PATH)),
            workload_kind: Some(DEFAULT_WORKLOAD_KIND.to_string()),
            workloads_file: None,
            workload_labels: None,
            fetch_timeout_seconds: Some(DEFAULT_FETCH_TIMEOUT_SECONDS),
            retention_seconds: Some(DEFAULT_RETENTION_SECONDS),
            reap_interval_seconds: Some(DEFAULT_REAP_INTERVAL_SECONDS),
            enable_health: Some(true),
            enable_telemetry: Some(true),
            log_level: Some("info".into()),
            enable_tls: Some(false),
            tls_cert_path: None,
            tls_key_path: None,
            workloads: None,
        }
    }
}

impl Config {
    pub fn conntrack_path(&self) -> PathBuf {
        self.conntrack_path
            .clone()
            .unwrap_or_else(|| PathBuf::from(DEFAULT_CONNTRACK_PATH))
    }

    pub fn workload_kind(&self) -> String {
        self.workload_kind
            .clone()
            .filter(|k| !k.is_empty())
            .unwrap_or_else(|| DEFAULT_WORKLOAD_KIND.to_string())
    }

    pub fn workload_labels(&self) -> Vec<String> {
        self.workload_labels.clone().unwrap_or_default()
    }

    pub fn fetch_timeout(&self) -> Duration {
        Duration::from_secs(
            self.fetch_timeout_seconds
                .unwrap_or(DEFAULT_FETCH_TIMEOUT_SECONDS),
        )
    }

    /// Effective log level; unknown values fall back to info.
    pub fn log_level(&self) -> LogLevel {
        self.log_level
            .as_deref()
            .and_then(|level| LogLevel::from_str(level, true).ok())
            .unwrap_or(LogLevel::Info)
    }

    pub fn reaper_config(&self) -> ReaperConfig {
        ReaperConfig {
            retention: Duration::from_secs(
                self.retention_seconds.unwrap_or(DEFAULT_RETENTION_SECONDS),
            ),
            interval: Duration::from_secs(
                self.reap_interval_seconds
                    .unwrap_or(DEFAULT_REAP_INTERVAL_SECONDS),
            ),
        }
    }
}

/// Validate effective config (used by --check-config and at startup)
pub fn validate_effective_config(cfg: &Config) -> Result<(), Box<dyn std::error::Error>> {
    // Timing: every duration must be positive
    for (name, value) in [
        ("fetch_timeout_seconds", cfg.fetch_timeout_seconds),
        ("retention_seconds", cfg.retention_seconds),
        ("reap_interval_seconds", cfg.reap_interval_seconds),
    ] {
        if value == Some(0) {
            return Err(format!("{} must be greater than 0", name).into());
        }
    }

    if let Some(level) = cfg.log_level.as_deref() {
        if LogLevel::from_str(level, true).is_err() {
            return Err(format!(
                "Invalid log_level '{}', expected off, error, warn, info, debug or trace",
                level
            )
            .into());
        }
    }

    let reaper = cfg.reaper_config();
    if reaper.retention < reaper.interval {
        return Err(format!(
            "retention_seconds ({}) must not be shorter than reap_interval_seconds ({})",
            reaper.retention.as_secs(),
            reaper.interval.as_secs()
        )
        .into());
    }

    // Workload source: inline list or file, not both
    let has_inline = cfg.workloads.as_ref().is_some_and(|w| !w.is_empty());
    if has_inline && cfg.workloads_file.is_some() {
        return Err("workloads and workloads_file are mutually exclusive".into());
    }

    if let Some(workloads) = &cfg.workloads {
        for workload in workloads {
            if workload.name.is_empty() {
                return Err("every inline workload needs a name".into());
            }
        }
    }

    // The workload kind becomes a label name and must not shadow the series labels
    let kind = sanitize_label_name(&cfg.workload_kind());
    if kind == ID_LABEL || TUPLE_LABELS.contains(&kind.as_str()) {
        return Err(format!(
            "workload_kind '{}' collides with a reserved label ({}, {})",
            kind,
            ID_LABEL,
            TUPLE_LABELS.join(", ")
        )
        .into());
    }

    if cfg
        .workload_labels
        .as_ref()
        .is_some_and(|keys| keys.iter().any(|k| k.trim().is_empty()))
    {
        return Err("workload_labels must not contain empty keys".into());
    }

    // TLS validation
    if cfg.enable_tls.unwrap_or(false) {
        let cert_path = cfg.tls_cert_path.as_deref();
        let key_path = cfg.tls_key_path.as_deref();

        match (cert_path, key_path) {
            (None, None) => {
                return Err(
                    "TLS is enabled but neither tls_cert_path nor tls_key_path are set".into(),
                );
            }
            (Some(_), None) => {
                return Err("TLS is enabled but tls_key_path is not set".into());
            }
            (None, Some(_)) => {
                return Err("TLS is enabled but tls_cert_path is not set".into());
            }
            (Some(cert), Some(key)) => {
                check_tls_file(cert, "certificate")?;
                check_tls_file(key, "private key")?;
            }
        }
    }

    Ok(())
}

fn check_tls_file(path: &str, what: &str) -> Result<(), Box<dyn std::error::Error>> {
    let p = Path::new(path);
    if !p.exists() {
        return Err(format!("TLS {} file not found: {}", what, path).into());
    }
    match fs::metadata(p) {
        Ok(meta) if meta.len() == 0 => {
            Err(format!("TLS {} file is empty: {}", what, path).into())
        }
        Err(e) => Err(format!("TLS {} file is not readable: {} ({})", what, path, e).into()),
        Ok(_) => Ok(()),
    }
}

/// Resolves configuration from CLI args, config file, and defaults.
/// This enforces precedence: CLI (if provided) > config file > default.
pub fn resolve_config(args: &Args) -> Result<Config, Box<dyn std::error::Error>> {
    let mut config = if args.no_config {
        Config::default()
    } else {
        load_config(args.config.as_deref().and_then(|p| p.to_str()))?
    };

    // Override with CLI args
    if let Some(bind_ip) = args.bind {
        config.bind = Some(bind_ip.to_string());
    }

    // Only override port if the user supplied it on the CLI.
    if let Some(cli_port) = args.port {
        config.port = Some(cli_port);
    }

    if let Some(level) = &args.log_level {
        if let Some(value) = level.to_possible_value() {
            config.log_level = Some(value.get_name().to_string());
        }
    }

    // Sources
    if let Some(path) = &args.conntrack_path {
        config.conntrack_path = Some(path.clone());
    }
    if let Some(path) = &args.workloads_file {
        config.workloads_file = Some(path.clone());
    }
    if let Some(kind) = &args.workload_kind {
        config.workload_kind = Some(kind.clone());
    }
    if let Some(labels) = &args.workload_labels {
        config.workload_labels = Some(split_list(labels));
    }

    // Timing
    if let Some(secs) = args.fetch_timeout {
        config.fetch_timeout_seconds = Some(secs);
    }
    if let Some(secs) = args.retention {
        config.retention_seconds = Some(secs);
    }
    if let Some(secs) = args.reap_interval {
        config.reap_interval_seconds = Some(secs);
    }

    // Feature flags
    if args.disable_health {
        config.enable_health = Some(false);
    }
    if args.disable_telemetry {
        config.enable_telemetry = Some(false);
    }

    // TLS configuration: CLI wins if provided
    if args.enable_tls {
        config.enable_tls = Some(true);
    }
    if let Some(cert_path) = &args.tls_cert {
        config.tls_cert_path = Some(cert_path.to_string_lossy().to_string());
    }
    if let Some(key_path) = &args.tls_key {
        config.tls_key_path = Some(key_path.to_string_lossy().to_string());
    }

    Ok(config)
}

/// Enhanced configuration loading with multiple format support
pub fn load_config(path: Option<&str>) -> Result<Config, Box<dyn std::error::Error>> {
    let path = if let Some(p) = path {
        PathBuf::from(p)
    } else {
        // Try default locations
        let defaults = [
            "/etc/herakles-conntrack-exporter/herakles-conntrack-exporter.yaml",
            "/etc/herakles/conntrack-exporter.yaml",
            "/etc/herakles/conntrack-exporter.yml",
            "/etc/herakles/conntrack-exporter.json",
            "./herakles-conntrack-exporter.yaml",
            "./herakles-conntrack-exporter.yml",
            "./herakles-conntrack-exporter.json",
        ];

        defaults
            .iter()
            .find(|p| Path::new(p).exists())
            .map(PathBuf::from)
            .unwrap_or_else(|| PathBuf::from(""))
    };

    if !path.exists() || path.to_string_lossy().is_empty() {
        return Ok(Config::default());
    }

    let content = fs::read_to_string(&path)?;

    match path.extension().and_then(|s| s.to_str()) {
        Some("json") => {
            let config: Config = serde_json::from_str(&content)?;
            info!("Loaded JSON configuration from: {}", path.display());
            Ok(config)
        }
        Some("toml") => {
            let config: Config = toml::from_str(&content)?;
            info!("Loaded TOML configuration from: {}", path.display());
            Ok(config)
        }
        _ => {
            // Default to YAML
            let config: Config = serde_yaml::from_str(&content)?;
            info!("Loaded YAML configuration from: {}", path.display());
            Ok(config)
        }
    }
}

/// Shows configuration in requested format
pub fn show_config(
    config: &Config,
    format: ConfigFormat,
    user_config: bool,
) -> Result<(), Box<dyn std::error::Error>> {
    let output = match format {
        ConfigFormat::Json => serde_json::to_string_pretty(config)?,
        ConfigFormat::Toml => toml::to_string_pretty(config)?,
        ConfigFormat::Yaml => serde_yaml::to_string(config)?,
    };

    if user_config {
        println!("User configuration (effective values):");
    }
    println!("{output}");
    Ok(())
}
