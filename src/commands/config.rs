//! Config command implementation.
//!
//! Generates configuration files in various formats.

use std::fs;
use std::path::PathBuf;

use crate::cli::ConfigFormat;
use crate::config::Config;

/// Generates configuration files.
pub fn command_config(
    output: Option<PathBuf>,
    format: ConfigFormat,
    commented: bool,
) -> Result<(), Box<dyn std::error::Error>> {
    let config = Config::default();
    let output = match output {
        Some(path) => path,
        None => PathBuf::from("herakles-conntrack-exporter.yaml"),
    };

    let content = match format {
        ConfigFormat::Json => serde_json::to_string_pretty(&config)?,
        ConfigFormat::Toml => toml::to_string_pretty(&config)?,
        ConfigFormat::Yaml => {
            let mut content = serde_yaml::to_string(&config)?;
            if commented {
                content = add_config_comments(content);
            }
            content
        }
    };

    if output.to_string_lossy() == "-" {
        print!("{}", content);
    } else {
        fs::write(&output, content)?;
        println!("✅ Configuration written to: {}", output.display());
    }

    Ok(())
}

/// Adds comments to YAML configuration.
fn add_config_comments(yaml: String) -> String {
    let comments = r#"# Herakles Conntrack Exporter Configuration
# =========================================
#
# Server Configuration
# --------------------
# bind: "0.0.0.0"              # Bind IP (0.0.0.0 = all interfaces)
# port: 9216                   # HTTP port
#
# Connection Source
# -----------------
# conntrack_path: /proc/net/nf_conntrack
#
# Workload Source
# ---------------
# workload_kind: container     # Label carrying the workload name (container, pod, vm, ...)
# workload_labels: null        # Metadata keys exported as label_<key>, e.g. ["app"]
# workloads_file: null         # YAML/JSON file re-read every scrape:
#                              #   workloads:
#                              #     - name: web-1
#                              #       ip: 10.0.0.2
#                              #       labels: { app: shop }
# workloads: null              # Inline list, same layout (exclusive with workloads_file)
#
# Timing
# ------
# fetch_timeout_seconds: 5     # Bound on a single workload or conntrack read
# retention_seconds: 1800      # Evict series not seen non-zero for this long
# reap_interval_seconds: 60    # Time between eviction sweeps
#
# Feature Flags
# -------------
# enable_health: true          # Enable /health endpoint
# enable_telemetry: true       # Enable herakles_conntrack_exporter_* metrics
#
# Logging
# -------
# log_level: "info"            # off, error, warn, info, debug, trace
#
# TLS/SSL Configuration
# ---------------------
# enable_tls: false            # Enable HTTPS (default: false)
# tls_cert_path: null          # Path to TLS certificate (PEM format)
# tls_key_path: null           # Path to TLS private key (PEM format)
"#;

    format!("{comments}\n{yaml}")
}
