//! Landing page for `/`.

use axum::{
    extract::State,
    response::{Html, IntoResponse},
};
use std::fmt::Write as FmtWrite;
use tracing::{debug, instrument};

use crate::handlers::health::FOOTER_TEXT;
use crate::state::SharedState;

/// Values shown on the landing page.
pub struct PageInfo<'a> {
    pub uptime_secs: u64,
    pub kind: &'a str,
    pub label_keys: &'a [String],
    pub tracked: usize,
    pub retention_secs: u64,
    pub health_enabled: bool,
}

/// Handler for the root `/` endpoint.
#[instrument(skip(state))]
pub async fn root_handler(State(state): State<SharedState>) -> impl IntoResponse {
    debug!("Processing / request");
    state.health_stats.record_http_request();

    let label_keys = state.config.workload_labels();
    let info = PageInfo {
        uptime_secs: state.start_time.elapsed().as_secs(),
        kind: state.collector.kind(),
        label_keys: &label_keys,
        tracked: state.collector.store().stats().tracked,
        retention_secs: state.config.reaper_config().retention.as_secs(),
        health_enabled: state.config.enable_health.unwrap_or(true),
    };

    Html(render_page(&info))
}

pub fn render_page(info: &PageInfo<'_>) -> String {
    let version = env!("CARGO_PKG_VERSION");
    let git_sha = option_env!("VERGEN_GIT_SHA").unwrap_or("unknown");
    let built = option_env!("VERGEN_BUILD_TIMESTAMP").unwrap_or("unknown");

    let uptime = format!(
        "{}h {}m {}s",
        info.uptime_secs / 3600,
        (info.uptime_secs % 3600) / 60,
        info.uptime_secs % 60
    );
    let labels = if info.label_keys.is_empty() {
        "none".to_string()
    } else {
        info.label_keys.join(", ")
    };

    let mut endpoints = String::new();
    let _ = writeln!(
        endpoints,
        r#"<li><a href="/metrics">/metrics</a> connection gauges, one collection cycle per scrape</li>"#
    );
    if info.health_enabled {
        let _ = writeln!(
            endpoints,
            r#"<li><a href="/health">/health</a> scrape and eviction statistics</li>"#
        );
    }
    let _ = writeln!(
        endpoints,
        r#"<li><a href="/config">/config</a> effective configuration (YAML)</li>"#
    );

    format!(
        r#"<!DOCTYPE html>
<html lang="en">
<head>
<meta charset="UTF-8">
<title>Herakles Conntrack Exporter</title>
<style>
body {{ font-family: sans-serif; max-width: 760px; margin: 2em auto; color: #333; }}
code {{ background: #eee; padding: 1px 4px; }}
</style>
</head>
<body>
<h1>Herakles Conntrack Exporter</h1>
<table>
<tr><td>Version</td><td>{version} (<code>{git_sha}</code>, built {built})</td></tr>
<tr><td>Uptime</td><td>{uptime}</td></tr>
<tr><td>Workload label</td><td><code>{kind}</code></td></tr>
<tr><td>Exported workload labels</td><td>{labels}</td></tr>
<tr><td>Tracked series</td><td>{tracked} (retention {retention}s)</td></tr>
</table>
<ul>
{endpoints}</ul>
<p><small>{footer}</small></p>
</body>
</html>"#,
        kind = info.kind,
        tracked = info.tracked,
        retention = info.retention_secs,
        footer = FOOTER_TEXT
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_page_lists_settings_and_endpoints() {
        let keys = vec!["app".to_string(), "team".to_string()];
        let page = render_page(&PageInfo {
            uptime_secs: 3725,
            kind: "container",
            label_keys: &keys,
            tracked: 12,
            retention_secs: 1800,
            health_enabled: true,
        });

        assert!(page.contains("1h 2m 5s"));
        assert!(page.contains("<code>container</code>"));
        assert!(page.contains("app, team"));
        assert!(page.contains("12 (retention 1800s)"));
        assert!(page.contains(r#"href="/health""#));
    }

    #[test]
    fn test_page_hides_disabled_health_link() {
        let page = render_page(&PageInfo {
            uptime_secs: 0,
            kind: "pod",
            label_keys: &[],
            tracked: 0,
            retention_secs: 60,
            health_enabled: false,
        });

        assert!(!page.contains(r#"href="/health""#));
        assert!(page.contains(r#"href="/metrics""#));
        assert!(page.contains("<td>none</td>"));
    }
}
