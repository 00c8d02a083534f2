//! Conversion of accumulated counts into Prometheus samples.
//!
//! Workloads carry arbitrary metadata, so the label-name set varies from one
//! workload to the next. Samples are grouped by label-name set, each group
//! gets its own descriptor, and the groups are folded into a single metric
//! family for encoding.

use once_cell::sync::Lazy;
use prometheus::core::Collector;
use prometheus::proto::MetricFamily;
use prometheus::{GaugeVec, Opts};
use regex::Regex;
use std::collections::{BTreeMap, HashSet};

use crate::correlator::TupleCounts;
use crate::workload::Workload;

pub const METRIC_NAME: &str = "conntrack_workload_connections";
pub const METRIC_HELP: &str = "Number of outbound connections by destination and state";

/// Prefix for labels derived from workload metadata.
pub const WORKLOAD_LABEL_PREFIX: &str = "label_";

/// Label carrying the workload id. Names are not unique across restarts.
pub const ID_LABEL: &str = "id";

/// Fixed per-series labels, appended after the workload labels.
pub const TUPLE_LABELS: [&str; 3] = ["state", "protocol", "destination"];

static INVALID_LABEL_CHARS: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"[^a-zA-Z0-9_]").expect("static regex is valid"));

/// One exported value with its labels, in emission order.
#[derive(Debug, Clone, PartialEq)]
pub struct ConnectionSample {
    pub label_names: Vec<String>,
    pub label_values: Vec<String>,
    pub value: f64,
}

impl ConnectionSample {
    /// Value of the label called `name`, if present.
    pub fn label(&self, name: &str) -> Option<&str> {
        self.label_names
            .iter()
            .position(|n| n == name)
            .and_then(|i| self.label_values.get(i))
            .map(String::as_str)
    }
}

/// Turns an arbitrary metadata key into a valid Prometheus label name.
///
/// Dots become underscores, as does any other character Prometheus rejects.
pub fn sanitize_label_name(name: &str) -> String {
    let dotless = name.replace('.', "_");
    let mut sanitized = INVALID_LABEL_CHARS
        .replace_all(&dotless, "_")
        .into_owned();
    if sanitized.is_empty() || sanitized.starts_with(|c: char| c.is_ascii_digit()) {
        sanitized.insert(0, '_');
    }
    sanitized
}

/// Labels identifying `workload`: the workload name under `kind`, its id,
/// then one `label_*` entry per configured key the workload actually carries.
pub fn workload_labels(
    kind: &str,
    workload: &Workload,
    label_keys: &[String],
) -> Vec<(String, String)> {
    let mut seen = HashSet::new();
    let mut labels = Vec::with_capacity(label_keys.len() + 2);

    let kind_label = sanitize_label_name(kind);
    seen.insert(kind_label.clone());
    seen.insert(ID_LABEL.to_string());
    labels.push((kind_label, workload.name.clone()));
    labels.push((ID_LABEL.to_string(), workload.id.clone()));

    for key in label_keys {
        let Some(value) = workload.labels.get(key) else {
            continue;
        };
        let name = format!("{}{}", WORKLOAD_LABEL_PREFIX, sanitize_label_name(key));
        // Two keys can sanitize to the same name; the first configured one wins.
        if !seen.insert(name.clone()) {
            continue;
        }
        labels.push((name, value.clone()));
    }

    labels
}

/// Builds one sample per series of a single workload, zero values included.
pub fn workload_samples(
    kind: &str,
    workload: &Workload,
    series: &TupleCounts,
    label_keys: &[String],
) -> Vec<ConnectionSample> {
    let base = workload_labels(kind, workload, label_keys);
    let mut label_names: Vec<String> = base.iter().map(|(n, _)| n.clone()).collect();
    label_names.extend(TUPLE_LABELS.iter().map(|n| n.to_string()));
    let base_values: Vec<String> = base.into_iter().map(|(_, v)| v).collect();

    let mut keys: Vec<_> = series.iter().collect();
    keys.sort_by(|a, b| a.0.cmp(b.0));

    keys.into_iter()
        .map(|(tuple, &count)| {
            let mut label_values = base_values.clone();
            label_values.push(tuple.state.clone());
            label_values.push(tuple.protocol.clone());
            label_values.push(tuple.destination.clone());
            ConnectionSample {
                label_names: label_names.clone(),
                label_values,
                value: count as f64,
            }
        })
        .collect()
}

/// Encodes samples as a single gauge family. Returns an empty vector when
/// there is nothing to export.
pub fn to_metric_families(
    samples: &[ConnectionSample],
) -> Result<Vec<MetricFamily>, prometheus::Error> {
    let mut groups: BTreeMap<&[String], Vec<&ConnectionSample>> = BTreeMap::new();
    for sample in samples {
        groups
            .entry(sample.label_names.as_slice())
            .or_default()
            .push(sample);
    }

    let mut merged: Option<MetricFamily> = None;

    for (label_names, group) in groups {
        let names: Vec<&str> = label_names.iter().map(String::as_str).collect();
        let gauges = GaugeVec::new(Opts::new(METRIC_NAME, METRIC_HELP), names.as_slice())?;
        for sample in group {
            let values: Vec<&str> = sample.label_values.iter().map(String::as_str).collect();
            gauges
                .get_metric_with_label_values(values.as_slice())?
                .set(sample.value);
        }

        for mut family in gauges.collect() {
            match merged.as_mut() {
                None => merged = Some(family),
                Some(existing) => {
                    let metrics = existing.mut_metric();
                    for metric in family.take_metric().into_iter() {
                        metrics.push(metric);
                    }
                }
            }
        }
    }

    Ok(merged.into_iter().collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::correlator::TupleKey;
    use prometheus::{Encoder, TextEncoder};

    fn encode(families: &[MetricFamily]) -> String {
        let mut buffer = Vec::new();
        TextEncoder::new().encode(families, &mut buffer).unwrap();
        String::from_utf8(buffer).unwrap()
    }

    #[test]
    fn test_sanitize_label_name() {
        assert_eq!(
            sanitize_label_name("app.kubernetes.io/name"),
            "app_kubernetes_io_name"
        );
        assert_eq!(sanitize_label_name("team"), "team");
        assert_eq!(sanitize_label_name("1st"), "_1st");
        assert!(!sanitize_label_name("a.b.c").contains('.'));
    }

    #[test]
    fn test_workload_labels_filters_and_prefixes() {
        let workload = Workload::new("id1", "web-1", "10.0.0.2")
            .with_label("app", "shop")
            .with_label("secret", "hidden")
            .with_label("app.kubernetes.io/name", "frontend");
        let keys = vec![
            "app".to_string(),
            "app.kubernetes.io/name".to_string(),
            "missing".to_string(),
        ];

        let labels = workload_labels("container", &workload, &keys);
        assert_eq!(
            labels,
            vec![
                ("container".to_string(), "web-1".to_string()),
                ("id".to_string(), "id1".to_string()),
                ("label_app".to_string(), "shop".to_string()),
                (
                    "label_app_kubernetes_io_name".to_string(),
                    "frontend".to_string()
                ),
            ]
        );
    }

    #[test]
    fn test_colliding_label_keys_keep_first() {
        let workload = Workload::new("id1", "web", "10.0.0.2")
            .with_label("a.b", "dotted")
            .with_label("a_b", "underscored");
        let keys = vec!["a.b".to_string(), "a_b".to_string()];

        let labels = workload_labels("container", &workload, &keys);
        assert_eq!(labels.len(), 3);
        assert_eq!(labels[2], ("label_a_b".to_string(), "dotted".to_string()));
    }

    #[test]
    fn test_mixed_label_sets_share_one_family() {
        let mut series = TupleCounts::new();
        series.insert(TupleKey::new("ESTABLISHED", "tcp", "10.0.0.9:2375"), 2);

        let keys = vec!["app".to_string()];
        let labelled = Workload::new("a", "web", "10.0.0.2").with_label("app", "shop");
        let bare = Workload::new("b", "db", "10.0.0.3");

        let mut samples = workload_samples("container", &labelled, &series, &keys);
        samples.extend(workload_samples("container", &bare, &series, &keys));

        let families = to_metric_families(&samples).unwrap();
        assert_eq!(families.len(), 1);

        let text = encode(&families);
        assert_eq!(text.matches("# HELP").count(), 1);
        assert!(text.contains(
            r#"conntrack_workload_connections{container="web",destination="10.0.0.9:2375",id="a",label_app="shop",protocol="tcp",state="ESTABLISHED"} 2"#
        ));
        assert!(text.contains(
            r#"conntrack_workload_connections{container="db",destination="10.0.0.9:2375",id="b",protocol="tcp",state="ESTABLISHED"} 2"#
        ));
    }

    #[test]
    fn test_zero_values_are_emitted() {
        let mut series = TupleCounts::new();
        series.insert(TupleKey::new("ESTABLISHED", "tcp", "10.0.0.9:2375"), 0);
        let workload = Workload::new("a", "web", "10.0.0.2");

        let samples = workload_samples("container", &workload, &series, &[]);
        assert_eq!(samples.len(), 1);
        assert_eq!(samples[0].value, 0.0);
        assert_eq!(samples[0].label("destination"), Some("10.0.0.9:2375"));

        let text = encode(&to_metric_families(&samples).unwrap());
        assert!(text.contains(r#"state="ESTABLISHED"} 0"#));
    }

    #[test]
    fn test_same_name_workloads_stay_distinct() {
        let mut series = TupleCounts::new();
        series.insert(TupleKey::new("ESTABLISHED", "tcp", "10.0.0.9:443"), 1);
        let mut restarted = TupleCounts::new();
        restarted.insert(TupleKey::new("ESTABLISHED", "tcp", "10.0.0.9:443"), 3);

        let old = Workload::new("zzz-old", "web", "10.0.0.2");
        let new = Workload::new("aaa-new", "web", "10.0.0.3");
        let mut samples = workload_samples("container", &old, &series, &[]);
        samples.extend(workload_samples("container", &new, &restarted, &[]));

        let families = to_metric_families(&samples).unwrap();
        assert_eq!(families[0].get_metric().len(), samples.len());

        let text = encode(&families);
        assert!(text.contains(r#"id="zzz-old",protocol="tcp",state="ESTABLISHED"} 1"#));
        assert!(text.contains(r#"id="aaa-new",protocol="tcp",state="ESTABLISHED"} 3"#));
    }

    #[test]
    fn test_label_lookup_tolerates_short_values() {
        let sample = ConnectionSample {
            label_names: vec!["container".to_string(), "state".to_string()],
            label_values: vec!["web".to_string()],
            value: 1.0,
        };
        assert_eq!(sample.label("container"), Some("web"));
        assert_eq!(sample.label("state"), None);
    }

    #[test]
    fn test_no_samples_no_family() {
        assert!(to_metric_families(&[]).unwrap().is_empty());
    }
}
