//! One collection cycle per scrape.
//!
//! The cycle takes a zeroed copy of the accumulated state, fetches workloads
//! and connections (outside any lock, bounded by a timeout), overlays the
//! fresh counts on the zeroed copy, commits the result to the store and
//! turns it into samples. A failed fetch aborts the cycle before anything is
//! committed, so the previous state is kept for the next scrape.

use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, instrument, warn};

use crate::accumulator::{AccumulatorStore, WorkloadMap};
use crate::conntrack::{Conn, ConnectionSource};
use crate::correlator::{correlate, WorkloadCounts};
use crate::error::SourceError;
use crate::exposition::{workload_samples, ConnectionSample};
use crate::workload::{Workload, WorkloadLister};

/// Default bound on a single workload or connection fetch.
pub const DEFAULT_FETCH_TIMEOUT: Duration = Duration::from_secs(5);

/// Reasons a collection cycle is aborted.
#[derive(Debug, thiserror::Error)]
pub enum CollectError {
    #[error("failed to list workloads: {0}")]
    Workloads(#[source] SourceError),

    #[error("failed to read connections: {0}")]
    Connections(#[source] SourceError),

    #[error("{what} fetch timed out after {timeout:?}")]
    Timeout {
        what: &'static str,
        timeout: Duration,
    },

    #[error("{what} fetch task failed: {source}")]
    Join {
        what: &'static str,
        #[source]
        source: tokio::task::JoinError,
    },
}

/// Result of a successful cycle.
#[derive(Debug, Clone, Default)]
pub struct CollectOutcome {
    pub samples: Vec<ConnectionSample>,
    /// Workloads returned by the lister this cycle.
    pub workloads: usize,
    /// Connections returned by the source this cycle.
    pub connections: usize,
}

/// Reconciles conntrack snapshots with workload identity across scrapes.
pub struct ConntrackCollector {
    lister: Arc<dyn WorkloadLister>,
    source: Arc<dyn ConnectionSource>,
    store: Arc<AccumulatorStore>,
    label_keys: Vec<String>,
    fetch_timeout: Duration,
}

impl ConntrackCollector {
    pub fn new(
        lister: Arc<dyn WorkloadLister>,
        source: Arc<dyn ConnectionSource>,
        store: Arc<AccumulatorStore>,
        label_keys: Vec<String>,
    ) -> Self {
        Self {
            lister,
            source,
            store,
            label_keys,
            fetch_timeout: DEFAULT_FETCH_TIMEOUT,
        }
    }

    pub fn with_fetch_timeout(mut self, timeout: Duration) -> Self {
        self.fetch_timeout = timeout;
        self
    }

    pub fn store(&self) -> &Arc<AccumulatorStore> {
        &self.store
    }

    /// Label name carrying the workload name.
    pub fn kind(&self) -> &str {
        self.lister.kind()
    }

    /// Runs one collection cycle.
    #[instrument(skip(self))]
    pub async fn collect(&self) -> Result<CollectOutcome, CollectError> {
        let (mut counts, mut known) = self.store.snapshot_and_zero();

        let lister = Arc::clone(&self.lister);
        let source = Arc::clone(&self.source);
        let (workloads, conns) = tokio::join!(
            fetch("workloads", self.fetch_timeout, move || lister.workloads()),
            fetch("connections", self.fetch_timeout, move || source.connections()),
        );
        let workloads: Vec<Workload> = workloads?.map_err(CollectError::Workloads)?;
        let conns: Vec<Conn> = conns?.map_err(CollectError::Connections)?;

        debug!(
            "Fetched {} workloads and {} connections",
            workloads.len(),
            conns.len()
        );

        overlay(&mut counts, correlate(&workloads, &conns));
        for workload in &workloads {
            known.insert(workload.id.clone(), workload.clone());
        }
        known.retain(|id, _| counts.contains_key(id));

        let samples = self.samples(&counts, &known);

        self.store.merge(counts, known, Instant::now());

        Ok(CollectOutcome {
            samples,
            workloads: workloads.len(),
            connections: conns.len(),
        })
    }

    fn samples(&self, counts: &WorkloadCounts, known: &WorkloadMap) -> Vec<ConnectionSample> {
        let kind = self.lister.kind();
        let mut ids: Vec<&String> = counts.keys().collect();
        ids.sort();

        let mut samples = Vec::new();
        for id in ids {
            let Some(workload) = known.get(id) else {
                warn!("No metadata for workload {}, skipping its series", id);
                continue;
            };
            if let Some(series) = counts.get(id) {
                samples.extend(workload_samples(kind, workload, series, &self.label_keys));
            }
        }
        samples
    }
}

/// Writes fresh counts over the zeroed base. Series missing from `fresh`
/// keep their zero.
fn overlay(base: &mut WorkloadCounts, fresh: WorkloadCounts) {
    for (id, series) in fresh {
        let entry = base.entry(id).or_default();
        for (tuple, count) in series {
            *entry.entry(tuple).or_insert(0) += count;
        }
    }
}

/// Runs a blocking collaborator call off the async runtime, bounded by `timeout`.
async fn fetch<T, F>(
    what: &'static str,
    timeout: Duration,
    call: F,
) -> Result<Result<T, SourceError>, CollectError>
where
    F: FnOnce() -> Result<T, SourceError> + Send + 'static,
    T: Send + 'static,
{
    match tokio::time::timeout(timeout, tokio::task::spawn_blocking(call)).await {
        Ok(Ok(result)) => Ok(result),
        Ok(Err(source)) => Err(CollectError::Join { what, source }),
        Err(_) => Err(CollectError::Timeout { what, timeout }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::correlator::TupleKey;
    use crate::workload::StaticWorkloadLister;
    use std::sync::Mutex;

    fn conn(origin: &str, reply: &str, reply_port: &str) -> Conn {
        Conn {
            origin_ip: origin.into(),
            origin_port: "33404".into(),
            reply_ip: reply.into(),
            reply_port: reply_port.into(),
            state: "ESTABLISHED".into(),
            protocol: "tcp".into(),
        }
    }

    /// Serves one table per call, repeating the last one.
    fn scripted(tables: Vec<Vec<Conn>>) -> Arc<dyn ConnectionSource> {
        let tables = Mutex::new(tables.into_iter().collect::<std::collections::VecDeque<_>>());
        Arc::new(move || -> Result<Vec<Conn>, SourceError> {
            let mut tables = tables.lock().unwrap();
            if tables.len() > 1 {
                Ok(tables.pop_front().unwrap())
            } else {
                Ok(tables.front().cloned().unwrap_or_default())
            }
        })
    }

    fn lister() -> Arc<dyn WorkloadLister> {
        Arc::new(StaticWorkloadLister::new(
            "container",
            vec![Workload::new("w1", "my-container1", "10.10.1.2").with_label("app", "app1")],
        ))
    }

    fn value(outcome: &CollectOutcome, destination: &str) -> Option<f64> {
        outcome
            .samples
            .iter()
            .find(|s| s.label("destination") == Some(destination))
            .map(|s| s.value)
    }

    #[tokio::test]
    async fn test_collect_counts_then_decays() {
        let source = scripted(vec![
            vec![
                conn("10.10.1.2", "192.168.50.4", "2375"),
                conn("10.10.1.2", "192.168.50.4", "2375"),
                conn("10.10.1.2", "192.168.50.5", "2376"),
            ],
            vec![conn("10.10.1.2", "192.168.50.4", "2375")],
        ]);
        let collector = ConntrackCollector::new(
            lister(),
            source,
            Arc::new(AccumulatorStore::new()),
            vec!["app".to_string()],
        );

        let first = collector.collect().await.unwrap();
        assert_eq!(value(&first, "192.168.50.4:2375"), Some(2.0));
        assert_eq!(value(&first, "192.168.50.5:2376"), Some(1.0));
        assert_eq!(first.samples[0].label("label_app"), Some("app1"));
        assert_eq!(first.samples[0].label("container"), Some("my-container1"));

        let second = collector.collect().await.unwrap();
        assert_eq!(value(&second, "192.168.50.4:2375"), Some(1.0));
        assert_eq!(value(&second, "192.168.50.5:2376"), Some(0.0));

        let third = collector.collect().await.unwrap();
        assert_eq!(value(&third, "192.168.50.4:2375"), Some(1.0));
        assert_eq!(value(&third, "192.168.50.5:2376"), None);
    }

    #[tokio::test]
    async fn test_failed_fetch_keeps_previous_state() {
        let calls = Mutex::new(0u32);
        let source: Arc<dyn ConnectionSource> =
            Arc::new(move || -> Result<Vec<Conn>, SourceError> {
                let mut calls = calls.lock().unwrap();
                *calls += 1;
                if *calls == 2 {
                    Err(SourceError::Other("conntrack unavailable".into()))
                } else {
                    Ok(vec![conn("10.10.1.2", "192.168.50.4", "2375")])
                }
            });
        let store = Arc::new(AccumulatorStore::new());
        let collector =
            ConntrackCollector::new(lister(), source, Arc::clone(&store), Vec::new());

        collector.collect().await.unwrap();
        let key = TupleKey::new("ESTABLISHED", "tcp", "192.168.50.4:2375");
        let before = store.stats();

        let err = collector.collect().await.unwrap_err();
        assert!(matches!(err, CollectError::Connections(_)));
        assert_eq!(store.stats(), before);
        assert_eq!(store.counts().get("w1").and_then(|s| s.get(&key)), Some(&1));

        let third = collector.collect().await.unwrap();
        assert_eq!(value(&third, "192.168.50.4:2375"), Some(1.0));
    }

    #[tokio::test]
    async fn test_lister_failure_aborts_cycle() {
        struct Broken;
        impl WorkloadLister for Broken {
            fn kind(&self) -> &str {
                "container"
            }
            fn workloads(&self) -> Result<Vec<Workload>, SourceError> {
                Err(SourceError::Other("runtime down".into()))
            }
        }

        let store = Arc::new(AccumulatorStore::new());
        let collector = ConntrackCollector::new(
            Arc::new(Broken),
            scripted(vec![vec![conn("10.10.1.2", "192.168.50.4", "2375")]]),
            Arc::clone(&store),
            Vec::new(),
        );

        let err = collector.collect().await.unwrap_err();
        assert!(matches!(err, CollectError::Workloads(_)));
        assert!(store.counts().is_empty());
    }

    #[tokio::test]
    async fn test_slow_source_times_out() {
        let source: Arc<dyn ConnectionSource> =
            Arc::new(|| -> Result<Vec<Conn>, SourceError> {
                std::thread::sleep(Duration::from_millis(500));
                Ok(Vec::new())
            });
        let collector = ConntrackCollector::new(
            lister(),
            source,
            Arc::new(AccumulatorStore::new()),
            Vec::new(),
        )
        .with_fetch_timeout(Duration::from_millis(20));

        let err = collector.collect().await.unwrap_err();
        assert!(matches!(
            err,
            CollectError::Timeout {
                what: "connections",
                ..
            }
        ));
    }

    #[test]
    fn test_overlay_overwrites_zeroed_base() {
        let key = TupleKey::new("ESTABLISHED", "tcp", "10.0.0.9:80");
        let other = TupleKey::new("ESTABLISHED", "tcp", "10.0.0.8:80");

        let mut base = WorkloadCounts::new();
        base.entry("w1".to_string())
            .or_default()
            .extend([(key.clone(), 0), (other.clone(), 0)]);

        let mut fresh = WorkloadCounts::new();
        fresh.entry("w1".to_string()).or_default().insert(key.clone(), 3);

        overlay(&mut base, fresh);
        let w1 = base.get("w1").unwrap();
        assert_eq!(w1.get(&key), Some(&3));
        assert_eq!(w1.get(&other), Some(&0));
    }
}
