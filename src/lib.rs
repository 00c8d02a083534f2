//! Herakles Conntrack Exporter Library
//!
//! This library counts the connections of locally running workloads by
//! correlating the kernel connection-tracking table with workload addresses.
//! It keeps the counts between scrapes so that closed connections decay to
//! zero before their series disappear.
//!
//! # Features
//!
//! - **Conntrack Parsing**: Read `/proc/net/nf_conntrack` into connection tuples
//! - **Workload Correlation**: Attribute each connection to a workload by IP
//! - **Decay Then Reap**: Report closed series as zero once, evict them after a retention period
//! - **Prometheus Exposition**: One gauge family with per-workload label sets
//!
//! # Usage
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use herakles_conntrack_exporter::{
//!     AccumulatorStore, ConntrackCollector, ProcConntrackSource, StaticWorkloadLister, Workload,
//! };
//!
//! # async fn run() -> Result<(), Box<dyn std::error::Error>> {
//! let lister = StaticWorkloadLister::new(
//!     "container",
//!     vec![Workload::new("web-1", "web-1", "10.0.0.2").with_label("app", "shop")],
//! );
//! let collector = ConntrackCollector::new(
//!     Arc::new(lister),
//!     Arc::new(ProcConntrackSource::default()),
//!     Arc::new(AccumulatorStore::new()),
//!     vec!["app".to_string()],
//! );
//!
//! let outcome = collector.collect().await?;
//! for sample in &outcome.samples {
//!     println!("{:?} = {}", sample.label_values, sample.value);
//! }
//! # Ok(())
//! # }
//! ```

pub mod accumulator;
pub mod collector;
pub mod conntrack;
pub mod correlator;
pub mod error;
pub mod exposition;
pub mod health_stats;
pub mod reaper;
pub mod workload;

// Re-export main types for convenience
pub use accumulator::{AccumulatorKey, AccumulatorStore, StoreStats};
pub use collector::{CollectError, CollectOutcome, ConntrackCollector};
pub use conntrack::{Conn, ConnectionSource, ProcConntrackSource};
pub use correlator::{correlate, TupleKey};
pub use error::SourceError;
pub use exposition::{to_metric_families, ConnectionSample};
pub use health_stats::HealthStats;
pub use reaper::{reap_once, spawn_reaper, ReaperConfig};
pub use workload::{FileWorkloadLister, StaticWorkloadLister, Workload, WorkloadLister};
