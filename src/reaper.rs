//! Periodic eviction of series that have stayed at zero too long.
//!
//! The reaper runs on its own timer and only touches the accumulator store
//! through [`AccumulatorStore::reap`].

use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, info};

use crate::accumulator::AccumulatorStore;
use crate::health_stats::HealthStats;

pub const DEFAULT_RETENTION: Duration = Duration::from_secs(30 * 60);
pub const DEFAULT_REAP_INTERVAL: Duration = Duration::from_secs(60);

#[derive(Debug, Clone, Copy)]
pub struct ReaperConfig {
    /// How long a series may go without a non-zero observation.
    pub retention: Duration,
    /// Time between sweeps.
    pub interval: Duration,
}

impl Default for ReaperConfig {
    fn default() -> Self {
        Self {
            retention: DEFAULT_RETENTION,
            interval: DEFAULT_REAP_INTERVAL,
        }
    }
}

/// Runs a single sweep and records its result.
pub fn reap_once(
    store: &AccumulatorStore,
    retention: Duration,
    now: Instant,
    stats: Option<&HealthStats>,
) -> usize {
    let removed = store.reap(retention, now);
    if let Some(stats) = stats {
        stats.record_reap(removed as u64);
    }
    if removed > 0 {
        info!("Reaped {} stale connection series", removed);
    } else {
        debug!("Reaper sweep found no stale series");
    }
    removed
}

/// Spawns the reaper task. It stops when `shutdown` flips to `true` or its
/// sender is dropped.
pub fn spawn_reaper(
    store: Arc<AccumulatorStore>,
    config: ReaperConfig,
    stats: Option<Arc<HealthStats>>,
    mut shutdown: watch::Receiver<bool>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(config.interval);
        // The first tick completes immediately; nothing can be stale yet.
        interval.tick().await;

        loop {
            tokio::select! {
                _ = interval.tick() => {
                    let now = tokio::time::Instant::now().into_std();
                    reap_once(&store, config.retention, now, stats.as_deref());
                }
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        debug!("Reaper task stopping");
                        break;
                    }
                }
            }
        }
    })
}
