//! Accumulated connection counts shared between scrapes and the reaper.
//!
//! The store owns three maps behind a single mutex:
//! - per-workload series counts,
//! - the last instant each series was observed with a non-zero count,
//! - the last-seen metadata of every workload that still owns series.
//!
//! Callers only ever receive copies. Every operation holds the lock for
//! in-memory work only; nothing here performs I/O.

use ahash::{AHashMap as HashMap, AHashSet as HashSet};
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};

use crate::correlator::{TupleCounts, TupleKey, WorkloadCounts};
use crate::workload::Workload;

/// Workload metadata keyed by workload id.
pub type WorkloadMap = HashMap<String, Workload>;

/// Identity of one exported series: workload plus tuple key.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct AccumulatorKey {
    pub workload: String,
    pub tuple: TupleKey,
}

impl AccumulatorKey {
    pub fn new(workload: impl Into<String>, tuple: TupleKey) -> Self {
        Self {
            workload: workload.into(),
            tuple,
        }
    }
}

/// Point-in-time size of the store.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StoreStats {
    /// Workloads with retained metadata.
    pub workloads: usize,
    /// Series present in the count map, zero-valued ones included.
    pub series: usize,
    /// Series still tracked for eviction.
    pub tracked: usize,
}

#[derive(Default)]
struct Inner {
    counts: WorkloadCounts,
    last_used: HashMap<AccumulatorKey, Instant>,
    workloads: WorkloadMap,
}

/// Concurrency-safe accumulator of connection counts.
#[derive(Default)]
pub struct AccumulatorStore {
    inner: Mutex<Inner>,
}

impl AccumulatorStore {
    pub fn new() -> Self {
        Self::default()
    }

    // A panic while holding the lock cannot leave the maps half-updated in a
    // way that matters for counting, so poisoning is ignored.
    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Returns a copy of every series that was non-zero, with its count reset
    /// to zero, plus the metadata of the workloads owning those series.
    ///
    /// Series already at zero are left out so each closed series is reported
    /// as zero exactly once. The live store is not modified.
    pub fn snapshot_and_zero(&self) -> (WorkloadCounts, WorkloadMap) {
        let inner = self.lock();

        let mut counts = WorkloadCounts::with_capacity(inner.counts.len());
        let mut workloads = WorkloadMap::with_capacity(inner.workloads.len());

        for (id, series) in &inner.counts {
            let zeroed: TupleCounts = series
                .iter()
                .filter(|(_, &count)| count != 0)
                .map(|(key, _)| (key.clone(), 0))
                .collect();
            if zeroed.is_empty() {
                continue;
            }
            if let Some(workload) = inner.workloads.get(id) {
                workloads.insert(id.clone(), workload.clone());
            }
            counts.insert(id.clone(), zeroed);
        }

        (counts, workloads)
    }

    /// Replaces the live counts with `counts` and upserts `workloads`.
    ///
    /// Every series with a non-zero count gets its last-used instant set to
    /// `now`. Workload metadata is never removed here.
    pub fn merge(&self, counts: WorkloadCounts, workloads: WorkloadMap, now: Instant) {
        let mut inner = self.lock();

        for (id, series) in &counts {
            for (tuple, &count) in series {
                if count > 0 {
                    inner
                        .last_used
                        .insert(AccumulatorKey::new(id.as_str(), tuple.clone()), now);
                }
            }
        }

        inner.counts = counts;
        inner.workloads.extend(workloads);
    }

    /// Evicts every series not observed non-zero for longer than `retention`.
    ///
    /// Series without a last-used entry are dropped as well; a scrape that
    /// snapshotted before an earlier sweep can merge one back. A workload's
    /// metadata is dropped together with its last series. Returns the number
    /// of expired series.
    pub fn reap(&self, retention: Duration, now: Instant) -> usize {
        let mut guard = self.lock();
        let inner = &mut *guard;

        let before = inner.last_used.len();
        inner
            .last_used
            .retain(|_, last| now.saturating_duration_since(*last) <= retention);
        let expired = before - inner.last_used.len();

        let last_used = &inner.last_used;
        inner.counts.retain(|id, series| {
            series.retain(|tuple, _| {
                last_used.contains_key(&AccumulatorKey::new(id.as_str(), tuple.clone()))
            });
            !series.is_empty()
        });

        let tracked: HashSet<&str> = last_used.keys().map(|key| key.workload.as_str()).collect();
        let counts = &inner.counts;
        inner
            .workloads
            .retain(|id, _| counts.contains_key(id) || tracked.contains(id.as_str()));

        expired
    }

    pub fn stats(&self) -> StoreStats {
        let inner = self.lock();
        StoreStats {
            workloads: inner.workloads.len(),
            series: inner.counts.values().map(|series| series.len()).sum(),
            tracked: inner.last_used.len(),
        }
    }

    /// Copy of the live counts.
    pub fn counts(&self) -> WorkloadCounts {
        self.lock().counts.clone()
    }

    /// Copy of the retained workload metadata.
    pub fn known_workloads(&self) -> WorkloadMap {
        self.lock().workloads.clone()
    }

    pub fn last_used(&self, key: &AccumulatorKey) -> Option<Instant> {
        self.lock().last_used.get(key).copied()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn key(dest: &str) -> TupleKey {
        TupleKey::new("ESTABLISHED", "tcp", dest)
    }

    fn counts(entries: &[(&str, &str, u64)]) -> WorkloadCounts {
        let mut out = WorkloadCounts::new();
        for (workload, dest, count) in entries {
            out.entry(workload.to_string())
                .or_default()
                .insert(key(dest), *count);
        }
        out
    }

    fn workloads(ids: &[&str]) -> WorkloadMap {
        ids.iter()
            .map(|id| (id.to_string(), Workload::new(*id, *id, "10.0.0.2")))
            .collect()
    }

    #[test]
    fn test_snapshot_zeroes_without_mutating_store() {
        let store = AccumulatorStore::new();
        store.merge(
            counts(&[("w1", "a:1", 3), ("w1", "b:2", 1)]),
            workloads(&["w1"]),
            Instant::now(),
        );

        let (snapshot, metadata) = store.snapshot_and_zero();
        let w1 = snapshot.get("w1").unwrap();
        assert_eq!(w1.len(), 2);
        assert!(w1.values().all(|&count| count == 0));
        assert!(metadata.contains_key("w1"));

        let live = store.counts();
        assert_eq!(live.get("w1").unwrap().get(&key("a:1")), Some(&3));
    }

    #[test]
    fn test_snapshot_drops_already_zero_series() {
        let store = AccumulatorStore::new();
        store.merge(
            counts(&[("w1", "a:1", 0), ("w2", "b:2", 0), ("w2", "c:3", 4)]),
            workloads(&["w1", "w2"]),
            Instant::now(),
        );

        let (snapshot, metadata) = store.snapshot_and_zero();
        assert!(!snapshot.contains_key("w1"));
        assert!(!metadata.contains_key("w1"));
        let w2 = snapshot.get("w2").unwrap();
        assert_eq!(w2.len(), 1);
        assert_eq!(w2.get(&key("c:3")), Some(&0));
    }

    #[test]
    fn test_merge_tracks_only_nonzero_series() {
        let store = AccumulatorStore::new();
        let now = Instant::now();
        store.merge(
            counts(&[("w1", "a:1", 2), ("w1", "b:2", 0)]),
            workloads(&["w1"]),
            now,
        );

        assert_eq!(
            store.last_used(&AccumulatorKey::new("w1", key("a:1"))),
            Some(now)
        );
        assert_eq!(store.last_used(&AccumulatorKey::new("w1", key("b:2"))), None);
    }

    #[test]
    fn test_decay_does_not_refresh_last_used() {
        let store = AccumulatorStore::new();
        let first = Instant::now();
        store.merge(counts(&[("w1", "a:1", 1)]), workloads(&["w1"]), first);

        let (zeroed, metadata) = store.snapshot_and_zero();
        store.merge(zeroed, metadata, first + Duration::from_secs(30));

        assert_eq!(
            store.last_used(&AccumulatorKey::new("w1", key("a:1"))),
            Some(first)
        );
    }

    #[test]
    fn test_reap_evicts_expired_series_and_metadata() {
        let store = AccumulatorStore::new();
        let start = Instant::now();
        store.merge(
            counts(&[("w1", "a:1", 1), ("w2", "b:2", 1)]),
            workloads(&["w1", "w2"]),
            start,
        );
        let mut fresh = counts(&[("w2", "b:2", 1)]);
        fresh.insert("w1".to_string(), {
            let mut series = TupleCounts::new();
            series.insert(key("a:1"), 0);
            series
        });
        store.merge(fresh, WorkloadMap::new(), start + Duration::from_secs(3000));

        let removed = store.reap(
            Duration::from_secs(1800),
            start + Duration::from_secs(3600),
        );
        assert_eq!(removed, 1);

        assert!(!store.counts().contains_key("w1"));
        assert!(!store.known_workloads().contains_key("w1"));
        assert!(store.known_workloads().contains_key("w2"));
        assert_eq!(
            store.stats(),
            StoreStats {
                workloads: 1,
                series: 1,
                tracked: 1
            }
        );
    }

    #[test]
    fn test_reap_keeps_entries_within_retention() {
        let store = AccumulatorStore::new();
        let start = Instant::now();
        store.merge(counts(&[("w1", "a:1", 1)]), workloads(&["w1"]), start);

        assert_eq!(store.reap(Duration::from_secs(60), start), 0);
        assert_eq!(
            store.reap(Duration::from_secs(60), start + Duration::from_secs(60)),
            0
        );
        assert_eq!(
            store.reap(Duration::from_secs(60), start + Duration::from_secs(61)),
            1
        );
    }

    #[test]
    fn test_reap_drops_series_merged_back_after_eviction() {
        let store = AccumulatorStore::new();
        let start = Instant::now();
        store.merge(counts(&[("w1", "a:1", 1)]), workloads(&["w1"]), start);

        // A scrape snapshots, the sweep evicts, then the scrape merges the decay
        let (zeroed, metadata) = store.snapshot_and_zero();
        let later = start + Duration::from_secs(120);
        assert_eq!(store.reap(Duration::from_secs(60), later), 1);
        store.merge(zeroed, metadata, later);
        assert!(store.known_workloads().contains_key("w1"));

        // The next sweep finds nothing expired but still clears the leftovers
        assert_eq!(store.reap(Duration::from_secs(60), later), 0);
        assert!(store.counts().is_empty());
        assert!(store.known_workloads().is_empty());
        assert_eq!(store.stats(), StoreStats::default());
    }

    #[test]
    fn test_reap_is_idempotent() {
        let store = AccumulatorStore::new();
        let start = Instant::now();
        store.merge(counts(&[("w1", "a:1", 1)]), workloads(&["w1"]), start);

        let later = start + Duration::from_secs(120);
        assert_eq!(store.reap(Duration::from_secs(60), later), 1);
        assert_eq!(store.reap(Duration::from_secs(60), later), 0);
        assert_eq!(store.stats(), StoreStats::default());
    }
}
