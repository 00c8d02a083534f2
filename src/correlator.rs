//! Workload/connection correlation.
//!
//! Attributes conntrack rows to workloads by comparing endpoint addresses
//! with each workload's IP, and derives the remote endpoint seen from the
//! workload's side of the connection.

use ahash::AHashMap as HashMap;

use crate::conntrack::Conn;
use crate::workload::Workload;

/// Identity of one series within a workload: state, protocol and remote endpoint.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TupleKey {
    pub state: String,
    pub protocol: String,
    pub destination: String,
}

impl TupleKey {
    pub fn new(
        state: impl Into<String>,
        protocol: impl Into<String>,
        destination: impl Into<String>,
    ) -> Self {
        Self {
            state: state.into(),
            protocol: protocol.into(),
            destination: destination.into(),
        }
    }
}

/// Per-workload series counts.
pub type TupleCounts = HashMap<TupleKey, u64>;

/// Series counts keyed by workload id.
pub type WorkloadCounts = HashMap<String, TupleCounts>;

/// Remote endpoint of `conn` as seen from a workload at `ip`.
///
/// The origin side is checked first, so a loopback connection whose both
/// ends carry the workload IP resolves to the reply endpoint.
pub fn remote_endpoint(ip: &str, conn: &Conn) -> Option<String> {
    if ip.is_empty() {
        return None;
    }
    if ip == conn.origin_ip {
        Some(format!("{}:{}", conn.reply_ip, conn.reply_port))
    } else if ip == conn.reply_ip {
        Some(format!("{}:{}", conn.origin_ip, conn.origin_port))
    } else {
        None
    }
}

/// Counts connections per workload and tuple key.
///
/// A connection relevant to several workloads is counted once for each.
/// Workloads without any matching connection are absent from the result.
pub fn correlate(workloads: &[Workload], conns: &[Conn]) -> WorkloadCounts {
    let mut counts = WorkloadCounts::new();

    for workload in workloads {
        for conn in conns {
            let Some(destination) = remote_endpoint(&workload.ip, conn) else {
                continue;
            };
            let key = TupleKey::new(conn.state.as_str(), conn.protocol.as_str(), destination);
            *counts
                .entry(workload.id.clone())
                .or_default()
                .entry(key)
                .or_insert(0) += 1;
        }
    }

    counts
}
