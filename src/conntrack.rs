//! Connection tracking table model and readers.
//!
//! A [`Conn`] is one row of the kernel connection tracking table, reduced to
//! the original direction's endpoints plus state and protocol. Rows are read
//! fresh on every scrape through a [`ConnectionSource`].

use std::fs;
use std::net::IpAddr;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

use crate::error::SourceError;

/// Default location of the netfilter connection tracking table.
pub const DEFAULT_CONNTRACK_PATH: &str = "/proc/net/nf_conntrack";

/// State reported for protocols whose conntrack entries carry no state column.
pub const STATELESS: &str = "NONE";

/// One observed connection.
///
/// `origin_*` is the initiating endpoint, `reply_*` the endpoint the
/// connection was opened towards.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Conn {
    pub origin_ip: String,
    pub origin_port: String,
    pub reply_ip: String,
    pub reply_port: String,
    pub state: String,
    pub protocol: String,
}

/// Capability to read the current connection tracking table.
pub trait ConnectionSource: Send + Sync {
    fn connections(&self) -> Result<Vec<Conn>, SourceError>;
}

impl<F> ConnectionSource for F
where
    F: Fn() -> Result<Vec<Conn>, SourceError> + Send + Sync,
{
    fn connections(&self) -> Result<Vec<Conn>, SourceError> {
        self()
    }
}

/// Reads connections from a `/proc/net/nf_conntrack` style file.
#[derive(Debug, Clone)]
pub struct ProcConntrackSource {
    path: PathBuf,
}

impl ProcConntrackSource {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Default for ProcConntrackSource {
    fn default() -> Self {
        Self::new(DEFAULT_CONNTRACK_PATH)
    }
}

impl ConnectionSource for ProcConntrackSource {
    fn connections(&self) -> Result<Vec<Conn>, SourceError> {
        let content =
            fs::read_to_string(&self.path).map_err(|e| SourceError::io(&self.path, e))?;
        let (conns, skipped) = parse_conntrack_table(&content);
        if skipped > 0 {
            warn!(
                "Skipped {} malformed entries while reading {}",
                skipped,
                self.path.display()
            );
        }
        Ok(conns)
    }
}

/// Parses a whole table, returning the valid connections and the number of
/// lines that had to be skipped.
pub fn parse_conntrack_table(content: &str) -> (Vec<Conn>, usize) {
    let mut conns = Vec::new();
    let mut skipped = 0usize;

    for line in content.lines() {
        if line.trim().is_empty() {
            continue;
        }
        match parse_conntrack_line(line) {
            Some(conn) => conns.push(conn),
            None => {
                debug!("Skipping malformed conntrack entry: {}", line);
                skipped += 1;
            }
        }
    }

    (conns, skipped)
}

/// Parses a single conntrack line.
///
/// Accepts both the `nf_conntrack` layout (`ipv4 2 tcp 6 ...`) and the legacy
/// `ip_conntrack` layout (`tcp 6 ...`). Returns `None` when the line lacks a
/// parseable original-direction source or destination address.
pub fn parse_conntrack_line(line: &str) -> Option<Conn> {
    let fields: Vec<&str> = line.split_whitespace().collect();

    let base = match fields.first() {
        Some(&"ipv4") | Some(&"ipv6") => 2,
        _ => 0,
    };

    // protocol name, protocol number, timeout
    let protocol = *fields.get(base)?;
    fields.get(base + 2)?;

    let state = match fields.get(base + 3) {
        Some(token) if !token.contains('=') && !token.starts_with('[') => (*token).to_string(),
        _ => STATELESS.to_string(),
    };

    let mut src = None;
    let mut dst = None;
    let mut sport = None;
    let mut dport = None;

    // Only the first occurrence of each key belongs to the original direction.
    for token in &fields[base + 3..] {
        let Some((key, value)) = token.split_once('=') else {
            continue;
        };
        let slot = match key {
            "src" => &mut src,
            "dst" => &mut dst,
            "sport" => &mut sport,
            "dport" => &mut dport,
            _ => continue,
        };
        if slot.is_none() {
            *slot = Some(value);
        }
    }

    let origin_ip = src.filter(|ip| ip.parse::<IpAddr>().is_ok())?;
    let reply_ip = dst.filter(|ip| ip.parse::<IpAddr>().is_ok())?;

    Some(Conn {
        origin_ip: origin_ip.to_string(),
        origin_port: sport.unwrap_or_default().to_string(),
        reply_ip: reply_ip.to_string(),
        reply_port: dport.unwrap_or_default().to_string(),
        state,
        protocol: protocol.to_string(),
    })
}
