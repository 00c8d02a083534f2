//! Monitored workloads and the listers that supply them.
//!
//! Workloads are fetched fresh on every scrape. The lister's [`kind`] names
//! the label that carries the workload name in exported metrics
//! (e.g. `container="web-1"`).
//!
//! [`kind`]: WorkloadLister::kind

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::debug;

use crate::error::SourceError;

/// Default label name carrying the workload name.
pub const DEFAULT_WORKLOAD_KIND: &str = "container";

/// A monitored unit with an address and metadata labels.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Workload {
    /// Stable identity. Falls back to `name` when empty.
    #[serde(default)]
    pub id: String,
    pub name: String,
    /// Address compared verbatim against conntrack endpoints. Empty never matches.
    #[serde(default, alias = "ip_address")]
    pub ip: String,
    #[serde(default)]
    pub labels: BTreeMap<String, String>,
}

impl Workload {
    pub fn new(id: impl Into<String>, name: impl Into<String>, ip: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            ip: ip.into(),
            labels: BTreeMap::new(),
        }
    }

    pub fn with_label(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.labels.insert(key.into(), value.into());
        self
    }

    fn normalized(mut self) -> Self {
        if self.id.is_empty() {
            self.id = self.name.clone();
        }
        self
    }
}

/// Capability to enumerate the current set of monitored workloads.
pub trait WorkloadLister: Send + Sync {
    /// Label name used for the workload name, e.g. `container` or `pod`.
    fn kind(&self) -> &str;

    fn workloads(&self) -> Result<Vec<Workload>, SourceError>;
}

/// Serves a fixed list of workloads, typically declared in the config file.
#[derive(Debug, Clone)]
pub struct StaticWorkloadLister {
    kind: String,
    workloads: Vec<Workload>,
}

impl StaticWorkloadLister {
    pub fn new(kind: impl Into<String>, workloads: Vec<Workload>) -> Self {
        Self {
            kind: kind.into(),
            workloads: workloads.into_iter().map(Workload::normalized).collect(),
        }
    }
}

impl WorkloadLister for StaticWorkloadLister {
    fn kind(&self) -> &str {
        &self.kind
    }

    fn workloads(&self) -> Result<Vec<Workload>, SourceError> {
        Ok(self.workloads.clone())
    }
}

/// On-disk layout read by [`FileWorkloadLister`].
#[derive(Debug, Default, Serialize, Deserialize)]
pub struct WorkloadFile {
    #[serde(default)]
    pub workloads: Vec<Workload>,
}

/// Re-reads a YAML or JSON workload document on every call, so an external
/// agent can keep it current.
#[derive(Debug, Clone)]
pub struct FileWorkloadLister {
    kind: String,
    path: PathBuf,
}

impl FileWorkloadLister {
    pub fn new(kind: impl Into<String>, path: impl Into<PathBuf>) -> Self {
        Self {
            kind: kind.into(),
            path: path.into(),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl WorkloadLister for FileWorkloadLister {
    fn kind(&self) -> &str {
        &self.kind
    }

    fn workloads(&self) -> Result<Vec<Workload>, SourceError> {
        let content =
            fs::read_to_string(&self.path).map_err(|e| SourceError::io(&self.path, e))?;

        let file: WorkloadFile = match self.path.extension().and_then(|s| s.to_str()) {
            Some("json") => serde_json::from_str(&content).map_err(|source| SourceError::Json {
                path: self.path.clone(),
                source,
            })?,
            _ => serde_yaml::from_str(&content).map_err(|source| SourceError::Yaml {
                path: self.path.clone(),
                source,
            })?,
        };

        debug!(
            "Loaded {} workloads from {}",
            file.workloads.len(),
            self.path.display()
        );
        Ok(file
            .workloads
            .into_iter()
            .map(Workload::normalized)
            .collect())
    }
}
