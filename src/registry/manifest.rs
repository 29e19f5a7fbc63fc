//! Identifier manifest: the registry's table of algorithm, metric, task and
//! learner names with their ordinals.
//!
//! The manifest is plain JSON data. It is parsed and validated before it is
//! cached, and every name is checked against it before it goes into a request.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt::Write as _;
use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use tracing::{info, warn};

use crate::common::error::{ClientError, ClientResult};
use crate::common::ids::{Algorithm, Learner, Metric, Task};

use super::domain::RunRegistry;

/// Highest manifest layout this client understands.
pub const SUPPORTED_MANIFEST_VERSION: u32 = 1;

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct IdentifierManifest {
    pub version: u32,
    pub algorithms: BTreeMap<String, u32>,
    pub metrics: BTreeMap<String, u32>,
    pub tasks: BTreeMap<String, u32>,
    pub learners: BTreeMap<String, u32>,
}

impl IdentifierManifest {
    /// Parse and validate manifest text.
    pub fn parse(raw: &str) -> ClientResult<Self> {
        let manifest: Self = serde_json::from_str(raw)
            .map_err(|err| ClientError::protocol(format!("identifier manifest is not valid: {err}")))?;
        manifest.validate()?;
        Ok(manifest)
    }

    fn validate(&self) -> ClientResult<()> {
        if self.version == 0 || self.version > SUPPORTED_MANIFEST_VERSION {
            return Err(ClientError::configuration(format!(
                "identifier manifest version {} is not supported (max {SUPPORTED_MANIFEST_VERSION})",
                self.version
            )));
        }
        for (kind, table) in self.tables() {
            let mut seen = BTreeSet::new();
            for (name, ordinal) in table {
                if name.trim().is_empty() {
                    return Err(ClientError::protocol(format!("empty {kind} name in manifest")));
                }
                if !seen.insert(*ordinal) {
                    return Err(ClientError::protocol(format!(
                        "duplicate {kind} ordinal {ordinal} in manifest"
                    )));
                }
            }
        }
        Ok(())
    }

    fn tables(&self) -> [(&'static str, &BTreeMap<String, u32>); 4] {
        [
            ("algorithm", &self.algorithms),
            ("metric", &self.metrics),
            ("task", &self.tasks),
            ("learner", &self.learners),
        ]
    }

    pub fn check_algorithm(&self, algorithm: &Algorithm) -> ClientResult<u32> {
        lookup("algorithm", &self.algorithms, algorithm.name())
    }

    pub fn check_metric(&self, metric: &Metric) -> ClientResult<u32> {
        lookup("metric", &self.metrics, metric.name())
    }

    pub fn check_task(&self, task: &Task) -> ClientResult<u32> {
        lookup("task", &self.tasks, task.name())
    }

    pub fn check_learner(&self, learner: &Learner) -> ClientResult<u32> {
        lookup("learner", &self.learners, learner.name())
    }

    /// Algorithm registered under `ordinal`.
    pub fn algorithm_by_ordinal(&self, ordinal: u32) -> Option<Algorithm> {
        self.algorithms
            .iter()
            .find(|(_, o)| **o == ordinal)
            .map(|(name, _)| Algorithm::new(name.clone()))
    }
}

fn lookup(kind: &str, table: &BTreeMap<String, u32>, name: &str) -> ClientResult<u32> {
    table.get(name).copied().ok_or_else(|| {
        ClientError::configuration(format!(
            "{kind} {name} is unknown to the registry; resync the identifier manifest"
        ))
    })
}

/// Lowercase hex SHA-256 of manifest text, used in logs to tell versions apart.
pub fn digest_hex(raw: &str) -> String {
    let digest = Sha256::digest(raw.as_bytes());
    let mut out = String::with_capacity(64);
    for byte in digest {
        let _ = write!(out, "{byte:02x}");
    }
    out
}

/// What a sync did to the cached copy.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum SyncOutcome {
    Created,
    Matched,
    Replaced,
}

/// Local copy of the manifest.
pub struct ManifestCache {
    path: PathBuf,
}

impl ManifestCache {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Cached manifest, if one was stored before.
    pub fn load(&self) -> ClientResult<Option<IdentifierManifest>> {
        if !self.path.exists() {
            return Ok(None);
        }
        let raw = fs::read_to_string(&self.path)?;
        IdentifierManifest::parse(&raw).map(Some)
    }

    /// Fetch the registry's manifest and make the cache match it byte for byte.
    pub fn sync(&self, registry: &dyn RunRegistry) -> ClientResult<(IdentifierManifest, SyncOutcome)> {
        info!("downloading identifier manifest");
        let remote = registry.fetch_identifier_manifest()?;
        let manifest = IdentifierManifest::parse(&remote)?;

        let outcome = match fs::read(&self.path) {
            Ok(cached) if cached == remote.as_bytes() => SyncOutcome::Matched,
            Ok(_) => SyncOutcome::Replaced,
            Err(_) => SyncOutcome::Created,
        };

        if outcome != SyncOutcome::Matched {
            self.store(&remote)?;
        }
        match outcome {
            SyncOutcome::Replaced => warn!(
                digest = %digest_hex(&remote),
                "cached identifier manifest differed from the registry; replaced it"
            ),
            _ => info!(digest = %digest_hex(&remote), ?outcome, "identifier manifest in sync"),
        }
        Ok((manifest, outcome))
    }

    /// Replace the cached copy wholesale via a sibling temp file.
    fn store(&self, raw: &str) -> ClientResult<()> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)?;
        }
        let tmp = self.path.with_extension("json.tmp");
        fs::write(&tmp, raw)?;
        fs::rename(&tmp, &self.path)?;
        Ok(())
    }
}
