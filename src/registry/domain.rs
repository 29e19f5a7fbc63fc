//! Contract between the client and the remote run registry.

use std::collections::BTreeSet;

use crate::common::error::ClientResult;
use crate::common::ids::{Algorithm, Fingerprint, Learner, Metric, Task};
use crate::evaluation::domain::EvaluationRun;
use crate::training::domain::MetaFeatures;

/// Acknowledgement payload returned by write endpoints, logged verbatim.
pub type Ack = serde_json::Value;

/// Answer to "does the registry know this dataset?".
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct HashCheck {
    /// Human readable label sent by the registry.
    pub message: String,
    pub already_exists: bool,
}

/// Metadata uploaded once per new dataset.
#[derive(Clone, Debug, PartialEq)]
pub struct DatasetMetadata {
    pub fingerprint: Fingerprint,
    pub features: MetaFeatures,
}

/// Point-in-time view of the runs the registry already holds for one
/// fingerprint and task. Captured once per session, before any fitting.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ExistingRuns {
    pairs: BTreeSet<(Algorithm, Metric)>,
}

impl ExistingRuns {
    pub fn new(pairs: impl IntoIterator<Item = (Algorithm, Metric)>) -> Self {
        Self {
            pairs: pairs.into_iter().collect(),
        }
    }

    pub fn contains(&self, algorithm: &Algorithm, metric: &Metric) -> bool {
        self.pairs.contains(&(algorithm.clone(), metric.clone()))
    }

    /// True when every requested metric already has a run for `algorithm`.
    pub fn covers_all(&self, algorithm: &Algorithm, metrics: &[Metric]) -> bool {
        metrics.iter().all(|m| self.contains(algorithm, m))
    }

    pub fn iter(&self) -> impl Iterator<Item = &(Algorithm, Metric)> {
        self.pairs.iter()
    }

    pub fn len(&self) -> usize {
        self.pairs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pairs.is_empty()
    }
}

/// Registry operations the client depends on. Every call is synchronous and
/// either succeeds as a whole or fails as a whole.
pub trait RunRegistry {
    fn check_hash(&self, fingerprint: Fingerprint) -> ClientResult<HashCheck>;

    fn save_metadata(&self, metadata: &DatasetMetadata) -> ClientResult<Ack>;

    fn check_data_status(
        &self,
        fingerprint: Fingerprint,
        algorithms: &[Algorithm],
        task: &Task,
        metrics: &[Metric],
    ) -> ClientResult<ExistingRuns>;

    fn save_runs(&self, runs: &[EvaluationRun]) -> ClientResult<Ack>;

    fn populate_database(&self) -> ClientResult<Ack>;

    /// Returns one evaluation table (JSON text) per trained meta-learner.
    fn train_meta_learner(
        &self,
        metrics: &[Metric],
        tasks: &[Task],
        learners: &[Learner],
    ) -> ClientResult<Vec<String>>;

    /// Predicted score per algorithm, indexed by `ordinal - 1`.
    fn predict_with_meta_learner(
        &self,
        features: &MetaFeatures,
        metric: &Metric,
        task: &Task,
        learner: &Learner,
    ) -> ClientResult<Vec<f64>>;

    /// Raw identifier manifest text as published by the registry.
    fn fetch_identifier_manifest(&self) -> ClientResult<String>;
}
