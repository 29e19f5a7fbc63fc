//! Collaborator contracts for model fitting and dataset characterisation.
//!
//! The client never fits models itself. Implementations of these traits live
//! outside the evaluation core; `training::baseline` ships simple reference
//! implementations.

use std::collections::BTreeMap;

use serde_json::{json, Map, Value};

use crate::common::error::ClientResult;
use crate::common::ids::{Algorithm, Fingerprint};
use crate::data::domain::Dataset;

/// Named numeric characteristics of a dataset.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct MetaFeatures(BTreeMap<String, f64>);

impl MetaFeatures {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, name: impl Into<String>, value: f64) {
        self.0.insert(name.into(), value);
    }

    pub fn get(&self, name: &str) -> Option<f64> {
        self.0.get(name).copied()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &f64)> {
        self.0.iter()
    }

    /// Column-oriented JSON object (`{"name": [value]}`) the registry stores as a table row.
    pub fn to_wire(&self) -> Map<String, Value> {
        self.0
            .iter()
            .map(|(name, value)| (name.clone(), json!([value])))
            .collect()
    }

    /// Wire form with the dataset fingerprint appended under `Hash`.
    pub fn to_wire_with_hash(&self, fingerprint: Fingerprint) -> Map<String, Value> {
        let mut wire = self.to_wire();
        wire.insert("Hash".to_string(), json!([fingerprint.raw()]));
        wire
    }
}

impl FromIterator<(String, f64)> for MetaFeatures {
    fn from_iter<I: IntoIterator<Item = (String, f64)>>(iter: I) -> Self {
        Self(iter.into_iter().collect())
    }
}

/// Result of one fit/predict call.
#[derive(Clone, Debug, PartialEq)]
pub struct FitOutcome {
    /// One prediction per test row, in test row order.
    pub predictions: Vec<f64>,
    /// Seconds spent fitting.
    pub fit_duration: f64,
    /// Seconds spent predicting.
    pub predict_duration: f64,
}

/// Fits `algorithm` on `train` and predicts the ratings of `test`.
pub trait FitPredict {
    fn fit_and_predict(
        &self,
        train: &Dataset,
        test: &Dataset,
        algorithm: &Algorithm,
    ) -> ClientResult<FitOutcome>;
}

/// Computes the meta-features the registry's meta-learners are trained on.
pub trait MetaFeatureExtractor {
    fn calculate_meta_features(&self, dataset: &Dataset) -> ClientResult<MetaFeatures>;
}

/// Trains the final model once the best algorithm is known.
pub trait BestModelTrainer {
    type Model;

    fn train_best_model(&self, dataset: &Dataset, algorithm: &Algorithm) -> ClientResult<Self::Model>;
}
