//! Domain primitives for evaluation sessions.

use std::collections::BTreeMap;

use crate::common::error::{ClientError, ClientResult};
use crate::common::ids::{Algorithm, Fingerprint, Metric, Task};

/// One scored (algorithm, metric) outcome on one dataset and task.
#[derive(Clone, Debug, PartialEq)]
pub struct EvaluationRun {
    pub fingerprint: Fingerprint,
    pub algorithm: Algorithm,
    pub task: Task,
    pub metric: Metric,
    pub score: f64,
}

impl EvaluationRun {
    /// Deduplication key; the registry stores at most one run per key.
    pub fn key(&self) -> (Fingerprint, &Algorithm, &Task, &Metric) {
        (self.fingerprint, &self.algorithm, &self.task, &self.metric)
    }
}

/// Metrics this client knows how to compute.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum MetricKind {
    FitTime,
    PredictTime,
    RootMeanSquaredError,
    MeanAbsoluteError,
}

impl MetricKind {
    pub fn parse(metric: &Metric) -> ClientResult<Self> {
        match metric.name() {
            "FitTime" => Ok(Self::FitTime),
            "PredictTime" => Ok(Self::PredictTime),
            "RootMeanSquaredError" => Ok(Self::RootMeanSquaredError),
            "MeanAbsoluteError" => Ok(Self::MeanAbsoluteError),
            other => Err(ClientError::configuration(format!("unsupported metric {other}"))),
        }
    }
}

/// Scores collected across repetitions, per metric.
#[derive(Clone, Debug, Default)]
pub struct ScoreSheet {
    scores: BTreeMap<Metric, Vec<f64>>,
}

impl ScoreSheet {
    pub fn record(&mut self, metric: &Metric, score: f64) {
        self.scores.entry(metric.clone()).or_default().push(score);
    }

    /// Mean score of `metric`, if any repetition recorded one.
    pub fn mean(&self, metric: &Metric) -> Option<f64> {
        let values = self.scores.get(metric)?;
        if values.is_empty() {
            return None;
        }
        Some(values.iter().sum::<f64>() / values.len() as f64)
    }
}

/// An algorithm whose evaluation failed, with the reason.
#[derive(Clone, Debug, PartialEq)]
pub struct AlgorithmFailure {
    pub algorithm: Algorithm,
    pub error: ClientError,
}

/// Summary of a session that ran to completion.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct SessionReport {
    pub fingerprint: Fingerprint,
    /// Rows left after preprocessing.
    pub rows: usize,
    pub evaluated: Vec<Algorithm>,
    /// Algorithms whose every requested metric was already registered.
    pub skipped: Vec<Algorithm>,
    pub failed: Vec<AlgorithmFailure>,
    /// Every run scored in this session.
    pub runs: Vec<EvaluationRun>,
    /// Runs absent from the registry snapshot; the upload candidates.
    pub new_runs: Vec<EvaluationRun>,
    pub uploaded: bool,
    pub upload_error: Option<ClientError>,
}

/// Terminal state of an evaluation session.
#[derive(Clone, Debug, PartialEq)]
pub enum SessionOutcome {
    /// Every algorithm was processed, whatever its individual result.
    Completed(SessionReport),
    /// Schema rejection or a registry failure before fitting began.
    Aborted(ClientError),
}

impl SessionOutcome {
    pub fn report(&self) -> Option<&SessionReport> {
        match self {
            Self::Completed(report) => Some(report),
            Self::Aborted(_) => None,
        }
    }

    pub fn is_completed(&self) -> bool {
        matches!(self, Self::Completed(_))
    }
}
