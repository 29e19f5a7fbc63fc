//! Evaluation sessions: preprocess, identify, fit, score, reconcile, upload.

use std::collections::{BTreeSet, HashSet};
use std::time::Instant;

use tracing::{error, info, info_span, warn};

use crate::common::config::{AppCfg, PrunePolicy, SplitPolicy};
use crate::common::error::{ClientError, ClientResult};
use crate::common::ids::{Algorithm, Fingerprint, Metric, Task};
use crate::common::time;
use crate::data::domain::{Dataset, RawTable};
use crate::data::fingerprint::fingerprint;
use crate::data::service::preprocess;
use crate::data::split::Partitioner;
use crate::registry::domain::{DatasetMetadata, ExistingRuns, RunRegistry};
use crate::registry::manifest::IdentifierManifest;
use crate::training::domain::{FitPredict, MetaFeatureExtractor};

use super::domain::{
    AlgorithmFailure, EvaluationRun, MetricKind, ScoreSheet, SessionOutcome, SessionReport,
};
use super::metrics as scoring;

/// Knobs of one evaluation session.
#[derive(Clone, Debug, PartialEq)]
pub struct EvaluationSettings {
    /// Consult the registry and upload new runs.
    pub upload: bool,
    pub prune: PrunePolicy,
    pub split: SplitPolicy,
    pub repetitions: usize,
}

impl Default for EvaluationSettings {
    fn default() -> Self {
        Self {
            upload: true,
            prune: PrunePolicy::default(),
            split: SplitPolicy::default(),
            repetitions: 1,
        }
    }
}

impl EvaluationSettings {
    pub fn from_cfg(cfg: &AppCfg, upload: bool) -> Self {
        Self {
            upload,
            prune: cfg.prune.clone(),
            split: cfg.split.clone(),
            repetitions: cfg.repetitions.max(1),
        }
    }
}

/// Runs the requested (algorithm, metric) grid against one dataset and
/// reconciles the scores with the registry.
pub struct Evaluator<'a> {
    registry: &'a dyn RunRegistry,
    fitter: &'a dyn FitPredict,
    features: &'a dyn MetaFeatureExtractor,
    manifest: Option<&'a IdentifierManifest>,
    settings: EvaluationSettings,
}

impl<'a> Evaluator<'a> {
    pub fn new(
        registry: &'a dyn RunRegistry,
        fitter: &'a dyn FitPredict,
        features: &'a dyn MetaFeatureExtractor,
        settings: EvaluationSettings,
    ) -> Self {
        Self {
            registry,
            fitter,
            features,
            manifest: None,
            settings,
        }
    }

    /// Check every identifier against `manifest` before it is used.
    pub fn with_manifest(mut self, manifest: &'a IdentifierManifest) -> Self {
        self.manifest = Some(manifest);
        self
    }

    /// Evaluate `algorithms` x `metrics` for `task` on `raw`.
    pub fn evaluate(
        &self,
        raw: &RawTable,
        task: &Task,
        algorithms: &[Algorithm],
        metrics: &[Metric],
    ) -> SessionOutcome {
        let started = Instant::now();
        match self.run(raw, task, algorithms, metrics) {
            Ok(report) => {
                info!(
                    fingerprint = %report.fingerprint,
                    evaluated = report.evaluated.len(),
                    skipped = report.skipped.len(),
                    failed = report.failed.len(),
                    uploaded = report.uploaded,
                    dur_ms = time::elapsed_ms(started) as u64,
                    "evaluation finished"
                );
                SessionOutcome::Completed(report)
            }
            Err(err) => {
                error!(code = err.code as u32, error = %err, "evaluation aborted");
                SessionOutcome::Aborted(err)
            }
        }
    }

    fn run(
        &self,
        raw: &RawTable,
        task: &Task,
        algorithms: &[Algorithm],
        metrics: &[Metric],
    ) -> ClientResult<SessionReport> {
        let algorithms = distinct(algorithms);
        let metrics = distinct(metrics);
        let metrics = metrics.as_slice();

        info!("preprocessing data");
        let dataset = preprocess(raw, &self.settings.prune)?;
        let fp = fingerprint(&dataset);

        let mut report = SessionReport {
            fingerprint: fp,
            rows: dataset.len(),
            ..SessionReport::default()
        };
        let algorithms = self.admit(task, &algorithms, metrics, &mut report.failed)?;

        let existing = if self.settings.upload {
            self.identify(&dataset, fp, task, &algorithms, metrics)?
        } else {
            ExistingRuns::default()
        };

        info!(fingerprint = %fp, algorithms = algorithms.len(), "evaluating algorithms");
        let mut partitioner = Partitioner::new(self.settings.split.clone());
        for algorithm in &algorithms {
            if existing.covers_all(algorithm, metrics) {
                info!(
                    %algorithm,
                    "all algorithm and metric combos already exist; skipping evaluation"
                );
                report.skipped.push(algorithm.clone());
                continue;
            }

            let span = info_span!("algorithm", %algorithm);
            let _enter = span.enter();
            match self.evaluate_algorithm(&dataset, &mut partitioner, fp, task, algorithm, metrics) {
                Ok(runs) => {
                    report.evaluated.push(algorithm.clone());
                    report.runs.extend(runs);
                }
                Err(err) => {
                    warn!(error = %err, "evaluation failed");
                    report.failed.push(AlgorithmFailure {
                        algorithm: algorithm.clone(),
                        error: err,
                    });
                }
            }
        }

        report.new_runs = new_runs(&report.runs, &existing);
        if self.settings.upload && !report.new_runs.is_empty() {
            info!(runs = report.new_runs.len(), "uploading runs");
            match self.registry.save_runs(&report.new_runs) {
                Ok(ack) => {
                    info!(%ack, "server returned");
                    report.uploaded = true;
                }
                Err(err) => {
                    error!(error = %err, "upload failed; results kept locally");
                    report.upload_error = Some(err);
                }
            }
        } else {
            info!("skipping upload");
        }
        Ok(report)
    }

    /// Apply the manifest compatibility check. Unknown tasks or metrics abort
    /// the session; unknown algorithms fail on their own.
    fn admit(
        &self,
        task: &Task,
        algorithms: &[Algorithm],
        metrics: &[Metric],
        failed: &mut Vec<AlgorithmFailure>,
    ) -> ClientResult<Vec<Algorithm>> {
        let Some(manifest) = self.manifest else {
            return Ok(algorithms.to_vec());
        };
        manifest.check_task(task)?;
        for metric in metrics {
            manifest.check_metric(metric)?;
        }

        let mut admitted = Vec::with_capacity(algorithms.len());
        for algorithm in algorithms {
            match manifest.check_algorithm(algorithm) {
                Ok(_) => admitted.push(algorithm.clone()),
                Err(error) => {
                    warn!(%algorithm, %error, "algorithm rejected");
                    failed.push(AlgorithmFailure {
                        algorithm: algorithm.clone(),
                        error,
                    });
                }
            }
        }
        Ok(admitted)
    }

    /// Register the dataset if needed and capture the existing-run snapshot.
    fn identify(
        &self,
        dataset: &Dataset,
        fp: Fingerprint,
        task: &Task,
        algorithms: &[Algorithm],
        metrics: &[Metric],
    ) -> ClientResult<ExistingRuns> {
        info!(fingerprint = %fp, "checking if hash exists on server");
        let check = self.registry.check_hash(fp)?;
        info!(message = %check.message, already_exists = check.already_exists, "server returned");

        if !check.already_exists {
            let features = self.features.calculate_meta_features(dataset)?;
            info!(features = features.len(), "saving metadata on server");
            let ack = self.registry.save_metadata(&DatasetMetadata {
                fingerprint: fp,
                features,
            })?;
            info!(%ack, "server returned");
        }

        info!("checking metadata run status");
        let existing = self
            .registry
            .check_data_status(fp, algorithms, task, metrics)?;
        for (algorithm, metric) in existing.iter() {
            info!(%algorithm, %metric, "run exists");
        }
        Ok(existing)
    }

    fn evaluate_algorithm(
        &self,
        dataset: &Dataset,
        partitioner: &mut Partitioner,
        fp: Fingerprint,
        task: &Task,
        algorithm: &Algorithm,
        metrics: &[Metric],
    ) -> ClientResult<Vec<EvaluationRun>> {
        let kinds = metrics
            .iter()
            .map(MetricKind::parse)
            .collect::<ClientResult<Vec<_>>>()?;

        info!("started evaluation");
        let mut sheet = ScoreSheet::default();
        for _ in 0..self.settings.repetitions.max(1) {
            let split = partitioner.split(dataset);
            let outcome = self
                .fitter
                .fit_and_predict(&split.train, &split.test, algorithm)?;
            let truth = split.test.ratings();

            for (metric, kind) in metrics.iter().zip(&kinds) {
                let score = match kind {
                    MetricKind::FitTime => outcome.fit_duration,
                    MetricKind::PredictTime => outcome.predict_duration,
                    MetricKind::RootMeanSquaredError => {
                        scoring::root_mean_squared_error(&outcome.predictions, &truth)?
                    }
                    MetricKind::MeanAbsoluteError => {
                        scoring::mean_absolute_error(&outcome.predictions, &truth)?
                    }
                };
                info!(%metric, score, "scored");
                sheet.record(metric, score);
            }
        }

        metrics
            .iter()
            .map(|metric| {
                let score = sheet
                    .mean(metric)
                    .ok_or_else(|| ClientError::internal(format!("no score recorded for {metric}")))?;
                Ok(EvaluationRun {
                    fingerprint: fp,
                    algorithm: algorithm.clone(),
                    task: task.clone(),
                    metric: metric.clone(),
                    score,
                })
            })
            .collect()
    }
}

/// Runs whose (algorithm, metric) pair is absent from the snapshot, at most
/// one per run key.
pub fn new_runs(runs: &[EvaluationRun], existing: &ExistingRuns) -> Vec<EvaluationRun> {
    let mut seen = HashSet::with_capacity(runs.len());
    runs.iter()
        .filter(|run| !existing.contains(&run.algorithm, &run.metric))
        .filter(|run| seen.insert(run.key()))
        .cloned()
        .collect()
}

/// Request names with repeats removed, first appearance wins.
fn distinct<T: Clone + Ord>(items: &[T]) -> Vec<T> {
    let mut seen = BTreeSet::new();
    items.iter().filter(|item| seen.insert(*item)).cloned().collect()
}
