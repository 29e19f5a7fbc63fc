mod support;

use std::cell::Cell;

use camels_client::common::config::{PrunePolicy, SplitPolicy};
use camels_client::data::domain::{Dataset, RawTable};
use camels_client::data::{fingerprint, preprocess};
use camels_client::evaluation::{EvaluationSettings, Evaluator, SessionOutcome, SessionReport};
use camels_client::registry::IdentifierManifest;
use camels_client::training::baseline::{BaselinePredictor, SummaryFeatures};
use camels_client::training::{FitOutcome, FitPredict};
use camels_client::{Algorithm, ClientError, ClientResult, ErrorCode, Metric, Task};

use support::{algorithms, metrics, ratings_table, CountingFitter, FakeRegistry, MANIFEST};

fn settings() -> EvaluationSettings {
    EvaluationSettings {
        split: SplitPolicy {
            seed: Some(7),
            ..SplitPolicy::default()
        },
        ..EvaluationSettings::default()
    }
}

fn completed(outcome: SessionOutcome) -> SessionReport {
    match outcome {
        SessionOutcome::Completed(report) => report,
        SessionOutcome::Aborted(err) => panic!("session aborted: {err}"),
    }
}

fn aborted(outcome: SessionOutcome) -> ClientError {
    match outcome {
        SessionOutcome::Aborted(err) => err,
        SessionOutcome::Completed(report) => panic!("session completed: {report:?}"),
    }
}

#[test]
fn new_dataset_is_registered_evaluated_and_uploaded() {
    let registry = FakeRegistry::default();
    let fitter = CountingFitter::default();
    let raw = ratings_table(10, 6);

    let report = completed(
        Evaluator::new(&registry, &fitter, &SummaryFeatures, settings()).evaluate(
            &raw,
            &Task::from("Rating"),
            &algorithms(&["GlobalMean"]),
            &metrics(&["FitTime"]),
        ),
    );

    assert_eq!(
        registry.calls(),
        vec!["check_hash", "save_metadata", "check_data_status", "save_runs"]
    );
    // one held-out rating per user
    assert_eq!(*fitter.calls.borrow(), vec![(Algorithm::from("GlobalMean"), 50, 10)]);

    let expected = fingerprint(&preprocess(&raw, &PrunePolicy::default()).unwrap());
    assert_eq!(report.fingerprint, expected);
    assert_eq!(report.rows, 60);

    let metadata = registry.saved_metadata.borrow();
    assert_eq!(metadata.len(), 1);
    assert_eq!(metadata[0].fingerprint, expected);
    assert_eq!(metadata[0].features.get("num_users"), Some(10.0));

    let uploaded = registry.uploaded();
    assert_eq!(uploaded.len(), 1);
    assert_eq!(uploaded[0].fingerprint, expected);
    assert_eq!(uploaded[0].algorithm, Algorithm::from("GlobalMean"));
    assert_eq!(uploaded[0].task, Task::from("Rating"));
    assert_eq!(uploaded[0].metric, Metric::from("FitTime"));
    assert_eq!(uploaded[0].score, 1.5);
    assert!(report.uploaded);
    assert!(report.upload_error.is_none());
}

#[test]
fn known_dataset_skips_metadata_upload() {
    let registry = FakeRegistry {
        hash_exists: true,
        ..FakeRegistry::default()
    };
    let fitter = CountingFitter::default();

    completed(
        Evaluator::new(&registry, &fitter, &SummaryFeatures, settings()).evaluate(
            &ratings_table(10, 6),
            &Task::from("Rating"),
            &algorithms(&["GlobalMean"]),
            &metrics(&["FitTime"]),
        ),
    );

    assert_eq!(registry.calls(), vec!["check_hash", "check_data_status", "save_runs"]);
    assert!(registry.saved_metadata.borrow().is_empty());
}

#[test]
fn fully_covered_algorithm_is_never_fitted() {
    let registry = FakeRegistry {
        hash_exists: true,
        existing: vec![("GlobalMean", "FitTime")],
        ..FakeRegistry::default()
    };
    let fitter = CountingFitter::default();

    let report = completed(
        Evaluator::new(&registry, &fitter, &SummaryFeatures, settings()).evaluate(
            &ratings_table(10, 6),
            &Task::from("Rating"),
            &algorithms(&["GlobalMean", "UserMean"]),
            &metrics(&["FitTime"]),
        ),
    );

    assert_eq!(fitter.fitted(), algorithms(&["UserMean"]));
    assert_eq!(report.skipped, algorithms(&["GlobalMean"]));
    assert_eq!(report.evaluated, algorithms(&["UserMean"]));

    let uploaded = registry.uploaded();
    assert_eq!(uploaded.len(), 1);
    assert_eq!(uploaded[0].algorithm, Algorithm::from("UserMean"));
}

#[test]
fn partially_covered_algorithm_uploads_only_missing_pairs() {
    let registry = FakeRegistry {
        hash_exists: true,
        existing: vec![("GlobalMean", "FitTime")],
        ..FakeRegistry::default()
    };
    let fitter = CountingFitter::default();

    let report = completed(
        Evaluator::new(&registry, &fitter, &SummaryFeatures, settings()).evaluate(
            &ratings_table(10, 6),
            &Task::from("Rating"),
            &algorithms(&["GlobalMean"]),
            &metrics(&["FitTime", "MeanAbsoluteError"]),
        ),
    );

    assert_eq!(fitter.fitted(), algorithms(&["GlobalMean"]));
    assert_eq!(report.runs.len(), 2);
    assert_eq!(report.new_runs.len(), 1);

    let uploaded = registry.uploaded();
    assert_eq!(uploaded.len(), 1);
    assert_eq!(uploaded[0].metric, Metric::from("MeanAbsoluteError"));
    assert!(uploaded[0].score >= 0.0);
}

#[test]
fn nothing_new_means_no_upload_call() {
    let registry = FakeRegistry {
        hash_exists: true,
        existing: vec![("GlobalMean", "FitTime"), ("UserMean", "FitTime")],
        ..FakeRegistry::default()
    };
    let fitter = CountingFitter::default();

    let report = completed(
        Evaluator::new(&registry, &fitter, &SummaryFeatures, settings()).evaluate(
            &ratings_table(10, 6),
            &Task::from("Rating"),
            &algorithms(&["GlobalMean", "UserMean"]),
            &metrics(&["FitTime"]),
        ),
    );

    assert!(fitter.fitted().is_empty());
    assert_eq!(report.skipped.len(), 2);
    assert!(!report.uploaded);
    assert!(!registry.calls().contains(&"save_runs"));
}

#[test]
fn status_query_failure_aborts_before_fitting() {
    let registry = FakeRegistry {
        hash_exists: true,
        fail_status: Some(ClientError::connectivity("connection refused")),
        ..FakeRegistry::default()
    };
    let fitter = CountingFitter::default();

    let err = aborted(
        Evaluator::new(&registry, &fitter, &SummaryFeatures, settings()).evaluate(
            &ratings_table(10, 6),
            &Task::from("Rating"),
            &algorithms(&["GlobalMean"]),
            &metrics(&["FitTime"]),
        ),
    );

    assert_eq!(err.code, ErrorCode::Connectivity);
    assert!(fitter.fitted().is_empty());
    assert!(!registry.calls().contains(&"save_runs"));
}

#[test]
fn hash_check_failure_aborts_session() {
    let registry = FakeRegistry {
        fail_check_hash: Some(ClientError::server_status(500)),
        ..FakeRegistry::default()
    };
    let fitter = CountingFitter::default();

    let err = aborted(
        Evaluator::new(&registry, &fitter, &SummaryFeatures, settings()).evaluate(
            &ratings_table(10, 6),
            &Task::from("Rating"),
            &algorithms(&["GlobalMean"]),
            &metrics(&["FitTime"]),
        ),
    );

    assert_eq!(err.code, ErrorCode::Protocol);
    assert_eq!(registry.calls(), vec!["check_hash"]);
    assert!(fitter.fitted().is_empty());
}

#[test]
fn malformed_table_aborts_without_registry_traffic() {
    let registry = FakeRegistry::default();
    let fitter = CountingFitter::default();
    let mut raw = RawTable::new(["user", "item"]);
    raw.push_row([1, 2]);

    let err = aborted(
        Evaluator::new(&registry, &fitter, &SummaryFeatures, settings()).evaluate(
            &raw,
            &Task::from("Rating"),
            &algorithms(&["GlobalMean"]),
            &metrics(&["FitTime"]),
        ),
    );

    assert_eq!(err.code, ErrorCode::Schema);
    assert!(registry.calls().is_empty());
    assert!(fitter.fitted().is_empty());
}

#[test]
fn upload_failure_keeps_results_locally() {
    let registry = FakeRegistry {
        hash_exists: true,
        fail_upload: Some(ClientError::connectivity("reset by peer")),
        ..FakeRegistry::default()
    };
    let fitter = CountingFitter::default();

    let report = completed(
        Evaluator::new(&registry, &fitter, &SummaryFeatures, settings()).evaluate(
            &ratings_table(10, 6),
            &Task::from("Rating"),
            &algorithms(&["GlobalMean", "ItemMean"]),
            &metrics(&["RootMeanSquaredError"]),
        ),
    );

    assert_eq!(report.runs.len(), 2);
    assert_eq!(report.new_runs.len(), 2);
    assert!(!report.uploaded);
    assert_eq!(
        report.upload_error.map(|e| e.code),
        Some(ErrorCode::Connectivity)
    );
}

#[test]
fn unknown_metric_fails_each_algorithm_before_fitting() {
    let registry = FakeRegistry::default();
    let fitter = CountingFitter::default();

    let report = completed(
        Evaluator::new(&registry, &fitter, &SummaryFeatures, settings()).evaluate(
            &ratings_table(10, 6),
            &Task::from("Rating"),
            &algorithms(&["GlobalMean"]),
            &metrics(&["FitTime", "NormalizedDCG"]),
        ),
    );

    assert!(fitter.fitted().is_empty());
    assert_eq!(report.failed.len(), 1);
    assert_eq!(report.failed[0].algorithm, Algorithm::from("GlobalMean"));
    assert_eq!(report.failed[0].error.code, ErrorCode::Configuration);
    assert!(!registry.calls().contains(&"save_runs"));
}

#[test]
fn fitter_failure_does_not_stop_other_algorithms() {
    let registry = FakeRegistry::default();
    let fitter = CountingFitter::default();

    let report = completed(
        Evaluator::new(&registry, &fitter, &SummaryFeatures, settings()).evaluate(
            &ratings_table(10, 6),
            &Task::from("Rating"),
            &algorithms(&["MatrixFactorization", "UserMean"]),
            &metrics(&["MeanAbsoluteError"]),
        ),
    );

    assert_eq!(report.failed.len(), 1);
    assert_eq!(report.failed[0].algorithm, Algorithm::from("MatrixFactorization"));
    assert_eq!(report.evaluated, algorithms(&["UserMean"]));
    assert_eq!(registry.uploaded().len(), 1);
}

#[test]
fn manifest_rejects_unknown_task_but_only_fails_unknown_algorithms() {
    let manifest = IdentifierManifest::parse(MANIFEST).unwrap();
    let fitter = CountingFitter::default();

    let registry = FakeRegistry::default();
    let err = aborted(
        Evaluator::new(&registry, &fitter, &SummaryFeatures, settings())
            .with_manifest(&manifest)
            .evaluate(
                &ratings_table(10, 6),
                &Task::from("Ranking"),
                &algorithms(&["GlobalMean"]),
                &metrics(&["FitTime"]),
            ),
    );
    assert_eq!(err.code, ErrorCode::Configuration);
    assert!(registry.calls().is_empty());

    let registry = FakeRegistry::default();
    let report = completed(
        Evaluator::new(&registry, &fitter, &SummaryFeatures, settings())
            .with_manifest(&manifest)
            .evaluate(
                &ratings_table(10, 6),
                &Task::from("Rating"),
                &algorithms(&["SVD", "GlobalMean"]),
                &metrics(&["FitTime"]),
            ),
    );
    assert_eq!(report.failed.len(), 1);
    assert_eq!(report.failed[0].algorithm, Algorithm::from("SVD"));
    assert_eq!(fitter.fitted(), algorithms(&["GlobalMean"]));

    // rejected algorithms never reach the status query
    let queries = registry.status_queries.borrow();
    assert_eq!(queries[0].1, algorithms(&["GlobalMean"]));
}

#[test]
fn local_only_session_makes_no_registry_calls() {
    let registry = FakeRegistry::default();
    let fitter = CountingFitter::default();
    let settings = EvaluationSettings {
        upload: false,
        ..settings()
    };

    let report = completed(
        Evaluator::new(&registry, &fitter, &SummaryFeatures, settings).evaluate(
            &ratings_table(10, 6),
            &Task::from("Rating"),
            &algorithms(&["GlobalMean", "UserMean", "ItemMean"]),
            &metrics(&["FitTime", "PredictTime"]),
        ),
    );

    assert!(registry.calls().is_empty());
    assert_eq!(report.runs.len(), 6);
    assert_eq!(report.new_runs.len(), 6);
    assert!(!report.uploaded);
}

/// Reports a predict time that grows by 0.25 s on every call.
#[derive(Default)]
struct SlowingFitter {
    calls: Cell<u32>,
}

impl FitPredict for SlowingFitter {
    fn fit_and_predict(
        &self,
        train: &Dataset,
        test: &Dataset,
        algorithm: &Algorithm,
    ) -> ClientResult<FitOutcome> {
        self.calls.set(self.calls.get() + 1);
        let mut outcome = BaselinePredictor.fit_and_predict(train, test, algorithm)?;
        outcome.predict_duration = 0.25 * f64::from(self.calls.get());
        Ok(outcome)
    }
}

#[test]
fn repetitions_average_the_scores() {
    let registry = FakeRegistry::default();
    let fitter = SlowingFitter::default();
    let settings = EvaluationSettings {
        repetitions: 3,
        ..settings()
    };

    let report = completed(
        Evaluator::new(&registry, &fitter, &SummaryFeatures, settings).evaluate(
            &ratings_table(10, 6),
            &Task::from("Rating"),
            &algorithms(&["GlobalMean"]),
            &metrics(&["PredictTime"]),
        ),
    );

    assert_eq!(fitter.calls.get(), 3);
    assert_eq!(report.runs.len(), 1);
    // mean of 0.25, 0.5 and 0.75
    assert_eq!(report.runs[0].score, 0.5);
}

#[test]
fn repeated_metric_yields_one_run() {
    let registry = FakeRegistry::default();
    let fitter = CountingFitter::default();

    let report = completed(
        Evaluator::new(&registry, &fitter, &SummaryFeatures, settings()).evaluate(
            &ratings_table(10, 6),
            &Task::from("Rating"),
            &algorithms(&["GlobalMean"]),
            &metrics(&["FitTime", "FitTime"]),
        ),
    );

    assert_eq!(report.runs.len(), 1);
    let uploaded = registry.uploaded();
    assert_eq!(uploaded.len(), 1);
    assert_eq!(uploaded[0].metric, Metric::from("FitTime"));
    assert_eq!(registry.status_queries.borrow()[0].3, metrics(&["FitTime"]));
}

#[test]
fn repeated_algorithm_is_fitted_and_uploaded_once() {
    let registry = FakeRegistry::default();
    let fitter = CountingFitter::default();

    let report = completed(
        Evaluator::new(&registry, &fitter, &SummaryFeatures, settings()).evaluate(
            &ratings_table(10, 6),
            &Task::from("Rating"),
            &algorithms(&["GlobalMean", "UserMean", "GlobalMean"]),
            &metrics(&["FitTime"]),
        ),
    );

    assert_eq!(fitter.fitted(), algorithms(&["GlobalMean", "UserMean"]));
    assert_eq!(report.evaluated, algorithms(&["GlobalMean", "UserMean"]));
    let uploaded: Vec<_> = registry.uploaded().into_iter().map(|r| r.algorithm).collect();
    assert_eq!(uploaded, algorithms(&["GlobalMean", "UserMean"]));
}
