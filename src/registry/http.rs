//! Blocking HTTP implementation of [`RunRegistry`].
//!
//! Endpoints live directly under the configured base URL. Query parameters
//! and form fields that carry lists are JSON encoded strings. Any status other
//! than 200 is a protocol failure; the status itself is not interpreted.

use std::time::{Duration, Instant};

use reqwest::blocking::{Client, Response};
use reqwest::StatusCode;
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;
use tracing::debug;

use crate::common::config::AppCfg;
use crate::common::error::{ClientError, ClientResult};
use crate::common::ids::{names, Algorithm, Fingerprint, Learner, Metric, Task};
use crate::common::time;
use crate::evaluation::domain::EvaluationRun;
use crate::training::domain::MetaFeatures;

use super::domain::{Ack, DatasetMetadata, ExistingRuns, HashCheck, RunRegistry};

/// Row layout of the registry's run table; scalar columns travel as one-element lists.
#[derive(Debug, Serialize)]
struct WireRun<'a> {
    #[serde(rename = "Hash")]
    hash: u64,
    #[serde(rename = "Algorithm")]
    algorithm: [&'a str; 1],
    #[serde(rename = "Task")]
    task: [&'a str; 1],
    #[serde(rename = "Metric")]
    metric: [&'a str; 1],
    #[serde(rename = "Score")]
    score: [f64; 1],
}

impl<'a> From<&'a EvaluationRun> for WireRun<'a> {
    fn from(run: &'a EvaluationRun) -> Self {
        Self {
            hash: run.fingerprint.raw(),
            algorithm: [run.algorithm.name()],
            task: [run.task.name()],
            metric: [run.metric.name()],
            score: [run.score],
        }
    }
}

/// Registry reached over HTTP at `cfg.registry_url`.
pub struct HttpRegistry {
    base_url: String,
    http: Client,
}

impl HttpRegistry {
    pub fn new(cfg: &AppCfg) -> ClientResult<Self> {
        let http = Client::builder()
            .timeout(Duration::from_secs(cfg.timeout_secs))
            .build()
            .map_err(|err| ClientError::configuration(format!("cannot build http client: {err}")))?;
        Ok(Self {
            base_url: cfg.registry_url.clone(),
            http,
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn url(&self, endpoint: &str) -> String {
        format!("{}{endpoint}", self.base_url)
    }

    fn get(&self, endpoint: &str, query: &[(&str, String)]) -> ClientResult<String> {
        let started = Instant::now();
        let response = self.http.get(self.url(endpoint)).query(query).send();
        let body = read_body(endpoint, response)?;
        debug!(endpoint, dur_ms = time::elapsed_ms(started) as u64, "registry GET");
        Ok(body)
    }

    fn post_form(&self, endpoint: &str, form: &[(&str, String)]) -> ClientResult<String> {
        let started = Instant::now();
        let response = self.http.post(self.url(endpoint)).form(form).send();
        let body = read_body(endpoint, response)?;
        debug!(endpoint, dur_ms = time::elapsed_ms(started) as u64, "registry POST");
        Ok(body)
    }
}

fn read_body(endpoint: &str, response: reqwest::Result<Response>) -> ClientResult<String> {
    let response = response.map_err(|err| {
        ClientError::connectivity(format!(
            "connection to the server could not be established ({endpoint}): {err}"
        ))
    })?;
    if response.status() != StatusCode::OK {
        return Err(ClientError::server_status(response.status().as_u16()));
    }
    response
        .text()
        .map_err(|err| ClientError::protocol(format!("unreadable response from {endpoint}: {err}")))
}

fn decode<T: DeserializeOwned>(endpoint: &str, body: &str) -> ClientResult<T> {
    serde_json::from_str(body)
        .map_err(|err| ClientError::protocol(format!("unexpected payload from {endpoint}: {err}")))
}

fn encode<T: Serialize + ?Sized>(value: &T) -> ClientResult<String> {
    serde_json::to_string(value)
        .map_err(|err| ClientError::internal(format!("cannot encode request: {err}")))
}

impl RunRegistry for HttpRegistry {
    fn check_hash(&self, fingerprint: Fingerprint) -> ClientResult<HashCheck> {
        let body = self.get("check_hash", &[("l_hash", fingerprint.to_string())])?;
        // second element is true when the registry has no metadata for the hash yet
        let (message, metadata_missing): (String, bool) = decode("check_hash", &body)?;
        Ok(HashCheck {
            message,
            already_exists: !metadata_missing,
        })
    }

    fn save_metadata(&self, metadata: &DatasetMetadata) -> ClientResult<Ack> {
        let wire = metadata.features.to_wire_with_hash(metadata.fingerprint);
        let body = self.post_form("save_metadata", &[("meta_data", encode(&wire)?)])?;
        decode("save_metadata", &body)
    }

    fn check_data_status(
        &self,
        fingerprint: Fingerprint,
        algorithms: &[Algorithm],
        task: &Task,
        metrics: &[Metric],
    ) -> ClientResult<ExistingRuns> {
        let body = self.get(
            "check_data_status",
            &[
                ("l_hash", fingerprint.to_string()),
                ("algo_names", encode(&names(algorithms))?),
                ("task_name", task.to_string()),
                ("metric_names", encode(&names(metrics))?),
            ],
        )?;
        let pairs: Vec<(String, String)> = decode("check_data_status", &body)?;
        Ok(ExistingRuns::new(
            pairs
                .into_iter()
                .map(|(algorithm, metric)| (Algorithm::new(algorithm), Metric::new(metric))),
        ))
    }

    fn save_runs(&self, runs: &[EvaluationRun]) -> ClientResult<Ack> {
        let wire: Vec<WireRun<'_>> = runs.iter().map(WireRun::from).collect();
        let body = self.post_form("save_runs", &[("evaluations", encode(&wire)?)])?;
        decode("save_runs", &body)
    }

    fn populate_database(&self) -> ClientResult<Ack> {
        let body = self.post_form("populate_database", &[])?;
        decode("populate_database", &body)
    }

    fn train_meta_learner(
        &self,
        metrics: &[Metric],
        tasks: &[Task],
        learners: &[Learner],
    ) -> ClientResult<Vec<String>> {
        let body = self.post_form(
            "train_meta_learner",
            &[
                ("metric_names", encode(&names(metrics))?),
                ("task_names", encode(&names(tasks))?),
                ("learner_names", encode(&names(learners))?),
            ],
        )?;
        let tables: Vec<Value> = decode("train_meta_learner", &body)?;
        Ok(tables
            .into_iter()
            .map(|table| match table {
                Value::String(text) => text,
                other => other.to_string(),
            })
            .collect())
    }

    fn predict_with_meta_learner(
        &self,
        features: &MetaFeatures,
        metric: &Metric,
        task: &Task,
        learner: &Learner,
    ) -> ClientResult<Vec<f64>> {
        let body = self.get(
            "predict_with_meta_learner",
            &[
                ("meta_data", encode(&features.to_wire())?),
                ("metric_name", metric.to_string()),
                ("task_name", task.to_string()),
                ("learner_name", learner.to_string()),
            ],
        )?;
        let rows: Vec<Vec<f64>> = decode("predict_with_meta_learner", &body)?;
        rows.into_iter().next().ok_or_else(|| {
            ClientError::protocol("predict_with_meta_learner returned no prediction row")
        })
    }

    fn fetch_identifier_manifest(&self) -> ClientResult<String> {
        self.get("validate_connection", &[])
    }
}
