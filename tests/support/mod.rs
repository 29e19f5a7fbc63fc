#![allow(dead_code)]

use std::cell::RefCell;
use std::io::{BufRead, BufReader, Read, Write};
use std::net::{SocketAddr, TcpListener};
use std::sync::{Arc, Mutex};
use std::thread::{self, JoinHandle};

use camels_client::common::error::{ClientError, ClientResult};
use camels_client::data::domain::{Dataset, RawTable};
use camels_client::evaluation::EvaluationRun;
use camels_client::registry::{Ack, DatasetMetadata, ExistingRuns, HashCheck, RunRegistry};
use camels_client::training::baseline::BaselinePredictor;
use camels_client::training::{FitOutcome, FitPredict, MetaFeatures};
use camels_client::{Algorithm, Fingerprint, Learner, Metric, Task};

pub const MANIFEST: &str = r#"{
  "version": 1,
  "algorithms": {"GlobalMean": 1, "UserMean": 2, "ItemMean": 3},
  "metrics": {"FitTime": 1, "PredictTime": 2, "RootMeanSquaredError": 3, "MeanAbsoluteError": 4},
  "tasks": {"Rating": 1},
  "learners": {"RandomForest": 1}
}"#;

/// `users` users with `per_user` distinct items each, ratings cycling 1..=5.
pub fn ratings_table(users: u64, per_user: u64) -> RawTable {
    let mut table = RawTable::new(["user", "item", "rating"]);
    for user in 0..users {
        for item in 0..per_user {
            table.push_row([user, item + 100, 1 + (user + item) % 5]);
        }
    }
    table
}

pub fn metrics(names: &[&str]) -> Vec<Metric> {
    names.iter().map(|n| Metric::from(*n)).collect()
}

pub fn algorithms(names: &[&str]) -> Vec<Algorithm> {
    names.iter().map(|n| Algorithm::from(*n)).collect()
}

/// In-memory registry recording every call.
pub struct FakeRegistry {
    pub hash_exists: bool,
    pub existing: Vec<(&'static str, &'static str)>,
    pub fail_check_hash: Option<ClientError>,
    pub fail_status: Option<ClientError>,
    pub fail_upload: Option<ClientError>,
    pub manifest: RefCell<Result<String, ClientError>>,
    pub predictions: Vec<f64>,
    pub calls: RefCell<Vec<&'static str>>,
    pub saved_metadata: RefCell<Vec<DatasetMetadata>>,
    pub saved_runs: RefCell<Vec<Vec<EvaluationRun>>>,
    pub status_queries: RefCell<Vec<(Fingerprint, Vec<Algorithm>, Task, Vec<Metric>)>>,
}

impl Default for FakeRegistry {
    fn default() -> Self {
        Self {
            hash_exists: false,
            existing: Vec::new(),
            fail_check_hash: None,
            fail_status: None,
            fail_upload: None,
            manifest: RefCell::new(Ok(MANIFEST.to_string())),
            predictions: Vec::new(),
            calls: RefCell::new(Vec::new()),
            saved_metadata: RefCell::new(Vec::new()),
            saved_runs: RefCell::new(Vec::new()),
            status_queries: RefCell::new(Vec::new()),
        }
    }
}

impl FakeRegistry {
    pub fn calls(&self) -> Vec<&'static str> {
        self.calls.borrow().clone()
    }

    pub fn uploaded(&self) -> Vec<EvaluationRun> {
        self.saved_runs.borrow().iter().flatten().cloned().collect()
    }

    fn record(&self, call: &'static str) {
        self.calls.borrow_mut().push(call);
    }
}

impl RunRegistry for FakeRegistry {
    fn check_hash(&self, _fingerprint: Fingerprint) -> ClientResult<HashCheck> {
        self.record("check_hash");
        if let Some(err) = &self.fail_check_hash {
            return Err(err.clone());
        }
        Ok(HashCheck {
            message: "hash checked".to_string(),
            already_exists: self.hash_exists,
        })
    }

    fn save_metadata(&self, metadata: &DatasetMetadata) -> ClientResult<Ack> {
        self.record("save_metadata");
        self.saved_metadata.borrow_mut().push(metadata.clone());
        Ok(Ack::from("metadata saved"))
    }

    fn check_data_status(
        &self,
        fingerprint: Fingerprint,
        algorithms: &[Algorithm],
        task: &Task,
        metrics: &[Metric],
    ) -> ClientResult<ExistingRuns> {
        self.record("check_data_status");
        self.status_queries.borrow_mut().push((
            fingerprint,
            algorithms.to_vec(),
            task.clone(),
            metrics.to_vec(),
        ));
        if let Some(err) = &self.fail_status {
            return Err(err.clone());
        }
        Ok(ExistingRuns::new(
            self.existing
                .iter()
                .map(|(a, m)| (Algorithm::from(*a), Metric::from(*m))),
        ))
    }

    fn save_runs(&self, runs: &[EvaluationRun]) -> ClientResult<Ack> {
        self.record("save_runs");
        if let Some(err) = &self.fail_upload {
            return Err(err.clone());
        }
        self.saved_runs.borrow_mut().push(runs.to_vec());
        Ok(Ack::from("runs saved"))
    }

    fn populate_database(&self) -> ClientResult<Ack> {
        self.record("populate_database");
        Ok(Ack::from("populated"))
    }

    fn train_meta_learner(
        &self,
        _metrics: &[Metric],
        _tasks: &[Task],
        learners: &[Learner],
    ) -> ClientResult<Vec<String>> {
        self.record("train_meta_learner");
        Ok(learners.iter().map(|l| format!("{{\"learner\":\"{l}\"}}")).collect())
    }

    fn predict_with_meta_learner(
        &self,
        _features: &MetaFeatures,
        _metric: &Metric,
        _task: &Task,
        _learner: &Learner,
    ) -> ClientResult<Vec<f64>> {
        self.record("predict_with_meta_learner");
        Ok(self.predictions.clone())
    }

    fn fetch_identifier_manifest(&self) -> ClientResult<String> {
        self.record("fetch_identifier_manifest");
        self.manifest.borrow().clone()
    }
}

/// Baseline fitter that records its calls and reports fixed durations.
#[derive(Default)]
pub struct CountingFitter {
    pub calls: RefCell<Vec<(Algorithm, usize, usize)>>,
}

impl CountingFitter {
    pub fn fitted(&self) -> Vec<Algorithm> {
        self.calls.borrow().iter().map(|(a, _, _)| a.clone()).collect()
    }
}

impl FitPredict for CountingFitter {
    fn fit_and_predict(
        &self,
        train: &Dataset,
        test: &Dataset,
        algorithm: &Algorithm,
    ) -> ClientResult<FitOutcome> {
        self.calls
            .borrow_mut()
            .push((algorithm.clone(), train.len(), test.len()));
        let mut outcome = BaselinePredictor.fit_and_predict(train, test, algorithm)?;
        outcome.fit_duration = 1.5;
        outcome.predict_duration = 0.25;
        Ok(outcome)
    }
}

/// One request as seen by [`StubServer`].
#[derive(Clone, Debug)]
pub struct Recorded {
    pub method: String,
    pub target: String,
    pub body: String,
}

impl Recorded {
    /// Decoded value of a query or form parameter.
    pub fn param(&self, name: &str) -> Option<String> {
        let query = self.target.split_once('?').map(|(_, q)| q).unwrap_or("");
        [query, self.body.as_str()]
            .into_iter()
            .flat_map(|encoded| encoded.split('&'))
            .filter_map(|pair| pair.split_once('='))
            .find(|(key, _)| *key == name)
            .map(|(_, value)| percent_decode(value))
    }

    pub fn path(&self) -> &str {
        self.target.split('?').next().unwrap_or("")
    }
}

fn percent_decode(value: &str) -> String {
    let bytes = value.as_bytes();
    let mut out = Vec::with_capacity(bytes.len());
    let mut i = 0;
    while i < bytes.len() {
        match bytes[i] {
            b'+' => out.push(b' '),
            b'%' if i + 2 < bytes.len() => {
                let hex = std::str::from_utf8(&bytes[i + 1..i + 3]).unwrap();
                out.push(u8::from_str_radix(hex, 16).unwrap());
                i += 2;
            }
            other => out.push(other),
        }
        i += 1;
    }
    String::from_utf8(out).unwrap()
}

/// Loop-back HTTP server answering the n-th connection with the n-th canned response.
pub struct StubServer {
    pub addr: SocketAddr,
    pub requests: Arc<Mutex<Vec<Recorded>>>,
    handle: Option<JoinHandle<()>>,
}

impl StubServer {
    pub fn start(responses: Vec<(u16, &'static str)>) -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();
        let requests = Arc::new(Mutex::new(Vec::new()));
        let seen = requests.clone();

        let handle = thread::spawn(move || {
            for (status, reply) in responses {
                let (stream, _) = match listener.accept() {
                    Ok(conn) => conn,
                    Err(_) => return,
                };
                let mut reader = BufReader::new(stream.try_clone().unwrap());

                let mut request_line = String::new();
                reader.read_line(&mut request_line).unwrap();
                let mut parts = request_line.split_whitespace();
                let method = parts.next().unwrap_or("").to_string();
                let target = parts.next().unwrap_or("").to_string();

                let mut content_length = 0usize;
                loop {
                    let mut line = String::new();
                    reader.read_line(&mut line).unwrap();
                    let line = line.trim_end();
                    if line.is_empty() {
                        break;
                    }
                    if let Some((key, value)) = line.split_once(':') {
                        if key.eq_ignore_ascii_case("content-length") {
                            content_length = value.trim().parse().unwrap();
                        }
                    }
                }
                let mut body = vec![0u8; content_length];
                reader.read_exact(&mut body).unwrap();

                seen.lock().unwrap().push(Recorded {
                    method,
                    target,
                    body: String::from_utf8(body).unwrap(),
                });

                let mut stream = stream;
                let response = format!(
                    "HTTP/1.1 {status} STUB\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{reply}",
                    reply.len()
                );
                stream.write_all(response.as_bytes()).unwrap();
                stream.flush().unwrap();
            }
        });

        Self {
            addr,
            requests,
            handle: Some(handle),
        }
    }

    pub fn url(&self) -> String {
        format!("http://{}/", self.addr)
    }

    /// Wait for the server thread and return what it saw.
    pub fn finish(mut self) -> Vec<Recorded> {
        if let Some(handle) = self.handle.take() {
            handle.join().unwrap();
        }
        self.requests.lock().unwrap().clone()
    }
}
