//! Evaluation sessions and their reconciliation with the run registry.

pub mod domain;
pub mod metrics;
pub mod service;

pub use domain::{EvaluationRun, SessionOutcome, SessionReport};
pub use service::{EvaluationSettings, Evaluator};
