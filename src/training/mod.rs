//! Model-side collaborators and meta-learner driven model selection.

pub mod baseline;
pub mod domain;
pub mod service;

pub use domain::{BestModelTrainer, FitOutcome, FitPredict, MetaFeatureExtractor, MetaFeatures};
pub use service::{AlgorithmForecast, ModelManager};
