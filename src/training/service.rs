//! Meta-learner driven model selection: ask the registry which algorithm
//! should perform best on a dataset, then train that algorithm locally.

use tracing::info;

use crate::common::config::PrunePolicy;
use crate::common::error::{ClientError, ClientResult};
use crate::common::ids::{Algorithm, Learner, Metric, Task};
use crate::data::domain::{Dataset, RawTable};
use crate::data::service::preprocess;
use crate::registry::domain::RunRegistry;
use crate::registry::manifest::IdentifierManifest;

use super::domain::{BestModelTrainer, MetaFeatureExtractor, MetaFeatures};

/// Predicted score of one algorithm; lower is better.
#[derive(Clone, Debug, PartialEq)]
pub struct AlgorithmForecast {
    pub algorithm: Algorithm,
    pub score: f64,
}

/// Holds the dataset and the registry's forecasts between the two steps of model selection.
pub struct ModelManager<'a> {
    registry: &'a dyn RunRegistry,
    manifest: &'a IdentifierManifest,
    features: &'a dyn MetaFeatureExtractor,
    metric: Metric,
    task: Task,
    learner: Learner,
    dataset: Option<Dataset>,
    forecasts: Option<Vec<AlgorithmForecast>>,
}

impl<'a> ModelManager<'a> {
    pub fn new(
        registry: &'a dyn RunRegistry,
        manifest: &'a IdentifierManifest,
        features: &'a dyn MetaFeatureExtractor,
        metric: Metric,
        task: Task,
        learner: Learner,
    ) -> Self {
        Self {
            registry,
            manifest,
            features,
            metric,
            task,
            learner,
            dataset: None,
            forecasts: None,
        }
    }

    /// Preprocess `raw` and keep the cleaned dataset for the later steps.
    pub fn load(&mut self, raw: &RawTable, prune: &PrunePolicy) -> ClientResult<&Dataset> {
        let dataset: &Dataset = self.dataset.insert(preprocess(raw, prune)?);
        Ok(dataset)
    }

    pub fn dataset(&self) -> ClientResult<&Dataset> {
        self.dataset
            .as_ref()
            .ok_or_else(|| ClientError::precondition("preprocess data before using it"))
    }

    /// Meta-features of the loaded dataset.
    pub fn obtain_metadata(&self) -> ClientResult<MetaFeatures> {
        let dataset = self
            .dataset
            .as_ref()
            .ok_or_else(|| ClientError::precondition("preprocess data before getting metadata"))?;
        self.features.calculate_meta_features(dataset)
    }

    /// Ask the meta-learner for a score per algorithm.
    pub fn predict_algo_performance(&mut self) -> ClientResult<&[AlgorithmForecast]> {
        self.manifest.check_metric(&self.metric)?;
        self.manifest.check_task(&self.task)?;
        self.manifest.check_learner(&self.learner)?;

        let features = self.obtain_metadata()?;
        info!(learner = %self.learner, "predicting with meta learner");
        let scores = self.registry.predict_with_meta_learner(
            &features,
            &self.metric,
            &self.task,
            &self.learner,
        )?;

        // registry ordinals start at one
        let forecasts = scores
            .into_iter()
            .enumerate()
            .map(|(idx, score)| {
                let ordinal = idx as u32 + 1;
                let algorithm = self.manifest.algorithm_by_ordinal(ordinal).ok_or_else(|| {
                    ClientError::protocol(format!("meta learner scored unknown algorithm ordinal {ordinal}"))
                })?;
                Ok(AlgorithmForecast { algorithm, score })
            })
            .collect::<ClientResult<Vec<_>>>()?;

        if let Some(best) = best_of(&forecasts) {
            info!(
                metric = %self.metric,
                task = %self.task,
                algorithm = %best.algorithm,
                score = best.score,
                "best algorithm predicted"
            );
        }
        let forecasts: &[AlgorithmForecast] = self.forecasts.insert(forecasts);
        Ok(forecasts)
    }

    /// Algorithm with the lowest forecast score.
    pub fn best_algorithm(&self) -> ClientResult<&Algorithm> {
        let forecasts = self.forecasts.as_ref().ok_or_else(|| {
            ClientError::precondition("need predictions before choosing an algorithm")
        })?;
        best_of(forecasts)
            .map(|f| &f.algorithm)
            .ok_or_else(|| ClientError::protocol("meta learner returned no scores"))
    }

    /// Train the predicted best algorithm on the loaded dataset.
    pub fn return_best_model<T: BestModelTrainer>(&self, trainer: &T) -> ClientResult<T::Model> {
        let algorithm = self.best_algorithm()?;
        let dataset = self.dataset()?;
        info!(%algorithm, "training best model");
        trainer.train_best_model(dataset, algorithm)
    }
}

fn best_of(forecasts: &[AlgorithmForecast]) -> Option<&AlgorithmForecast> {
    forecasts.iter().min_by(|a, b| a.score.total_cmp(&b.score))
}
