//! Client routines: the entry points a benchmarking user calls.
//!
//! A [`Client`] owns the configuration, the registry connection and the
//! identifier manifest synced when it was created.

use tracing::{info, warn};

use crate::common::config::AppCfg;
use crate::common::error::ClientResult;
use crate::common::ids::{Algorithm, Learner, Metric, Task};
use crate::data::domain::RawTable;
use crate::evaluation::domain::SessionOutcome;
use crate::evaluation::service::{EvaluationSettings, Evaluator};
use crate::registry::domain::{Ack, RunRegistry};
use crate::registry::http::HttpRegistry;
use crate::registry::manifest::{IdentifierManifest, ManifestCache};
use crate::training::domain::{BestModelTrainer, FitPredict, MetaFeatureExtractor};
use crate::training::service::{AlgorithmForecast, ModelManager};

/// Outcome of meta-learner driven model selection.
#[derive(Clone, Debug, PartialEq)]
pub struct BestModel<M> {
    pub algorithm: Algorithm,
    pub forecasts: Vec<AlgorithmForecast>,
    pub model: M,
}

pub struct Client<R> {
    cfg: AppCfg,
    registry: R,
    manifest: IdentifierManifest,
}

impl Client<HttpRegistry> {
    /// Connect to the registry named in `cfg` over HTTP.
    pub fn connect(cfg: AppCfg) -> ClientResult<Self> {
        let registry = HttpRegistry::new(&cfg)?;
        Self::with_registry(cfg, registry)
    }
}

impl<R: RunRegistry> Client<R> {
    /// Sync the identifier manifest with `registry`. When the registry cannot
    /// be reached a previously cached manifest is used instead.
    pub fn with_registry(cfg: AppCfg, registry: R) -> ClientResult<Self> {
        cfg.validate()?;
        let cache = ManifestCache::new(cfg.manifest_path());
        let manifest = match cache.sync(&registry) {
            Ok((manifest, _)) => manifest,
            Err(err) if err.is_remote() => match cache.load()? {
                Some(cached) => {
                    warn!(error = %err, path = %cache.path().display(), "using cached identifier manifest");
                    cached
                }
                None => return Err(err),
            },
            Err(err) => return Err(err),
        };
        Ok(Self {
            cfg,
            registry,
            manifest,
        })
    }

    pub fn cfg(&self) -> &AppCfg {
        &self.cfg
    }

    pub fn registry(&self) -> &R {
        &self.registry
    }

    pub fn manifest(&self) -> &IdentifierManifest {
        &self.manifest
    }

    /// Ask the registry to seed its database.
    pub fn populate_database(&self) -> ClientResult<Ack> {
        info!("populating database on server");
        let ack = self.registry.populate_database()?;
        info!(%ack, "server returned");
        Ok(ack)
    }

    /// Evaluate `algorithms` x `metrics` for `task` on `data`.
    pub fn evaluate_algorithms(
        &self,
        algorithms: &[Algorithm],
        metrics: &[Metric],
        task: &Task,
        data: &RawTable,
        fitter: &dyn FitPredict,
        features: &dyn MetaFeatureExtractor,
        upload: bool,
    ) -> SessionOutcome {
        let settings = EvaluationSettings::from_cfg(&self.cfg, upload);
        Evaluator::new(&self.registry, fitter, features, settings)
            .with_manifest(&self.manifest)
            .evaluate(data, task, algorithms, metrics)
    }

    /// Train meta-learners on the registry; returns one evaluation table per learner.
    pub fn train_meta_learner(
        &self,
        metrics: &[Metric],
        tasks: &[Task],
        learners: &[Learner],
    ) -> ClientResult<Vec<String>> {
        for metric in metrics {
            self.manifest.check_metric(metric)?;
        }
        for task in tasks {
            self.manifest.check_task(task)?;
        }
        for learner in learners {
            self.manifest.check_learner(learner)?;
        }

        info!("training meta learner");
        let tables = self.registry.train_meta_learner(metrics, tasks, learners)?;
        for table in &tables {
            info!(%table, "server returned");
        }
        Ok(tables)
    }

    /// Predict the best algorithm for `data` with a meta-learner, then train it.
    pub fn predict_with_meta_learner<T: BestModelTrainer>(
        &self,
        metric: &Metric,
        task: &Task,
        learner: &Learner,
        data: &RawTable,
        features: &dyn MetaFeatureExtractor,
        trainer: &T,
    ) -> ClientResult<BestModel<T::Model>> {
        let mut manager = ModelManager::new(
            &self.registry,
            &self.manifest,
            features,
            metric.clone(),
            task.clone(),
            learner.clone(),
        );
        manager.load(data, &self.cfg.prune)?;
        let forecasts = manager.predict_algo_performance()?.to_vec();
        let model = manager.return_best_model(trainer)?;
        Ok(BestModel {
            algorithm: manager.best_algorithm()?.clone(),
            forecasts,
            model,
        })
    }
}
