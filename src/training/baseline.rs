//! Reference collaborators: mean-rating baselines and summary meta-features.
//!
//! They are deterministic and need no external model library, so the CLI and
//! the tests can drive a full evaluation session with them.

use std::collections::HashMap;
use std::time::Instant;

use crate::common::error::{ClientError, ClientResult};
use crate::common::ids::Algorithm;
use crate::common::time;
use crate::data::domain::{Dataset, EntityId};

use super::domain::{BestModelTrainer, FitOutcome, FitPredict, MetaFeatureExtractor, MetaFeatures};

/// Algorithm names understood by [`BaselinePredictor`].
pub const GLOBAL_MEAN: &str = "GlobalMean";
pub const USER_MEAN: &str = "UserMean";
pub const ITEM_MEAN: &str = "ItemMean";

#[derive(Copy, Clone, Debug, Eq, PartialEq)]
enum BaselineKind {
    Global,
    User,
    Item,
}

impl BaselineKind {
    fn parse(algorithm: &Algorithm) -> ClientResult<Self> {
        match algorithm.name() {
            GLOBAL_MEAN => Ok(Self::Global),
            USER_MEAN => Ok(Self::User),
            ITEM_MEAN => Ok(Self::Item),
            other => Err(ClientError::configuration(format!(
                "baseline predictor does not implement algorithm {other}"
            ))),
        }
    }
}

/// A fitted mean-rating model.
#[derive(Clone, Debug, PartialEq)]
pub struct BaselineModel {
    kind: BaselineKind,
    global_mean: f64,
    means: HashMap<EntityId, f64>,
}

impl BaselineModel {
    fn fit(kind: BaselineKind, train: &Dataset) -> ClientResult<Self> {
        if train.is_empty() {
            return Err(ClientError::internal("cannot fit on an empty training split"));
        }
        let global_mean = train.records().iter().map(|r| r.rating).sum::<f64>() / train.len() as f64;

        let mut sums: HashMap<EntityId, (f64, usize)> = HashMap::new();
        if kind != BaselineKind::Global {
            for r in train.records() {
                let key = if kind == BaselineKind::User { &r.user } else { &r.item };
                let entry = sums.entry(key.clone()).or_insert((0.0, 0));
                entry.0 += r.rating;
                entry.1 += 1;
            }
        }
        let means = sums
            .into_iter()
            .map(|(key, (sum, n))| (key, sum / n as f64))
            .collect();

        Ok(Self {
            kind,
            global_mean,
            means,
        })
    }

    /// Predicted rating; unknown users or items fall back to the global mean.
    pub fn predict(&self, user: &EntityId, item: &EntityId) -> f64 {
        let key = match self.kind {
            BaselineKind::Global => return self.global_mean,
            BaselineKind::User => user,
            BaselineKind::Item => item,
        };
        self.means.get(key).copied().unwrap_or(self.global_mean)
    }
}

/// Fits the mean baselines named by [`GLOBAL_MEAN`], [`USER_MEAN`] and [`ITEM_MEAN`].
#[derive(Clone, Copy, Debug, Default)]
pub struct BaselinePredictor;

impl FitPredict for BaselinePredictor {
    fn fit_and_predict(
        &self,
        train: &Dataset,
        test: &Dataset,
        algorithm: &Algorithm,
    ) -> ClientResult<FitOutcome> {
        let kind = BaselineKind::parse(algorithm)?;

        let started = Instant::now();
        let model = BaselineModel::fit(kind, train)?;
        let fit_duration = time::elapsed_secs(started);

        let started = Instant::now();
        let predictions = test
            .records()
            .iter()
            .map(|r| model.predict(&r.user, &r.item))
            .collect();
        let predict_duration = time::elapsed_secs(started);

        Ok(FitOutcome {
            predictions,
            fit_duration,
            predict_duration,
        })
    }
}

impl BestModelTrainer for BaselinePredictor {
    type Model = BaselineModel;

    fn train_best_model(&self, dataset: &Dataset, algorithm: &Algorithm) -> ClientResult<BaselineModel> {
        BaselineModel::fit(BaselineKind::parse(algorithm)?, dataset)
    }
}

/// Size, sparsity and rating-distribution features.
#[derive(Clone, Copy, Debug, Default)]
pub struct SummaryFeatures;

impl MetaFeatureExtractor for SummaryFeatures {
    fn calculate_meta_features(&self, dataset: &Dataset) -> ClientResult<MetaFeatures> {
        if dataset.is_empty() {
            return Err(ClientError::precondition(
                "meta-features need a non-empty preprocessed dataset",
            ));
        }
        let n = dataset.len() as f64;
        let users = dataset.users().len() as f64;
        let items = dataset.item_count() as f64;
        let mean = dataset.records().iter().map(|r| r.rating).sum::<f64>() / n;
        let variance = dataset
            .records()
            .iter()
            .map(|r| (r.rating - mean).powi(2))
            .sum::<f64>()
            / n;

        let mut features = MetaFeatures::new();
        features.insert("num_ratings", n);
        features.insert("num_users", users);
        features.insert("num_items", items);
        features.insert("density", n / (users * items));
        features.insert("ratings_per_user", n / users);
        features.insert("ratings_per_item", n / items);
        features.insert("rating_mean", mean);
        features.insert("rating_std", variance.sqrt());
        Ok(features)
    }
}
