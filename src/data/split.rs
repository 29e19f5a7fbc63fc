//! User-stratified train/test partitioning.
//!
//! Test rows are drawn per user, so every test user also has training history
//! as long as the test fraction stays below one half.

use std::collections::HashMap;

use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;
use tracing::debug;

use crate::common::config::SplitPolicy;

use super::domain::{Dataset, EntityId, RatingRecord, TrainTestSplit};

/// Number of test rows drawn from a user with `n` ratings.
///
/// Rounds to the nearest integer: with a fraction of 0.2, five or six ratings
/// give one test row and eight give two. Users with one or two ratings give none.
pub fn test_share(n: usize, fraction: f64) -> usize {
    ((fraction * n as f64).round() as usize).min(n)
}

/// Splits datasets with a private random source.
pub struct Partitioner {
    policy: SplitPolicy,
    rng: StdRng,
}

impl Partitioner {
    pub fn new(policy: SplitPolicy) -> Self {
        let rng = match policy.seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };
        Self { policy, rng }
    }

    pub fn policy(&self) -> &SplitPolicy {
        &self.policy
    }

    /// Draw a fresh split. Training ratings of exactly zero are replaced by the
    /// configured epsilon; test ratings are left as observed.
    pub fn split(&mut self, dataset: &Dataset) -> TrainTestSplit {
        let records = dataset.records();

        let mut rows_by_user: HashMap<&EntityId, Vec<usize>> = HashMap::new();
        for (idx, r) in records.iter().enumerate() {
            rows_by_user.entry(&r.user).or_default().push(idx);
        }

        let mut users = dataset.users();
        users.shuffle(&mut self.rng);

        let mut in_test = vec![false; records.len()];
        let mut test = Vec::new();
        for user in &users {
            let rows = &rows_by_user[user];
            let take = test_share(rows.len(), self.policy.test_fraction);
            for &idx in rows.choose_multiple(&mut self.rng, take) {
                in_test[idx] = true;
                test.push(records[idx].clone());
            }
        }

        let epsilon = self.policy.zero_epsilon;
        let train: Vec<RatingRecord> = records
            .iter()
            .zip(&in_test)
            .filter(|(_, held_out)| !**held_out)
            .map(|(r, _)| {
                let mut r = r.clone();
                if r.rating == 0.0 {
                    r.rating = epsilon;
                }
                r
            })
            .collect();

        debug!(
            users = users.len(),
            train_rows = train.len(),
            test_rows = test.len(),
            "partitioned dataset"
        );
        TrainTestSplit {
            train: Dataset::new(train),
            test: Dataset::new(test),
        }
    }
}
