//! Identifiers shared with the registry.
//!
//! Algorithm, metric, task and learner names are data: the registry owns the
//! canonical name set and publishes it through the identifier manifest
//! (`registry::manifest`). The newtypes below only keep the four kinds from
//! being mixed up at call sites.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Content identity of a cleaned dataset.
#[derive(Copy, Clone, Debug, Default, Eq, PartialEq, Hash, Ord, PartialOrd, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Fingerprint(pub u64);

impl Fingerprint {
    pub fn raw(&self) -> u64 {
        self.0
    }
}

impl fmt::Display for Fingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

macro_rules! identifier {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Clone, Debug, Eq, PartialEq, Hash, Ord, PartialOrd, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(String);

        impl $name {
            pub fn new<S: Into<String>>(name: S) -> Self {
                Self(name.into())
            }

            pub fn name(&self) -> &str {
                &self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(&self.0)
            }
        }

        impl From<&str> for $name {
            fn from(value: &str) -> Self {
                Self::new(value)
            }
        }
    };
}

identifier!(
    /// Recommender algorithm evaluated by the fit/predict collaborator.
    Algorithm
);
identifier!(
    /// Evaluation metric name, e.g. `RootMeanSquaredError`.
    Metric
);
identifier!(
    /// Prediction task the dataset is evaluated for.
    Task
);
identifier!(
    /// Meta-learner algorithm trained by the registry.
    Learner
);

/// Names of a slice of identifiers, in order.
pub fn names<T: fmt::Display>(items: &[T]) -> Vec<String> {
    items.iter().map(ToString::to_string).collect()
}
