//! Data domain: ratings tables, preprocessing, identity and partitioning.

pub mod domain;
pub mod fingerprint;
pub mod repo_fs;
pub mod service;
pub mod split;

pub use domain::{DataRepo, Dataset, EntityId, RatingRecord, RawTable, TrainTestSplit};
pub use fingerprint::fingerprint;
pub use service::preprocess;
pub use split::Partitioner;
