// lib.rs - client side of the recommender benchmarking platform
pub mod api;
pub mod common;
pub mod data;
pub mod evaluation;
pub mod registry;
pub mod training;

pub use api::{BestModel, Client};
pub use common::{Algorithm, ClientError, ClientResult, ErrorCode, Fingerprint, Learner, Metric, Task};
