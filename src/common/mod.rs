//! Shared utilities that glue the different domains together.
pub mod config;
pub mod error;
pub mod ids;
pub mod log;
pub mod time;

pub use error::{ClientError, ClientResult, ErrorCode};
pub use ids::{Algorithm, Fingerprint, Learner, Metric, Task};
