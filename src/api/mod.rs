//! Public entry points for benchmarking users.

pub mod routine;

pub use routine::{BestModel, Client};
