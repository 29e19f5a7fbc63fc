//! Registry boundary: the run registry contract, its HTTP client and the
//! identifier manifest shared with it.

pub mod domain;
pub mod http;
pub mod manifest;

pub use domain::{Ack, DatasetMetadata, ExistingRuns, HashCheck, RunRegistry};
pub use http::HttpRegistry;
pub use manifest::{IdentifierManifest, ManifestCache, SyncOutcome};
