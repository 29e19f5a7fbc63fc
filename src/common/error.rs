//! Error handling primitives shared across the client.
//!
//! Every failure carries a stable numeric code so that session reports and
//! logs can be grouped by category without string matching.

use thiserror::Error;

/// Stable error codes, one per failure category. Zero is never used.
#[repr(u32)]
#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash)]
pub enum ErrorCode {
    /// The registry could not be reached.
    Connectivity = 1,
    /// The registry answered with a non-success status or an unreadable body.
    Protocol = 2,
    /// The input dataset does not follow the user/item/rating contract.
    Schema = 3,
    /// An identifier or setting the client cannot honour.
    Configuration = 4,
    /// An operation was invoked before the step it depends on.
    Precondition = 5,
    /// Local filesystem failure.
    Io = 6,
    /// Catch-all for bugs and collaborator contract violations.
    Internal = 7,
}

/// Canonical error type for the client.
#[derive(Clone, Debug, Error, PartialEq)]
#[error("{code:?}: {msg}")]
pub struct ClientError {
    /// Machine parsable error code.
    pub code: ErrorCode,
    /// Developer facing message.
    pub msg: String,
}

/// Result alias used throughout the crate.
pub type ClientResult<T> = Result<T, ClientError>;

impl ClientError {
    /// Create a new error with the provided code and message.
    pub fn new(code: ErrorCode, msg: impl Into<String>) -> Self {
        Self {
            code,
            msg: msg.into(),
        }
    }

    pub fn connectivity(msg: impl Into<String>) -> Self {
        Self::new(ErrorCode::Connectivity, msg)
    }

    /// Non-200 answers are not inspected per status; the code is only kept for the message.
    pub fn server_status(status: u16) -> Self {
        Self::new(
            ErrorCode::Protocol,
            format!("the server returned with status code {status}"),
        )
    }

    pub fn protocol(msg: impl Into<String>) -> Self {
        Self::new(ErrorCode::Protocol, msg)
    }

    pub fn schema(msg: impl Into<String>) -> Self {
        Self::new(ErrorCode::Schema, msg)
    }

    pub fn configuration(msg: impl Into<String>) -> Self {
        Self::new(ErrorCode::Configuration, msg)
    }

    pub fn precondition(msg: impl Into<String>) -> Self {
        Self::new(ErrorCode::Precondition, msg)
    }

    pub fn io(msg: impl Into<String>) -> Self {
        Self::new(ErrorCode::Io, msg)
    }

    pub fn internal(msg: impl Into<String>) -> Self {
        Self::new(ErrorCode::Internal, msg)
    }

    /// True for failures that originate at the registry boundary.
    pub fn is_remote(&self) -> bool {
        matches!(self.code, ErrorCode::Connectivity | ErrorCode::Protocol)
    }
}

impl From<std::io::Error> for ClientError {
    fn from(err: std::io::Error) -> Self {
        Self::io(err.to_string())
    }
}

impl From<serde_json::Error> for ClientError {
    fn from(err: serde_json::Error) -> Self {
        Self::protocol(format!("malformed json: {err}"))
    }
}
