//! Error types for rustcocite.
//!
//! Two layers of failure exist in a run:
//!
//! - [`ErrorKind`] is a per-identifier, per-direction lookup failure reported by a
//!   source adapter. It is recorded on the seed and never aborts the batch.
//! - [`CociteError`] is a run-level failure (no seeds, unwritable output, bad
//!   configuration). All library functions return `Result<T, CociteError>`
//!   instead of using `unwrap()`.

use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

/// Main error type for rustcocite operations.
#[derive(Debug, Error)]
pub enum CociteError {
    /// No usable seed identifier was supplied
    #[error("No seed identifiers to process")]
    NoSeeds,

    /// Output directory could not be created or written
    #[error("Output directory {path} is not writable: {source}")]
    OutputDir {
        path: String,
        #[source]
        source: std::io::Error,
    },

    /// Network/HTTP client construction error
    #[error("Network error: {0}")]
    Network(#[from] reqwest::Error),

    /// File I/O error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization/deserialization error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// CSV writer error
    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    /// Configuration error
    #[error("Config error: {0}")]
    Config(String),

    /// Validation error
    #[error("Validation error: {0}")]
    Validation(String),
}

/// Result type alias using `CociteError`
pub type Result<T> = std::result::Result<T, CociteError>;

/// Why a single lookup against a source adapter failed.
///
/// Serialized in snake_case so it can be written to `summary.csv` and the
/// detailed JSON document as a marker.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    /// Identifier unknown to the adapter
    NotFound,
    /// Provider kept answering HTTP 429 after backoff
    RateLimited,
    /// Call exceeded the per-call timeout
    Timeout,
    /// Response body could not be decoded
    MalformedResponse,
    /// Transport failure or unexpected HTTP status
    Network,
    /// Every adapter failed for a seed/direction with differing kinds
    AllSourcesFailed,
}

impl ErrorKind {
    /// Fold a newer failure into an existing one.
    ///
    /// Identical kinds stay as they are; distinct kinds collapse into
    /// [`ErrorKind::AllSourcesFailed`].
    pub fn combine(self, newer: ErrorKind) -> ErrorKind {
        if self == newer {
            self
        } else {
            ErrorKind::AllSourcesFailed
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorKind::NotFound => "not_found",
            ErrorKind::RateLimited => "rate_limited",
            ErrorKind::Timeout => "timeout",
            ErrorKind::MalformedResponse => "malformed_response",
            ErrorKind::Network => "network",
            ErrorKind::AllSourcesFailed => "all_sources_failed",
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl From<reqwest::Error> for ErrorKind {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            ErrorKind::Timeout
        } else if err.is_decode() {
            ErrorKind::MalformedResponse
        } else {
            ErrorKind::Network
        }
    }
}

/// Outcome of a single adapter call
pub type FetchResult<T> = std::result::Result<T, ErrorKind>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_combine_same_kind_is_kept() {
        assert_eq!(ErrorKind::NotFound.combine(ErrorKind::NotFound), ErrorKind::NotFound);
    }

    #[test]
    fn test_combine_distinct_kinds() {
        assert_eq!(
            ErrorKind::Timeout.combine(ErrorKind::NotFound),
            ErrorKind::AllSourcesFailed
        );
    }

    #[test]
    fn test_serialized_marker() {
        let json = serde_json::to_string(&ErrorKind::MalformedResponse).unwrap();
        assert_eq!(json, "\"malformed_response\"");
        assert_eq!(ErrorKind::RateLimited.to_string(), "rate_limited");
    }
}
