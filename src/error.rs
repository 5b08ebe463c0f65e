//! Error types for the SSTable writer

use std::path::PathBuf;
use thiserror::Error;

/// Result type alias for SSTable writer operations
pub type Result<T> = std::result::Result<T, Error>;

/// Main error type for SSTable writer operations
#[derive(Error, Debug)]
pub enum Error {
    /// I/O fault while reading or writing a generic path (no component context)
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// I/O fault tied to a specific component file: append, fsync, truncate, or rename.
    /// Always fatal to the writer that produced it.
    #[error("write error on {path}: {source}")]
    Write {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Serialization/deserialization errors
    #[error("serialization error: {0}")]
    Serialization(String),

    /// On-disk data does not match its expected format or checksum
    #[error("data corruption: {0}")]
    Corruption(String),

    /// Configuration errors
    #[error("configuration error: {0}")]
    Configuration(String),

    /// Storage engine errors not covered by a more specific variant
    #[error("storage error: {0}")]
    Storage(String),

    /// Invalid operation given the current writer/sink state machine
    #[error("invalid operation: {0}")]
    InvalidOperation(String),

    /// Composite error produced by the commit error accumulator (spec §7: `PrepareFailure`).
    /// Every step of prepare/commit runs regardless of earlier failures; this variant
    /// chains whatever each step produced.
    #[error("prepare/commit failed with {} error(s): {}", causes.len(), causes.iter().map(ToString::to_string).collect::<Vec<_>>().join("; "))]
    Prepare { causes: Vec<Error> },

    /// Generic internal error
    #[error("internal error: {0}")]
    Internal(String),
}

impl Error {
    /// Create a write error tied to a component path
    pub fn write(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Write {
            path: path.into(),
            source,
        }
    }

    /// Create a serialization error
    pub fn serialization(msg: impl Into<String>) -> Self {
        Self::Serialization(msg.into())
    }

    /// Create a corruption error
    pub fn corruption(msg: impl Into<String>) -> Self {
        Self::Corruption(msg.into())
    }

    /// Create a configuration error
    pub fn configuration(msg: impl Into<String>) -> Self {
        Self::Configuration(msg.into())
    }

    /// Create a storage error
    pub fn storage(msg: impl Into<String>) -> Self {
        Self::Storage(msg.into())
    }

    /// Create an invalid-operation error
    pub fn invalid_operation(msg: impl Into<String>) -> Self {
        Self::InvalidOperation(msg.into())
    }

    /// Create an internal error
    pub fn internal(msg: impl Into<String>) -> Self {
        Self::Internal(msg.into())
    }

    /// Fold a new outcome into an accumulator, per spec §7/§9: every commit step runs
    /// regardless of prior failure, and errors are chained rather than short-circuited.
    pub fn accumulate(prev: Option<Error>, outcome: Result<()>) -> Option<Error> {
        match (prev, outcome) {
            (None, Ok(())) => None,
            (Some(prev), Ok(())) => Some(prev),
            (None, Err(e)) => Some(Error::Prepare { causes: vec![e] }),
            (Some(Error::Prepare { mut causes }), Err(e)) => {
                causes.push(e);
                Some(Error::Prepare { causes })
            }
            (Some(prev), Err(e)) => Some(Error::Prepare {
                causes: vec![prev, e],
            }),
        }
    }
}

impl From<bincode::Error> for Error {
    fn from(err: bincode::Error) -> Self {
        Error::Serialization(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_creation() {
        let err = Error::storage("test error");
        assert!(matches!(err, Error::Storage(_)));
        assert_eq!(err.to_string(), "storage error: test error");
    }

    #[test]
    fn test_accumulator_chains_all_failures() {
        let mut acc = None;
        acc = Error::accumulate(acc, Err(Error::storage("first")));
        acc = Error::accumulate(acc, Ok(()));
        acc = Error::accumulate(acc, Err(Error::storage("second")));

        match acc {
            Some(Error::Prepare { causes }) => assert_eq!(causes.len(), 2),
            other => panic!("expected Prepare with 2 causes, got {other:?}"),
        }
    }

    #[test]
    fn test_accumulator_all_ok_is_none() {
        let mut acc = None;
        acc = Error::accumulate(acc, Ok(()));
        acc = Error::accumulate(acc, Ok(()));
        assert!(acc.is_none());
    }
}
