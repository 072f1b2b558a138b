//! Unified error types for Tally.
//!
//! Only malformed answer submissions are user errors. Missing data (no
//! answers yet, no batch statistics, unknown state) is never an error and is
//! represented by empty or zeroed values instead. Collaborator failures are
//! propagated unchanged; retrying is the storage layer's job.

use std::io;
use std::path::PathBuf;
use thiserror::Error;

/// The main error type for Tally operations.
#[derive(Error, Debug)]
pub enum TallyError {
    /// A submitted answer failed validation. Never retried.
    #[error("validation error: {message}")]
    Validation { message: String },

    /// I/O errors from the file-backed stores.
    #[error("storage error at {path}: {source}")]
    Storage {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    /// JSON or TOML parsing/serialization errors.
    #[error("serialization error: {message}")]
    Serde { message: String },

    /// A collaborator (exploration, statistics or answer store) failed.
    #[error("upstream error: {message}")]
    Upstream { message: String },

    /// Configuration loading errors.
    #[error("config error: {message}")]
    Config { message: String },
}

/// A specialized Result type for Tally operations.
pub type Result<T> = std::result::Result<T, TallyError>;

impl TallyError {
    /// Create a validation error.
    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation {
            message: message.into(),
        }
    }

    /// Create a storage error from an I/O error.
    pub fn storage(path: impl Into<PathBuf>, source: io::Error) -> Self {
        Self::Storage {
            path: path.into(),
            source,
        }
    }

    /// Create a serialization error.
    pub fn serde(message: impl Into<String>) -> Self {
        Self::Serde {
            message: message.into(),
        }
    }

    /// Create an upstream collaborator error.
    pub fn upstream(message: impl Into<String>) -> Self {
        Self::Upstream {
            message: message.into(),
        }
    }

    /// Create a config error.
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config {
            message: message.into(),
        }
    }

    /// Whether this error was caused by the submitted data rather than by
    /// infrastructure.
    pub fn is_validation(&self) -> bool {
        matches!(self, Self::Validation { .. })
    }
}

impl From<io::Error> for TallyError {
    fn from(err: io::Error) -> Self {
        Self::Storage {
            path: PathBuf::new(),
            source: err,
        }
    }
}

impl From<serde_json::Error> for TallyError {
    fn from(err: serde_json::Error) -> Self {
        Self::Serde {
            message: err.to_string(),
        }
    }
}

/// Log-and-substitute handling for failures that must not block a caller.
///
/// Used where a degraded answer is acceptable: a best-effort statistics
/// fetch falls back to zero counts, and a failed event append never undoes
/// an answer that was already persisted.
pub trait FailOpen<T> {
    /// Handle an error by logging a warning and returning the default value.
    fn fail_open_default(self, context: &str) -> T
    where
        T: Default;
}

impl<T> FailOpen<T> for Result<T> {
    fn fail_open_default(self, context: &str) -> T
    where
        T: Default,
    {
        match self {
            Ok(value) => value,
            Err(err) => {
                tracing::warn!("{}: {} (fail-open: using default)", context, err);
                T::default()
            }
        }
    }
}

/// Exit codes for the Tally CLI.
pub mod exit_codes {
    /// The command completed.
    pub const SUCCESS: i32 = 0;

    /// The command failed for an infrastructure reason.
    pub const ERROR: i32 = 1;

    /// The submitted data was rejected.
    pub const INVALID: i32 = 2;

    /// The process panicked.
    pub const CRASH: i32 = 3;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validation_error_display() {
        let err = TallyError::validation("session_id must be a string");
        assert_eq!(
            err.to_string(),
            "validation error: session_id must be a string"
        );
    }

    #[test]
    fn test_storage_error_display() {
        let err = TallyError::storage(
            "/tmp/answers.json",
            io::Error::new(io::ErrorKind::NotFound, "file not found"),
        );
        assert!(err.to_string().contains("storage error"));
        assert!(err.to_string().contains("/tmp/answers.json"));
    }

    #[test]
    fn test_upstream_error_display() {
        let err = TallyError::upstream("statistics unavailable");
        assert_eq!(err.to_string(), "upstream error: statistics unavailable");
    }

    #[test]
    fn test_config_error_display() {
        let err = TallyError::config("invalid TOML");
        assert_eq!(err.to_string(), "config error: invalid TOML");
    }

    #[test]
    fn test_is_validation() {
        assert!(TallyError::validation("x").is_validation());
        assert!(!TallyError::upstream("x").is_validation());
        assert!(!TallyError::serde("x").is_validation());
        assert!(!TallyError::config("x").is_validation());
    }

    #[test]
    fn test_from_io_error() {
        let io_err = io::Error::new(io::ErrorKind::PermissionDenied, "access denied");
        let err: TallyError = io_err.into();
        assert!(matches!(err, TallyError::Storage { .. }));
    }

    #[test]
    fn test_from_serde_json_error() {
        let json_err = serde_json::from_str::<serde_json::Value>("invalid").unwrap_err();
        let err: TallyError = json_err.into();
        assert!(matches!(err, TallyError::Serde { .. }));
    }

    #[test]
    fn test_fail_open_default() {
        let result: Result<Vec<String>> = Err(TallyError::upstream("down"));
        assert!(result.fail_open_default("fetching statistics").is_empty());
    }

    #[test]
    fn test_fail_open_success() {
        let result: Result<u64> = Ok(100);
        assert_eq!(result.fail_open_default("counting"), 100);
    }

    #[test]
    fn test_exit_codes() {
        assert_eq!(exit_codes::SUCCESS, 0);
        assert_eq!(exit_codes::ERROR, 1);
        assert_eq!(exit_codes::INVALID, 2);
        assert_eq!(exit_codes::CRASH, 3);
    }
}
