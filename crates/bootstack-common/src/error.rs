//! Unified error types for the bootstack workspace.
//!
//! Higher-level crates define their own domain-specific error enums that
//! wrap these common variants (see `bootstack-build`'s `BuildError`).

use std::path::PathBuf;

use thiserror::Error;

/// Top-level error type shared across the workspace.
#[derive(Debug, Error)]
pub enum BootstackError {
    /// An I/O operation failed.
    #[error("I/O error at {path}: {source}")]
    Io {
        /// Path where the I/O error occurred.
        path: PathBuf,
        /// Underlying I/O error.
        source: std::io::Error,
    },

    /// A configuration value is invalid.
    #[error("invalid configuration: {message}")]
    Config {
        /// Description of the invalid configuration.
        message: String,
    },

    /// A required resource was not found.
    #[error("{kind} not found: {id}")]
    NotFound {
        /// Type of the missing resource.
        kind: &'static str,
        /// Identifier of the missing resource.
        id: String,
    },

    /// A hash validation failed.
    #[error("hash mismatch for {resource}: expected {expected}, got {actual}")]
    HashMismatch {
        /// Resource that failed validation.
        resource: String,
        /// Expected hash value.
        expected: String,
        /// Actual computed hash value.
        actual: String,
    },

    /// A permission or capability error.
    #[error("permission denied: {message}")]
    PermissionDenied {
        /// Description of the denied operation.
        message: String,
    },

    /// A network transfer failed.
    #[error("network error fetching {url}: {message}")]
    Network {
        /// URL that was being fetched.
        url: String,
        /// Description of the failure.
        message: String,
    },

    /// Serialization or deserialization failed.
    #[error("serialization error: {source}")]
    Serialization {
        /// Underlying serialization error.
        #[from]
        source: serde_json::Error,
    },
}

impl BootstackError {
    /// Builds an [`BootstackError::Io`] from a path and an I/O error.
    ///
    /// Shorthand for the `map_err(|e| BootstackError::Io { .. })` pattern.
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }
}

/// Convenience alias used throughout the workspace.
pub type Result<T> = std::result::Result<T, BootstackError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn io_error_display_includes_path() {
        let err = BootstackError::io(
            "/app/requirements.txt",
            std::io::Error::from(std::io::ErrorKind::NotFound),
        );
        assert!(err.to_string().contains("/app/requirements.txt"));
    }

    #[test]
    fn not_found_display_names_kind_and_id() {
        let err = BootstackError::NotFound {
            kind: "image",
            id: "python:3.11-slim".into(),
        };
        assert_eq!(err.to_string(), "image not found: python:3.11-slim");
    }
}
