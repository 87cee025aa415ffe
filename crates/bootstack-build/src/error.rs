//! Build failures.
//!
//! Every variant is fatal: the pipeline stops at the first error and
//! returns it unchanged, with no layer committed for the failing stage.

use std::path::PathBuf;

use bootstack_common::error::BootstackError;
use thiserror::Error;

/// Error raised while parsing a descriptor or running a build stage.
#[derive(Debug, Error)]
pub enum BuildError {
    /// The descriptor is malformed or uses an unsupported construct.
    #[error("descriptor line {line}: {message}")]
    Descriptor {
        /// 1-based line where the offending instruction starts.
        line: usize,
        /// What is wrong with it.
        message: String,
    },

    /// The base image reference could not be resolved to layers.
    #[error("cannot resolve base image {reference}: {reason}")]
    BaseImageUnresolved {
        /// Reference as written in the descriptor.
        reference: String,
        /// Why resolution failed.
        reason: String,
    },

    /// The dependency manifest is absent or unreadable.
    #[error("dependency manifest missing or unreadable: {}", path.display())]
    ManifestMissing {
        /// Path inside the build context.
        path: PathBuf,
    },

    /// A dependency manifest line could not be parsed.
    #[error("manifest line {line}: {message}")]
    Manifest {
        /// 1-based line number.
        line: usize,
        /// What is wrong with it.
        message: String,
    },

    /// A `COPY` source does not exist in the build context.
    #[error("copy source not found in build context: {}", path.display())]
    SourceMissing {
        /// Path inside the build context.
        path: PathBuf,
    },

    /// An install command exited unsuccessfully.
    #[error("install command {command:?} failed with exit status {status}")]
    InstallFailed {
        /// The command line that failed.
        command: String,
        /// Its exit status (127 when it could not be found).
        status: i32,
    },

    /// An install command would run on the host instead of in the image.
    #[error(
        "refusing to run install command {command:?} on the host: build as root \
         or pass --isolation host explicitly"
    )]
    HostInstallRefused {
        /// The command line that was not run.
        command: String,
    },

    /// A lower-level failure (I/O, storage, catalog).
    #[error(transparent)]
    Common(#[from] BootstackError),
}

/// Convenience alias used throughout the build crate.
pub type Result<T> = std::result::Result<T, BuildError>;

impl BuildError {
    /// Shorthand for a [`BuildError::Descriptor`].
    pub fn descriptor(line: usize, message: impl Into<String>) -> Self {
        Self::Descriptor {
            line,
            message: message.into(),
        }
    }
}
