//! Image source protocol handlers.
//!
//! Supports `file://` (local directory), `tar://` (archive), and remote
//! `https://` sources. Remote sources must pin their content with a
//! `#sha256=<hex>` fragment; the download is verified before use.
//! Local-first by design.

use std::path::{Path, PathBuf};

use bootstack_common::error::{BootstackError, Result};
use bootstack_common::types::Sha256Hash;

/// Supported image source protocols.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ImageSource {
    /// Local directory (`file:///path/to/rootfs`).
    File(PathBuf),
    /// Local tar archive (`tar:///path/to/image.tar`).
    Tar(PathBuf),
    /// Remote HTTP(S) archive.
    Remote {
        /// URL of the remote archive, without the digest fragment.
        url: String,
        /// Expected SHA-256 of the downloaded bytes.
        sha256: Sha256Hash,
    },
}

/// Whether `input` uses one of the source URI schemes.
#[must_use]
pub fn is_source_uri(input: &str) -> bool {
    ["file://", "tar://", "http://", "https://"]
        .iter()
        .any(|scheme| input.starts_with(scheme))
}

/// Resolves an image source URI into an `ImageSource`.
///
/// # Errors
///
/// Returns an error if the URI scheme is unsupported, a local path does not
/// exist, or a remote URI lacks a valid `#sha256=` pin.
pub fn resolve_source(uri: &str) -> Result<ImageSource> {
    if let Some(path_str) = uri.strip_prefix("file://") {
        let path = PathBuf::from(path_str);
        if !path.is_dir() {
            return Err(BootstackError::NotFound {
                kind: "image directory",
                id: path_str.to_string(),
            });
        }
        tracing::info!(path = %path.display(), "resolved file:// source");
        Ok(ImageSource::File(path))
    } else if let Some(path_str) = uri.strip_prefix("tar://") {
        let path = PathBuf::from(path_str);
        if !path.is_file() {
            return Err(BootstackError::NotFound {
                kind: "tar archive",
                id: path_str.to_string(),
            });
        }
        tracing::info!(path = %path.display(), "resolved tar:// source");
        Ok(ImageSource::Tar(path))
    } else if uri.starts_with("https://") || uri.starts_with("http://") {
        let (url, fragment) = uri.split_once('#').unwrap_or((uri, ""));
        let sha256 = fragment
            .strip_prefix("sha256=")
            .ok_or_else(|| BootstackError::Config {
                message: format!("remote source must pin content with #sha256=<hex>: {uri}"),
            })
            .and_then(Sha256Hash::from_hex)?;
        tracing::info!(url, "resolved remote source");
        Ok(ImageSource::Remote {
            url: url.to_string(),
            sha256,
        })
    } else {
        Err(BootstackError::Config {
            message: format!("unsupported image source URI scheme: {uri}"),
        })
    }
}

/// Downloads a remote archive into `dest_dir` and verifies its digest.
///
/// A single attempt is made; a failed transfer or a digest mismatch is
/// returned as-is.
///
/// # Errors
///
/// Returns `Network` on transfer failure and `HashMismatch` when the bytes
/// do not match `sha256`.
pub fn fetch_remote(url: &str, sha256: &Sha256Hash, dest_dir: &Path) -> Result<PathBuf> {
    tracing::info!(url, expected = %sha256, "downloading base archive");
    let network = |message: String| BootstackError::Network {
        url: url.to_string(),
        message,
    };

    let response = reqwest::blocking::get(url)
        .and_then(reqwest::blocking::Response::error_for_status)
        .map_err(|e| network(e.to_string()))?;
    let bytes = response.bytes().map_err(|e| network(e.to_string()))?;

    let dest = dest_dir.join(format!("{}.download", sha256.as_hex()));
    std::fs::write(&dest, &bytes).map_err(|e| BootstackError::io(&dest, e))?;
    crate::hash::validate_hash(&dest, sha256)?;
    tracing::info!(url, size = bytes.len(), "base archive verified");
    Ok(dest)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn resolve_file_source_existing_dir_returns_file() {
        let dir = tempfile::tempdir().expect("failed to create tempdir");
        let uri = format!("file://{}", dir.path().display());
        let source = resolve_source(&uri).expect("resolve failed");
        assert!(matches!(source, ImageSource::File(_)));
    }

    #[test]
    fn resolve_tar_source_existing_file_returns_tar() {
        let dir = tempfile::tempdir().expect("failed to create tempdir");
        let tar_path = dir.path().join("test.tar");
        std::fs::write(&tar_path, b"fake tar").expect("failed to write");
        let uri = format!("tar://{}", tar_path.display());
        let source = resolve_source(&uri).expect("resolve failed");
        assert!(matches!(source, ImageSource::Tar(_)));
    }

    #[test]
    fn resolve_pinned_https_source_returns_remote() {
        let hex = "ab".repeat(32);
        let source = resolve_source(&format!("https://example.com/python.tar.gz#sha256={hex}"))
            .expect("resolve failed");
        match source {
            ImageSource::Remote { url, sha256 } => {
                assert_eq!(url, "https://example.com/python.tar.gz");
                assert_eq!(sha256.as_hex(), hex);
            }
            other => panic!("expected remote, got {other:?}"),
        }
    }

    #[test]
    fn resolve_unpinned_remote_is_rejected() {
        assert!(resolve_source("https://example.com/image.tar").is_err());
        assert!(resolve_source("http://example.com/image.tar#sha256=zz").is_err());
    }

    #[test]
    fn resolve_unknown_scheme_returns_error() {
        assert!(resolve_source("ftp://example.com/image").is_err());
    }

    #[test]
    fn resolve_missing_paths_return_not_found() {
        assert!(matches!(
            resolve_source("file:///nonexistent/path"),
            Err(BootstackError::NotFound { .. })
        ));
        assert!(matches!(
            resolve_source("tar:///nonexistent/archive.tar"),
            Err(BootstackError::NotFound { .. })
        ));
    }

    #[test]
    fn is_source_uri_distinguishes_references() {
        assert!(is_source_uri("tar:///tmp/base.tar"));
        assert!(!is_source_uri("python:3.11-slim"));
    }
}
