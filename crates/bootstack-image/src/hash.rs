//! SHA-256 content verification.
//!
//! Validates integrity of downloaded base images and stored layers.

use std::io::Read;
use std::path::Path;

use bootstack_common::error::{BootstackError, Result};
use bootstack_common::types::Sha256Hash;
use sha2::{Digest, Sha256};

/// Computes the SHA-256 hash of a file.
///
/// # Errors
///
/// Returns an error if the file cannot be read.
pub fn hash_file(path: &Path) -> Result<Sha256Hash> {
    tracing::debug!(path = %path.display(), "computing SHA-256 hash");
    let mut file = std::fs::File::open(path).map_err(|e| BootstackError::io(path, e))?;
    let mut hasher = Sha256::new();
    let mut buf = [0u8; 64 * 1024];
    loop {
        let n = file.read(&mut buf).map_err(|e| BootstackError::io(path, e))?;
        if n == 0 {
            break;
        }
        hasher.update(&buf[..n]);
    }
    Sha256Hash::from_hex(hex(&hasher.finalize()))
}

/// Computes the SHA-256 hash of an in-memory buffer.
#[must_use]
pub fn hash_bytes(data: &[u8]) -> Sha256Hash {
    Sha256Hash::from_hex(hex(&Sha256::digest(data)))
        .unwrap_or_else(|_| unreachable!("sha256 output is always 64 hex chars"))
}

/// Validates that a file matches the expected SHA-256 hash.
///
/// # Errors
///
/// Returns `BootstackError::HashMismatch` if the hashes do not match.
pub fn validate_hash(path: &Path, expected: &Sha256Hash) -> Result<()> {
    tracing::debug!(path = %path.display(), "validating SHA-256 hash");
    let actual = hash_file(path)?;
    if &actual != expected {
        return Err(BootstackError::HashMismatch {
            resource: path.display().to_string(),
            expected: expected.to_string(),
            actual: actual.to_string(),
        });
    }
    Ok(())
}

fn hex(bytes: &[u8]) -> String {
    use std::fmt::Write;

    bytes.iter().fold(String::with_capacity(64), |mut s, b| {
        let _ = write!(s, "{b:02x}");
        s
    })
}
