//! Access audit for a non-root identity.
//!
//! Nothing is ever chowned or chmodded here. The audit only reports which
//! paths the identity could not read, so the risk is visible before the
//! container fails at run time.

use std::path::{Path, PathBuf};

use bootstack_common::error::{BootstackError, Result};
use bootstack_common::types::RuntimeIdentity;

const READ: u32 = 0o4;
const EXEC: u32 = 0o1;

/// Returns every path under `root` (relative to it) that `identity` cannot
/// read. Directories additionally require search permission.
///
/// Symlinks are not followed. A missing `root` yields an empty list.
///
/// # Errors
///
/// Returns an error if a directory under `root` cannot be listed.
pub fn audit_readable(root: &Path, identity: RuntimeIdentity) -> Result<Vec<PathBuf>> {
    let mut denied = Vec::new();
    if !root.exists() {
        return Ok(denied);
    }
    walk(root, root, identity, &mut denied)?;
    denied.sort();
    if !denied.is_empty() {
        tracing::warn!(
            identity = %identity,
            count = denied.len(),
            "paths unreadable by runtime identity"
        );
    }
    Ok(denied)
}

fn walk(root: &Path, dir: &Path, identity: RuntimeIdentity, denied: &mut Vec<PathBuf>) -> Result<()> {
    let read_dir = std::fs::read_dir(dir).map_err(|e| BootstackError::io(dir, e))?;
    for entry in read_dir {
        let entry = entry.map_err(|e| BootstackError::io(dir, e))?;
        let path = entry.path();
        let meta = std::fs::symlink_metadata(&path).map_err(|e| BootstackError::io(&path, e))?;
        if meta.file_type().is_symlink() {
            continue;
        }
        let needed = if meta.is_dir() { READ | EXEC } else { READ };
        if !permits(&meta, identity, needed) {
            denied.push(path.strip_prefix(root).unwrap_or(&path).to_path_buf());
        }
        if meta.is_dir() {
            walk(root, &path, identity, denied)?;
        }
    }
    Ok(())
}

#[cfg(unix)]
fn permits(meta: &std::fs::Metadata, identity: RuntimeIdentity, needed: u32) -> bool {
    use std::os::unix::fs::MetadataExt;

    let mode = meta.mode();
    let bits = if meta.uid() == identity.uid {
        (mode >> 6) & 0o7
    } else if meta.gid() == identity.gid {
        (mode >> 3) & 0o7
    } else {
        mode & 0o7
    };
    bits & needed == needed
}

#[cfg(not(unix))]
fn permits(_meta: &std::fs::Metadata, _identity: RuntimeIdentity, _needed: u32) -> bool {
    true
}
