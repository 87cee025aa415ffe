//! Filesystem helpers operating on an unpacked image rootfs.

pub mod access;
pub mod copy;

use std::path::{Component, Path, PathBuf};

/// Joins an absolute in-image path onto a host rootfs directory.
///
/// Leading `/`, `.` and `..` components are dropped so the result never
/// escapes `rootfs`.
#[must_use]
pub fn rootfs_join(rootfs: &Path, image_path: &str) -> PathBuf {
    let mut out = rootfs.to_path_buf();
    for component in Path::new(image_path).components() {
        if let Component::Normal(part) = component {
            out.push(part);
        }
    }
    out
}
