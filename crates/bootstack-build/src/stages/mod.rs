//! The five build stages, in pipeline order.

pub mod base;
pub mod copy;
pub mod entry;
pub mod identity;
pub mod install;

use std::path::Path;

use bootstack_core::filesystem::{copy::copy_path, rootfs_join};

use crate::error::Result;
use crate::stage::BuildContext;

pub use self::base::BaseStage;
pub use self::copy::SourceCopyStage;
pub use self::entry::EntryStage;
pub use self::identity::IdentityStage;
pub use self::install::DependencyStage;

/// Collapses `.` and `..` in an absolute image path.
pub(crate) fn normalize_image_path(path: &str) -> String {
    let mut parts: Vec<&str> = Vec::new();
    for part in path.split('/') {
        match part {
            "" | "." => {}
            ".." => {
                let _ = parts.pop();
            }
            other => parts.push(other),
        }
    }
    format!("/{}", parts.join("/"))
}

/// Copies one host path into the image at `dest`, with `COPY` semantics:
/// a directory's contents merge into `dest`; a file lands inside `dest`
/// when `dest` names a directory (trailing `/`, `.`, an existing directory,
/// or several sources), otherwise at `dest` itself.
///
/// Returns the in-image path written.
pub(crate) fn copy_into_image(
    ctx: &BuildContext<'_>,
    src: &Path,
    dest: &str,
    many_sources: bool,
) -> Result<String> {
    let target = normalize_image_path(&ctx.config.resolve_path(dest));
    let host_target = rootfs_join(&ctx.rootfs, &target);

    let into_dir = src.is_dir()
        || many_sources
        || dest.ends_with('/')
        || matches!(dest, "." | "..")
        || host_target.is_dir();

    let written_to = match src.file_name() {
        Some(name) if into_dir && !src.is_dir() => {
            let name = name.to_string_lossy();
            let _ = copy_path(src, &host_target.join(name.as_ref()))?;
            normalize_image_path(&format!("{target}/{name}"))
        }
        _ => {
            let _ = copy_path(src, &host_target)?;
            target
        }
    };
    tracing::debug!(src = %src.display(), dest = %written_to, "copied into image");
    Ok(written_to)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn normalize_collapses_dots() {
        assert_eq!(normalize_image_path("/app/."), "/app");
        assert_eq!(normalize_image_path("/app/../srv//x"), "/srv/x");
        assert_eq!(normalize_image_path("/../.."), "/");
    }
}
