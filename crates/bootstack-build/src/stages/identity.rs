//! Privilege de-escalation stage.

use bootstack_common::types::RuntimeIdentity;
use bootstack_core::filesystem::{access, rootfs_join};

use crate::error::Result;
use crate::stage::{BuildContext, Stage};

/// Records the non-root runtime identity in the image configuration.
///
/// Ownership is never corrected. The working directory is audited and
/// every path the identity cannot read becomes a build warning.
#[derive(Debug, Clone, Copy)]
pub struct IdentityStage {
    identity: RuntimeIdentity,
}

impl IdentityStage {
    /// Creates the stage.
    #[must_use]
    pub const fn new(identity: RuntimeIdentity) -> Self {
        Self { identity }
    }
}

impl Stage for IdentityStage {
    fn name(&self) -> &'static str {
        "identity"
    }

    fn apply(&self, ctx: &mut BuildContext<'_>) -> Result<()> {
        ctx.config.identity = Some(self.identity);
        tracing::info!(identity = %self.identity, "runtime identity recorded");

        let workdir = rootfs_join(&ctx.rootfs, &ctx.config.workdir);
        let denied = access::audit_readable(&workdir, self.identity)?;
        for path in denied {
            ctx.warn(format!(
                "{} is not readable by {}",
                std::path::Path::new(&ctx.config.workdir).join(&path).display(),
                self.identity
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use bootstack_core::process::Isolation;
    use bootstack_image::registry::ImageCatalog;
    use bootstack_image::storage::StorageBackend;

    use super::*;

    #[test]
    fn records_identity() {
        let dir = tempfile::tempdir().expect("tempdir");
        let storage = StorageBackend::open(dir.path().join("store")).expect("storage");
        let catalog = ImageCatalog::open(dir.path()).expect("catalog");
        let rootfs = dir.path().join("rootfs");
        let mut ctx = BuildContext::new(dir.path(), &rootfs, &storage, &catalog, Isolation::Host);

        IdentityStage::new(RuntimeIdentity::default())
            .apply(&mut ctx)
            .expect("apply");
        assert_eq!(ctx.config.identity, Some(RuntimeIdentity { uid: 1000, gid: 1000 }));
        assert!(ctx.warnings.is_empty());
    }

    #[cfg(unix)]
    #[test]
    fn unreadable_workdir_files_become_warnings() {
        use std::os::unix::fs::PermissionsExt;

        let dir = tempfile::tempdir().expect("tempdir");
        let storage = StorageBackend::open(dir.path().join("store")).expect("storage");
        let catalog = ImageCatalog::open(dir.path()).expect("catalog");
        let rootfs = dir.path().join("rootfs");
        std::fs::create_dir_all(rootfs.join("app")).expect("mkdir");
        std::fs::set_permissions(rootfs.join("app"), std::fs::Permissions::from_mode(0o755))
            .expect("chmod dir");
        let secret = rootfs.join("app/secret.py");
        std::fs::write(&secret, "x").expect("write");
        std::fs::set_permissions(&secret, std::fs::Permissions::from_mode(0o600)).expect("chmod");

        let mut ctx = BuildContext::new(dir.path(), &rootfs, &storage, &catalog, Isolation::Host);
        ctx.config.workdir = "/app".into();
        let identity = RuntimeIdentity::new(4242, 4242).expect("identity");
        IdentityStage::new(identity).apply(&mut ctx).expect("apply");

        assert_eq!(ctx.warnings.len(), 1);
        assert!(ctx.warnings[0].contains("/app/secret.py"));
        assert!(secret.exists());
    }
}
