//! Dependency install stage.

use crate::descriptor::recipe::DependencyStep;
use crate::error::{BuildError, Result};
use crate::installer::{InstallSession, PackageInstaller, prune_caches};
use crate::manifest::DependencyManifest;
use crate::stage::{BuildContext, Stage};

/// Copies the dependency manifest into the image and runs the installer.
///
/// The manifest is checked before anything runs: a missing manifest
/// fails the stage with no installer invocation and no files changed.
#[derive(Debug)]
pub struct DependencyStage {
    step: Option<DependencyStep>,
    installer: Box<dyn PackageInstaller>,
}

impl DependencyStage {
    /// Creates the stage; `step` is `None` when nothing is declared.
    #[must_use]
    pub fn new(step: Option<DependencyStep>, installer: Box<dyn PackageInstaller>) -> Self {
        Self { step, installer }
    }
}

impl Stage for DependencyStage {
    fn name(&self) -> &'static str {
        "dependencies"
    }

    fn commits_layer(&self) -> bool {
        self.step.is_some()
    }

    fn describe(&self) -> String {
        match &self.step {
            Some(step) => format!("install {} ({})", step.manifest, self.installer.name()),
            None => "install (none)".into(),
        }
    }

    fn apply(&self, ctx: &mut BuildContext<'_>) -> Result<()> {
        let Some(step) = &self.step else {
            tracing::info!("no dependency manifest declared, skipping install");
            return Ok(());
        };

        let manifest_path = ctx.context_dir.join(&step.manifest);
        if !manifest_path.is_file() {
            return Err(BuildError::ManifestMissing {
                path: manifest_path,
            });
        }
        let manifest = match DependencyManifest::load(&manifest_path) {
            Ok(manifest) => manifest,
            Err(BuildError::Manifest { line, message }) => {
                ctx.warn(format!(
                    "{} line {line}: {message}; passed to the installer unchecked",
                    step.manifest
                ));
                DependencyManifest::default()
            }
            Err(e) => return Err(e),
        };
        tracing::info!(
            manifest = %step.manifest,
            requirements = manifest.requirements.len(),
            options = manifest.options.len(),
            installer = self.installer.name(),
            "installing dependencies"
        );

        let image_manifest = super::copy_into_image(ctx, &manifest_path, &step.dest, false)?;
        self.installer.configure(&mut ctx.config);
        let session = InstallSession {
            rootfs: &ctx.rootfs,
            config: &ctx.config,
            manifest: &image_manifest,
            isolation: ctx.isolation,
            allow_host: ctx.allow_host_install,
        };
        self.installer.install(&session)?;

        let pruned = prune_caches(&ctx.rootfs, self.installer.cache_paths())?;
        tracing::debug!(
            pruned = pruned.len(),
            paths = ?pruned,
            "package caches excluded from dependency layer"
        );
        Ok(())
    }
}
