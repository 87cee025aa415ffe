//! Base runtime stage: resolve the base image and unpack it.

use bootstack_common::error::BootstackError;
use bootstack_image::config::ImageConfig;
use bootstack_image::layer::LayerRef;
use bootstack_image::reference::ImageReference;
use bootstack_image::source::{self, ImageSource};

use crate::descriptor::recipe::ConfigDirective;
use crate::error::{BuildError, Result};
use crate::stage::{BuildContext, Stage};

/// Resolves the base reference, extracts its layers into the build rootfs,
/// and starts the image configuration from the base's.
#[derive(Debug, Clone)]
pub struct BaseStage {
    reference: String,
    directives: Vec<ConfigDirective>,
}

impl BaseStage {
    /// Creates the stage for a `FROM` reference plus descriptor metadata.
    #[must_use]
    pub const fn new(reference: String, directives: Vec<ConfigDirective>) -> Self {
        Self {
            reference,
            directives,
        }
    }

    fn unresolved(&self, reason: impl ToString) -> BuildError {
        BuildError::BaseImageUnresolved {
            reference: self.reference.clone(),
            reason: reason.to_string(),
        }
    }

    fn resolve(&self, ctx: &BuildContext<'_>) -> Result<(Vec<LayerRef>, ImageConfig)> {
        if source::is_source_uri(&self.reference) {
            let created_by = format!("base {}", self.reference);
            let source = source::resolve_source(&self.reference).map_err(|e| self.unresolved(e))?;
            let layer = match source {
                ImageSource::File(dir) => ctx.storage.import_dir(&dir, &created_by)?,
                ImageSource::Tar(archive) => ctx.storage.import_archive(&archive, &created_by)?,
                ImageSource::Remote { url, sha256 } => {
                    let scratch = ctx.storage.scratch_dir("fetch")?;
                    let archive = source::fetch_remote(&url, &sha256, scratch.path())
                        .map_err(|e| self.unresolved(e))?;
                    ctx.storage.import_archive(&archive, &created_by)?
                }
            };
            return Ok((vec![layer], ImageConfig::base()));
        }

        let reference = ImageReference::parse(&self.reference).map_err(|e| self.unresolved(e))?;
        let entry = ctx
            .catalog
            .find(&reference.key())
            .map_err(|e| self.unresolved(e))?;
        if let Some(digest) = &reference.digest {
            if digest.as_hex() != entry.id.as_str() {
                return Err(self.unresolved(format!(
                    "pinned to {digest} but catalog has sha256:{}",
                    entry.id
                )));
            }
        }
        Ok((entry.layers, entry.config))
    }

    fn apply_directives(&self, config: &mut ImageConfig) {
        for directive in &self.directives {
            match directive {
                ConfigDirective::Env(key, value) => config.set_env(key.clone(), value.clone()),
                ConfigDirective::Workdir(path) => config.workdir = config.resolve_path(path),
                ConfigDirective::Label(key, value) => {
                    let _ = config.labels.insert(key.clone(), value.clone());
                }
                ConfigDirective::Expose(port) => {
                    if !config.exposed_ports.contains(port) {
                        config.exposed_ports.push(port.clone());
                    }
                }
            }
        }
    }
}

impl Stage for BaseStage {
    fn name(&self) -> &'static str {
        "base"
    }

    fn apply(&self, ctx: &mut BuildContext<'_>) -> Result<()> {
        let (layers, mut config) = self.resolve(ctx)?;
        tracing::info!(reference = %self.reference, layers = layers.len(), "base image resolved");

        ctx.storage
            .materialize(&layers, &ctx.rootfs)
            .map_err(|e| match e {
                BootstackError::NotFound { .. } => self.unresolved(e),
                other => other.into(),
            })?;

        self.apply_directives(&mut config);
        ctx.config = config;
        ctx.layers = layers;
        ctx.base = Some(self.reference.clone());
        Ok(())
    }
}
