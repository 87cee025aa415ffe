//! The build stage abstraction.
//!
//! A stage reads and updates a [`BuildContext`]. Stages that change files
//! declare it through [`Stage::commits_layer`]; the pipeline then records
//! what they changed as one new layer.

use std::path::{Path, PathBuf};

use bootstack_core::process::Isolation;
use bootstack_image::config::ImageConfig;
use bootstack_image::layer::LayerRef;
use bootstack_image::registry::ImageCatalog;
use bootstack_image::storage::StorageBackend;

use crate::error::Result;

/// Mutable state threaded through the stages of one build.
#[derive(Debug)]
pub struct BuildContext<'a> {
    /// Build context directory (sources and manifest live here).
    pub context_dir: PathBuf,
    /// Scratch rootfs the image is assembled in.
    pub rootfs: PathBuf,
    /// Layer store.
    pub storage: &'a StorageBackend,
    /// Catalog used to resolve base references.
    pub catalog: &'a ImageCatalog,
    /// Isolation used for install commands.
    pub isolation: Isolation,
    /// Whether install commands may run under host isolation.
    pub allow_host_install: bool,
    /// Image configuration built so far.
    pub config: ImageConfig,
    /// Layers committed so far, bottom to top.
    pub layers: Vec<LayerRef>,
    /// Where the bottom layers came from.
    pub base: Option<String>,
    /// Non-fatal findings, surfaced in the build report.
    pub warnings: Vec<String>,
}

impl<'a> BuildContext<'a> {
    /// Starts an empty build.
    #[must_use]
    pub fn new(
        context_dir: &Path,
        rootfs: &Path,
        storage: &'a StorageBackend,
        catalog: &'a ImageCatalog,
        isolation: Isolation,
    ) -> Self {
        Self {
            context_dir: context_dir.to_path_buf(),
            rootfs: rootfs.to_path_buf(),
            storage,
            catalog,
            isolation,
            allow_host_install: false,
            config: ImageConfig::default(),
            layers: Vec::new(),
            base: None,
            warnings: Vec::new(),
        }
    }

    /// Records a warning and logs it.
    pub fn warn(&mut self, message: impl Into<String>) {
        let message = message.into();
        tracing::warn!(%message, "build warning");
        self.warnings.push(message);
    }
}

/// One ordered step of an image build.
pub trait Stage {
    /// Name used in logs and the report.
    fn name(&self) -> &'static str;

    /// Whether files changed by [`Stage::apply`] form a new layer.
    fn commits_layer(&self) -> bool {
        false
    }

    /// Short description recorded as the layer's `created_by`.
    fn describe(&self) -> String {
        self.name().to_string()
    }

    /// Runs the stage.
    ///
    /// # Errors
    ///
    /// Any error aborts the build; no layer is committed for this stage.
    fn apply(&self, ctx: &mut BuildContext<'_>) -> Result<()>;
}
