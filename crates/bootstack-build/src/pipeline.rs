//! The ordered, fail-fast build pipeline.
//!
//! Stages run strictly in sequence. Around every stage that commits a
//! layer the rootfs is snapshotted; on success the changed paths are
//! packed into one content-addressed layer. The first failure stops the
//! build and is returned unchanged, and nothing is committed for the
//! failing stage.

use std::path::PathBuf;
use std::time::{Duration, Instant};

use bootstack_common::error::BootstackError;
use bootstack_common::types::RuntimeIdentity;
use bootstack_core::process::Isolation;
use bootstack_image::layer::{DirSnapshot, LayerRef};
use bootstack_image::reference::ImageReference;
use bootstack_image::registry::{ImageCatalog, ImageEntry};
use bootstack_image::storage::StorageBackend;
use serde::Serialize;

use crate::descriptor::{self, recipe::BuildRecipe};
use crate::error::Result;
use crate::installer::{PackageInstaller, PipInstaller, ScriptInstaller};
use crate::stage::{BuildContext, Stage};
use crate::stages::{BaseStage, DependencyStage, EntryStage, IdentityStage, SourceCopyStage};

/// Outcome of one stage.
#[derive(Debug, Clone, Serialize)]
pub struct StageReport {
    /// Stage name.
    pub name: &'static str,
    /// Wall time spent in the stage, snapshots included.
    pub duration: Duration,
    /// Layer committed by the stage, if any.
    pub layer: Option<LayerRef>,
}

/// Summary of a finished build.
#[derive(Debug, Clone, Default, Serialize)]
pub struct BuildReport {
    /// Per-stage outcomes, in order.
    pub stages: Vec<StageReport>,
    /// Non-fatal findings (unreadable paths for the runtime identity).
    pub warnings: Vec<String>,
}

impl BuildReport {
    /// Total wall time over all stages.
    #[must_use]
    pub fn total_duration(&self) -> Duration {
        self.stages.iter().map(|s| s.duration).sum()
    }
}

/// An ordered list of stages.
#[derive(Default)]
pub struct Pipeline {
    stages: Vec<Box<dyn Stage>>,
}

impl Pipeline {
    /// Creates an empty pipeline.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends a stage.
    #[must_use]
    pub fn with_stage(mut self, stage: impl Stage + 'static) -> Self {
        self.stages.push(Box::new(stage));
        self
    }

    /// The five-stage pipeline for a lowered recipe.
    #[must_use]
    pub fn for_recipe(
        recipe: BuildRecipe,
        installer: InstallerKind,
        default_identity: RuntimeIdentity,
    ) -> Self {
        let dependency_installer: Box<dyn PackageInstaller> = match (installer, &recipe.dependencies) {
            (InstallerKind::Pip, _) => Box::new(PipInstaller),
            (InstallerKind::Descriptor, Some(step)) => {
                Box::new(ScriptInstaller::new(step.commands.clone()))
            }
            (InstallerKind::Descriptor, None) => Box::new(ScriptInstaller::default()),
        };
        Self::new()
            .with_stage(BaseStage::new(recipe.base, recipe.directives))
            .with_stage(DependencyStage::new(recipe.dependencies, dependency_installer))
            .with_stage(SourceCopyStage::new(recipe.sources))
            .with_stage(IdentityStage::new(recipe.identity.unwrap_or(default_identity)))
            .with_stage(EntryStage::new(recipe.entry))
    }

    /// Stage names in execution order.
    #[must_use]
    pub fn stage_names(&self) -> Vec<&'static str> {
        self.stages.iter().map(|s| s.name()).collect()
    }

    /// Runs every stage in order, stopping at the first error.
    ///
    /// # Errors
    ///
    /// Returns the failing stage's error unchanged, or a storage error
    /// raised while snapshotting or committing a layer.
    pub fn run(&self, ctx: &mut BuildContext<'_>) -> Result<BuildReport> {
        let mut report = BuildReport::default();
        for stage in &self.stages {
            let started = Instant::now();
            let before = if stage.commits_layer() {
                Some(DirSnapshot::capture(&ctx.rootfs)?)
            } else {
                None
            };

            tracing::info!(stage = stage.name(), "stage started");
            if let Err(e) = stage.apply(ctx) {
                tracing::error!(stage = stage.name(), error = %e, "stage failed");
                return Err(e);
            }

            let layer = match before {
                Some(before) => commit_changes(ctx, &before, &stage.describe())?,
                None => None,
            };
            let duration = started.elapsed();
            tracing::info!(
                stage = stage.name(),
                elapsed_ms = u64::try_from(duration.as_millis()).unwrap_or(u64::MAX),
                layer = layer.as_ref().map(|l| l.digest.to_string()),
                "stage finished"
            );
            report.stages.push(StageReport {
                name: stage.name(),
                duration,
                layer,
            });
        }
        report.warnings.clone_from(&ctx.warnings);
        Ok(report)
    }
}

fn commit_changes(
    ctx: &mut BuildContext<'_>,
    before: &DirSnapshot,
    created_by: &str,
) -> Result<Option<LayerRef>> {
    let after = DirSnapshot::capture(&ctx.rootfs)?;
    let changed = before.diff(&after);
    if changed.is_empty() {
        tracing::debug!(created_by, "stage changed no files, no layer committed");
        return Ok(None);
    }
    let layer = ctx.storage.commit_paths(&ctx.rootfs, &changed, created_by)?;
    ctx.layers.push(layer.clone());
    Ok(Some(layer))
}

/// Which installer runs the dependency step.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum InstallerKind {
    /// The `RUN` commands following the manifest copy.
    #[default]
    Descriptor,
    /// The built-in pip preset.
    Pip,
}

/// Inputs of one image build.
#[derive(Debug, Clone)]
pub struct BuildOptions {
    /// Build context directory.
    pub context_dir: PathBuf,
    /// Descriptor file.
    pub descriptor: PathBuf,
    /// Reference the image is registered under.
    pub tag: String,
    /// Isolation for install commands.
    pub isolation: Isolation,
    /// Whether install commands may run under host isolation. Only set
    /// when the user asked for host isolation explicitly.
    pub allow_host_install: bool,
    /// Identity used when the descriptor has no `USER`.
    pub default_identity: RuntimeIdentity,
    /// Installer for the dependency step.
    pub installer: InstallerKind,
}

/// A registered image and how it was built.
#[derive(Debug, Clone)]
pub struct BuildOutput {
    /// The catalog entry.
    pub image: ImageEntry,
    /// Stage report.
    pub report: BuildReport,
}

/// Parses the descriptor, runs the pipeline in a scratch rootfs, and
/// registers the result.
///
/// # Errors
///
/// Returns the first descriptor, stage, or storage error. On failure the
/// catalog is untouched.
pub fn build_image(
    options: &BuildOptions,
    storage: &StorageBackend,
    catalog: &ImageCatalog,
) -> Result<BuildOutput> {
    let reference = ImageReference::parse(&options.tag)?;
    let descriptor = descriptor::parse_file(&options.descriptor)?;
    let recipe = BuildRecipe::from_descriptor(&descriptor)?;
    tracing::info!(
        tag = %reference.key(),
        base = %recipe.base,
        context = %options.context_dir.display(),
        "building image"
    );

    let context_dir = options
        .context_dir
        .canonicalize()
        .map_err(|e| BootstackError::io(&options.context_dir, e))?;
    let scratch = storage.scratch_dir("build")?;
    let rootfs = scratch.path().join("rootfs");
    std::fs::create_dir_all(&rootfs).map_err(|e| BootstackError::io(&rootfs, e))?;

    let pipeline = Pipeline::for_recipe(recipe, options.installer, options.default_identity);
    let mut ctx = BuildContext::new(&context_dir, &rootfs, storage, catalog, options.isolation);
    ctx.allow_host_install = options.allow_host_install;
    let report = pipeline.run(&mut ctx)?;

    let image = ImageEntry::new(reference.key(), ctx.base, ctx.layers, ctx.config)?;
    catalog.register(image.clone())?;
    tracing::info!(
        tag = %image.reference,
        id = %image.id.short(),
        layers = image.layers.len(),
        warnings = report.warnings.len(),
        "image built"
    );
    Ok(BuildOutput { image, report })
}

#[cfg(test)]
mod tests {
    use std::cell::Cell;
    use std::path::Path;
    use std::rc::Rc;

    use bootstack_image::config::ImageConfig;

    use super::*;
    use crate::descriptor::recipe::DependencyStep;
    use crate::error::BuildError;
    use crate::installer::InstallSession;

    #[derive(Debug, Default, Clone)]
    struct RecordingInstaller {
        calls: Rc<Cell<usize>>,
    }

    impl PackageInstaller for RecordingInstaller {
        fn name(&self) -> &'static str {
            "recording"
        }

        fn install(&self, session: &InstallSession<'_>) -> Result<()> {
            self.calls.set(self.calls.get() + 1);
            let target = bootstack_core::filesystem::rootfs_join(session.rootfs, "/site/pkg.py");
            std::fs::create_dir_all(target.parent().expect("parent")).expect("mkdir");
            std::fs::write(target, "installed").expect("write");
            Ok(())
        }
    }

    struct Fixture {
        dir: tempfile::TempDir,
        storage: StorageBackend,
        catalog: ImageCatalog,
    }

    impl Fixture {
        fn new() -> Self {
            let dir = tempfile::tempdir().expect("tempdir");
            let storage = StorageBackend::open(dir.path().join("store")).expect("storage");
            let catalog = ImageCatalog::open(dir.path()).expect("catalog");
            let base = dir.path().join("base");
            std::fs::create_dir_all(base.join("bin")).expect("mkdir");
            std::fs::write(base.join("bin/runtime"), "rt").expect("write");
            Self {
                dir,
                storage,
                catalog,
            }
        }

        fn base_uri(&self) -> String {
            format!("file://{}", self.dir.path().join("base").display())
        }

        fn context(&self, files: &[(&str, &str)]) -> PathBuf {
            let ctx = self.dir.path().join("context");
            for (name, content) in files {
                let path = ctx.join(name);
                std::fs::create_dir_all(path.parent().expect("parent")).expect("mkdir");
                std::fs::write(path, content).expect("write");
            }
            std::fs::create_dir_all(&ctx).expect("mkdir");
            ctx
        }

        fn ctx<'a>(&'a self, context: &Path) -> BuildContext<'a> {
            let rootfs = self.dir.path().join("rootfs");
            BuildContext::new(context, &rootfs, &self.storage, &self.catalog, Isolation::Host)
        }
    }

    fn dependency_step() -> Option<DependencyStep> {
        Some(DependencyStep {
            manifest: "requirements.txt".into(),
            dest: ".".into(),
            commands: Vec::new(),
        })
    }

    #[test]
    fn missing_manifest_fails_before_installer_runs() {
        let fx = Fixture::new();
        let context = fx.context(&[("main.py", "print(1)")]);
        let recorder = RecordingInstaller::default();
        let pipeline = Pipeline::new()
            .with_stage(BaseStage::new(fx.base_uri(), Vec::new()))
            .with_stage(DependencyStage::new(dependency_step(), Box::new(recorder.clone())))
            .with_stage(SourceCopyStage::new(Vec::new()));

        let mut ctx = fx.ctx(&context);
        let err = pipeline.run(&mut ctx).expect_err("manifest missing");

        assert!(matches!(err, BuildError::ManifestMissing { .. }));
        assert_eq!(recorder.calls.get(), 0);
        assert_eq!(ctx.layers.len(), 1, "only the base layer exists");
    }

    #[test]
    fn successful_stages_commit_only_their_changes() {
        let fx = Fixture::new();
        let context = fx.context(&[("requirements.txt", "requests==2.31.0\n"), ("main.py", "m")]);
        let recorder = RecordingInstaller::default();
        let pipeline = Pipeline::new()
            .with_stage(BaseStage::new(
                fx.base_uri(),
                vec![crate::descriptor::recipe::ConfigDirective::Workdir("/app".into())],
            ))
            .with_stage(DependencyStage::new(dependency_step(), Box::new(recorder.clone())))
            .with_stage(SourceCopyStage::new(vec![crate::descriptor::recipe::CopyStep {
                sources: vec![".".into()],
                dest: ".".into(),
            }]))
            .with_stage(IdentityStage::new(RuntimeIdentity::default()));

        let mut ctx = fx.ctx(&context);
        let report = pipeline.run(&mut ctx).expect("run");

        assert_eq!(recorder.calls.get(), 1);
        assert_eq!(ctx.layers.len(), 3);
        assert_eq!(report.stages.len(), 4);
        assert!(report.stages[0].layer.is_none());
        assert!(report.stages[1].layer.is_some());
        assert!(report.stages[3].layer.is_none());
        assert!(ctx.rootfs.join("app/requirements.txt").is_file());
        assert!(ctx.rootfs.join("site/pkg.py").is_file());
        assert!(ctx.rootfs.join("app/main.py").is_file());
    }

    #[derive(Debug)]
    struct CachingInstaller;

    impl PackageInstaller for CachingInstaller {
        fn name(&self) -> &'static str {
            "caching"
        }

        fn install(&self, session: &InstallSession<'_>) -> Result<()> {
            for path in ["/root/.cache/pip/http/wheel.bin", "/tmp/pip-build-1/setup.py", "/site/pkg.py"] {
                let target = bootstack_core::filesystem::rootfs_join(session.rootfs, path);
                std::fs::create_dir_all(target.parent().expect("parent")).expect("mkdir");
                std::fs::write(target, "x").expect("write");
            }
            Ok(())
        }
    }

    #[test]
    fn package_caches_are_absent_from_dependency_layer() {
        let fx = Fixture::new();
        let context = fx.context(&[("requirements.txt", "requests\n")]);
        let pipeline = Pipeline::new()
            .with_stage(BaseStage::new(fx.base_uri(), Vec::new()))
            .with_stage(DependencyStage::new(dependency_step(), Box::new(CachingInstaller)));

        let mut ctx = fx.ctx(&context);
        let _ = pipeline.run(&mut ctx).expect("run");
        assert_eq!(ctx.layers.len(), 2);

        let unpacked = fx.dir.path().join("unpacked");
        let archive = fx.storage.layer_path(ctx.layers[1].digest.as_hex());
        let _ = bootstack_image::layer::extract_layer(&archive, &unpacked).expect("extract");
        assert!(unpacked.join("site/pkg.py").is_file());
        assert!(unpacked.join("requirements.txt").is_file());
        assert!(!unpacked.join("root/.cache/pip").exists());
        assert!(!unpacked.join("tmp/pip-build-1").exists());
    }

    #[test]
    fn unreadable_manifest_line_is_a_warning_not_a_failure() {
        let fx = Fixture::new();
        let context = fx.context(&[("requirements.txt", "requests\n>=1.0\n")]);
        let recorder = RecordingInstaller::default();
        let pipeline = Pipeline::new()
            .with_stage(BaseStage::new(fx.base_uri(), Vec::new()))
            .with_stage(DependencyStage::new(dependency_step(), Box::new(recorder.clone())));

        let mut ctx = fx.ctx(&context);
        let report = pipeline.run(&mut ctx).expect("run");
        assert_eq!(recorder.calls.get(), 1);
        assert_eq!(report.warnings.len(), 1);
        assert!(report.warnings[0].contains("requirements.txt line 2"));
    }

    #[test]
    fn recipe_pipeline_has_five_ordered_stages() {
        let recipe = BuildRecipe::from_descriptor(
            &descriptor::parse("FROM base\nCOPY requirements.txt .\nRUN true\nCOPY . .\nCMD [\"python\", \"main.py\"]")
                .expect("parse"),
        )
        .expect("lower");
        let pipeline = Pipeline::for_recipe(recipe, InstallerKind::Descriptor, RuntimeIdentity::default());
        assert_eq!(
            pipeline.stage_names(),
            ["base", "dependencies", "sources", "identity", "entry"]
        );
    }

    #[test]
    fn failed_build_leaves_catalog_untouched() {
        let fx = Fixture::new();
        let context = fx.context(&[("main.py", "m")]);
        std::fs::write(
            context.join("Dockerfile"),
            format!(
                "FROM {}\nCOPY requirements.txt .\nRUN true\nCOPY . .\nCMD [\"python\", \"main.py\"]\n",
                fx.base_uri()
            ),
        )
        .expect("write");
        let options = BuildOptions {
            descriptor: context.join("Dockerfile"),
            context_dir: context,
            tag: "app:1".into(),
            isolation: Isolation::Host,
            allow_host_install: true,
            default_identity: RuntimeIdentity::default(),
            installer: InstallerKind::Descriptor,
        };

        let err = build_image(&options, &fx.storage, &fx.catalog).expect_err("no manifest");
        assert!(matches!(err, BuildError::ManifestMissing { .. }));
        assert!(fx.catalog.list().expect("list").is_empty());
    }

    #[test]
    fn implicit_host_isolation_refuses_install_commands() {
        let fx = Fixture::new();
        let context = fx.context(&[("requirements.txt", "requests\n"), ("main.py", "m")]);
        std::fs::write(
            context.join("Dockerfile"),
            format!(
                "FROM {}\nCOPY requirements.txt .\nRUN touch installed-on-host\nCOPY . .\n\
                 CMD [\"python\", \"main.py\"]\n",
                fx.base_uri()
            ),
        )
        .expect("write");
        let options = BuildOptions {
            descriptor: context.join("Dockerfile"),
            context_dir: context.clone(),
            tag: "app:1".into(),
            isolation: Isolation::Host,
            allow_host_install: false,
            default_identity: RuntimeIdentity::default(),
            installer: InstallerKind::Descriptor,
        };

        let err = build_image(&options, &fx.storage, &fx.catalog).expect_err("refused");
        assert!(matches!(err, BuildError::HostInstallRefused { .. }));
        assert!(!context.join("installed-on-host").exists());
        assert!(fx.catalog.list().expect("list").is_empty());
    }

    #[cfg(unix)]
    #[test]
    fn build_image_registers_config() {
        let fx = Fixture::new();
        let context = fx.context(&[("requirements.txt", ""), ("main.py", "print('hi')")]);
        std::fs::write(
            context.join("Dockerfile"),
            format!(
                "FROM {}\nWORKDIR /app\nCOPY requirements.txt .\nRUN true\nCOPY . .\n\
                 ENV PYTHONUNBUFFERED=1\nUSER 1000\nCMD [\"python\", \"main.py\"]\n",
                fx.base_uri()
            ),
        )
        .expect("write");
        let options = BuildOptions {
            descriptor: context.join("Dockerfile"),
            context_dir: context,
            tag: "app".into(),
            isolation: Isolation::Host,
            allow_host_install: true,
            default_identity: RuntimeIdentity::default(),
            installer: InstallerKind::Descriptor,
        };

        let output = build_image(&options, &fx.storage, &fx.catalog).expect("build");
        let config: &ImageConfig = &output.image.config;
        assert_eq!(output.image.reference, "app:latest");
        assert_eq!(config.identity, Some(RuntimeIdentity { uid: 1000, gid: 1000 }));
        assert_eq!(
            config.entry.as_ref().map(|e| e.argv().to_vec()),
            Some(vec!["python".to_string(), "main.py".to_string()])
        );
        assert_eq!(config.env_value("PYTHONUNBUFFERED"), Some("1"));
        assert_eq!(fx.catalog.find("app").expect("registered").id, output.image.id);
    }
}
