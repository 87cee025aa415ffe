//! Source copy stage.

use crate::descriptor::recipe::CopyStep;
use crate::error::{BuildError, Result};
use crate::stage::{BuildContext, Stage};

/// Overlays build-context sources onto the image, above the installed
/// dependencies. Nothing is filtered out.
#[derive(Debug, Clone)]
pub struct SourceCopyStage {
    copies: Vec<CopyStep>,
}

impl SourceCopyStage {
    /// Creates the stage for the descriptor's source copies.
    #[must_use]
    pub const fn new(copies: Vec<CopyStep>) -> Self {
        Self { copies }
    }
}

impl Stage for SourceCopyStage {
    fn name(&self) -> &'static str {
        "sources"
    }

    fn commits_layer(&self) -> bool {
        !self.copies.is_empty()
    }

    fn describe(&self) -> String {
        let parts: Vec<String> = self
            .copies
            .iter()
            .map(|c| format!("{} -> {}", c.sources.join(" "), c.dest))
            .collect();
        format!("copy {}", parts.join(", "))
    }

    fn apply(&self, ctx: &mut BuildContext<'_>) -> Result<()> {
        for copy in &self.copies {
            let many = copy.sources.len() > 1;
            for source in &copy.sources {
                let src = ctx.context_dir.join(source);
                if std::fs::symlink_metadata(&src).is_err() {
                    return Err(BuildError::SourceMissing { path: src });
                }
                let written = super::copy_into_image(ctx, &src, &copy.dest, many)?;
                tracing::info!(source = %source, dest = %written, "sources copied");
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::path::Path;

    use bootstack_core::process::Isolation;
    use bootstack_image::registry::ImageCatalog;
    use bootstack_image::storage::StorageBackend;

    use super::*;

    fn copy(sources: &[&str], dest: &str) -> CopyStep {
        CopyStep {
            sources: sources.iter().map(ToString::to_string).collect(),
            dest: dest.into(),
        }
    }

    fn write(path: &Path, content: &str) {
        std::fs::create_dir_all(path.parent().expect("parent")).expect("mkdir");
        std::fs::write(path, content).expect("write");
    }

    #[test]
    fn copies_context_into_workdir_overwriting() {
        let dir = tempfile::tempdir().expect("tempdir");
        let storage = StorageBackend::open(dir.path().join("store")).expect("storage");
        let catalog = ImageCatalog::open(dir.path()).expect("catalog");
        let context = dir.path().join("ctx");
        write(&context.join("main.py"), "print('new')");
        write(&context.join("pkg/util.py"), "x = 1");
        let rootfs = dir.path().join("rootfs");
        write(&rootfs.join("app/main.py"), "print('old')");
        write(&rootfs.join("app/keep.txt"), "kept");

        let mut ctx = BuildContext::new(&context, &rootfs, &storage, &catalog, Isolation::Host);
        ctx.config.workdir = "/app".into();
        SourceCopyStage::new(vec![copy(&["."], ".")])
            .apply(&mut ctx)
            .expect("apply");

        let read = |p: &str| std::fs::read_to_string(rootfs.join(p)).expect("read");
        assert_eq!(read("app/main.py"), "print('new')");
        assert_eq!(read("app/pkg/util.py"), "x = 1");
        assert_eq!(read("app/keep.txt"), "kept");
    }

    #[test]
    fn single_file_to_new_path_and_into_directory() {
        let dir = tempfile::tempdir().expect("tempdir");
        let storage = StorageBackend::open(dir.path().join("store")).expect("storage");
        let catalog = ImageCatalog::open(dir.path()).expect("catalog");
        let context = dir.path().join("ctx");
        write(&context.join("main.py"), "main");
        write(&context.join("conf.ini"), "conf");
        let rootfs = dir.path().join("rootfs");

        let mut ctx = BuildContext::new(&context, &rootfs, &storage, &catalog, Isolation::Host);
        SourceCopyStage::new(vec![
            copy(&["main.py"], "/srv/entry.py"),
            copy(&["main.py", "conf.ini"], "/etc/app"),
        ])
        .apply(&mut ctx)
        .expect("apply");

        assert!(rootfs.join("srv/entry.py").is_file());
        assert!(rootfs.join("etc/app/main.py").is_file());
        assert!(rootfs.join("etc/app/conf.ini").is_file());
    }

    #[test]
    fn missing_source_is_reported() {
        let dir = tempfile::tempdir().expect("tempdir");
        let storage = StorageBackend::open(dir.path().join("store")).expect("storage");
        let catalog = ImageCatalog::open(dir.path()).expect("catalog");
        let rootfs = dir.path().join("rootfs");
        let mut ctx = BuildContext::new(dir.path(), &rootfs, &storage, &catalog, Isolation::Host);
        let err = SourceCopyStage::new(vec![copy(&["absent.py"], ".")])
            .apply(&mut ctx)
            .expect_err("missing");
        assert!(matches!(err, BuildError::SourceMissing { .. }));
    }
}
