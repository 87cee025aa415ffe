//! `bstk import`: register a base image from a directory or archive.

use std::path::Path;

use anyhow::Context;
use bootstack_image::config::ImageConfig;
use bootstack_image::layer::LayerRef;
use bootstack_image::reference::ImageReference;
use bootstack_image::registry::ImageEntry;
use bootstack_image::source::{self, ImageSource};
use bootstack_image::storage::StorageBackend;
use clap::Args;

use super::Session;

/// Arguments for the `import` command.
#[derive(Args, Debug)]
pub struct ImportArgs {
    /// Root filesystem: a directory, a tar archive, or a source URI.
    pub source: String,

    /// Reference to register the image under (`name[:tag]`).
    #[arg(short, long)]
    pub tag: String,

    /// Environment recorded in the image config (`KEY=VALUE`).
    #[arg(long, value_parser = parse_env)]
    pub env: Vec<(String, String)>,

    /// Working directory recorded in the image config.
    #[arg(long)]
    pub workdir: Option<String>,
}

fn parse_env(input: &str) -> Result<(String, String), String> {
    match input.split_once('=') {
        Some((key, value)) if !key.is_empty() => Ok((key.to_string(), value.to_string())),
        _ => Err(format!("expected KEY=VALUE, got {input:?}")),
    }
}

/// Executes the `import` command.
///
/// # Errors
///
/// Returns an error if the source cannot be read, fetched, or stored.
pub fn execute(session: &Session, args: ImportArgs) -> anyhow::Result<()> {
    let reference = ImageReference::parse(&args.tag)?;
    let storage = session.storage()?;
    let created_by = format!("import {}", args.source);

    let source = if source::is_source_uri(&args.source) {
        source::resolve_source(&args.source)?
    } else {
        local_source(Path::new(&args.source))?
    };
    let layer = import_layer(&storage, source, &created_by)?;

    let mut config = ImageConfig::base();
    for (key, value) in args.env {
        config.set_env(key, value);
    }
    if let Some(workdir) = args.workdir {
        config.workdir = config.resolve_path(&workdir);
    }

    let entry = ImageEntry::new(reference.key(), Some(args.source), vec![layer], config)?;
    session.catalog()?.register(entry.clone())?;
    tracing::info!(reference = %entry.reference, id = %entry.id.short(), "base image imported");
    println!("Imported {} ({})", entry.reference, entry.id.short());
    Ok(())
}

fn local_source(path: &Path) -> anyhow::Result<ImageSource> {
    let meta = std::fs::metadata(path)
        .with_context(|| format!("cannot read import source {}", path.display()))?;
    Ok(if meta.is_dir() {
        ImageSource::File(path.to_path_buf())
    } else {
        ImageSource::Tar(path.to_path_buf())
    })
}

fn import_layer(
    storage: &StorageBackend,
    source: ImageSource,
    created_by: &str,
) -> anyhow::Result<LayerRef> {
    let layer = match source {
        ImageSource::File(dir) => storage.import_dir(&dir, created_by)?,
        ImageSource::Tar(archive) => storage.import_archive(&archive, created_by)?,
        ImageSource::Remote { url, sha256 } => {
            let scratch = storage.scratch_dir("fetch")?;
            let archive = source::fetch_remote(&url, &sha256, scratch.path())?;
            storage.import_archive(&archive, created_by)?
        }
    };
    Ok(layer)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn env_pairs_split_on_first_equals() {
        assert_eq!(
            parse_env("OPTS=a=b").expect("parse"),
            ("OPTS".to_string(), "a=b".to_string())
        );
        assert!(parse_env("NOVALUE").is_err());
        assert!(parse_env("=x").is_err());
    }

    #[test]
    fn directory_is_imported_as_single_layer() {
        let dir = tempfile::tempdir().expect("tempdir");
        let rootfs = dir.path().join("rootfs");
        std::fs::create_dir_all(rootfs.join("usr/bin")).expect("mkdir");
        std::fs::write(rootfs.join("usr/bin/python3"), "bin").expect("write");
        let storage = StorageBackend::open(dir.path().join("store")).expect("storage");

        let source = local_source(&rootfs).expect("source");
        assert!(matches!(source, ImageSource::File(_)));
        let layer = import_layer(&storage, source, "import test").expect("import");
        assert!(storage.has_layer(layer.digest.as_hex()));
    }

    #[test]
    fn missing_local_source_is_an_error() {
        let dir = tempfile::tempdir().expect("tempdir");
        assert!(local_source(&dir.path().join("absent.tar")).is_err());
    }
}
