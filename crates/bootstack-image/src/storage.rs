//! Local storage backend for layers.
//!
//! Layers live under `<root>/layers/<hex>.tar.gz`, named by the digest of
//! their compressed bytes. Committing an archive that is already present is
//! a no-op, so identical build steps share one file.

use std::path::{Path, PathBuf};

use bootstack_common::constants::MAX_IMAGE_LAYERS;
use bootstack_common::error::{BootstackError, Result};

use crate::layer::{self, LayerRef};

/// Manages local storage of layers.
#[derive(Debug, Clone)]
pub struct StorageBackend {
    /// Root directory for all stored data.
    root: PathBuf,
}

impl StorageBackend {
    /// Opens or initializes the storage backend at the given root.
    ///
    /// # Errors
    ///
    /// Returns an error if the layer or scratch directory cannot be created.
    pub fn open(root: impl Into<PathBuf>) -> Result<Self> {
        let root = root.into();
        tracing::info!(path = %root.display(), "opening storage backend");
        for dir in [root.join("layers"), root.join("tmp")] {
            std::fs::create_dir_all(&dir).map_err(|e| BootstackError::io(&dir, e))?;
        }
        Ok(Self { root })
    }

    /// Returns the path to a layer archive given its digest hex.
    #[must_use]
    pub fn layer_path(&self, hex: &str) -> PathBuf {
        self.root.join("layers").join(format!("{hex}.tar.gz"))
    }

    /// Checks whether a layer exists in the local store.
    #[must_use]
    pub fn has_layer(&self, hex: &str) -> bool {
        self.layer_path(hex).exists()
    }

    /// Returns the root storage path.
    #[must_use]
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Creates a scratch directory under the store, removed on drop.
    ///
    /// Scratch space lives next to the layers so renames stay on one
    /// filesystem.
    ///
    /// # Errors
    ///
    /// Returns an error if the directory cannot be created.
    pub fn scratch_dir(&self, prefix: &str) -> Result<ScratchDir> {
        let path = self
            .root
            .join("tmp")
            .join(format!("{prefix}-{}", uuid::Uuid::new_v4().simple()));
        std::fs::create_dir_all(&path).map_err(|e| BootstackError::io(&path, e))?;
        Ok(ScratchDir { path })
    }

    /// Moves a finished gzip archive into the content-addressed store.
    ///
    /// # Errors
    ///
    /// Returns an error if the archive cannot be hashed or moved.
    pub fn commit_archive(&self, archive: &Path, created_by: &str) -> Result<LayerRef> {
        let digest = crate::hash::hash_file(archive)?;
        let dest = self.layer_path(digest.as_hex());
        if dest.exists() {
            std::fs::remove_file(archive).map_err(|e| BootstackError::io(archive, e))?;
        } else {
            std::fs::rename(archive, &dest).map_err(|e| BootstackError::io(&dest, e))?;
        }
        let size_bytes = std::fs::metadata(&dest)
            .map_err(|e| BootstackError::io(&dest, e))?
            .len();
        tracing::info!(digest = %digest, size = size_bytes, created_by, "layer committed");
        Ok(LayerRef {
            digest,
            size_bytes,
            created_by: created_by.to_string(),
        })
    }

    /// Packs `paths` under `root` into a new layer and commits it.
    ///
    /// # Errors
    ///
    /// Returns an error if packing or committing fails.
    pub fn commit_paths(&self, root: &Path, paths: &[PathBuf], created_by: &str) -> Result<LayerRef> {
        let scratch = self.scratch_dir("layer")?;
        let archive = scratch.path().join("layer.tar.gz");
        layer::write_archive(root, paths, &archive)?;
        self.commit_archive(&archive, created_by)
    }

    /// Packs an entire directory tree as one layer.
    ///
    /// # Errors
    ///
    /// Returns an error if the tree cannot be listed or packed.
    pub fn import_dir(&self, dir: &Path, created_by: &str) -> Result<LayerRef> {
        let paths = layer::list_tree(dir)?;
        self.commit_paths(dir, &paths, created_by)
    }

    /// Imports an existing tar archive (plain or gzip) as one layer.
    ///
    /// Plain archives are recompressed so every stored layer is gzip.
    ///
    /// # Errors
    ///
    /// Returns an error if the archive cannot be read or stored.
    pub fn import_archive(&self, archive: &Path, created_by: &str) -> Result<LayerRef> {
        let scratch = self.scratch_dir("import")?;
        let staged = scratch.path().join("layer.tar.gz");
        if layer::is_gzip_archive(archive)? {
            let _ = std::fs::copy(archive, &staged).map_err(|e| BootstackError::io(&staged, e))?;
        } else {
            let mut input =
                std::fs::File::open(archive).map_err(|e| BootstackError::io(archive, e))?;
            let output =
                std::fs::File::create(&staged).map_err(|e| BootstackError::io(&staged, e))?;
            let mut encoder = flate2::write::GzEncoder::new(output, flate2::Compression::default());
            let _ = std::io::copy(&mut input, &mut encoder)
                .map_err(|e| BootstackError::io(&staged, e))?;
            let _ = encoder.finish().map_err(|e| BootstackError::io(&staged, e))?;
        }
        self.commit_archive(&staged, created_by)
    }

    /// Extracts `layers` bottom to top into `target`; upper layers shadow
    /// lower ones at overlapping paths.
    ///
    /// # Errors
    ///
    /// Returns `NotFound` if a layer is missing from the store, or an error
    /// if the stack is too deep or extraction fails.
    pub fn materialize(&self, layers: &[LayerRef], target: &Path) -> Result<()> {
        if layers.len() > MAX_IMAGE_LAYERS {
            return Err(BootstackError::Config {
                message: format!(
                    "image has {} layers, limit is {MAX_IMAGE_LAYERS}",
                    layers.len()
                ),
            });
        }
        std::fs::create_dir_all(target).map_err(|e| BootstackError::io(target, e))?;
        for layer in layers {
            let path = self.layer_path(layer.digest.as_hex());
            if !path.exists() {
                return Err(BootstackError::NotFound {
                    kind: "layer",
                    id: layer.digest.to_string(),
                });
            }
            let _ = layer::extract_layer(&path, target)?;
        }
        tracing::debug!(count = layers.len(), target = %target.display(), "layer stack materialized");
        Ok(())
    }
}

/// Scratch directory deleted when dropped.
#[derive(Debug)]
pub struct ScratchDir {
    path: PathBuf,
}

impl ScratchDir {
    /// Path of the scratch directory.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for ScratchDir {
    fn drop(&mut self) {
        if let Err(e) = std::fs::remove_dir_all(&self.path) {
            tracing::debug!(path = %self.path.display(), error = %e, "scratch cleanup failed");
        }
    }
}
