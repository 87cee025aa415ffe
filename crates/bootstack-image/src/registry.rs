//! Local image catalog management.
//!
//! Maintains an index of registered images keyed by their `name:tag`
//! reference, with the ordered layer stack and runtime configuration of
//! each.

use std::path::{Path, PathBuf};

use bootstack_common::error::{BootstackError, Result};
use bootstack_common::types::ImageId;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::config::ImageConfig;
use crate::layer::LayerRef;

/// Entry in the local image catalog.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImageEntry {
    /// Content identifier; see [`compute_image_id`].
    pub id: ImageId,
    /// Catalog key (`name:tag`).
    pub reference: String,
    /// What the bottom layer came from: a base reference or a source URI.
    pub base: Option<String>,
    /// Ordered layers, bottom to top.
    pub layers: Vec<LayerRef>,
    /// Runtime configuration.
    pub config: ImageConfig,
    /// Sum of the compressed layer sizes.
    pub size_bytes: u64,
    /// Creation timestamp (RFC 3339).
    pub created_at: String,
}

impl ImageEntry {
    /// Assembles an entry, deriving its id and total size.
    ///
    /// # Errors
    ///
    /// Returns an error if the configuration cannot be serialized.
    pub fn new(
        reference: impl Into<String>,
        base: Option<String>,
        layers: Vec<LayerRef>,
        config: ImageConfig,
    ) -> Result<Self> {
        let id = compute_image_id(&config, &layers)?;
        let size_bytes = layers.iter().map(|l| l.size_bytes).sum();
        Ok(Self {
            id,
            reference: reference.into(),
            base,
            layers,
            config,
            size_bytes,
            created_at: chrono::Utc::now().to_rfc3339(),
        })
    }
}

/// Derives an image id from its configuration and layer digests.
///
/// The creation time is not part of the input, so rebuilding the same
/// content yields the same id.
///
/// # Errors
///
/// Returns an error if the configuration cannot be serialized.
pub fn compute_image_id(config: &ImageConfig, layers: &[LayerRef]) -> Result<ImageId> {
    let mut hasher = Sha256::new();
    hasher.update(serde_json::to_vec(config)?);
    for layer in layers {
        hasher.update(b"\n");
        hasher.update(layer.digest.as_hex().as_bytes());
    }
    let digest = hasher.finalize();
    let hex: String = digest.iter().map(|b| format!("{b:02x}")).collect();
    Ok(ImageId::new(hex))
}

/// Image catalog backed by a JSON file.
#[derive(Debug)]
pub struct ImageCatalog {
    catalog_path: PathBuf,
}

impl ImageCatalog {
    /// Opens or creates an image catalog at the given directory.
    ///
    /// # Errors
    ///
    /// Returns an error if the catalog directory cannot be created.
    pub fn open(data_dir: &Path) -> Result<Self> {
        let images_dir = data_dir.join("images");
        std::fs::create_dir_all(&images_dir).map_err(|e| BootstackError::io(&images_dir, e))?;
        Ok(Self {
            catalog_path: images_dir.join("catalog.json"),
        })
    }

    /// Lists all images in the catalog.
    ///
    /// # Errors
    ///
    /// Returns an error if the catalog file cannot be read or parsed.
    pub fn list(&self) -> Result<Vec<ImageEntry>> {
        if !self.catalog_path.exists() {
            return Ok(Vec::new());
        }
        let content = std::fs::read_to_string(&self.catalog_path)
            .map_err(|e| BootstackError::io(&self.catalog_path, e))?;
        Ok(serde_json::from_str(&content)?)
    }

    /// Registers an image, replacing any entry with the same reference.
    ///
    /// # Errors
    ///
    /// Returns an error if the catalog cannot be read or written.
    pub fn register(&self, entry: ImageEntry) -> Result<()> {
        let mut entries = self.list()?;
        if let Some(previous) = entries.iter().find(|e| e.reference == entry.reference) {
            tracing::info!(reference = %entry.reference, previous = %previous.id.short(), "retagging image");
        }
        entries.retain(|e| e.reference != entry.reference);
        tracing::info!(reference = %entry.reference, id = %entry.id.short(), layers = entry.layers.len(), "image registered");
        entries.push(entry);
        self.write_entries(&entries)
    }

    /// Finds an image by reference (`name[:tag]`) or id prefix.
    ///
    /// # Errors
    ///
    /// Returns `NotFound` if nothing matches, or a catalog read error.
    pub fn find(&self, query: &str) -> Result<ImageEntry> {
        let entries = self.list()?;
        let key = reference_key(query);
        entries
            .iter()
            .find(|e| key.as_deref() == Some(e.reference.as_str()))
            .or_else(|| entries.iter().find(|e| matches_id(e, query)))
            .cloned()
            .ok_or_else(|| BootstackError::NotFound {
                kind: "image",
                id: query.to_string(),
            })
    }

    /// Removes an image by reference or id prefix.
    ///
    /// Layers are left in the store.
    ///
    /// # Errors
    ///
    /// Returns `NotFound` if no image matches.
    pub fn remove(&self, query: &str) -> Result<ImageEntry> {
        let target = self.find(query)?;
        let mut entries = self.list()?;
        entries.retain(|e| e.reference != target.reference);
        self.write_entries(&entries)?;
        tracing::info!(reference = %target.reference, "image removed");
        Ok(target)
    }

    fn write_entries(&self, entries: &[ImageEntry]) -> Result<()> {
        let json = serde_json::to_string_pretty(entries)?;
        std::fs::write(&self.catalog_path, json)
            .map_err(|e| BootstackError::io(&self.catalog_path, e))
    }
}

fn reference_key(query: &str) -> Option<String> {
    crate::reference::ImageReference::parse(query)
        .ok()
        .map(|r| r.key())
}

fn matches_id(entry: &ImageEntry, query: &str) -> bool {
    let bare = query.strip_prefix("sha256:").unwrap_or(query);
    bare.len() >= 6 && entry.id.as_str().starts_with(bare)
}
