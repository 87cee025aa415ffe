//! Filesystem layer management.
//!
//! Each image is composed of ordered layers. Layers are content-addressed
//! by the SHA-256 of their gzip tar archive. Archives written here are
//! deterministic: entries are sorted and timestamps and ownership are
//! zeroed, so the same tree always yields the same digest.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use bootstack_common::error::{BootstackError, Result};
use bootstack_common::types::Sha256Hash;
use serde::{Deserialize, Serialize};

/// A single filesystem layer in an image stack.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LayerRef {
    /// Digest of the compressed archive.
    pub digest: Sha256Hash,
    /// Size of the compressed archive in bytes.
    pub size_bytes: u64,
    /// Build step that produced the layer.
    pub created_by: String,
}

/// Extracts a tar archive to the target directory.
///
/// Supports both plain `.tar` and gzip-compressed archives; gzip is
/// detected from the magic bytes. Entries overwrite existing paths, so
/// extracting layers in order shadows lower layers with upper ones.
///
/// # Errors
///
/// Returns an error if the archive cannot be opened or unpacked.
pub fn extract_layer(archive_path: &Path, target: &Path) -> Result<u64> {
    tracing::info!(
        archive = %archive_path.display(),
        target = %target.display(),
        "extracting layer"
    );

    std::fs::create_dir_all(target).map_err(|e| BootstackError::io(target, e))?;

    let file = std::fs::File::open(archive_path).map_err(|e| BootstackError::io(archive_path, e))?;
    let size_bytes = file
        .metadata()
        .map_err(|e| BootstackError::io(archive_path, e))?
        .len();

    if is_gzip_archive(archive_path)? {
        unpack(tar::Archive::new(flate2::read::GzDecoder::new(file)), target)?;
    } else {
        unpack(tar::Archive::new(file), target)?;
    }

    Ok(size_bytes)
}

fn unpack<R: std::io::Read>(mut archive: tar::Archive<R>, target: &Path) -> Result<()> {
    archive.set_preserve_permissions(true);
    archive.set_preserve_mtime(true);
    archive.set_overwrite(true);
    archive.unpack(target).map_err(|e| BootstackError::io(target, e))
}

/// Determines whether an archive is gzip-compressed from its magic bytes.
///
/// # Errors
///
/// Returns an error if the file cannot be read.
pub fn is_gzip_archive(path: &Path) -> Result<bool> {
    use std::io::Read;

    let mut magic = [0u8; 2];
    let mut file = std::fs::File::open(path).map_err(|e| BootstackError::io(path, e))?;
    let n = file.read(&mut magic).map_err(|e| BootstackError::io(path, e))?;
    Ok(n == 2 && magic == [0x1f, 0x8b])
}

/// Metadata for a single path in a snapshot.
#[derive(Debug, Clone, PartialEq, Eq)]
struct FileEntry {
    size: u64,
    mtime_nanos: u128,
    mode: u32,
    is_dir: bool,
}

/// A snapshot of a directory's file state, used to compute a stage's diff.
#[derive(Debug, Clone, Default)]
pub struct DirSnapshot {
    entries: HashMap<PathBuf, FileEntry>,
}

impl DirSnapshot {
    /// Records every path under `root` with its size, mtime, and mode.
    ///
    /// # Errors
    ///
    /// Returns an error if any directory cannot be listed.
    pub fn capture(root: &Path) -> Result<Self> {
        let mut entries = HashMap::new();
        if root.exists() {
            walk_dir(root, root, &mut entries)?;
        }
        Ok(Self { entries })
    }

    /// Paths added or modified between `self` (before) and `after`, sorted.
    ///
    /// Deletions are not represented.
    #[must_use]
    pub fn diff(&self, after: &Self) -> Vec<PathBuf> {
        let mut changed: Vec<PathBuf> = after
            .entries
            .iter()
            .filter(|(path, entry)| match self.entries.get(*path) {
                None => true,
                Some(before) if entry.is_dir => before.mode != entry.mode || !before.is_dir,
                Some(before) => before != *entry,
            })
            .map(|(path, _)| path.clone())
            .collect();
        changed.sort();
        changed
    }

    /// Number of recorded paths.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the snapshot recorded nothing.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

fn walk_dir(root: &Path, current: &Path, entries: &mut HashMap<PathBuf, FileEntry>) -> Result<()> {
    let read_dir = std::fs::read_dir(current).map_err(|e| BootstackError::io(current, e))?;
    for entry in read_dir {
        let entry = entry.map_err(|e| BootstackError::io(current, e))?;
        let path = entry.path();
        let meta = std::fs::symlink_metadata(&path).map_err(|e| BootstackError::io(&path, e))?;
        let relative = path.strip_prefix(root).unwrap_or(&path).to_path_buf();
        let mtime_nanos = meta
            .modified()
            .ok()
            .and_then(|t| t.duration_since(std::time::UNIX_EPOCH).ok())
            .map_or(0, |d| d.as_nanos());

        let _ = entries.insert(
            relative,
            FileEntry {
                size: meta.len(),
                mtime_nanos,
                mode: file_mode(&meta),
                is_dir: meta.is_dir(),
            },
        );

        if meta.is_dir() {
            walk_dir(root, &path, entries)?;
        }
    }
    Ok(())
}

#[cfg(unix)]
fn file_mode(meta: &std::fs::Metadata) -> u32 {
    use std::os::unix::fs::MetadataExt;
    meta.mode() & 0o7777
}

#[cfg(not(unix))]
fn file_mode(meta: &std::fs::Metadata) -> u32 {
    if meta.is_dir() {
        0o755
    } else if meta.permissions().readonly() {
        0o444
    } else {
        0o644
    }
}

/// Writes a deterministic gzip tar of `paths` (relative to `root`).
///
/// Paths are sorted; directories, regular files, and symlinks are stored
/// with their permission bits, owner `0:0`, and mtime `0`.
///
/// # Errors
///
/// Returns an error if a path cannot be read or the archive cannot be written.
pub fn write_archive(root: &Path, paths: &[PathBuf], output: &Path) -> Result<()> {
    let mut sorted = paths.to_vec();
    sorted.sort();
    sorted.dedup();

    let file = std::fs::File::create(output).map_err(|e| BootstackError::io(output, e))?;
    let encoder = flate2::write::GzEncoder::new(file, flate2::Compression::default());
    let mut builder = tar::Builder::new(encoder);

    for relative in &sorted {
        append_entry(&mut builder, root, relative)?;
    }

    let encoder = builder.into_inner().map_err(|e| BootstackError::io(output, e))?;
    let _ = encoder.finish().map_err(|e| BootstackError::io(output, e))?;
    Ok(())
}

fn append_entry<W: std::io::Write>(
    builder: &mut tar::Builder<W>,
    root: &Path,
    relative: &Path,
) -> Result<()> {
    let full = root.join(relative);
    let meta = std::fs::symlink_metadata(&full).map_err(|e| BootstackError::io(&full, e))?;

    let mut header = tar::Header::new_gnu();
    header.set_mode(file_mode(&meta));
    header.set_uid(0);
    header.set_gid(0);
    header.set_mtime(0);

    let io_err = |e: std::io::Error| BootstackError::io(&full, e);
    if meta.file_type().is_symlink() {
        let target = std::fs::read_link(&full).map_err(io_err)?;
        header.set_entry_type(tar::EntryType::Symlink);
        header.set_size(0);
        builder.append_link(&mut header, relative, target).map_err(io_err)
    } else if meta.is_dir() {
        header.set_entry_type(tar::EntryType::Directory);
        header.set_size(0);
        builder
            .append_data(&mut header, relative, std::io::empty())
            .map_err(io_err)
    } else {
        let file = std::fs::File::open(&full).map_err(io_err)?;
        header.set_entry_type(tar::EntryType::Regular);
        header.set_size(meta.len());
        builder.append_data(&mut header, relative, file).map_err(io_err)
    }
}

/// Lists every path under `root` (relative), for packing a whole tree.
///
/// # Errors
///
/// Returns an error if any directory cannot be listed.
pub fn list_tree(root: &Path) -> Result<Vec<PathBuf>> {
    let snapshot = DirSnapshot::capture(root)?;
    let mut paths: Vec<PathBuf> = snapshot.entries.into_keys().collect();
    paths.sort();
    Ok(paths)
}
