//! Recursive copies into a rootfs.
//!
//! A copy behaves like stacking a layer: existing paths at the destination
//! are overwritten, nothing at the destination is removed, and no source
//! entry is filtered out.

use std::path::Path;

use bootstack_common::error::{BootstackError, Result};

/// Copies `src` (file, directory, or symlink) to `dst`.
///
/// Directories are merged into `dst`; files and symlinks replace whatever
/// is at their destination. Returns the number of non-directory entries
/// written.
///
/// # Errors
///
/// Returns an error if `src` cannot be read or any destination write fails.
pub fn copy_path(src: &Path, dst: &Path) -> Result<u64> {
    let meta = std::fs::symlink_metadata(src).map_err(|e| BootstackError::io(src, e))?;
    if meta.is_dir() {
        copy_dir(src, dst)
    } else {
        if let Some(parent) = dst.parent() {
            std::fs::create_dir_all(parent).map_err(|e| BootstackError::io(parent, e))?;
        }
        copy_entry(src, dst, &meta)?;
        Ok(1)
    }
}

fn copy_dir(src: &Path, dst: &Path) -> Result<u64> {
    clear_non_dir(dst)?;
    std::fs::create_dir_all(dst).map_err(|e| BootstackError::io(dst, e))?;

    let mut written = 0;
    let read_dir = std::fs::read_dir(src).map_err(|e| BootstackError::io(src, e))?;
    for entry in read_dir {
        let entry = entry.map_err(|e| BootstackError::io(src, e))?;
        let from = entry.path();
        let to = dst.join(entry.file_name());
        let meta = std::fs::symlink_metadata(&from).map_err(|e| BootstackError::io(&from, e))?;
        if meta.is_dir() {
            written += copy_dir(&from, &to)?;
        } else {
            copy_entry(&from, &to, &meta)?;
            written += 1;
        }
    }
    Ok(written)
}

fn copy_entry(from: &Path, to: &Path, meta: &std::fs::Metadata) -> Result<()> {
    remove_existing(to)?;
    if meta.file_type().is_symlink() {
        copy_symlink(from, to)
    } else {
        let _ = std::fs::copy(from, to).map_err(|e| BootstackError::io(to, e))?;
        Ok(())
    }
}

#[cfg(unix)]
fn copy_symlink(from: &Path, to: &Path) -> Result<()> {
    let target = std::fs::read_link(from).map_err(|e| BootstackError::io(from, e))?;
    std::os::unix::fs::symlink(&target, to).map_err(|e| BootstackError::io(to, e))
}

#[cfg(not(unix))]
fn copy_symlink(from: &Path, to: &Path) -> Result<()> {
    let _ = std::fs::copy(from, to).map_err(|e| BootstackError::io(to, e))?;
    Ok(())
}

/// Removes a file or symlink at `path` so it can be replaced. A directory
/// in the way of a file is removed recursively.
fn remove_existing(path: &Path) -> Result<()> {
    match std::fs::symlink_metadata(path) {
        Ok(meta) if meta.is_dir() => {
            std::fs::remove_dir_all(path).map_err(|e| BootstackError::io(path, e))
        }
        Ok(_) => std::fs::remove_file(path).map_err(|e| BootstackError::io(path, e)),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
        Err(e) => Err(BootstackError::io(path, e)),
    }
}

/// A file or symlink where a directory must go is removed.
fn clear_non_dir(path: &Path) -> Result<()> {
    match std::fs::symlink_metadata(path) {
        Ok(meta) if !meta.is_dir() => {
            std::fs::remove_file(path).map_err(|e| BootstackError::io(path, e))
        }
        Ok(_) => Ok(()),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
        Err(e) => Err(BootstackError::io(path, e)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn copy_tree_merges_and_overwrites() {
        let dir = tempfile::tempdir().expect("tempdir");
        let src = dir.path().join("ctx");
        let dst = dir.path().join("rootfs/app");
        std::fs::create_dir_all(src.join("pkg")).expect("mkdir");
        std::fs::write(src.join("main.py"), "print('new')").expect("write");
        std::fs::write(src.join("pkg/mod.py"), "x = 1").expect("write");
        std::fs::create_dir_all(&dst).expect("mkdir");
        std::fs::write(dst.join("main.py"), "print('old')").expect("write");
        std::fs::write(dst.join("keep.txt"), "kept").expect("write");

        let written = copy_path(&src, &dst).expect("copy");

        assert_eq!(written, 2);
        assert_eq!(
            std::fs::read_to_string(dst.join("main.py")).expect("read"),
            "print('new')"
        );
        assert!(dst.join("pkg/mod.py").exists());
        assert!(dst.join("keep.txt").exists(), "copy must not delete");
    }

    #[test]
    fn copy_single_file_creates_parents() {
        let dir = tempfile::tempdir().expect("tempdir");
        let src = dir.path().join("requirements.txt");
        std::fs::write(&src, "requests==2.31.0\n").expect("write");
        let dst = dir.path().join("rootfs/app/requirements.txt");

        assert_eq!(copy_path(&src, &dst).expect("copy"), 1);
        assert!(dst.exists());
    }

    #[test]
    fn copy_hidden_files_are_included() {
        let dir = tempfile::tempdir().expect("tempdir");
        let src = dir.path().join("ctx");
        std::fs::create_dir_all(&src).expect("mkdir");
        std::fs::write(src.join(".env"), "TOKEN=x").expect("write");
        let dst = dir.path().join("out");

        let _ = copy_path(&src, &dst).expect("copy");
        assert!(dst.join(".env").exists());
    }

    #[cfg(unix)]
    #[test]
    fn copy_preserves_symlinks() {
        let dir = tempfile::tempdir().expect("tempdir");
        let src = dir.path().join("ctx");
        std::fs::create_dir_all(&src).expect("mkdir");
        std::os::unix::fs::symlink("main.py", src.join("app.py")).expect("symlink");
        let dst = dir.path().join("out");

        let _ = copy_path(&src, &dst).expect("copy");
        let target = std::fs::read_link(dst.join("app.py")).expect("readlink");
        assert_eq!(target, Path::new("main.py"));
    }

    #[test]
    fn copy_missing_source_fails() {
        let dir = tempfile::tempdir().expect("tempdir");
        assert!(copy_path(&dir.path().join("nope"), &dir.path().join("out")).is_err());
    }
}
