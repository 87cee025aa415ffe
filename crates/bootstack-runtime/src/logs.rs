//! Container log management.
//!
//! Each container gets `<data_dir>/logs/<id>.log`. Detached containers
//! write their stdout and stderr there; the runtime appends its own notes
//! (launch failures) to the same file.

use std::fs::File;
use std::io::Write;
use std::path::{Path, PathBuf};

use bootstack_common::error::{BootstackError, Result};

/// Returns the log file path for a container.
#[must_use]
pub fn log_path(data_dir: &Path, container_id: &str) -> PathBuf {
    data_dir.join("logs").join(format!("{container_id}.log"))
}

fn open_append(path: &Path) -> Result<File> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).map_err(|e| BootstackError::io(parent, e))?;
    }
    std::fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .map_err(|e| BootstackError::io(path, e))
}

/// Opens a log file for the entry process's output, creating it if needed.
///
/// # Errors
///
/// Returns an error if the directory or file cannot be created.
pub fn open_log(path: &Path) -> Result<File> {
    open_append(path)
}

/// Reads a log file. Returns an empty string if it does not exist yet.
///
/// # Errors
///
/// Returns an error if the file exists but cannot be read.
pub fn read_logs(path: &Path) -> Result<String> {
    if !path.exists() {
        return Ok(String::new());
    }
    std::fs::read_to_string(path).map_err(|e| BootstackError::io(path, e))
}

/// Appends a runtime note to a log file.
///
/// # Errors
///
/// Returns an error if the directory or file cannot be created or written.
pub fn append_log(path: &Path, line: &str) -> Result<()> {
    let mut file = open_append(path)?;
    writeln!(file, "[{}] {line}", bootstack_common::constants::APP_NAME)
        .map_err(|e| BootstackError::io(path, e))
}
