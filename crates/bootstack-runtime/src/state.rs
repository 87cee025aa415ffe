//! Persistent state management.
//!
//! Maintains a local JSON index of all containers and their current
//! states, enabling daemon-less lifecycle management. The file is
//! rewritten whole on every transition.

use std::path::{Path, PathBuf};

use bootstack_common::constants::EXIT_STATUS_LOST;
use bootstack_common::error::{BootstackError, Result};
use bootstack_common::types::{ContainerId, ContainerState};
use bootstack_core::process::process_alive;
use serde::{Deserialize, Serialize};

/// Persistent record of a container's state.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StateEntry {
    /// Container identifier.
    pub id: ContainerId,
    /// Image reference the container was created from.
    pub image: String,
    /// Current lifecycle state.
    pub state: ContainerState,
    /// PID of the entry process while running.
    pub pid: Option<u32>,
    /// Argument vector of the entry process.
    pub argv: Vec<String>,
    /// Exit code once exited.
    pub exit_code: Option<i32>,
    /// Captured output of the entry process.
    pub log_path: PathBuf,
    /// RFC 3339 creation timestamp.
    pub created_at: String,
    /// RFC 3339 exit timestamp.
    pub finished_at: Option<String>,
}

/// Loads the state index from disk. A missing file is an empty index.
///
/// # Errors
///
/// Returns an error if the file exists but cannot be read or parsed.
pub fn load_state(path: &Path) -> Result<Vec<StateEntry>> {
    tracing::debug!(path = %path.display(), "loading state index");
    if !path.exists() {
        return Ok(Vec::new());
    }
    let content = std::fs::read_to_string(path).map_err(|e| BootstackError::io(path, e))?;
    Ok(serde_json::from_str(&content)?)
}

/// Persists the state index to disk atomically.
///
/// # Errors
///
/// Returns an error if the file cannot be written.
pub fn save_state(path: &Path, entries: &[StateEntry]) -> Result<()> {
    tracing::debug!(path = %path.display(), count = entries.len(), "saving state index");
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).map_err(|e| BootstackError::io(parent, e))?;
    }
    let tmp = path.with_extension("json.tmp");
    let json = serde_json::to_string_pretty(entries)?;
    std::fs::write(&tmp, json).map_err(|e| BootstackError::io(&tmp, e))?;
    std::fs::rename(&tmp, path).map_err(|e| BootstackError::io(path, e))
}

/// Container index stored in one JSON file.
#[derive(Debug, Clone)]
pub struct StateFile {
    path: PathBuf,
}

impl StateFile {
    /// Uses the index at `path`; nothing is read until queried.
    #[must_use]
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Path of the index file.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// All records, oldest first.
    ///
    /// # Errors
    ///
    /// Returns an error if the index cannot be read.
    pub fn list(&self) -> Result<Vec<StateEntry>> {
        load_state(&self.path)
    }

    /// Inserts a record or replaces the one with the same id.
    ///
    /// # Errors
    ///
    /// Returns an error if the index cannot be read or written.
    pub fn upsert(&self, entry: StateEntry) -> Result<()> {
        let mut entries = self.list()?;
        match entries.iter_mut().find(|e| e.id == entry.id) {
            Some(existing) => *existing = entry,
            None => entries.push(entry),
        }
        save_state(&self.path, &entries)
    }

    /// Finds a record by full id or unique id prefix.
    ///
    /// # Errors
    ///
    /// Returns `NotFound` when nothing matches and `Config` when the prefix
    /// is ambiguous.
    pub fn find(&self, query: &str) -> Result<StateEntry> {
        let mut matches: Vec<StateEntry> = self
            .list()?
            .into_iter()
            .filter(|e| e.id.as_str().starts_with(query))
            .collect();
        if let Some(exact) = matches.iter().position(|e| e.id.as_str() == query) {
            return Ok(matches.swap_remove(exact));
        }
        match matches.len() {
            0 => Err(BootstackError::NotFound {
                kind: "container",
                id: query.to_string(),
            }),
            1 => Ok(matches.swap_remove(0)),
            n => Err(BootstackError::Config {
                message: format!("container id prefix {query:?} is ambiguous ({n} matches)"),
            }),
        }
    }

    /// Marks `Running` records whose entry process no longer exists as
    /// exited with [`EXIT_STATUS_LOST`]. This happens when the process that
    /// waited on them was killed. Returns the ids that were changed.
    ///
    /// # Errors
    ///
    /// Returns an error if the index cannot be read or written.
    pub fn reconcile(&self) -> Result<Vec<ContainerId>> {
        let mut entries = self.list()?;
        let mut lost = Vec::new();
        for entry in &mut entries {
            if entry.state != ContainerState::Running || entry.pid.is_some_and(process_alive) {
                continue;
            }
            tracing::warn!(id = %entry.id.short(), pid = ?entry.pid, "running container lost its entry process");
            entry.state = ContainerState::Exited {
                code: EXIT_STATUS_LOST,
            };
            entry.exit_code = Some(EXIT_STATUS_LOST);
            entry.pid = None;
            entry.finished_at = Some(chrono::Utc::now().to_rfc3339());
            lost.push(entry.id.clone());
        }
        if !lost.is_empty() {
            save_state(&self.path, &entries)?;
        }
        Ok(lost)
    }

    /// Records that are still running according to the index.
    ///
    /// # Errors
    ///
    /// Returns an error if the index cannot be read.
    pub fn running(&self) -> Result<Vec<StateEntry>> {
        Ok(self
            .list()?
            .into_iter()
            .filter(|e| e.state == ContainerState::Running)
            .collect())
    }
}
