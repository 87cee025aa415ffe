//! Global configuration model for bootstack.
//!
//! Values come from `<data_dir>/config.json` when present; the CLI layers
//! its flags and `BOOTSTACK_*` environment variables on top.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::{BootstackError, Result};
use crate::types::RuntimeIdentity;

/// How the entry process and build commands are isolated from the host.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum IsolationMode {
    /// Chroot when running as root, host otherwise.
    #[default]
    Auto,
    /// Chroot into the rootfs and switch to the runtime identity.
    Chroot,
    /// Run on the host with the rootfs as working directory.
    Host,
}

impl std::str::FromStr for IsolationMode {
    type Err = BootstackError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "auto" => Ok(Self::Auto),
            "chroot" => Ok(Self::Chroot),
            "host" => Ok(Self::Host),
            other => Err(BootstackError::Config {
                message: format!("unknown isolation mode: {other}"),
            }),
        }
    }
}

/// Root configuration for bootstack.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BootstackConfig {
    /// Base directory for layers, images, containers, and logs.
    pub data_dir: PathBuf,
    /// Identity recorded in images whose descriptor has no `USER`.
    pub default_identity: RuntimeIdentity,
    /// Isolation used for build commands and container processes.
    pub isolation: IsolationMode,
}

impl Default for BootstackConfig {
    fn default() -> Self {
        Self {
            data_dir: crate::constants::data_dir().clone(),
            default_identity: RuntimeIdentity::default(),
            isolation: IsolationMode::Auto,
        }
    }
}

impl BootstackConfig {
    /// Loads `config.json` from `data_dir`, falling back to defaults when
    /// the file is absent. `data_dir` always wins over the file's value.
    ///
    /// # Errors
    ///
    /// Returns an error if the file exists but cannot be read or parsed.
    pub fn load(data_dir: &Path) -> Result<Self> {
        let path = data_dir.join(crate::constants::CONFIG_FILE);
        let mut config = if path.exists() {
            let content =
                std::fs::read_to_string(&path).map_err(|e| BootstackError::io(&path, e))?;
            tracing::debug!(path = %path.display(), "loaded configuration file");
            serde_json::from_str::<Self>(&content)?
        } else {
            Self::default()
        };
        config.data_dir = data_dir.to_path_buf();
        Ok(config)
    }

    /// Directory holding per-container root filesystems.
    #[must_use]
    pub fn containers_dir(&self) -> PathBuf {
        self.data_dir.join("containers")
    }

    /// Path of the container state index.
    #[must_use]
    pub fn state_file(&self) -> PathBuf {
        self.data_dir.join("state.json")
    }
}
