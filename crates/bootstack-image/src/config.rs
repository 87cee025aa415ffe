//! Runtime configuration attached to an image.
//!
//! Everything a container needs at start that is not file content: the
//! environment, working directory, identity, and entry command. Once the
//! image is registered this is never mutated.

use std::collections::BTreeMap;

use bootstack_common::constants::{DEFAULT_PATH_ENV, DEFAULT_WORKDIR};
use bootstack_common::types::{EntryCommand, RuntimeIdentity};
use serde::{Deserialize, Serialize};

/// Image configuration consumed by the container runtime.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImageConfig {
    /// Environment in declaration order; later keys replace earlier ones in place.
    pub env: Vec<(String, String)>,
    /// Absolute working directory of the entry process.
    pub workdir: String,
    /// Identity the entry process runs as; `None` means root.
    pub identity: Option<RuntimeIdentity>,
    /// Foreground command started with the container.
    pub entry: Option<EntryCommand>,
    /// Free-form labels.
    #[serde(default)]
    pub labels: BTreeMap<String, String>,
    /// Ports the descriptor documented. Nothing is published.
    #[serde(default)]
    pub exposed_ports: Vec<String>,
}

impl Default for ImageConfig {
    fn default() -> Self {
        Self {
            env: Vec::new(),
            workdir: DEFAULT_WORKDIR.to_string(),
            identity: None,
            entry: None,
            labels: BTreeMap::new(),
            exposed_ports: Vec::new(),
        }
    }
}

impl ImageConfig {
    /// Configuration given to imported base images: just a `PATH`.
    #[must_use]
    pub fn base() -> Self {
        let mut config = Self::default();
        config.set_env("PATH", DEFAULT_PATH_ENV);
        config
    }

    /// Sets `key`, replacing an existing value without moving it.
    pub fn set_env(&mut self, key: impl Into<String>, value: impl Into<String>) {
        let key = key.into();
        let value = value.into();
        if let Some(slot) = self.env.iter_mut().find(|(k, _)| *k == key) {
            slot.1 = value;
        } else {
            self.env.push((key, value));
        }
    }

    /// Looks up an environment variable.
    #[must_use]
    pub fn env_value(&self, key: &str) -> Option<&str> {
        self.env
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }

    /// Resolves `path` against the working directory, Docker style.
    #[must_use]
    pub fn resolve_path(&self, path: &str) -> String {
        if path.starts_with('/') {
            path.to_string()
        } else if self.workdir.ends_with('/') {
            format!("{}{path}", self.workdir)
        } else {
            format!("{}/{path}", self.workdir)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn set_env_replaces_in_place() {
        let mut config = ImageConfig::base();
        config.set_env("PYTHONUNBUFFERED", "1");
        config.set_env("PATH", "/opt/bin");
        assert_eq!(config.env[0], ("PATH".into(), "/opt/bin".into()));
        assert_eq!(config.env_value("PYTHONUNBUFFERED"), Some("1"));
        assert_eq!(config.env.len(), 2);
    }

    #[test]
    fn resolve_path_joins_relative_paths() {
        let config = ImageConfig {
            workdir: "/app".into(),
            ..ImageConfig::default()
        };
        assert_eq!(config.resolve_path("requirements.txt"), "/app/requirements.txt");
        assert_eq!(config.resolve_path("."), "/app/.");
        assert_eq!(config.resolve_path("/opt"), "/opt");
    }

    #[test]
    fn default_workdir_is_root() {
        let config = ImageConfig::default();
        assert_eq!(config.resolve_path("main.py"), "/main.py");
        assert!(config.identity.is_none());
    }
}
