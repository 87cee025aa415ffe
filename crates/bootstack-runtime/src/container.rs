//! Core container struct and lifecycle transitions.

use std::path::PathBuf;

use bootstack_common::error::{BootstackError, Result};
use bootstack_common::types::{ContainerId, ContainerState, EntryCommand, ImageId};
use bootstack_image::config::ImageConfig;
use bootstack_image::registry::ImageEntry;

use crate::state::StateEntry;

/// A container instance created from an image.
#[derive(Debug, Clone)]
pub struct Container {
    /// Unique identifier.
    pub id: ContainerId,
    /// Catalog reference of the image (`name:tag`).
    pub image: String,
    /// Content id of the image.
    pub image_id: ImageId,
    /// Entry command copied from the image configuration.
    pub entry: EntryCommand,
    /// Environment, working directory, and identity of the entry process.
    pub config: ImageConfig,
    /// Current lifecycle state.
    pub state: ContainerState,
    /// PID of the entry process while running.
    pub pid: Option<u32>,
    /// Host path of the container's root filesystem.
    pub rootfs: PathBuf,
    /// Host path of the captured output.
    pub log_path: PathBuf,
    /// RFC 3339 creation timestamp.
    pub created_at: String,
    /// RFC 3339 timestamp of the exit.
    pub finished_at: Option<String>,
}

impl Container {
    /// Creates a container for `image` in the `Stopped` state.
    ///
    /// # Errors
    ///
    /// Returns an error if the image records no entry command.
    pub fn new(
        id: ContainerId,
        image: &ImageEntry,
        rootfs: PathBuf,
        log_path: PathBuf,
    ) -> Result<Self> {
        let Some(entry) = image.config.entry.clone() else {
            return Err(BootstackError::Config {
                message: format!("image {} has no entry command", image.reference),
            });
        };
        Ok(Self {
            id,
            image: image.reference.clone(),
            image_id: image.id.clone(),
            entry,
            config: image.config.clone(),
            state: ContainerState::Stopped,
            pid: None,
            rootfs,
            log_path,
            created_at: chrono::Utc::now().to_rfc3339(),
            finished_at: None,
        })
    }

    /// Records the spawned entry process, transitioning to `Running`.
    ///
    /// # Errors
    ///
    /// Returns an error unless the container is `Stopped`.
    pub fn mark_running(&mut self, pid: u32) -> Result<()> {
        if self.state != ContainerState::Stopped {
            return Err(self.invalid_transition("start"));
        }
        self.state = ContainerState::Running;
        self.pid = Some(pid);
        tracing::info!(id = %self.id.short(), pid, "container running");
        Ok(())
    }

    /// Records the exit code, transitioning to `Exited`.
    ///
    /// A container whose entry process never spawned exits straight from
    /// `Stopped`.
    ///
    /// # Errors
    ///
    /// Returns an error if the container has already exited.
    pub fn mark_exited(&mut self, code: i32) -> Result<()> {
        if self.state.is_terminal() {
            return Err(self.invalid_transition("exit"));
        }
        self.state = ContainerState::Exited { code };
        self.pid = None;
        self.finished_at = Some(chrono::Utc::now().to_rfc3339());
        tracing::info!(id = %self.id.short(), code, "container exited");
        Ok(())
    }

    /// Snapshot persisted in the state file.
    #[must_use]
    pub fn record(&self) -> StateEntry {
        StateEntry {
            id: self.id.clone(),
            image: self.image.clone(),
            state: self.state,
            pid: self.pid,
            argv: self.entry.argv().to_vec(),
            exit_code: self.state.exit_code(),
            log_path: self.log_path.clone(),
            created_at: self.created_at.clone(),
            finished_at: self.finished_at.clone(),
        }
    }

    fn invalid_transition(&self, action: &str) -> BootstackError {
        BootstackError::Config {
            message: format!("cannot {action} container {}: it is {}", self.id, self.state),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn image(entry: Option<EntryCommand>) -> ImageEntry {
        let config = ImageConfig {
            entry,
            ..ImageConfig::base()
        };
        ImageEntry::new("app:latest", None, Vec::new(), config).expect("image")
    }

    fn container() -> Container {
        let entry = EntryCommand::new(vec!["python".into(), "main.py".into()]).expect("entry");
        Container::new(
            ContainerId::new("c0ffee000000aaaa"),
            &image(Some(entry)),
            PathBuf::from("/tmp/rootfs"),
            PathBuf::from("/tmp/c.log"),
        )
        .expect("container")
    }

    #[test]
    fn new_container_is_stopped() {
        let c = container();
        assert_eq!(c.state, ContainerState::Stopped);
        assert!(c.pid.is_none());
        assert!(c.finished_at.is_none());
    }

    #[test]
    fn image_without_entry_is_rejected() {
        let err = Container::new(
            ContainerId::generate(),
            &image(None),
            PathBuf::from("/tmp/rootfs"),
            PathBuf::from("/tmp/c.log"),
        )
        .expect_err("no entry");
        assert!(err.to_string().contains("no entry command"));
    }

    #[test]
    fn full_lifecycle() {
        let mut c = container();
        c.mark_running(42).expect("start");
        assert_eq!(c.pid, Some(42));
        c.mark_exited(3).expect("exit");
        assert_eq!(c.state, ContainerState::Exited { code: 3 });
        assert!(c.pid.is_none());
        assert!(c.finished_at.is_some());
    }

    #[test]
    fn exited_container_cannot_restart() {
        let mut c = container();
        c.mark_running(42).expect("start");
        c.mark_exited(0).expect("exit");
        assert!(c.mark_running(43).is_err());
        assert!(c.mark_exited(1).is_err());
    }

    #[test]
    fn launch_failure_exits_from_stopped() {
        let mut c = container();
        c.mark_exited(127).expect("exit");
        assert_eq!(c.state.exit_code(), Some(127));
    }

    #[test]
    fn record_carries_argv_and_exit_code() {
        let mut c = container();
        c.mark_exited(2).expect("exit");
        let record = c.record();
        assert_eq!(record.argv, ["python", "main.py"]);
        assert_eq!(record.exit_code, Some(2));
        assert_eq!(record.image, "app:latest");
    }
}
