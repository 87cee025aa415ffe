//! Runtime engine that orchestrates container lifecycle.
//!
//! `run` is `create` + `start` + `wait`: the image's layers are unpacked
//! into a fresh rootfs, the entry command is spawned as the only process,
//! and its exit code becomes the container's. The rootfs is discarded once
//! the container exits since it can never be started again.

use std::path::{Path, PathBuf};
use std::process::{Child, Stdio};

use bootstack_common::config::BootstackConfig;
use bootstack_common::constants::{EXIT_NOT_EXECUTABLE, EXIT_NOT_FOUND};
use bootstack_common::error::{BootstackError, Result};
use bootstack_common::types::{ContainerId, ContainerState};
use bootstack_core::process::{Isolation, RootfsCommand, exit_code_of};
use bootstack_image::registry::ImageCatalog;
use bootstack_image::storage::StorageBackend;

use crate::container::Container;
use crate::logs;
use crate::state::{StateEntry, StateFile};

/// Where the entry process's stdio goes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputMode {
    /// Inherit the caller's stdin, stdout, and stderr.
    Attached,
    /// Null stdin; stdout and stderr appended to the container log.
    Logged,
}

/// The runtime engine that coordinates all container operations.
#[derive(Debug)]
pub struct Engine {
    data_dir: PathBuf,
    containers_dir: PathBuf,
    storage: StorageBackend,
    catalog: ImageCatalog,
    state: StateFile,
    isolation: Isolation,
}

impl Engine {
    /// Opens the engine over the stores under `config.data_dir`.
    ///
    /// # Errors
    ///
    /// Returns an error if the layer store or catalog cannot be opened.
    pub fn new(config: &BootstackConfig, isolation: Isolation) -> Result<Self> {
        let engine = Self {
            data_dir: config.data_dir.clone(),
            containers_dir: config.containers_dir(),
            storage: StorageBackend::open(&config.data_dir)?,
            catalog: ImageCatalog::open(&config.data_dir)?,
            state: StateFile::new(config.state_file()),
            isolation,
        };
        let _ = engine.reconcile()?;
        Ok(engine)
    }

    /// Isolation used for entry processes.
    #[must_use]
    pub const fn isolation(&self) -> Isolation {
        self.isolation
    }

    /// Creates a `Stopped` container from a catalog image.
    ///
    /// # Errors
    ///
    /// Returns an error if the image is unknown, has no entry command, or
    /// its layers cannot be materialized.
    pub fn create(&self, image_query: &str) -> Result<Container> {
        let image = self.catalog.find(image_query)?;
        let id = ContainerId::generate();
        let rootfs = self.containers_dir.join(id.as_str()).join("rootfs");
        let log_path = logs::log_path(&self.data_dir, id.as_str());
        let container = Container::new(id, &image, rootfs, log_path)?;

        if let Err(e) = self.storage.materialize(&image.layers, &container.rootfs) {
            if let Some(dir) = container.rootfs.parent() {
                discard_dir(dir);
            }
            return Err(e);
        }
        self.state.upsert(container.record())?;
        tracing::info!(
            id = %container.id.short(),
            image = %container.image,
            entry = %container.entry,
            "container created"
        );
        Ok(container)
    }

    /// Spawns the entry process of a `Stopped` container.
    ///
    /// An entry executable that cannot be found or executed does not fail
    /// the call: the container exits immediately with 127 or 126 and the
    /// reason is appended to its log.
    ///
    /// # Errors
    ///
    /// Returns an error if the container is not `Stopped`, its log cannot
    /// be opened, or the state file cannot be written.
    pub fn start(
        &self,
        mut container: Container,
        output: OutputMode,
    ) -> Result<RunningContainer<'_>> {
        if container.state != ContainerState::Stopped {
            return Err(BootstackError::Config {
                message: format!("container {} is {}, not stopped", container.id, container.state),
            });
        }
        let command = RootfsCommand {
            rootfs: container.rootfs.clone(),
            argv: container.entry.argv().to_vec(),
            env: container.config.env.clone(),
            workdir: container.config.workdir.clone(),
            identity: container.config.identity,
            isolation: self.isolation,
        };

        // Under chroot, absolute symlinks in the rootfs only resolve after
        // entering it, so the exec errno is authoritative there.
        if self.isolation == Isolation::Host && command.locate_program().is_none() {
            let reason = format!("entry executable not found: {}", container.entry.program());
            return self.launch_failed(container, EXIT_NOT_FOUND, &reason);
        }

        let mut cmd = command.build()?;
        match output {
            OutputMode::Attached => {
                let _ = cmd
                    .stdin(Stdio::inherit())
                    .stdout(Stdio::inherit())
                    .stderr(Stdio::inherit());
            }
            OutputMode::Logged => {
                let stdout = logs::open_log(&container.log_path)?;
                let stderr = stdout
                    .try_clone()
                    .map_err(|e| BootstackError::io(&container.log_path, e))?;
                let _ = cmd.stdin(Stdio::null()).stdout(stdout).stderr(stderr);
            }
        }

        let child = match cmd.spawn() {
            Ok(child) => child,
            Err(e) => {
                let code = launch_failure_code(&e);
                let reason = format!("cannot start {}: {e}", container.entry.program());
                return self.launch_failed(container, code, &reason);
            }
        };

        container.mark_running(child.id())?;
        self.state.upsert(container.record())?;
        Ok(RunningContainer {
            engine: self,
            container,
            child: Some(child),
        })
    }

    /// Creates a container, starts it, and waits for it to exit.
    ///
    /// # Errors
    ///
    /// Returns an error from [`Self::create`], [`Self::start`], or
    /// [`RunningContainer::wait`].
    pub fn run(&self, image_query: &str, output: OutputMode) -> Result<Container> {
        let container = self.create(image_query)?;
        self.start(container, output)?.wait()
    }

    /// Settles `Running` records whose entry process is gone and discards
    /// their leftover rootfs. Returns the affected container ids.
    ///
    /// # Errors
    ///
    /// Returns an error if the state file cannot be read or written.
    pub fn reconcile(&self) -> Result<Vec<ContainerId>> {
        let lost = self.state.reconcile()?;
        for id in &lost {
            let dir = self.containers_dir.join(id.as_str());
            if dir.exists() {
                discard_dir(&dir);
            }
        }
        Ok(lost)
    }

    /// Lists all container records, oldest first.
    ///
    /// # Errors
    ///
    /// Returns an error if the state file cannot be read or written.
    pub fn list(&self) -> Result<Vec<StateEntry>> {
        let _ = self.reconcile()?;
        self.state.list()
    }

    /// Finds a container record by id or unique id prefix.
    ///
    /// # Errors
    ///
    /// Returns `NotFound` or an ambiguity error.
    pub fn find(&self, query: &str) -> Result<StateEntry> {
        self.state.find(query)
    }

    /// Returns the captured log of a container.
    ///
    /// # Errors
    ///
    /// Returns an error if the container is unknown or its log unreadable.
    pub fn logs(&self, query: &str) -> Result<String> {
        let entry = self.state.find(query)?;
        logs::read_logs(&entry.log_path)
    }

    fn launch_failed(
        &self,
        mut container: Container,
        code: i32,
        reason: &str,
    ) -> Result<RunningContainer<'_>> {
        tracing::warn!(id = %container.id.short(), code, "{reason}");
        logs::append_log(&container.log_path, reason)?;
        container.mark_exited(code)?;
        self.finish(&container)?;
        Ok(RunningContainer {
            engine: self,
            container,
            child: None,
        })
    }

    fn finish(&self, container: &Container) -> Result<()> {
        self.state.upsert(container.record())?;
        if let Some(dir) = container.rootfs.parent() {
            discard_dir(dir);
        }
        Ok(())
    }
}

fn discard_dir(dir: &Path) {
    if let Err(e) = std::fs::remove_dir_all(dir) {
        tracing::warn!(path = %dir.display(), error = %e, "failed to discard container rootfs");
    }
}

/// Exit code for an entry process that could not be spawned.
fn launch_failure_code(error: &std::io::Error) -> i32 {
    match error.kind() {
        std::io::ErrorKind::NotFound => EXIT_NOT_FOUND,
        _ => EXIT_NOT_EXECUTABLE,
    }
}

/// A started container whose exit has not been collected yet.
#[derive(Debug)]
pub struct RunningContainer<'a> {
    engine: &'a Engine,
    container: Container,
    child: Option<Child>,
}

impl RunningContainer<'_> {
    /// PID of the entry process; `None` if it never spawned.
    #[must_use]
    pub fn pid(&self) -> Option<u32> {
        self.child.as_ref().map(Child::id)
    }

    /// The container as of the last transition.
    #[must_use]
    pub const fn container(&self) -> &Container {
        &self.container
    }

    /// Blocks until the entry process exits and records its exit code.
    ///
    /// # Errors
    ///
    /// Returns an error if waiting fails or the state cannot be persisted.
    pub fn wait(mut self) -> Result<Container> {
        if let Some(mut child) = self.child.take() {
            let status = child
                .wait()
                .map_err(|e| BootstackError::io(&self.container.rootfs, e))?;
            self.container.mark_exited(exit_code_of(status))?;
            self.engine.finish(&self.container)?;
        }
        Ok(self.container)
    }
}

/// Sends `signal` to an entry process.
///
/// # Errors
///
/// Returns an error if the pid is out of range or the process cannot be
/// signalled.
#[cfg(unix)]
pub fn forward_signal(pid: u32, signal: nix::sys::signal::Signal) -> Result<()> {
    use nix::sys::signal::kill;
    use nix::unistd::Pid;

    let raw = i32::try_from(pid).map_err(|_| BootstackError::Config {
        message: format!("pid {pid} out of range"),
    })?;
    kill(Pid::from_raw(raw), signal).map_err(|e| BootstackError::PermissionDenied {
        message: format!("cannot signal process {pid}: {e}"),
    })?;
    tracing::info!(pid, signal = ?signal, "signal forwarded to entry process");
    Ok(())
}
