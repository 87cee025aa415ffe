//! Package installers run by the dependency stage.
//!
//! An installer turns a dependency manifest already copied into the rootfs
//! into installed packages. Commands run as root inside the rootfs under
//! the build isolation; the first failing command aborts the build.

use std::fmt;
use std::path::{Path, PathBuf};

use bootstack_common::constants::{EXIT_NOT_EXECUTABLE, EXIT_NOT_FOUND, UNBUFFERED_ENV};
use bootstack_common::error::BootstackError;
use bootstack_core::filesystem::rootfs_join;
use bootstack_core::process::{Isolation, RootfsCommand, exit_code_of};
use bootstack_image::config::ImageConfig;

use crate::descriptor::ast::CommandForm;
use crate::error::{BuildError, Result};

/// Package cache locations removed after installing, relative to the rootfs.
/// A trailing `*` matches by prefix within the parent directory.
pub const WELL_KNOWN_CACHES: &[&str] = &["root/.cache/pip", "tmp/pip-*"];

/// Where and how install commands run.
#[derive(Debug, Clone, Copy)]
pub struct InstallSession<'a> {
    /// Build rootfs on the host.
    pub rootfs: &'a Path,
    /// Image configuration at this point of the build.
    pub config: &'a ImageConfig,
    /// Absolute in-image path of the copied manifest.
    pub manifest: &'a str,
    /// Isolation used for the commands.
    pub isolation: Isolation,
    /// Whether commands may run under [`Isolation::Host`], where they see
    /// the host's tools and install paths instead of the rootfs.
    pub allow_host: bool,
}

impl InstallSession<'_> {
    /// Runs one command to completion with the image environment.
    ///
    /// # Errors
    ///
    /// Returns [`BuildError::HostInstallRefused`] under host isolation that
    /// was not explicitly allowed, [`BuildError::InstallFailed`] when the
    /// command exits non-zero or cannot be started, and an I/O error for
    /// other spawn failures.
    pub fn run(&self, argv: Vec<String>, shown: &str) -> Result<()> {
        if self.isolation == Isolation::Host && !self.allow_host {
            tracing::error!(command = shown, "install command would run on the host");
            return Err(BuildError::HostInstallRefused {
                command: shown.to_string(),
            });
        }
        let command = RootfsCommand {
            rootfs: self.rootfs.to_path_buf(),
            argv,
            env: self.config.env.clone(),
            workdir: self.config.workdir.clone(),
            identity: None,
            isolation: self.isolation,
        };
        tracing::info!(command = shown, isolation = %self.isolation, "running install command");

        let failed = |status| BuildError::InstallFailed {
            command: shown.to_string(),
            status,
        };
        let status = match command.build()?.status() {
            Ok(status) => status,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Err(failed(EXIT_NOT_FOUND)),
            Err(e) if e.kind() == std::io::ErrorKind::PermissionDenied => {
                return Err(failed(EXIT_NOT_EXECUTABLE));
            }
            Err(e) => return Err(BootstackError::io(command.host_workdir(), e).into()),
        };
        if status.success() {
            Ok(())
        } else {
            let code = exit_code_of(status);
            tracing::error!(command = shown, status = code, "install command failed");
            Err(failed(code))
        }
    }
}

/// Strategy that installs the packages a manifest declares.
pub trait PackageInstaller: fmt::Debug {
    /// Short name shown in logs and the build report.
    fn name(&self) -> &'static str;

    /// Adjusts the image configuration before installing.
    fn configure(&self, _config: &mut ImageConfig) {}

    /// Installs every declared dependency.
    ///
    /// # Errors
    ///
    /// Returns the first failing command's error.
    fn install(&self, session: &InstallSession<'_>) -> Result<()>;

    /// Cache paths pruned after a successful install.
    fn cache_paths(&self) -> &[&'static str] {
        WELL_KNOWN_CACHES
    }
}

/// Runs the descriptor's `RUN` commands in order.
#[derive(Debug, Clone, Default)]
pub struct ScriptInstaller {
    commands: Vec<CommandForm>,
}

impl ScriptInstaller {
    /// Creates an installer from the commands following the manifest copy.
    #[must_use]
    pub const fn new(commands: Vec<CommandForm>) -> Self {
        Self { commands }
    }
}

impl PackageInstaller for ScriptInstaller {
    fn name(&self) -> &'static str {
        "script"
    }

    fn install(&self, session: &InstallSession<'_>) -> Result<()> {
        for command in &self.commands {
            let display = match command {
                CommandForm::Shell(line) => line.clone(),
                CommandForm::Exec(argv) => argv.join(" "),
            };
            session.run(command.to_argv(), &display)?;
        }
        Ok(())
    }
}

/// Built-in pip preset: upgrade pip, then install the manifest without a
/// download cache. Also sets `PYTHONUNBUFFERED=1`.
#[derive(Debug, Clone, Copy, Default)]
pub struct PipInstaller;

impl PipInstaller {
    /// Commands the preset runs for a manifest at `manifest`.
    #[must_use]
    pub fn commands(manifest: &str) -> Vec<Vec<String>> {
        vec![
            vec!["pip".into(), "install".into(), "--upgrade".into(), "pip".into()],
            vec![
                "pip".into(),
                "install".into(),
                "--no-cache-dir".into(),
                "-r".into(),
                manifest.into(),
            ],
        ]
    }
}

impl PackageInstaller for PipInstaller {
    fn name(&self) -> &'static str {
        "pip"
    }

    fn configure(&self, config: &mut ImageConfig) {
        config.set_env(UNBUFFERED_ENV, "1");
    }

    fn install(&self, session: &InstallSession<'_>) -> Result<()> {
        for argv in Self::commands(session.manifest) {
            let display = argv.join(" ");
            session.run(argv, &display)?;
        }
        Ok(())
    }
}

/// Removes cache paths under `rootfs`. Returns what was removed, relative
/// to the rootfs.
///
/// # Errors
///
/// Returns an error if a matching path exists but cannot be removed.
pub fn prune_caches(rootfs: &Path, patterns: &[&str]) -> Result<Vec<PathBuf>> {
    let mut removed = Vec::new();
    for pattern in patterns {
        let targets = match pattern.strip_suffix('*') {
            Some(prefix) => prefix_matches(&rootfs_join(rootfs, prefix)),
            None => vec![rootfs_join(rootfs, pattern)],
        };
        for target in targets {
            let Ok(meta) = std::fs::symlink_metadata(&target) else {
                continue;
            };
            let result = if meta.is_dir() {
                std::fs::remove_dir_all(&target)
            } else {
                std::fs::remove_file(&target)
            };
            result.map_err(|e| BootstackError::io(&target, e))?;
            removed.push(target.strip_prefix(rootfs).unwrap_or(&target).to_path_buf());
        }
    }
    if !removed.is_empty() {
        tracing::info!(count = removed.len(), "pruned package caches");
    }
    Ok(removed)
}

/// Entries of `stem`'s parent whose name starts with `stem`'s file name.
fn prefix_matches(stem: &Path) -> Vec<PathBuf> {
    let (Some(parent), Some(prefix)) = (stem.parent(), stem.file_name()) else {
        return Vec::new();
    };
    let prefix = prefix.to_string_lossy();
    std::fs::read_dir(parent)
        .map(|entries| {
            let mut matches: Vec<PathBuf> = entries
                .filter_map(std::result::Result::ok)
                .filter(|e| e.file_name().to_string_lossy().starts_with(&*prefix))
                .map(|e| e.path())
                .collect();
            matches.sort();
            matches
        })
        .unwrap_or_default()
}
