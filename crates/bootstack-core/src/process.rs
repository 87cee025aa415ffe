//! Launching a command inside an unpacked rootfs.
//!
//! Two isolation levels exist. `Chroot` enters the rootfs with `chroot(2)`,
//! changes into the working directory and, when an identity is given,
//! drops to it with `setgroups`/`setgid`/`setuid` before `exec`. It needs
//! root. `Host` runs the program on the host with the rootfs working
//! directory as `cwd` and cannot switch identity.

use std::ffi::OsString;
use std::path::PathBuf;
use std::process::{Command, ExitStatus};

use bootstack_common::config::IsolationMode;
use bootstack_common::constants::{DEFAULT_PATH_ENV, EXIT_SIGNAL_BASE};
use bootstack_common::error::{BootstackError, Result};
use bootstack_common::types::RuntimeIdentity;

use crate::filesystem::rootfs_join;

/// Effective isolation after resolving [`IsolationMode::Auto`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Isolation {
    /// `chroot` into the rootfs, optionally switching identity.
    Chroot,
    /// Host process with its `cwd` inside the rootfs.
    Host,
}

impl std::fmt::Display for Isolation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Chroot => write!(f, "chroot"),
            Self::Host => write!(f, "host"),
        }
    }
}

/// Whether the current process runs with an effective uid of 0.
#[must_use]
pub fn is_privileged() -> bool {
    #[cfg(unix)]
    {
        nix::unistd::geteuid().is_root()
    }
    #[cfg(not(unix))]
    {
        false
    }
}

/// Whether a process with `pid` still exists.
///
/// A process owned by another user still counts as alive.
#[must_use]
pub fn process_alive(pid: u32) -> bool {
    #[cfg(unix)]
    {
        use nix::errno::Errno;
        use nix::sys::signal::kill;
        use nix::unistd::Pid;

        match i32::try_from(pid) {
            Ok(raw) if raw > 0 => !matches!(kill(Pid::from_raw(raw), None), Err(Errno::ESRCH)),
            _ => false,
        }
    }
    #[cfg(not(unix))]
    {
        pid != 0
    }
}

/// Resolves a configured mode into the isolation actually used.
///
/// # Errors
///
/// Returns `PermissionDenied` when `Chroot` is requested without root, and
/// `Config` when it is requested on a platform without `chroot` support.
pub fn resolve_isolation(mode: IsolationMode) -> Result<Isolation> {
    match mode {
        IsolationMode::Host => Ok(Isolation::Host),
        IsolationMode::Chroot if !cfg!(target_os = "linux") => Err(BootstackError::Config {
            message: "chroot isolation requires Linux".into(),
        }),
        IsolationMode::Chroot if !is_privileged() => Err(BootstackError::PermissionDenied {
            message: "chroot isolation requires root".into(),
        }),
        IsolationMode::Chroot => Ok(Isolation::Chroot),
        IsolationMode::Auto if cfg!(target_os = "linux") && is_privileged() => {
            Ok(Isolation::Chroot)
        }
        IsolationMode::Auto => {
            tracing::warn!(
                "not running as root: using host isolation, identity not enforced and \
                 install commands refused"
            );
            Ok(Isolation::Host)
        }
    }
}

/// A command to run with a rootfs as its filesystem view.
#[derive(Debug, Clone)]
pub struct RootfsCommand {
    /// Host path of the unpacked rootfs.
    pub rootfs: PathBuf,
    /// Argument vector; the first element is the program.
    pub argv: Vec<String>,
    /// Complete environment of the process (the host's is not inherited).
    pub env: Vec<(String, String)>,
    /// Absolute working directory inside the image.
    pub workdir: String,
    /// Identity to switch to; `None` keeps the caller's identity.
    pub identity: Option<RuntimeIdentity>,
    /// How the process is isolated.
    pub isolation: Isolation,
}

impl RootfsCommand {
    /// Host path of the working directory.
    #[must_use]
    pub fn host_workdir(&self) -> PathBuf {
        rootfs_join(&self.rootfs, &self.workdir)
    }

    fn path_env(&self) -> &str {
        self.env
            .iter()
            .rev()
            .find(|(k, _)| k == "PATH")
            .map_or(DEFAULT_PATH_ENV, |(_, v)| v.as_str())
    }

    /// Finds the program the process would execute, as a host path.
    ///
    /// Bare names are looked up in the command's `PATH`, mapped into the
    /// rootfs under `Chroot`. Returns `None` when nothing executable exists.
    #[must_use]
    pub fn locate_program(&self) -> Option<PathBuf> {
        let program = self.argv.first()?;
        let cwd = self.host_workdir();
        let chrooted = self.isolation == Isolation::Chroot;

        if program.contains('/') {
            let candidate = if program.starts_with('/') {
                if chrooted {
                    rootfs_join(&self.rootfs, program)
                } else {
                    PathBuf::from(program)
                }
            } else {
                cwd.join(program)
            };
            return candidate.is_file().then_some(candidate);
        }

        let dirs: Vec<PathBuf> = self
            .path_env()
            .split(':')
            .filter(|d| !d.is_empty())
            .map(|d| {
                if chrooted {
                    rootfs_join(&self.rootfs, d)
                } else {
                    PathBuf::from(d)
                }
            })
            .collect();
        let search = std::env::join_paths(dirs).unwrap_or_else(|_| OsString::new());
        which::which_in(program, Some(search), cwd).ok()
    }

    /// Builds a ready-to-spawn [`Command`].
    ///
    /// The working directory is created inside the rootfs if missing.
    ///
    /// # Errors
    ///
    /// Returns an error if the argument vector is empty, the working
    /// directory cannot be created, or `Chroot` is unsupported here.
    pub fn build(&self) -> Result<Command> {
        let Some((program, args)) = self.argv.split_first() else {
            return Err(BootstackError::Config {
                message: "cannot launch an empty command".into(),
            });
        };

        let host_workdir = self.host_workdir();
        std::fs::create_dir_all(&host_workdir).map_err(|e| BootstackError::io(&host_workdir, e))?;

        let mut cmd = Command::new(program);
        let _ = cmd
            .args(args)
            .env_clear()
            .envs(self.env.iter().map(|(k, v)| (k.as_str(), v.as_str())));

        match self.isolation {
            Isolation::Host => {
                if self.identity.is_some() {
                    tracing::debug!("host isolation: runtime identity recorded but not applied");
                }
                let _ = cmd.current_dir(&host_workdir);
            }
            Isolation::Chroot => enter_rootfs(&mut cmd, self)?,
        }

        tracing::debug!(argv = ?self.argv, isolation = %self.isolation, "prepared rootfs command");
        Ok(cmd)
    }
}

#[cfg(target_os = "linux")]
#[allow(unsafe_code)]
fn enter_rootfs(cmd: &mut Command, spec: &RootfsCommand) -> Result<()> {
    use std::os::unix::process::CommandExt;

    use nix::unistd::{Gid, Uid, chdir, chroot, setgid, setgroups, setuid};

    let rootfs = spec.rootfs.clone();
    let workdir = spec.workdir.clone();
    let identity = spec.identity;

    // SAFETY: the hook runs in the forked child before exec and only issues
    // chroot/chdir/set*id syscalls on data captured before the fork.
    unsafe {
        let _ = cmd.pre_exec(move || {
            chroot(&rootfs)?;
            chdir(workdir.as_str())?;
            if let Some(id) = identity {
                let gid = Gid::from_raw(id.gid);
                setgroups(&[gid])?;
                setgid(gid)?;
                setuid(Uid::from_raw(id.uid))?;
            }
            Ok(())
        });
    }
    Ok(())
}

#[cfg(not(target_os = "linux"))]
fn enter_rootfs(_cmd: &mut Command, _spec: &RootfsCommand) -> Result<()> {
    Err(BootstackError::Config {
        message: "chroot isolation requires Linux".into(),
    })
}

/// Converts a wait status into a shell-style exit code.
///
/// Death by signal `n` becomes `128 + n`.
#[must_use]
pub fn exit_code_of(status: ExitStatus) -> i32 {
    if let Some(code) = status.code() {
        return code;
    }
    #[cfg(unix)]
    {
        use std::os::unix::process::ExitStatusExt;
        if let Some(signal) = status.signal() {
            return EXIT_SIGNAL_BASE + signal;
        }
    }
    EXIT_SIGNAL_BASE
}
