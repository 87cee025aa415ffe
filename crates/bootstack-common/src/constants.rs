//! System-wide constants and default paths.

use std::path::PathBuf;
use std::sync::OnceLock;

/// Default base directory for bootstack data on Linux with root access.
pub const SYSTEM_DATA_DIR: &str = "/var/lib/bootstack";

/// Returns the data directory, preferring `$HOME/.bootstack` and falling
/// back to `/var/lib/bootstack`.
fn resolve_data_dir() -> PathBuf {
    if let Ok(home) = std::env::var("HOME").or_else(|_| std::env::var("USERPROFILE")) {
        let user_dir = PathBuf::from(home).join(".bootstack");
        if std::fs::create_dir_all(&user_dir).is_ok() {
            return user_dir;
        }
    }
    PathBuf::from(SYSTEM_DATA_DIR)
}

static DATA_DIR: OnceLock<PathBuf> = OnceLock::new();

/// Returns the resolved data directory for this session.
pub fn data_dir() -> &'static PathBuf {
    DATA_DIR.get_or_init(resolve_data_dir)
}

/// Default runtime uid (and gid) recorded in built images.
pub const DEFAULT_UID: u32 = 1000;

/// Tag assumed when an image reference omits one.
pub const DEFAULT_TAG: &str = "latest";

/// Descriptor file name looked up in the build context.
pub const DEFAULT_DESCRIPTOR: &str = "Dockerfile";

/// Working directory used when neither the base image nor the descriptor sets one.
pub const DEFAULT_WORKDIR: &str = "/";

/// `PATH` recorded for imported base images that do not declare one.
pub const DEFAULT_PATH_ENV: &str = "/usr/local/sbin:/usr/local/bin:/usr/sbin:/usr/bin:/sbin:/bin";

/// Variable that disables stdout/stderr buffering in the Python runtime.
pub const UNBUFFERED_ENV: &str = "PYTHONUNBUFFERED";

/// Exit code reported when the entry executable does not exist.
pub const EXIT_NOT_FOUND: i32 = 127;

/// Exit code reported when the entry executable cannot be executed.
pub const EXIT_NOT_EXECUTABLE: i32 = 126;

/// Exit code recorded for a container whose entry process disappeared
/// without its exit status being collected.
pub const EXIT_STATUS_LOST: i32 = 255;

/// Offset added to a signal number when a process dies by signal.
pub const EXIT_SIGNAL_BASE: i32 = 128;

/// SHA-256 digest length in hex characters.
pub const SHA256_HEX_LENGTH: usize = 64;

/// Maximum number of layers in an image.
pub const MAX_IMAGE_LAYERS: usize = 128;

/// Name of the optional configuration file inside the data directory.
pub const CONFIG_FILE: &str = "config.json";

/// Application name used in CLI output and state files.
pub const APP_NAME: &str = "bootstack";

/// Binary name for the CLI.
pub const BIN_NAME: &str = "bstk";
