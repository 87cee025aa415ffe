//! Domain primitive types used across the bootstack workspace.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::{BootstackError, Result};

/// Unique identifier for a container instance.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ContainerId(String);

impl ContainerId {
    /// Creates a new container ID from a string value.
    #[must_use]
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Generates a random container ID.
    #[must_use]
    pub fn generate() -> Self {
        Self(uuid::Uuid::new_v4().to_string())
    }

    /// Returns the inner string representation.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Returns the first 12 characters, as shown in listings.
    #[must_use]
    pub fn short(&self) -> &str {
        self.0.get(..12).unwrap_or(&self.0)
    }
}

impl fmt::Display for ContainerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Content-derived identifier of a built image.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ImageId(String);

impl ImageId {
    /// Creates a new image ID from a string value.
    #[must_use]
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Returns the inner string representation.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Returns the first 12 characters, as shown in listings.
    #[must_use]
    pub fn short(&self) -> &str {
        self.0.get(..12).unwrap_or(&self.0)
    }
}

impl fmt::Display for ImageId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// SHA-256 hash digest used for content verification.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Sha256Hash(String);

impl Sha256Hash {
    /// Creates a hash from a hex-encoded string.
    ///
    /// An optional `sha256:` prefix is accepted and stripped.
    ///
    /// # Errors
    ///
    /// Returns an error if the input is not a valid 64-character hex string.
    pub fn from_hex(hex: impl Into<String>) -> Result<Self> {
        let hex = hex.into();
        let bare = hex.strip_prefix("sha256:").unwrap_or(&hex);
        if bare.len() != crate::constants::SHA256_HEX_LENGTH
            || !bare.chars().all(|c| c.is_ascii_hexdigit())
        {
            return Err(BootstackError::Config {
                message: format!("invalid SHA-256 hex string: {hex}"),
            });
        }
        Ok(Self(bare.to_ascii_lowercase()))
    }

    /// Returns the hex-encoded hash string.
    #[must_use]
    pub fn as_hex(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Sha256Hash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "sha256:{}", self.0)
    }
}

/// Numeric user and group a container process runs as.
///
/// Always non-root: the superuser id is rejected at construction, including
/// when read back from a configuration file or the image catalog.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "RawIdentity")]
pub struct RuntimeIdentity {
    /// Numeric user id.
    pub uid: u32,
    /// Numeric group id.
    pub gid: u32,
}

impl RuntimeIdentity {
    /// Creates an identity from a uid and gid.
    ///
    /// # Errors
    ///
    /// Returns an error if `uid` is 0.
    pub fn new(uid: u32, gid: u32) -> Result<Self> {
        if uid == 0 {
            return Err(BootstackError::Config {
                message: "runtime identity must be non-root (uid 0 rejected)".into(),
            });
        }
        Ok(Self { uid, gid })
    }

    /// Parses `uid` or `uid:gid`. Without a group, the gid equals the uid.
    ///
    /// Names are not resolved; only numeric ids are accepted.
    ///
    /// # Errors
    ///
    /// Returns an error if either part is not a number or the uid is 0.
    pub fn parse(spec: &str) -> Result<Self> {
        let spec = spec.trim();
        let (user, group) = spec.split_once(':').unwrap_or((spec, spec));
        let parse_id = |s: &str| {
            s.parse::<u32>().map_err(|_| BootstackError::Config {
                message: format!("runtime identity must be numeric, got {spec:?}"),
            })
        };
        Self::new(parse_id(user)?, parse_id(group)?)
    }
}

/// Unvalidated wire form of [`RuntimeIdentity`].
#[derive(Deserialize)]
struct RawIdentity {
    uid: u32,
    gid: u32,
}

impl TryFrom<RawIdentity> for RuntimeIdentity {
    type Error = BootstackError;

    fn try_from(raw: RawIdentity) -> Result<Self> {
        Self::new(raw.uid, raw.gid)
    }
}

impl Default for RuntimeIdentity {
    fn default() -> Self {
        Self {
            uid: crate::constants::DEFAULT_UID,
            gid: crate::constants::DEFAULT_UID,
        }
    }
}

impl fmt::Display for RuntimeIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.uid, self.gid)
    }
}

/// Argument vector executed as a container's foreground process.
///
/// Never empty: both [`EntryCommand::new`] and deserialization reject an
/// argv without a program.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "Vec<String>")]
pub struct EntryCommand(Vec<String>);

impl EntryCommand {
    /// Creates an entry command from an argument vector.
    ///
    /// # Errors
    ///
    /// Returns an error if the vector is empty or its program is blank.
    pub fn new(argv: Vec<String>) -> Result<Self> {
        match argv.first() {
            Some(program) if !program.trim().is_empty() => Ok(Self(argv)),
            _ => Err(BootstackError::Config {
                message: "entry command must name a program".into(),
            }),
        }
    }

    /// Returns the program (first argument).
    #[must_use]
    pub fn program(&self) -> &str {
        self.0.first().map_or("", String::as_str)
    }

    /// Returns the arguments after the program.
    #[must_use]
    pub fn args(&self) -> &[String] {
        self.0.get(1..).unwrap_or_default()
    }

    /// Returns the full argument vector.
    #[must_use]
    pub fn argv(&self) -> &[String] {
        &self.0
    }
}

impl TryFrom<Vec<String>> for EntryCommand {
    type Error = BootstackError;

    fn try_from(argv: Vec<String>) -> Result<Self> {
        Self::new(argv)
    }
}

impl fmt::Display for EntryCommand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}", self.0)
    }
}

/// Lifecycle state of a container.
///
/// A container moves `Stopped -> Running -> Exited` exactly once; there is
/// no restart.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ContainerState {
    /// Created from an image but its entry process has not been started.
    Stopped,
    /// The entry process is alive.
    Running,
    /// The entry process terminated with the given exit code.
    Exited {
        /// Exit code carried forward as the container's exit code.
        code: i32,
    },
}

impl ContainerState {
    /// Whether the container reached its terminal state.
    #[must_use]
    pub const fn is_terminal(self) -> bool {
        matches!(self, Self::Exited { .. })
    }

    /// Exit code, if the container has exited.
    #[must_use]
    pub const fn exit_code(self) -> Option<i32> {
        match self {
            Self::Exited { code } => Some(code),
            Self::Stopped | Self::Running => None,
        }
    }
}

impl fmt::Display for ContainerState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Stopped => write!(f, "stopped"),
            Self::Running => write!(f, "running"),
            Self::Exited { code } => write!(f, "exited ({code})"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sha256_accepts_prefixed_and_normalizes_case() {
        let upper = "B94D27B9934D3E08A52E52D7DA7DABFAC484EFE37A5380EE9088F7ACE2EFCDE9";
        let hash = Sha256Hash::from_hex(format!("sha256:{upper}")).expect("valid");
        assert_eq!(hash.as_hex(), upper.to_ascii_lowercase());
        assert!(hash.to_string().starts_with("sha256:b94d"));
    }

    #[test]
    fn sha256_rejects_short_input() {
        assert!(Sha256Hash::from_hex("abc123").is_err());
    }

    #[test]
    fn identity_parse_uid_only_uses_uid_as_gid() {
        let id = RuntimeIdentity::parse("1000").expect("parse");
        assert_eq!(id, RuntimeIdentity { uid: 1000, gid: 1000 });
    }

    #[test]
    fn identity_parse_uid_and_gid() {
        let id = RuntimeIdentity::parse("1000:50").expect("parse");
        assert_eq!(id.gid, 50);
    }

    #[test]
    fn identity_rejects_root_and_names() {
        assert!(RuntimeIdentity::parse("0").is_err());
        assert!(RuntimeIdentity::parse("app").is_err());
    }

    #[test]
    fn identity_default_is_1000() {
        assert_eq!(RuntimeIdentity::default().to_string(), "1000:1000");
    }

    #[test]
    fn entry_command_rejects_empty() {
        assert!(EntryCommand::new(vec![]).is_err());
        assert!(EntryCommand::new(vec![" ".into()]).is_err());
    }

    #[test]
    fn entry_command_splits_program_and_args() {
        let cmd = EntryCommand::new(vec!["python".into(), "main.py".into()]).expect("valid");
        assert_eq!(cmd.program(), "python");
        assert_eq!(cmd.args(), ["main.py"]);
    }

    #[test]
    fn identity_deserialization_rejects_root() {
        let err = serde_json::from_str::<RuntimeIdentity>(r#"{"uid":0,"gid":0}"#)
            .expect_err("root identity");
        assert!(err.to_string().contains("non-root"));
        let id: RuntimeIdentity = serde_json::from_str(r#"{"uid":2000,"gid":3000}"#).expect("valid");
        assert_eq!(id, RuntimeIdentity { uid: 2000, gid: 3000 });
    }

    #[test]
    fn entry_command_deserialization_rejects_empty_argv() {
        assert!(serde_json::from_str::<EntryCommand>("[]").is_err());
        assert!(serde_json::from_str::<EntryCommand>(r#"[""]"#).is_err());
        let cmd: EntryCommand = serde_json::from_str(r#"["python","main.py"]"#).expect("valid");
        assert_eq!(cmd.program(), "python");
    }

    #[test]
    fn exited_state_carries_code() {
        let state = ContainerState::Exited { code: 3 };
        assert!(state.is_terminal());
        assert_eq!(state.exit_code(), Some(3));
        assert_eq!(state.to_string(), "exited (3)");
        assert_eq!(ContainerState::Running.exit_code(), None);
    }

    #[test]
    fn container_state_serializes_in_snake_case() {
        let json = serde_json::to_string(&ContainerState::Exited { code: 1 }).expect("json");
        assert_eq!(json, r#"{"exited":{"code":1}}"#);
    }
}
