//! AST node types for build descriptors.

/// A command written either as a JSON array or as a shell string.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CommandForm {
    /// `["python", "main.py"]`
    Exec(Vec<String>),
    /// `python main.py`, run through `/bin/sh -c`.
    Shell(String),
}

impl CommandForm {
    /// The argument vector this form executes.
    #[must_use]
    pub fn to_argv(&self) -> Vec<String> {
        match self {
            Self::Exec(argv) => argv.clone(),
            Self::Shell(cmd) => vec!["/bin/sh".into(), "-c".into(), cmd.clone()],
        }
    }
}

/// One descriptor instruction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Instruction {
    /// `FROM <image>`
    From {
        /// Base image reference or source URI.
        image: String,
    },
    /// `RUN <command>`
    Run(CommandForm),
    /// `COPY <src>... <dest>`
    Copy {
        /// Sources relative to the build context.
        sources: Vec<String>,
        /// Destination inside the image.
        dest: String,
    },
    /// `WORKDIR <path>`
    Workdir(String),
    /// `ENV <key>=<value> ...`
    Env(Vec<(String, String)>),
    /// `LABEL <key>=<value> ...`
    Label(Vec<(String, String)>),
    /// `EXPOSE <port>[/<proto>] ...`
    Expose(Vec<String>),
    /// `USER <uid>[:<gid>]`
    User(String),
    /// `CMD`
    Cmd(CommandForm),
    /// `ENTRYPOINT`
    Entrypoint(CommandForm),
}

impl Instruction {
    /// Upper-case keyword, for messages.
    #[must_use]
    pub const fn keyword(&self) -> &'static str {
        match self {
            Self::From { .. } => "FROM",
            Self::Run(_) => "RUN",
            Self::Copy { .. } => "COPY",
            Self::Workdir(_) => "WORKDIR",
            Self::Env(_) => "ENV",
            Self::Label(_) => "LABEL",
            Self::Expose(_) => "EXPOSE",
            Self::User(_) => "USER",
            Self::Cmd(_) => "CMD",
            Self::Entrypoint(_) => "ENTRYPOINT",
        }
    }
}

/// An instruction with the line it starts on.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Located {
    /// 1-based physical line of the instruction keyword.
    pub line: usize,
    /// The parsed instruction.
    pub instruction: Instruction,
}

/// A parsed descriptor: instructions in file order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Descriptor {
    /// Instructions in the order they appear.
    pub instructions: Vec<Located>,
}
