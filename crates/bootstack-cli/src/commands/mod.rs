//! CLI command definitions and dispatch.

pub mod build;
pub mod images;
pub mod import;
pub mod inspect;
pub mod logs;
pub mod ps;
pub mod run;

use std::path::PathBuf;

use anyhow::Context;
use bootstack_common::config::{BootstackConfig, IsolationMode};
use bootstack_common::constants::BIN_NAME;
use bootstack_core::process::{Isolation, resolve_isolation};
use bootstack_image::registry::ImageCatalog;
use bootstack_image::storage::StorageBackend;
use clap::{Parser, Subcommand, ValueEnum};

/// bootstack: build a container image from one descriptor and run it.
#[derive(Parser, Debug)]
#[command(name = BIN_NAME, version, about, long_about = None)]
pub struct Cli {
    /// Subcommand to execute.
    #[command(subcommand)]
    pub command: Command,

    /// Directory holding layers, images, containers, and logs.
    #[arg(long, global = true, env = "BOOTSTACK_DATA_DIR")]
    pub data_dir: Option<PathBuf>,

    /// Isolation for build commands and entry processes.
    #[arg(long, global = true, env = "BOOTSTACK_ISOLATION")]
    pub isolation: Option<IsolationMode>,

    /// Format of diagnostic output on stderr.
    #[arg(long, global = true, value_enum, default_value_t = LogFormat::Text)]
    pub log_format: LogFormat,
}

/// Diagnostic output format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum LogFormat {
    /// Human-readable lines.
    Text,
    /// One JSON object per event.
    Json,
}

/// Available CLI subcommands.
#[derive(Subcommand, Debug)]
pub enum Command {
    /// Build an image from a descriptor and a build context.
    Build(build::BuildArgs),
    /// Register a directory or archive as a base image.
    Import(import::ImportArgs),
    /// Start a container from an image and wait for its exit.
    Run(run::RunArgs),
    /// List or remove catalog images.
    Images(images::ImagesArgs),
    /// Show an image's layers and configuration as JSON.
    Inspect(inspect::InspectArgs),
    /// List containers.
    Ps(ps::PsArgs),
    /// Print a container's captured output.
    Logs(logs::LogsArgs),
}

/// Resolved configuration shared by every command.
#[derive(Debug)]
pub struct Session {
    /// Effective configuration.
    pub config: BootstackConfig,
}

impl Session {
    fn from_cli(cli: &Cli) -> anyhow::Result<Self> {
        let data_dir = cli
            .data_dir
            .clone()
            .unwrap_or_else(|| bootstack_common::constants::data_dir().clone());
        std::fs::create_dir_all(&data_dir)
            .with_context(|| format!("cannot create data directory {}", data_dir.display()))?;
        let mut config = BootstackConfig::load(&data_dir)?;
        if let Some(mode) = cli.isolation {
            config.isolation = mode;
        }
        tracing::debug!(data_dir = %config.data_dir.display(), isolation = ?config.isolation, "session");
        Ok(Self { config })
    }

    /// Resolves the configured isolation mode for this process.
    pub fn isolation(&self) -> anyhow::Result<Isolation> {
        Ok(resolve_isolation(self.config.isolation)?)
    }

    /// Opens the layer store.
    pub fn storage(&self) -> anyhow::Result<StorageBackend> {
        Ok(StorageBackend::open(&self.config.data_dir)?)
    }

    /// Opens the image catalog.
    pub fn catalog(&self) -> anyhow::Result<ImageCatalog> {
        Ok(ImageCatalog::open(&self.config.data_dir)?)
    }
}

/// Dispatches the parsed CLI command to its handler.
///
/// Returns the process exit code: the container's for `run`, 0 otherwise.
///
/// # Errors
///
/// Returns an error if the command execution fails.
pub fn execute(cli: Cli) -> anyhow::Result<i32> {
    let session = Session::from_cli(&cli)?;
    match cli.command {
        Command::Build(args) => build::execute(&session, args).map(|()| 0),
        Command::Import(args) => import::execute(&session, args).map(|()| 0),
        Command::Run(args) => run::execute(&session, &args),
        Command::Images(args) => images::execute(&session, &args).map(|()| 0),
        Command::Inspect(args) => inspect::execute(&session, &args).map(|()| 0),
        Command::Ps(args) => ps::execute(&session, &args).map(|()| 0),
        Command::Logs(args) => logs::execute(&session, &args).map(|()| 0),
    }
}
