//! `bstk build`: build an image from a descriptor.

use std::path::PathBuf;

use bootstack_build::{BuildOptions, InstallerKind, build_image};
use bootstack_common::config::IsolationMode;
use bootstack_common::constants::DEFAULT_DESCRIPTOR;
use clap::{Args, ValueEnum};

use super::Session;
use crate::output::{format_bytes, format_duration};

/// Arguments for the `build` command.
#[derive(Args, Debug)]
pub struct BuildArgs {
    /// Build context directory.
    #[arg(default_value = ".")]
    pub context: PathBuf,

    /// Descriptor file (defaults to `Dockerfile` inside the context).
    #[arg(short, long)]
    pub file: Option<PathBuf>,

    /// Reference to register the image under (`name[:tag]`).
    #[arg(short, long)]
    pub tag: String,

    /// How the dependency step installs packages.
    #[arg(long, value_enum, default_value_t = InstallerArg::Descriptor)]
    pub installer: InstallerArg,
}

/// Installer selection on the command line.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum InstallerArg {
    /// Run the descriptor's `RUN` commands.
    Descriptor,
    /// Upgrade pip, then `pip install -r` the manifest.
    Pip,
}

impl From<InstallerArg> for InstallerKind {
    fn from(arg: InstallerArg) -> Self {
        match arg {
            InstallerArg::Descriptor => Self::Descriptor,
            InstallerArg::Pip => Self::Pip,
        }
    }
}

/// Executes the `build` command and prints the stage report.
///
/// Install commands only run under host isolation when it was chosen
/// explicitly (flag, environment, or config file), never through `auto`.
///
/// # Errors
///
/// Returns the first descriptor, stage, or storage error.
pub fn execute(session: &Session, args: BuildArgs) -> anyhow::Result<()> {
    let descriptor = args
        .file
        .unwrap_or_else(|| args.context.join(DEFAULT_DESCRIPTOR));
    let options = BuildOptions {
        context_dir: args.context,
        descriptor,
        tag: args.tag,
        isolation: session.isolation()?,
        allow_host_install: session.config.isolation == IsolationMode::Host,
        default_identity: session.config.default_identity,
        installer: args.installer.into(),
    };
    let storage = session.storage()?;
    let catalog = session.catalog()?;

    let output = build_image(&options, &storage, &catalog)?;

    for stage in &output.report.stages {
        let layer = stage.layer.as_ref().map_or_else(
            || "-".to_string(),
            |l| format!("{} ({})", short_digest(l.digest.as_hex()), format_bytes(l.size_bytes)),
        );
        println!("{:<14} {:>8}  {layer}", stage.name, format_duration(stage.duration));
    }
    for warning in &output.report.warnings {
        eprintln!("warning: {warning}");
    }
    println!(
        "Built {} ({}) in {}",
        output.image.reference,
        output.image.id.short(),
        format_duration(output.report.total_duration())
    );
    Ok(())
}

fn short_digest(hex: &str) -> &str {
    hex.get(..12).unwrap_or(hex)
}
