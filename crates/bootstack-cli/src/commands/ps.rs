//! `bstk ps`: list containers.

use bootstack_common::types::ContainerState;
use bootstack_runtime::state::StateFile;
use clap::Args;

use super::Session;

/// Arguments for the `ps` command.
#[derive(Args, Debug)]
pub struct PsArgs {
    /// Show all containers (including exited).
    #[arg(short, long)]
    pub all: bool,
}

/// Executes the `ps` command.
///
/// `Running` records whose entry process no longer exists are settled
/// first, so a killed `bstk run` does not leave a container running forever.
///
/// # Errors
///
/// Returns an error if the state file cannot be read.
pub fn execute(session: &Session, args: &PsArgs) -> anyhow::Result<()> {
    let state = StateFile::new(session.config.state_file());
    let lost = state.reconcile()?;
    if !lost.is_empty() {
        tracing::info!(count = lost.len(), "stale running containers marked exited");
    }
    let containers: Vec<_> = state
        .list()?
        .into_iter()
        .filter(|c| args.all || c.state == ContainerState::Running)
        .collect();

    if containers.is_empty() {
        println!("No containers found.");
        return Ok(());
    }

    println!(
        "{:<14} {:<24} {:<12} {:<8} {:<30}",
        "CONTAINER ID", "IMAGE", "STATE", "PID", "COMMAND"
    );
    for c in &containers {
        println!(
            "{:<14} {:<24} {:<12} {:<8} {:<30}",
            c.id.short(),
            c.image,
            c.state.to_string(),
            c.pid.map_or_else(|| "-".to_string(), |p| p.to_string()),
            c.argv.join(" ")
        );
    }
    Ok(())
}
