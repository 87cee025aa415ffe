//! `bstk logs`: view container logs.

use bootstack_runtime::logs::read_logs;
use bootstack_runtime::state::StateFile;
use clap::Args;

use super::Session;

/// Arguments for the `logs` command.
#[derive(Args, Debug)]
pub struct LogsArgs {
    /// Container id or unique id prefix.
    pub container: String,
}

/// Executes the `logs` command.
///
/// # Errors
///
/// Returns an error if the container is not found or its log is unreadable.
pub fn execute(session: &Session, args: &LogsArgs) -> anyhow::Result<()> {
    let state = StateFile::new(session.config.state_file());
    let entry = state.find(&args.container)?;
    let logs = read_logs(&entry.log_path)?;

    if logs.is_empty() {
        println!("No logs available for container: {}", entry.id.short());
    } else {
        print!("{logs}");
    }
    Ok(())
}
