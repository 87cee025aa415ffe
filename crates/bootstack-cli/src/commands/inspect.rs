//! `bstk inspect`: print an image's catalog entry.

use clap::Args;

use super::Session;

/// Arguments for the `inspect` command.
#[derive(Args, Debug)]
pub struct InspectArgs {
    /// Image reference or id prefix.
    pub image: String,
}

/// Executes the `inspect` command, printing the entry as pretty JSON.
///
/// # Errors
///
/// Returns an error if the image is unknown.
pub fn execute(session: &Session, args: &InspectArgs) -> anyhow::Result<()> {
    let image = session.catalog()?.find(&args.image)?;
    println!("{}", serde_json::to_string_pretty(&image)?);
    Ok(())
}
