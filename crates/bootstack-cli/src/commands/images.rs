//! `bstk images`: manage the local image catalog.

use clap::Args;

use super::Session;
use crate::output::format_bytes;

/// Arguments for the `images` command.
#[derive(Args, Debug)]
pub struct ImagesArgs {
    /// Remove an image by reference or id prefix. Its layers stay stored.
    #[arg(long)]
    pub remove: Option<String>,
}

/// Executes the `images` command.
///
/// # Errors
///
/// Returns an error if catalog operations fail.
pub fn execute(session: &Session, args: &ImagesArgs) -> anyhow::Result<()> {
    let catalog = session.catalog()?;

    if let Some(query) = &args.remove {
        let removed = catalog.remove(query)?;
        println!("Removed {} ({})", removed.reference, removed.id.short());
        return Ok(());
    }

    let images = catalog.list()?;
    if images.is_empty() {
        println!("No images found.");
        return Ok(());
    }

    println!(
        "{:<32} {:<14} {:>6} {:>10}  {:<25}",
        "REFERENCE", "IMAGE ID", "LAYERS", "SIZE", "CREATED"
    );
    for image in &images {
        println!(
            "{:<32} {:<14} {:>6} {:>10}  {:<25}",
            image.reference,
            image.id.short(),
            image.layers.len(),
            format_bytes(image.size_bytes),
            image.created_at
        );
    }
    Ok(())
}
