//! Entry command stage.

use bootstack_common::types::EntryCommand;

use crate::error::Result;
use crate::stage::{BuildContext, Stage};

/// Records the foreground command containers execute at start.
///
/// Nothing is checked against the rootfs here: a missing entry file only
/// shows at container start.
#[derive(Debug, Clone)]
pub struct EntryStage {
    entry: EntryCommand,
}

impl EntryStage {
    /// Creates the stage.
    #[must_use]
    pub const fn new(entry: EntryCommand) -> Self {
        Self { entry }
    }
}

impl Stage for EntryStage {
    fn name(&self) -> &'static str {
        "entry"
    }

    fn apply(&self, ctx: &mut BuildContext<'_>) -> Result<()> {
        tracing::info!(entry = %self.entry, "entry command recorded");
        ctx.config.entry = Some(self.entry.clone());
        Ok(())
    }
}
