//! Outbreaks description: relocated verbatim from the extracted to the
//! analyzed store.

use crate::analysis::{AnalysisContext, AnalysisUnit};
use crate::error::AnalysisError;
use tracing::info;

pub struct OutbreaksDescription;

impl AnalysisUnit for OutbreaksDescription {
    fn name(&self) -> &'static str {
        "move_outbreaks_description"
    }

    fn run(&self, ctx: &AnalysisContext<'_>) -> Result<(), AnalysisError> {
        let moved = ctx.move_to_analyzed("outbreaks_description")?;
        info!(rows = moved, "moved outbreaks description");
        Ok(())
    }
}
