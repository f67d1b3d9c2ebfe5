//! Cleaning step: produces the prepared dataset from a diagnosed table.

use crate::error::Result;
use crate::pipeline::StepOutcome;
use crate::table::Table;
use std::path::Path;

/// Write the prepared dataset to `output` unless it already exists.
///
/// No transformation is applied yet; the table is persisted as diagnosed.
pub fn handle_missing_values(table: &Table, output: &Path) -> Result<StepOutcome> {
    if output.exists() {
        tracing::info!(path = %output.display(), "prepared dataset exists, skipping");
        return Ok(StepOutcome::Skipped {
            path: output.to_path_buf(),
        });
    }

    table.write_csv(output)?;
    tracing::info!(path = %output.display(), rows = table.height(), "prepared dataset written");
    Ok(StepOutcome::Created {
        path: output.to_path_buf(),
        rows: Some(table.height()),
    })
}
