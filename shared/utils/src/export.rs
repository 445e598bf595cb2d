//! CSV rendering of the flattened parts list.

use anyhow::{Context, Result};
use bomsync_models::FlatPart;
use std::io::Write;

/// Writes one header row plus one row per part to `writer`.
pub fn write_parts_csv<W: Write>(parts: &[FlatPart], writer: W) -> Result<()> {
    let mut csv_writer = csv::Writer::from_writer(writer);
    for part in parts {
        csv_writer
            .serialize(part)
            .with_context(|| format!("Failed to serialize part at {}", part.position))?;
    }
    csv_writer.flush().context("Failed to flush parts CSV")?;
    Ok(())
}
