//! Categorize command: show which category the configured table picks.

use std::io::Write;

use anyhow::Result;
use ut_core::CategoryTable;

pub fn run<W: Write>(
    writer: &mut W,
    table: &CategoryTable,
    app: &str,
    exe: &str,
    title: &str,
) -> Result<()> {
    let category = table.categorize(app, exe, title);
    tracing::debug!(app, exe, category, "categorized");
    writeln!(writer, "{category}")?;
    Ok(())
}
