//! Chapter listing command

use serde::Serialize;
use tabled::Tabled;

use crate::chapters;
use crate::cli::OutputFormat;
use crate::error::Result;
use crate::output::{json::format_json, table::format_table};

#[derive(Debug, Tabled, Serialize)]
struct ChapterRow {
    #[tabled(rename = "ID")]
    id: String,
    #[tabled(rename = "TITLE")]
    title: String,
}

/// List the available discussion chapters
pub fn list(format: OutputFormat) -> Result<()> {
    let chapters = chapters::load()?;
    let rows: Vec<ChapterRow> = chapters
        .into_iter()
        .map(|c| ChapterRow {
            id: c.id,
            title: c.title,
        })
        .collect();

    match format {
        OutputFormat::Table => println!("{}", format_table(&rows)),
        OutputFormat::Json => println!("{}", format_json(&rows)?),
    }
    Ok(())
}
