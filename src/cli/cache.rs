//! Cache management commands

use colored::Colorize;

use crate::cache::ArtifactStore;
use crate::cli::OutputFormat;
use crate::error::Result;
use crate::output::json::format_json;

/// Show cache status/statistics
pub fn status(format: OutputFormat) -> Result<()> {
    let store = ArtifactStore::open()?;
    let stats = store.stats()?;

    match format {
        OutputFormat::Json => println!("{}", format_json(&stats)?),
        OutputFormat::Table => {
            println!("{}\n", "Artifact Cache".bold());
            println!("Location: {}", ArtifactStore::cache_dir()?.display());
            println!("Entries:  {} total", stats.total_entries);
            println!("  text:   {}", stats.text_entries);
            println!("  image:  {}", stats.image_entries);
            println!("Size:     {}", format_size(stats.total_size_bytes));
        }
    }
    Ok(())
}

/// Remove all cached artifacts
pub fn clear() -> Result<()> {
    let store = ArtifactStore::open()?;
    let cleared = store.clear_all()?;
    println!(
        "{} Removed {} cached artifact(s)",
        "✓".green(),
        cleared.entries_removed
    );
    Ok(())
}

/// Print the cache directory path
pub fn path() -> Result<()> {
    println!("{}", ArtifactStore::cache_dir()?.display());
    Ok(())
}

/// Format bytes as human-readable size
fn format_size(bytes: usize) -> String {
    const KB: usize = 1024;
    const MB: usize = KB * 1024;
    const GB: usize = MB * 1024;

    if bytes >= GB {
        format!("{:.2} GB", bytes as f64 / GB as f64)
    } else if bytes >= MB {
        format!("{:.2} MB", bytes as f64 / MB as f64)
    } else if bytes >= KB {
        format!("{:.2} KB", bytes as f64 / KB as f64)
    } else {
        format!("{} bytes", bytes)
    }
}
