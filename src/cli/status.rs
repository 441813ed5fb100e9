//! Status command implementation

use std::path::PathBuf;

use colored::Colorize;

use crate::cache::ArtifactStore;
use crate::config::{Config, DEFAULT_BACKEND_HOST};
use crate::error::Result;

/// Run the status command to display configuration and cache status
pub fn run(config_path: Option<&str>) -> Result<()> {
    println!("{}\n", "Chalktalk Configuration Status".bold());

    let path = match config_path {
        Some(p) => PathBuf::from(p),
        None => Config::default_path()?,
    };

    match Config::load_from(path.clone()) {
        Ok(config) => {
            println!("Config file: {}", path.display().to_string().cyan());
            println!();

            match config.api_key.as_deref().map(str::trim) {
                Some(key) if !key.is_empty() => {
                    println!("{} API key configured ({})", "✓".green(), mask_key(key));
                }
                _ => {
                    println!("{} API key not configured", "✗".red());
                    println!("  → Run 'chalktalk init' to configure");
                }
            }

            match config.archive_root() {
                Some(root) => println!("{} Static archive: {}", "✓".green(), root.cyan()),
                None => println!("{} No static archive configured", "○".dimmed()),
            }

            let host = config
                .backend_host
                .as_deref()
                .unwrap_or(DEFAULT_BACKEND_HOST);
            println!("{} Model service: {}", "○".dimmed(), host.cyan());
            println!(
                "{} Narration: {} (voice '{}')",
                "○".dimmed(),
                if config.preferences.narration { "on" } else { "off" },
                config.preferences.voice
            );
        }
        Err(_) => {
            println!("{} Configuration not found", "✗".red());
            println!();
            println!(
                "Run {} to create a configuration file.",
                "chalktalk init".cyan()
            );
        }
    }

    println!();
    match ArtifactStore::open().and_then(|s| s.stats()) {
        Ok(stats) => println!(
            "{} Cache: {} artifact(s) ({} text, {} image)",
            "○".dimmed(),
            stats.total_entries,
            stats.text_entries,
            stats.image_entries
        ),
        Err(err) => println!("{} Cache unavailable: {}", "⚠".yellow(), err),
    }

    Ok(())
}

/// Show only the edges of a key
fn mask_key(key: &str) -> String {
    if key.len() <= 8 {
        return "*".repeat(key.len());
    }
    format!("{}...{}", &key[..4], &key[key.len() - 4..])
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mask_key() {
        assert_eq!(mask_key("short"), "*****");
        assert_eq!(mask_key("hawk-1234567890-key"), "hawk...-key");
    }
}
