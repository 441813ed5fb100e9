//! Init command implementation

use std::path::PathBuf;

use colored::Colorize;
use dialoguer::{Confirm, Input, Password, theme::ColorfulTheme};

use crate::config::Config;
use crate::error::Result;

/// Run the init command
pub fn run(config_path: Option<&str>) -> Result<()> {
    println!("{}", "Welcome to chalktalk!".bold().green());
    println!("Let's set up your configuration.\n");

    let api_key: String = Password::with_theme(&ColorfulTheme::default())
        .with_prompt("Enter your model service API key")
        .interact()?;

    let archive_root: String = Input::with_theme(&ColorfulTheme::default())
        .with_prompt("Static archive URL (empty to skip)")
        .allow_empty(true)
        .interact_text()?;

    let narration = Confirm::with_theme(&ColorfulTheme::default())
        .with_prompt("Narrate responses aloud by default?")
        .default(false)
        .interact()?;

    // Preserve existing settings when re-initializing
    let path = match config_path {
        Some(p) => PathBuf::from(p),
        None => Config::default_path()?,
    };
    let mut config = Config::load_from(path.clone()).unwrap_or_default();
    config.api_key = Some(api_key.trim().to_string());
    config.archive_root = Some(archive_root.trim().to_string()).filter(|r| !r.is_empty());
    config.preferences.narration = narration;
    config.save_to(path.clone())?;

    println!(
        "\n{} Configuration saved to: {}",
        "✓".green(),
        path.display()
    );
    println!("\n{}", "You're all set! Try running:".bold());
    println!("  {} - List discussion chapters", "chalktalk chapters".cyan());
    println!("  {} - Start a discussion", "chalktalk chat".cyan());

    Ok(())
}
