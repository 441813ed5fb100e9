//! chalktalk - Guided conversations on the history of mathematics, told by
//! an Einstein persona at his blackboard

use clap::Parser;

mod archive;
mod backend;
mod cache;
mod chapters;
mod cli;
mod config;
mod diag;
mod error;
mod fingerprint;
mod generate;
mod narrate;
mod output;
mod resolve;

use cli::{CacheCommands, Cli, Commands};
use error::Result;

#[tokio::main]
async fn main() {
    if let Err(err) = run().await {
        eprintln!("Error: {}", err);
        std::process::exit(1);
    }
}

async fn run() -> Result<()> {
    let cli = Cli::parse();

    let mut logger = env_logger::Builder::from_default_env();
    if cli.debug {
        logger.filter_level(log::LevelFilter::Debug);
    }
    logger.init();

    match cli.command {
        Commands::Init => cli::init::run(cli.config.as_deref()),
        Commands::Status => cli::status::run(cli.config.as_deref()),
        Commands::Chat { chapter, narrate } => {
            cli::chat::run(chapter.as_deref(), narrate, cli.config.as_deref()).await
        }
        Commands::Chapters => cli::chapters::list(cli.format),
        Commands::Cache(cache_cmd) => match cache_cmd {
            CacheCommands::Status => cli::cache::status(cli.format),
            CacheCommands::Clear => cli::cache::clear(),
            CacheCommands::Path => cli::cache::path(),
        },
        Commands::Version => {
            println!("chalktalk version {}", env!("CARGO_PKG_VERSION"));
            Ok(())
        }
    }
}
