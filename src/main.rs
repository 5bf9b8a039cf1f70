mod cli;
mod commands;
mod server;

use chapterbox::config::Config;
use clap::Parser;
use cli::{Cli, Commands};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("chapterbox=info")),
        )
        .init();

    let cli = Cli::parse();

    let config = match cli.config {
        Some(path) => Config::load_from_path(path)?,
        None => Config::load()?,
    };

    match cli.command {
        Commands::Server(args) => server::run(config, args.address).await?,
        Commands::Search(args) => commands::search(config, args).await?,
        Commands::Download(args) => commands::download(config, args).await?,
    }

    Ok(())
}
