use clap::{Parser, Subcommand, ValueEnum};
use std::net::SocketAddr;
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(name = "chapterbox")]
#[command(about = "Queue chapter downloads, pack them as CBZ and deliver them", long_about = None)]
pub struct Cli {
    /// Configuration file (defaults to $CHAPTERBOX_CONFIG or config/chapterbox.toml)
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Run the HTTP API together with the worker pool
    Server(ServerArgs),
    /// Search a source's catalog
    Search(SearchArgs),
    /// Download chapters in-process and wait for the result
    Download(DownloadArgs),
}

#[derive(clap::Args, Debug)]
pub struct ServerArgs {
    /// Address to bind the HTTP server to (overrides server.bind_addr)
    #[arg(long)]
    pub address: Option<SocketAddr>,
}

#[derive(clap::Args, Debug)]
pub struct SearchArgs {
    /// Registered source name
    #[arg(long)]
    pub source: String,

    pub query: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum Mode {
    All,
    Single,
    From,
}

#[derive(clap::Args, Debug)]
pub struct DownloadArgs {
    #[arg(long)]
    pub source: String,

    /// Catalog id as returned by `search`
    #[arg(long)]
    pub catalog_id: String,

    /// Chapter id for `--mode single` and `--mode from`
    #[arg(long)]
    pub chapter: Option<String>,

    #[arg(long, value_enum, default_value_t = Mode::All)]
    pub mode: Mode,

    /// Newest chapter first
    #[arg(long)]
    pub descending: bool,

    /// Pack this many chapters per archive instead of one archive per chapter
    #[arg(long)]
    pub volume_size: Option<usize>,

    /// Directory to write archives to (overrides the storage section)
    #[arg(long)]
    pub out: Option<PathBuf>,

    /// Sub-directory (destination handle) under the storage root
    #[arg(long, default_value = "downloads")]
    pub destination: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_download() {
        let cli = Cli::parse_from([
            "chapterbox",
            "download",
            "--source",
            "toonbr",
            "--catalog-id",
            "slug",
            "--mode",
            "from",
            "--chapter",
            "12",
            "--volume-size",
            "5",
        ]);

        match cli.command {
            Commands::Download(args) => {
                assert_eq!(args.mode, Mode::From);
                assert_eq!(args.chapter.as_deref(), Some("12"));
                assert_eq!(args.volume_size, Some(5));
                assert!(!args.descending);
                assert_eq!(args.destination, "downloads");
            }
            other => panic!("unexpected command: {other:?}"),
        }
    }

    #[test]
    fn test_global_config_flag() {
        let cli = Cli::parse_from(["chapterbox", "search", "--source", "mangaflix", "one piece", "--config", "x.toml"]);
        assert_eq!(cli.config, Some(PathBuf::from("x.toml")));
    }

    #[test]
    fn test_cli_definition_is_consistent() {
        use clap::CommandFactory;
        Cli::command().debug_assert();
    }
}
