use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(name = "bulkfetch")]
#[command(about = "Resumable bulk image downloader", long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Download the next batch of pending items
    Run(RunArgs),
    /// Show ledger counts without downloading anything
    Status(StatusArgs),
}

#[derive(clap::Args, Debug)]
pub struct ConfigArgs {
    /// Path to the TOML configuration file
    #[arg(long, short)]
    pub config: Option<PathBuf>,
}

#[derive(clap::Args, Debug)]
pub struct RunArgs {
    #[command(flatten)]
    pub config: ConfigArgs,

    /// Override download.batch_size
    #[arg(long)]
    pub batch_size: Option<usize>,

    /// Override download.workers
    #[arg(long)]
    pub workers: Option<usize>,

    /// Disable the progress bar
    #[arg(long)]
    pub no_progress: bool,

    /// Print the report as JSON
    #[arg(long)]
    pub json: bool,
}

#[derive(clap::Args, Debug)]
pub struct StatusArgs {
    #[command(flatten)]
    pub config: ConfigArgs,

    /// Print the counts as JSON
    #[arg(long)]
    pub json: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_run_overrides() {
        let cli = Cli::parse_from([
            "bulkfetch",
            "run",
            "--config",
            "punks.toml",
            "--batch-size",
            "50",
            "--workers",
            "4",
            "--no-progress",
        ]);
        let Commands::Run(args) = cli.command else {
            panic!("expected run");
        };
        assert_eq!(args.config.config, Some(PathBuf::from("punks.toml")));
        assert_eq!(args.batch_size, Some(50));
        assert_eq!(args.workers, Some(4));
        assert!(args.no_progress);
        assert!(!args.json);
    }

    #[test]
    fn test_parse_status() {
        let cli = Cli::parse_from(["bulkfetch", "status", "--json"]);
        assert!(matches!(cli.command, Commands::Status(StatusArgs { json: true, .. })));
    }
}
