mod cli;

use bulkfetch::config::Config;
use bulkfetch::ledger::Ledger;
use bulkfetch::observability;
use bulkfetch::orchestrator::Orchestrator;
use clap::Parser;
use cli::{Cli, Commands, RunArgs, StatusArgs};
use tracing::{info, warn};

type AnyError = Box<dyn std::error::Error + Send + Sync + 'static>;

#[tokio::main]
async fn main() -> Result<(), AnyError> {
    observability::init_tracing();

    let cli = Cli::parse();

    match cli.command {
        Commands::Run(args) => run(args).await?,
        Commands::Status(args) => status(args)?,
    }

    Ok(())
}

async fn run(args: RunArgs) -> Result<(), AnyError> {
    let mut config = Config::load(args.config.config)?;
    if let Some(batch_size) = args.batch_size {
        config.download.batch_size = batch_size;
    }
    if let Some(workers) = args.workers {
        config.download.workers = workers;
    }
    config.validate()?;

    let mut orchestrator = Orchestrator::new(config)?.show_progress(!args.no_progress);
    let report = orchestrator.run_until(shutdown_signal()).await?;

    if args.json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        println!("{}", report);
    }
    Ok(())
}

fn status(args: StatusArgs) -> Result<(), AnyError> {
    let config = Config::load(args.config.config)?;
    let ledger_path = config.ledger_path();
    let ledger = Ledger::load_or_init(&ledger_path, &config.project.contract, config.project.size)?;
    let summary = ledger.summary();

    if args.json {
        println!("{}", serde_json::to_string_pretty(&summary)?);
    } else {
        println!("Ledger: {}", ledger_path.display());
        println!(
            " succeeded: {}, failed: {}, never attempted: {} (of {})",
            summary.succeeded, summary.failed, summary.pending, summary.total
        );
    }
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!(error = %e, "Failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        use tokio::signal::unix::{SignalKind, signal};
        match signal(SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                warn!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
    info!("Shutdown signal received");
}
