//! dealscrape binary
//!
//! Loads the config, runs every pending region, logs the report and exits
//! 0 only when the run fully succeeded. With `repeat_every_secs` set it keeps
//! starting fresh cycles until Ctrl-C.

use anyhow::{Context, Result};
use clap::Parser;
use dealscrape::{AirtableSink, ChromiumLauncher, LogProgress, RunConfig, RunOrchestrator};
use std::path::PathBuf;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Exit code for problems found before any region ran
const EXIT_STARTUP: i32 = 2;

#[derive(Parser, Debug)]
#[command(name = "dealscrape")]
#[command(about = "Harvest property records region by region into Airtable")]
struct Args {
    /// JSON config file (default: $DEALSCRAPE_CONFIG, then ./dealscrape.json)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Env file with credentials (default: ./.env when present)
    #[arg(long)]
    env_file: Option<PathBuf>,

    /// Stop after this many cycles in continuous mode
    #[arg(long)]
    cycles: Option<usize>,
}

#[tokio::main]
async fn main() {
    let args = Args::parse();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let code = match run(args).await {
        Ok(code) => code,
        Err(e) => {
            error!("{e:#}");
            EXIT_STARTUP
        }
    };
    std::process::exit(code);
}

async fn run(args: Args) -> Result<i32> {
    let config = RunConfig::load(args.config.as_deref(), args.env_file.as_deref())
        .context("invalid configuration")?;
    info!(
        "Loaded configuration with {} region(s), sink {}/{}",
        config.regions().len(),
        config.sink_endpoint_id(),
        config.sink_collection_name()
    );

    let cancel = CancellationToken::new();
    let ctrl_c = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("Ctrl-C received, finishing the current region");
            ctrl_c.cancel();
        }
    });

    let sink = AirtableSink::from_config(&config).context("sink setup failed")?;
    let mut orchestrator = RunOrchestrator::new(&config, ChromiumLauncher::from_config(&config), sink)
        .with_progress(Arc::new(LogProgress))
        .with_cancellation(cancel);

    let report = match config.repeat_every() {
        Some(every) => orchestrator.run_continuous(args.cycles, every).await,
        None => orchestrator.run().await,
    }
    .context("run aborted")?;

    if report.auth_failed {
        return Ok(EXIT_STARTUP);
    }
    Ok(report.exit_code())
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_arguments() {
        Args::command().debug_assert();

        let args = Args::try_parse_from(["dealscrape", "-c", "run.json", "--env-file", "ops.env", "--cycles", "3"])
            .expect("arguments parse");
        assert_eq!(args.config, Some(PathBuf::from("run.json")));
        assert_eq!(args.env_file, Some(PathBuf::from("ops.env")));
        assert_eq!(args.cycles, Some(3));

        assert!(Args::try_parse_from(["dealscrape", "--cycles", "many"]).is_err());
    }
}
