use std::path::PathBuf;
use std::time::Duration;

use anyhow::{bail, Context};
use clap::{Parser, Subcommand};
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use journal_connector::config::{Config, DEFAULT_CONFIG_PATH};
use journal_connector::runner::Connector;
use journal_connector::{logging, metrics};

#[derive(Parser)]
#[command(name = "journal_connector")]
#[command(about = "Streams an event journal into a sink with durable checkpoints")]
#[command(version)]
struct Cli {
    /// Path to the connector configuration
    #[arg(long, short, default_value = DEFAULT_CONFIG_PATH)]
    config: PathBuf,
    /// Directory for rotated JSON log files
    #[arg(long, default_value = "logs")]
    log_dir: PathBuf,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Deliver new journal events for every input (or just one)
    Run {
        /// Only run the input with this name
        #[arg(long)]
        input: Option<String>,
        /// Repeat on this interval until interrupted instead of running once
        #[arg(long)]
        interval_secs: Option<u64>,
    },
    /// Check that inputs can authenticate and read their journal
    Validate {
        /// Only validate the input with this name
        #[arg(long)]
        input: Option<String>,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenv::dotenv().ok();
    let cli = Cli::parse();
    let _log_guard = logging::init_logging(&cli.log_dir);

    let config = Config::load(&cli.config)
        .with_context(|| format!("loading {}", cli.config.display()))?;
    if let Some(port) = config.connector.metrics_port {
        metrics::init_metrics(port);
    }

    match cli.command {
        Commands::Run { input, interval_secs } => {
            let inputs = config.select_inputs(input.as_deref())?;
            if inputs.is_empty() {
                warn!("no inputs configured");
                return Ok(());
            }
            let connector = Connector::from_settings(config.connector.clone())?;

            let cancel = CancellationToken::new();
            let on_signal = cancel.clone();
            tokio::spawn(async move {
                if tokio::signal::ctrl_c().await.is_ok() {
                    info!("interrupt received, stopping after the current page");
                    on_signal.cancel();
                }
            });

            loop {
                let reports = connector.run_once(&inputs, &cancel).await;
                let failed = reports.iter().filter(|r| r.result.is_err()).count();
                for report in &reports {
                    match &report.result {
                        Ok(summary) => info!(
                            input = %report.input,
                            pages = summary.pages,
                            delivered = summary.delivered,
                            skipped = summary.skipped,
                            "input finished"
                        ),
                        Err(e) => error!(input = %report.input, error = %e, "input failed"),
                    }
                }

                let Some(secs) = interval_secs else {
                    if failed > 0 {
                        bail!("{} of {} inputs failed", failed, reports.len());
                    }
                    return Ok(());
                };
                tokio::select! {
                    _ = cancel.cancelled() => return Ok(()),
                    _ = tokio::time::sleep(Duration::from_secs(secs)) => {}
                }
            }
        }
        Commands::Validate { input } => {
            let inputs = config.select_inputs(input.as_deref())?;
            let connector = Connector::from_settings(config.connector.clone())?;
            let failed = connector.validate(&inputs).await;
            if failed > 0 {
                bail!("{} of {} inputs failed validation", failed, inputs.len());
            }
            Ok(())
        }
    }
}
