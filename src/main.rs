//! rfp - recursive file publisher
//!
//! Walks a directory tree and publishes one JSON message per regular file to
//! a durable RabbitMQ queue.

mod cli;

use clap::Parser;
use rfp_config::Config;
use rfp_pipeline::{Orchestrator, ScanSummary};
use rfp_publish::{AmqpConnector, Publisher};
use std::process::ExitCode;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::EnvFilter;

/// Shell convention for "terminated by SIGINT".
const EXIT_INTERRUPTED: u8 = 130;
const EXIT_CONFIG: u8 = 2;
const EXIT_FAILURE: u8 = 1;

#[tokio::main(flavor = "current_thread")]
async fn main() -> ExitCode {
    let args = cli::Args::parse();
    let config = match Config::load(args.config.as_deref(), &args.overrides()) {
        Ok(config) => config,
        Err(err) => {
            init_logging("info");
            tracing::error!(error = ?err, "Invalid configuration");
            return ExitCode::from(EXIT_CONFIG);
        },
    };
    init_logging(&config.log_level);

    let cancel = CancellationToken::new();
    tokio::spawn(cancel_on_interrupt(cancel.clone()));
    run(&config, cancel).await
}

fn init_logging(level: &str) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    tracing_subscriber::fmt().with_env_filter(filter).init();
}

/// First Ctrl-C stops the walk after the current file; a second one exits
/// immediately.
async fn cancel_on_interrupt(cancel: CancellationToken) {
    if let Err(err) = tokio::signal::ctrl_c().await {
        tracing::warn!(error = %err, "Cannot listen for Ctrl-C");
        return;
    }
    tracing::warn!("Interrupted; stopping after the current file (press Ctrl-C again to force)");
    cancel.cancel();
    if tokio::signal::ctrl_c().await.is_ok() {
        tracing::error!("Forced shutdown");
        std::process::exit(EXIT_INTERRUPTED.into());
    }
}

async fn run(config: &Config, cancel: CancellationToken) -> ExitCode {
    let Some(root) = config.root() else {
        tracing::error!("No root directory given");
        return ExitCode::from(EXIT_CONFIG);
    };
    tracing::info!(root = %root.display(), dry_run = config.dry_run, broker = ?config.broker, "Starting recursive file publisher");

    let publisher = Publisher::new(AmqpConnector::new(config.amqp()), config.retry_policy());
    let mut orchestrator = Orchestrator::new(Box::new(publisher), cancel);
    let result = orchestrator.run(root, &config.destination(), config.dry_run).await;
    if let Err(err) = orchestrator.finish().await {
        tracing::warn!(error = ?err, "Failed to close broker connection");
    }

    match result {
        Ok(summary) => ExitCode::from(exit_status(&summary)),
        Err(err) => {
            tracing::error!(error = ?err, "Cannot scan root directory");
            ExitCode::from(EXIT_FAILURE)
        },
    }
}

fn exit_status(summary: &ScanSummary) -> u8 {
    if summary.cancelled {
        EXIT_INTERRUPTED
    } else if summary.errors_encountered > 0 {
        EXIT_FAILURE
    } else {
        0
    }
}
