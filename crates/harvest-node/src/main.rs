use std::sync::Arc;

use anyhow::Context;
use clap::Parser;
use tracing::{info, warn};

use harvest_config::Config;
use harvest_node::api::{start_api_server, AppState};
use harvest_node::cli::{Cli, Command};
use harvest_node::logbuf::LogBuffer;
use harvest_node::notify::Notifier;
use harvest_node::orchestrator::Orchestrator;
use harvest_node::scheduler::Scheduler;
use harvest_node::{driver, logging};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let logs = LogBuffer::default();
    logging::init_logging(cli.verbose, &cli.log_format, cli.log_file.as_ref(), &logs)?;

    // Fatal at startup only: missing or invalid files exit non-zero.
    let config = Arc::new(
        Config::from_file(&cli.config)
            .with_context(|| format!("loading config from {}", cli.config.display()))?,
    );
    harvest_config::load_accounts(&cli.accounts)
        .with_context(|| format!("loading accounts from {}", cli.accounts.display()))?;

    std::fs::create_dir_all(&cli.data_dir)
        .with_context(|| format!("creating data dir {}", cli.data_dir.display()))?;

    let notifier = Arc::new(Notifier::new(config.notifications.clone()));
    let orchestrator = Arc::new(Orchestrator::new(
        Arc::clone(&config),
        cli.accounts.clone(),
        cli.data_dir.clone(),
        driver::create_driver(),
        notifier,
    )?);

    match cli.command.unwrap_or(Command::Serve) {
        Command::Serve => serve(config, orchestrator, logs).await,
        Command::Run => {
            let summary = orchestrator.run_all().await?;
            info!(
                run_id = %summary.run_id,
                points = summary.total_points,
                succeeded = summary.accounts_succeeded,
                failed = summary.accounts_failed,
                "run complete"
            );
            Ok(())
        }
        Command::RunOnce { email } => {
            let summary = orchestrator.run_single(&email).await?;
            info!(points = summary.total_points, "single-account run complete");
            Ok(())
        }
        Command::ResetToday => {
            let cleared = orchestrator.job_state.reset_all_today().await?;
            info!(cleared, "today's job state cleared");
            Ok(())
        }
    }
}

async fn serve(
    config: Arc<Config>,
    orchestrator: Arc<Orchestrator>,
    logs: LogBuffer,
) -> anyhow::Result<()> {
    let api_handle = if config.dashboard.enabled {
        Some(start_api_server(
            AppState { orchestrator: Arc::clone(&orchestrator), logs },
            config.dashboard.host.clone(),
            config.dashboard.port,
        ))
    } else {
        None
    };

    let scheduler = Scheduler::new(config.schedule.clone(), Arc::clone(&orchestrator));
    let scheduler_handle = tokio::spawn(scheduler.run());

    info!("supervisor up; press ctrl-c to stop");
    tokio::signal::ctrl_c().await?;
    info!("shutdown signal received");

    orchestrator.stop().await;
    scheduler_handle.abort();
    if let Some(handle) = api_handle {
        handle.abort();
    }

    // Give in-flight units a moment to reach their boundary.
    let drain = tokio::time::timeout(std::time::Duration::from_secs(30), async {
        while orchestrator.is_running() {
            tokio::time::sleep(std::time::Duration::from_millis(250)).await;
        }
    })
    .await;
    if drain.is_err() {
        warn!("workers did not drain within 30s; exiting anyway");
    }

    Ok(())
}
