#![doc = include_str!("../README.md")]

mod sim;

use clap::Parser;
use core::time::Duration;
use leastload::Balancer;
use sim::client::client_loop;
use sim::config::{CliArgs, SimConfig};
use sim::reporter::report_loop;
use sim::task::SineTask;
use sim::telemetry::init_telemetry;
use tokio::signal;
use tokio_util::sync::CancellationToken;
use tracing::Instrument;

// Using mimalloc for better performance under contention, especially in musl
// environments.
#[global_allocator]
static GLOBAL: mimalloc::MiMalloc = mimalloc::MiMalloc;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load from .env
    let _ = dotenvy::dotenv();
    let args = CliArgs::parse();
    let config = SimConfig::try_from(args)?;

    let providers = init_telemetry()?;
    log_startup_info(&config);

    let result = run(config).await;

    tracing::info!("Simulation finished");
    providers.shutdown();
    result
}

async fn run(config: SimConfig) -> anyhow::Result<()> {
    let balancer = Balancer::spawn(config.balancer.clone(), SineTask)?;
    let shutdown_token = CancellationToken::new();

    let mut tasks = Vec::with_capacity(config.client_count + 1);
    for client_id in 0..config.client_count {
        let client = client_loop(
            client_id,
            balancer.clone(),
            config.max_client_delay,
            shutdown_token.clone(),
        )
        .instrument(tracing::trace_span!("client", client_id));
        tasks.push(tokio::spawn(client));
    }
    tasks.push(tokio::spawn(report_loop(
        balancer.clone(),
        config.report_interval,
        shutdown_token.clone(),
    )));

    shutdown_signal(config.run_for).await;

    // Refuse new work and drain before the clients are told to stop, so
    // clients waiting on a result still receive it.
    let outcome = balancer.shutdown().await;
    shutdown_token.cancel();
    for joined in futures::future::join_all(tasks).await {
        if let Err(e) = joined {
            tracing::error!("Simulation task failed: {e}");
        }
    }

    outcome?;
    Ok(())
}

fn log_startup_info(config: &SimConfig) {
    if cfg!(debug_assertions) {
        tracing::info!("Starting simulation with full config: {:#?}", config);
    } else {
        tracing::info!(
            "Starting simulation with {} workers and {} clients",
            config.balancer.worker_count,
            config.client_count
        );
    }
}

/// Resolves on Ctrl+C, SIGTERM, or once `run_for` has elapsed.
async fn shutdown_signal(run_for: Option<Duration>) {
    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                tracing::warn!("Failed to install SIGTERM handler: {e}");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            tracing::warn!("Failed to install Ctrl+C handler: {e}");
            std::future::pending::<()>().await;
        }
    };

    let deadline = async {
        match run_for {
            Some(run_for) => tokio::time::sleep(run_for).await,
            None => std::future::pending::<()>().await,
        }
    };

    tokio::select! {
        () = ctrl_c => tracing::info!("Received Ctrl+C signal"),
        () = terminate => tracing::info!("Received SIGTERM signal"),
        () = deadline => tracing::info!("Run time elapsed"),
    }

    tracing::info!("Shutdown signal received, terminating gracefully...");
}
