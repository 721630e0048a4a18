//! Mirage entry point.
//!
//! Starts the DNS sinkhole and the instance-data HTTP server concurrently,
//! waits for an OS termination signal or the first server failure, then
//! shuts everything down with a bounded deadline.

use std::path::PathBuf;
use std::time::{Duration, Instant};

use anyhow::{Context, Result};
use tokio::signal::unix::{signal, SignalKind};
use tokio::sync::watch;
use tokio::task::JoinSet;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

use mirage::config::Config;
use mirage::dns::DnsServer;
use mirage::idp::InstanceDataServer;

/// Upper bound on the graceful shutdown wait.
const SHUTDOWN_DEADLINE: Duration = Duration::from_secs(60);

fn init_tracing(verbose: bool) {
    let default_level = if verbose { "debug" } else { "info" };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    tracing_subscriber::fmt().with_env_filter(filter).init();
}

async fn run() -> Result<()> {
    let config_path = std::env::var("CONFIG_PATH").ok().map(PathBuf::from);
    let config =
        Config::load(config_path.as_deref()).context("failed to load configuration")?;

    init_tracing(config.verbose);

    mirage::metrics::init(&config.metrics).context("failed to initialize metrics")?;
    if config.metrics.enabled {
        info!("metrics enabled on {}", config.metrics.listen);
    }

    info!("starting mirage");
    info!(
        "DNS on {}, upstream {}, {} blackhole zone(s)",
        config.dns.listen,
        config.dns.upstream,
        config.dns.zones.len()
    );
    info!(
        "instance-data on {} via {} provider",
        config.instance_data.listen, config.instance_data.provider
    );

    let dns = DnsServer::new(&config.dns)
        .context("failed to build DNS server")?
        .bind()
        .await?;
    let idp = InstanceDataServer::new(&config.instance_data)
        .context("failed to build instance-data server")?
        .bind()
        .await?;

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let mut tasks: JoinSet<mirage::Result<()>> = JoinSet::new();
    tasks.spawn(dns.serve(shutdown_rx.clone()));
    tasks.spawn(idp.serve(shutdown_rx));

    let mut sigterm = signal(SignalKind::terminate()).context("failed to install SIGTERM")?;
    let mut failed = false;

    tokio::select! {
        _ = tokio::signal::ctrl_c() => info!("interrupt received, shutting down..."),
        _ = sigterm.recv() => info!("terminate received, shutting down..."),
        Some(result) = tasks.join_next() => {
            failed = true;
            match result {
                Ok(Err(err)) => error!("server failed: {err}"),
                Err(err) => error!("server task panicked: {err}"),
                Ok(Ok(())) => warn!("server exited unexpectedly"),
            }
        }
    }

    let _ = shutdown_tx.send(true);

    let deadline = Instant::now() + SHUTDOWN_DEADLINE;
    loop {
        let remaining = deadline.saturating_duration_since(Instant::now());
        match tokio::time::timeout(remaining, tasks.join_next()).await {
            Ok(None) => break,
            Ok(Some(Ok(Ok(())))) => {}
            Ok(Some(Ok(Err(err)))) => {
                failed = true;
                error!("server shutdown failed: {err}");
            }
            Ok(Some(Err(err))) => {
                failed = true;
                error!("server task panicked: {err}");
            }
            Err(_) => {
                failed = true;
                error!("shutdown deadline exceeded, abandoning remaining listeners");
                tasks.abort_all();
                while tasks.join_next().await.is_some() {}
                break;
            }
        }
    }

    info!("shutdown complete");

    if failed {
        anyhow::bail!("exited after server failure");
    }
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    run().await
}
