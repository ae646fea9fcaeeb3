//! mosaicd — UDP fragment reassembly daemon.

use std::time::Duration;

use anyhow::{Context, Result};
use tokio::net::UdpSocket;
use tokio::sync::{broadcast, mpsc};

use mosaic_core::config::MosaicConfig;
use mosaic_services::{bind_socket, report_hole, DatagramListener, MessageRegistry, Notifier};

mod output;

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    // Load config
    if let Err(e) = MosaicConfig::write_default_if_missing() {
        tracing::warn!(error = %e, "failed to write default config");
    }
    let mut config = MosaicConfig::load().unwrap_or_else(|e| {
        tracing::warn!(error = %e, "failed to load config, using defaults");
        MosaicConfig::default()
    });

    if let Some(arg) = std::env::args().nth(1) {
        config.listener.bind_addr = arg
            .parse()
            .with_context(|| format!("invalid bind address: {arg}"))?;
    }
    tracing::info!(
        bind = %config.listener.bind_addr,
        workers = config.listener.workers,
        cleanup_delay_ms = config.reassembly.cleanup_delay_ms,
        "mosaicd starting"
    );

    // Registry
    let (event_tx, event_rx) = mpsc::unbounded_channel();
    let registry = MessageRegistry::new(
        config.reassembly.cleanup_delay(),
        Notifier::new().on_hole(report_hole).events(event_tx),
    );

    // Socket + workers
    let socket = bind_socket(config.listener.bind_addr, config.listener.recv_buffer_bytes)
        .context("failed to bind fragment socket")?;
    let socket = UdpSocket::from_std(socket).context("failed to convert to tokio UdpSocket")?;
    let (error_tx, error_rx) = mpsc::channel(config.listener.error_queue.max(1));
    let listener = DatagramListener::new(
        socket,
        registry.clone(),
        error_tx,
        config.listener.workers,
    );
    tracing::info!(addr = %listener.local_addr()?, "listening for fragments");

    // ── Shutdown channel ─────────────────────────────────────────────────────
    let (shutdown_tx, _) = broadcast::channel::<()>(1);
    let mut shutdown_rx = shutdown_tx.subscribe();

    {
        let shutdown = shutdown_tx.clone();
        tokio::spawn(async move {
            tokio::signal::ctrl_c().await.ok();
            tracing::info!("shutdown signal received");
            let _ = shutdown.send(());
        });
    }

    // ── Spawn tasks ──────────────────────────────────────────────────────────

    let workers = listener.spawn(&shutdown_tx);
    let event_printer = tokio::spawn(output::print_events(event_rx));
    let error_logger = tokio::spawn(output::log_errors(error_rx));

    let stats_printer = {
        let registry = registry.clone();
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(Duration::from_secs(10));
            loop {
                interval.tick().await;
                let stats = registry.stats();
                tracing::info!(
                    in_flight = registry.len(),
                    fragments = stats.fragments,
                    duplicates = stats.duplicates,
                    completed = stats.completed,
                    abandoned = stats.abandoned,
                    holes = stats.holes,
                    "registry stats"
                );
            }
        })
    };

    // ── Wait for exit ────────────────────────────────────────────────────────

    tokio::select! {
        _ = shutdown_rx.recv() => tracing::info!("shutting down"),
        r = event_printer      => tracing::error!("event printer exited: {:?}", r),
        r = stats_printer      => tracing::error!("stats printer exited: {:?}", r),
    }

    for worker in workers {
        if let Err(e) = worker.await {
            tracing::error!(error = %e, "listener worker failed");
        }
    }
    // Workers held the last error senders; the logger drains and exits.
    let _ = error_logger.await;

    if !registry.is_empty() {
        tracing::info!(
            in_flight = registry.len(),
            "exiting with incomplete transactions"
        );
    }

    Ok(())
}
