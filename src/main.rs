//! ip-widget - public IP country tracker
//!
//! This is the composition root that wires together all the components.

use anyhow::Context;
use ip_widget::adapters::inbound::{render_state, ConsoleCommands};
use ip_widget::adapters::outbound::{build_http_client, HttpProviderClient};
use ip_widget::application::RefreshOrchestrator;
use ip_widget::config::load_config;
use ip_widget::domain::entities::Trigger;
use ip_widget::domain::services::ProviderRegistry;
use ip_widget::infrastructure::{
    shutdown_signal, spawn_refresh_timer, NetworkChangeWatcher, ShutdownController,
};
use std::sync::Arc;
use std::time::Duration;
use tracing_subscriber::fmt::format::FmtSpan;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load configuration from environment
    let cfg = load_config()?;

    // Setup logging
    let log_level = if cfg.debug {
        tracing::Level::DEBUG
    } else {
        tracing::Level::INFO
    };

    tracing_subscriber::fmt()
        .with_max_level(log_level)
        .with_span_events(FmtSpan::CLOSE)
        .with_writer(std::io::stderr)
        .init();

    tracing::info!(
        "starting ip-widget provider={} refresh={}s",
        cfg.provider,
        cfg.refresh_secs
    );

    // ===== COMPOSITION ROOT =====

    // 1. Providers
    let policy = cfg.retry_policy();
    let http = build_http_client(&policy)?;
    let registry = Arc::new(ProviderRegistry::with_defaults(HttpProviderClient::factory(
        http, policy,
    )));
    if let Err(e) = registry.set_active(&cfg.provider) {
        tracing::warn!(
            "{}, keeping {}",
            e,
            registry.active_name().unwrap_or_default()
        );
    }

    // 2. Orchestrator
    let shutdown = ShutdownController::new();
    let orchestrator =
        RefreshOrchestrator::new(registry, cfg.orchestrator_config(), shutdown.clone());
    let handle = orchestrator.handle();

    handle.subscribe(|state| println!("{}", render_state(state)));

    // 3. Triggers
    let watcher = NetworkChangeWatcher::new(cfg.watcher_config())
        .context("failed to start network change watcher")?;
    tracing::info!("network watcher mode: {:?}", watcher.mode());

    let on_change = handle.clone();
    watcher.spawn(
        move || {
            on_change.notify_network_changed();
        },
        shutdown.clone(),
    );

    let on_tick = handle.clone();
    spawn_refresh_timer(
        cfg.refresh_interval(),
        shutdown.clone(),
        move || {
            on_tick.trigger(Trigger::Timer);
        },
    );

    orchestrator.spawn();
    handle.trigger(Trigger::Startup);

    // 4. Console commands (tray menu stand-in)
    let console = ConsoleCommands::new(handle.clone());
    let console_shutdown = shutdown.clone();
    tokio::spawn(async move {
        let stdin = tokio::io::BufReader::new(tokio::io::stdin());
        if let Err(e) = console.run(stdin, console_shutdown).await {
            tracing::error!("console input error: {}", e);
        }
    });

    shutdown_signal(shutdown.clone()).await;

    if !shutdown.wait_for_drain(Duration::from_secs(5)).await {
        tracing::warn!("exiting with background tasks still running");
    }
    Ok(())
}
