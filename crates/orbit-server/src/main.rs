//! `orbitd` — standalone binary for the Orbit relay daemon.
//!
//! A thin entry point in the spirit of `astrid-cli`'s `astridd`: load the
//! layered config, install logging, wire every crate's component into a
//! `RelayState`, serve the router, and tear down in order on signal.

#![deny(unsafe_code)]

mod config;
mod logging;
mod providers;

use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use clap::Parser;
use config::CliOverrides;
use orbit_approval::ApprovalManager;
use orbit_auth::AuthManager;
use orbit_core::ReliabilityCounters;
use orbit_registry::Registry;
use orbit_relay::RelayState;
use orbit_store::EventStore;
use tokio::task::JoinHandle;
use tracing::{error, info, warn};

/// Orbit Relay daemon — bridges UI clients to AI agent subprocesses.
#[derive(Parser)]
#[command(name = "orbitd")]
#[command(author, version, about = "Local-first relay and aggregation server for AI agent subprocesses")]
struct Args {
    /// Path to the JSON config file. Defaults to the per-user config
    /// directory (overridable by `ORBIT_CONFIG`).
    #[arg(short, long)]
    config: Option<std::path::PathBuf>,

    /// Override the bound host.
    #[arg(long)]
    host: Option<String>,

    /// Override the bound port.
    #[arg(long)]
    port: Option<u16>,

    /// Override the legacy bootstrap token.
    #[arg(long)]
    token: Option<String>,

    /// Override the SQLite database path.
    #[arg(long)]
    db: Option<std::path::PathBuf>,

    /// Log output format.
    #[arg(long, value_enum)]
    log_format: Option<logging::LogFormat>,

    /// Enable debug-level logging.
    #[arg(short, long)]
    verbose: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    let overrides = CliOverrides {
        config_path: args.config.clone(),
        token: args.token.clone(),
        host: args.host.clone(),
        port: args.port,
        db: args.db.clone(),
        log_format: args.log_format,
    };
    let daemon_config = match config::load(&overrides) {
        Ok(config) => config,
        Err(err) => {
            eprintln!("fatal: failed to load configuration: {err:#}");
            std::process::exit(1);
        }
    };

    logging::init(daemon_config.log_format, args.verbose, daemon_config.token.clone())?;

    let Some(legacy_token) = daemon_config.token.clone() else {
        error!("no legacy token configured (set `token` in the config file, ORBIT_TOKEN, or --token)");
        std::process::exit(1);
    };

    if let Err(err) = run(daemon_config, legacy_token).await {
        error!(error = %err, "orbitd exited with an error");
        std::process::exit(1);
    }
    Ok(())
}

async fn run(daemon_config: config::DaemonConfig, legacy_token: String) -> anyhow::Result<()> {
    config::ensure_parent_dir(&daemon_config.db).context("creating database directory")?;
    config::ensure_parent_dir(&daemon_config.upload_dir).context("creating upload directory")?;
    config::ensure_parent_dir(&daemon_config.title_store_path).context("creating title store directory")?;

    let store = EventStore::connect(&daemon_config.db).await.context("connecting to the event store")?;
    let auth = AuthManager::new(legacy_token, store.clone());
    let counters = Arc::new(ReliabilityCounters::new());
    let registry = Arc::new(Registry::new());
    providers::register_all(&registry, &daemon_config.providers, counters.clone()).await.context("registering providers")?;
    let started = registry.start_all().await;
    info!(started = ?started, "providers started");

    let approvals = ApprovalManager::new().with_counters(counters.clone());
    let relay_config = daemon_config.to_relay_config();
    let state = RelayState::new(relay_config, store, auth, registry.clone(), approvals, counters);

    let mut event_tasks: Vec<JoinHandle<()>> = Vec::with_capacity(started.len());
    for provider_id in &started {
        if let Some(adapter) = registry.get(provider_id).await {
            event_tasks.push(orbit_relay::spawn_for_adapter(state.clone(), adapter).await);
        }
    }

    let app = orbit_relay::build_router(state.clone()).layer(tower_http::trace::TraceLayer::new_for_http()).layer(tower_http::cors::CorsLayer::permissive());

    let addr = format!("{}:{}", daemon_config.host, daemon_config.port);
    let listener = tokio::net::TcpListener::bind(&addr).await.with_context(|| format!("binding {addr}"))?;
    info!(addr = %addr, "orbitd listening");

    let prune_handle = spawn_prune_loop(state.clone());

    let mut shutdown_rx = state.subscribe_shutdown();
    let serve_state = state.clone();
    tokio::select! {
        result = axum::serve(listener, app).with_graceful_shutdown(async move {
            tokio::select! {
                _ = tokio::signal::ctrl_c() => {},
                _ = wait_for_sigterm() => {},
                _ = shutdown_rx.recv() => {},
            }
            serve_state.trigger_shutdown();
        }) => {
            result.context("server loop")?;
        }
    }

    info!("shutting down");
    prune_handle.abort();
    for task in event_tasks {
        task.abort();
    }
    registry.stop_all().await;

    info!("orbitd stopped");
    Ok(())
}

#[cfg(unix)]
async fn wait_for_sigterm() {
    match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
        Ok(mut sigterm) => {
            sigterm.recv().await;
        }
        Err(err) => {
            warn!(error = %err, "failed to install SIGTERM handler");
            std::future::pending::<()>().await;
        }
    }
}

#[cfg(not(unix))]
async fn wait_for_sigterm() {
    std::future::pending::<()>().await;
}

/// Periodic sweep: prune the event store past its retention window and
/// delete expired uploads (§4.7 "scheduled every 6 hours").
fn spawn_prune_loop(state: RelayState) -> JoinHandle<()> {
    tokio::spawn(async move {
        loop {
            tokio::time::sleep(state.prune_interval()).await;
            let retention = Duration::from_secs(u64::try_from(state.config().event_retention_days.max(0)).unwrap_or(0) * 24 * 60 * 60);
            match state.store().prune(retention).await {
                Ok(count) => info!(pruned = count, "event store prune sweep completed"),
                Err(err) => {
                    warn!(error = %err, "event store prune sweep failed");
                    state.counters().inc_store_append_failure();
                }
            }
            if let Err(err) = state.prune_uploads().await {
                warn!(error = %err, "upload prune sweep failed");
            }
        }
    })
}
