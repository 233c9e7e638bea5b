//! Sentry Console - Security Patrol Monitoring
//!
//! Live monitoring console for RFID security patrols over MQTT.
//!
//! # Usage
//!
//! ```bash
//! # Run with console.toml from the working directory (or defaults)
//! cargo run --release
//!
//! # Point at a different broker
//! cargo run --release -- --broker broker.internal:1883
//! ```
//!
//! # Environment Variables
//!
//! - `SENTRY_CONSOLE_CONFIG`: Path to the TOML config file
//! - `SENTRY_CORS_ORIGINS`: Comma-separated allowed CORS origins (dev only)
//! - `RUST_LOG`: Logging level (default: info)

use anyhow::{Context, Result};
use clap::Parser;
use std::sync::Arc;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

use sentry_console::api::{create_app, ApiState};
use sentry_console::config::{self, ConsoleConfig};
use sentry_console::coordinator::Coordinator;
use sentry_console::push::PushChannel;
use sentry_console::store::RecordStore;
use sentry_console::{bus, Signal};

// ============================================================================
// CLI Arguments
// ============================================================================

#[derive(Parser, Debug)]
#[command(name = "sentry-console")]
#[command(about = "Security Patrol Monitoring Console")]
#[command(version)]
struct CliArgs {
    /// Override the HTTP server address (default: "0.0.0.0:8080")
    #[arg(short, long)]
    addr: Option<String>,

    /// Override the MQTT broker (HOST or HOST:PORT)
    #[arg(long, value_name = "HOST[:PORT]")]
    broker: Option<String>,

    /// Override the record store path
    #[arg(long)]
    db: Option<String>,

    /// Path to the console TOML config file
    #[arg(long, env = "SENTRY_CONSOLE_CONFIG")]
    config: Option<String>,
}

/// Apply CLI overrides on top of the loaded configuration.
fn apply_overrides(mut config: ConsoleConfig, args: &CliArgs) -> Result<ConsoleConfig> {
    if let Some(addr) = &args.addr {
        config.server.addr = addr.clone();
    }
    if let Some(broker) = &args.broker {
        match broker.split_once(':') {
            Some((host, port)) => {
                config.broker.host = host.to_string();
                config.broker.port = port
                    .parse()
                    .with_context(|| format!("Invalid broker port: {port}"))?;
            }
            None => config.broker.host = broker.clone(),
        }
    }
    if let Some(db) = &args.db {
        config.store.path = db.clone();
    }
    Ok(config)
}

// ============================================================================
// Task Names for Supervisor Logging
// ============================================================================

#[derive(Debug, Clone, Copy)]
enum TaskName {
    HttpServer,
    MessageBus,
}

impl std::fmt::Display for TaskName {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TaskName::HttpServer => write!(f, "HttpServer"),
            TaskName::MessageBus => write!(f, "MessageBus"),
        }
    }
}

/// Spawn the HTTP server task into the JoinSet.
fn spawn_http_server(
    task_set: &mut JoinSet<Result<TaskName>>,
    listener: tokio::net::TcpListener,
    app: axum::Router,
    cancel_token: CancellationToken,
) {
    task_set.spawn(async move {
        info!("[HttpServer] Task starting");

        let result = axum::serve(listener, app)
            .with_graceful_shutdown(async move {
                cancel_token.cancelled().await;
                info!("[HttpServer] Received shutdown signal");
            })
            .await;

        match result {
            Ok(()) => {
                info!("[HttpServer] Graceful shutdown complete");
                Ok(TaskName::HttpServer)
            }
            Err(e) => {
                error!("[HttpServer] Server error: {}", e);
                Err(anyhow::anyhow!("HTTP server error: {}", e))
            }
        }
    });
}

/// Run the supervisor loop: monitor tasks, cancel on failure.
async fn run_supervisor(
    task_set: &mut JoinSet<Result<TaskName>>,
    cancel_token: CancellationToken,
) -> Result<()> {
    info!("🔒 Supervisor: All tasks spawned, monitoring...");

    loop {
        tokio::select! {
            _ = cancel_token.cancelled() => {
                info!("🛑 Supervisor: Shutdown signal received");
                break;
            }
            result = task_set.join_next() => {
                match result {
                    Some(Ok(Ok(task_name))) => {
                        info!("🔒 Supervisor: Task {} completed normally", task_name);
                    }
                    Some(Ok(Err(e))) => {
                        error!("🔒 Supervisor: Task failed with error: {}", e);
                        cancel_token.cancel();
                        return Err(e);
                    }
                    Some(Err(e)) => {
                        error!("🔒 Supervisor: Task panicked: {}", e);
                        cancel_token.cancel();
                        return Err(anyhow::anyhow!("Task panicked: {}", e));
                    }
                    None => {
                        info!("🔒 Supervisor: All tasks completed");
                        break;
                    }
                }
            }
        }
    }

    Ok(())
}

// ============================================================================
// Main Entry Point
// ============================================================================

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_target(false)
        .init();

    let args = CliArgs::parse();
    let app_config = apply_overrides(ConsoleConfig::load(args.config.as_deref()), &args)?;
    let server_addr = app_config.server.addr.clone();
    let store_path = app_config.store.path.clone();
    config::init(app_config);

    info!("━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━");
    info!("  Sentry Console - Security Patrol Monitoring");
    info!("━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━");
    info!("");

    info!("💾 Opening record store at {}...", store_path);
    let store = RecordStore::open(&store_path).context("Failed to open record store")?;
    info!("✓ Record store opened");

    let push = PushChannel::new(config::defaults::PUSH_CHANNEL_CAPACITY);
    let (outbound_tx, outbound_rx) =
        tokio::sync::mpsc::channel::<Signal>(config::defaults::OUTBOUND_QUEUE_CAPACITY);
    let coordinator = Arc::new(Coordinator::new(store.clone(), outbound_tx, push.clone()));
    info!("✓ Session coordinator initialized");

    info!("🌐 Starting HTTP server on {}...", server_addr);
    let app = create_app(ApiState::new(Arc::clone(&coordinator), store), push);
    let listener = tokio::net::TcpListener::bind(&server_addr)
        .await
        .with_context(|| format!("Failed to bind to {server_addr}"))?;
    info!("✓ HTTP server listening on {}", server_addr);
    info!("");
    info!("🎯 Dashboard available at: http://{}", server_addr);
    info!("");

    // Graceful shutdown via Ctrl+C
    let cancel_token = CancellationToken::new();
    let shutdown_token = cancel_token.clone();
    tokio::spawn(async move {
        tokio::signal::ctrl_c().await.ok();
        info!("🛑 Received Ctrl+C, initiating shutdown...");
        shutdown_token.cancel();
    });

    info!("🔒 Supervisor: Initializing task monitoring");
    let mut task_set: JoinSet<Result<TaskName>> = JoinSet::new();

    // Task 1: HTTP Server
    spawn_http_server(&mut task_set, listener, app, cancel_token.clone());

    // Task 2: MQTT Message Bus
    let bus_cancel = cancel_token.clone();
    task_set.spawn(async move {
        info!("[MessageBus] Task starting");
        bus::run(coordinator, outbound_rx, bus_cancel).await;
        Ok(TaskName::MessageBus)
    });

    run_supervisor(&mut task_set, cancel_token).await?;

    info!("");
    info!("✓ Sentry Console shutdown complete");
    Ok(())
}
