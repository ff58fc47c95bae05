//! Pomodoro Server - Main entry point.
//!
//! This binary starts the Pomodoro timer server with:
//! - Structured JSON logging
//! - Graceful shutdown handling (SIGTERM/SIGINT)
//! - The background scheduler that counts the Session down
//!
//! # Configuration
//!
//! See [`pomodoro_server::config`] for environment variable configuration.
//!
//! # Example
//!
//! ```bash
//! # Defaults: 25/5 minutes, state in the platform data directory
//! cargo run --bin pomodoro-server
//!
//! # Throwaway session on another port
//! POMODORO_EPHEMERAL=true PORT=9000 cargo run --bin pomodoro-server
//! ```

use std::process::ExitCode;
use std::sync::Arc;

use anyhow::Context;
use tokio::net::TcpListener;
use tokio::signal;
use tracing::{error, info, warn};
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{fmt, EnvFilter};

use pomodoro_server::config::Config;
use pomodoro_server::controller::SessionController;
use pomodoro_server::routes::{create_router, AppState};
use pomodoro_server::scheduler::Scheduler;
use pomodoro_server::store::{FileStore, MemoryStore, StoreBackend};

#[tokio::main]
async fn main() -> ExitCode {
    // Initialize structured logging
    init_logging();

    // Load configuration
    let config = match Config::from_env() {
        Ok(config) => config,
        Err(err) => {
            error!(error = %err, "Failed to load configuration");
            eprintln!("Error: {err}");
            eprintln!();
            eprintln!("Optional environment variables:");
            eprintln!("  PORT                    - HTTP server port (default: 8080)");
            eprintln!("  POMODORO_BIND           - Bind address (default: 127.0.0.1)");
            eprintln!("  POMODORO_STATE_PATH     - Session store file (default: data dir)");
            eprintln!("  POMODORO_EPHEMERAL      - Keep the session in memory ('true')");
            eprintln!("  POMODORO_FOCUS_MINUTES  - Focus length in minutes (default: 25)");
            eprintln!("  POMODORO_BREAK_MINUTES  - Break length in minutes (default: 5)");
            eprintln!("  POMODORO_TICK_MS        - Tick period in ms (default: 1000)");
            eprintln!("  RUST_LOG                - Log level filter (default: info)");
            return ExitCode::from(1);
        }
    };

    match run(config).await {
        Ok(()) => {
            info!("Server shutdown complete");
            ExitCode::SUCCESS
        }
        Err(err) => {
            error!(error = ?err, "Server error");
            ExitCode::from(1)
        }
    }
}

async fn run(config: Config) -> anyhow::Result<()> {
    let backend: Arc<dyn StoreBackend> = match &config.state_path {
        Some(path) => Arc::new(FileStore::new(path)),
        None => Arc::new(MemoryStore::new()),
    };

    info!(
        port = config.port,
        bind = %config.bind,
        store = ?backend,
        focus_secs = config.durations.focus_secs(),
        break_secs = config.durations.break_secs(),
        "Pomodoro server starting"
    );

    // Write the default Session unless one already exists. A store that is
    // not readable yet is initialized by the first intent instead.
    let controller = SessionController::new(backend, config.durations);
    if let Err(err) = controller.initialize().await {
        warn!(error = %err, "Failed to initialize session store, continuing");
    }

    let scheduler_handle = Scheduler::new(controller.clone()).spawn(config.tick_period);
    info!(
        period_ms = config.tick_period.as_millis() as u64,
        "Scheduler started"
    );

    let bind_addr = (config.bind, config.port);
    let app = create_router(AppState::new(controller));

    let listener = TcpListener::bind(bind_addr)
        .await
        .with_context(|| format!("failed to bind to {}:{}", bind_addr.0, bind_addr.1))?;
    info!(address = %listener.local_addr()?, "Server listening");

    let result = axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("HTTP server failed");

    info!("Server shutting down gracefully");
    scheduler_handle.abort();
    info!("Scheduler stopped");

    result
}

/// Initialize structured logging with tracing.
///
/// JSON output, filtered by `RUST_LOG` with a default of `info`.
fn init_logging() {
    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info,tower_http=debug,axum::rejection=trace"));

    let json_layer = fmt::layer()
        .json()
        .with_target(true)
        .with_level(true)
        .with_file(false)
        .with_line_number(false);

    tracing_subscriber::registry()
        .with(env_filter)
        .with(json_layer)
        .init();
}

/// Resolves when SIGTERM or SIGINT is received.
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(err) = signal::ctrl_c().await {
            error!(error = %err, "Failed to listen for Ctrl+C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(err) => {
                error!(error = %err, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received SIGINT (Ctrl+C), initiating graceful shutdown");
        }
        _ = terminate => {
            info!("Received SIGTERM, initiating graceful shutdown");
        }
    }
}
