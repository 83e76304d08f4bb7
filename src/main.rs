//! DriveHub Server
//!
//! Main entry point that builds the engine and runs its background work:
//! URL transfers, recycle bin expiry, and content reaping.

use tracing;
use tracing_subscriber::{EnvFilter, fmt};

use drivehub::Engine;
use drivehub_core::config::AppConfig;
use drivehub_core::error::AppError;
use drivehub_worker::CronScheduler;

#[tokio::main]
async fn main() {
    let env = std::env::var("DRIVEHUB_ENV").unwrap_or_else(|_| "development".to_string());
    let config = match AppConfig::load(&env) {
        Ok(c) => c,
        Err(e) => {
            eprintln!("Failed to load configuration: {}", e);
            std::process::exit(1);
        }
    };

    init_logging(&config);
    tracing::info!("Loaded configuration (env: {})", env);

    if let Err(e) = run(config).await {
        tracing::error!("Server error: {}", e);
        std::process::exit(1);
    }
}

/// Initialize tracing/logging
fn init_logging(config: &AppConfig) {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.logging.level));

    match config.logging.format.as_str() {
        "json" => {
            fmt()
                .json()
                .with_env_filter(filter)
                .with_target(true)
                .with_thread_ids(true)
                .init();
        }
        _ => {
            fmt()
                .pretty()
                .with_env_filter(filter)
                .with_target(true)
                .init();
        }
    }
}

/// Main server run function
async fn run(config: AppConfig) -> Result<(), AppError> {
    tracing::info!("Starting DriveHub v{}", env!("CARGO_PKG_VERSION"));

    // ── Step 1: Stores, blob backend, services ───────────────────
    let engine = Engine::build(&config).await?;

    // ── Step 2: Reconcile jobs stranded by the last exit ─────────
    let recovered = engine.tasks.recover().await?;
    tracing::info!("Transfer recovery complete ({} jobs failed)", recovered);

    // ── Step 3: Scheduled maintenance ────────────────────────────
    let mut scheduler = CronScheduler::new(engine.bin.clone(), engine.addresser.clone()).await?;
    scheduler.register_default_tasks(&config.bin).await?;
    scheduler.start().await?;

    tracing::info!("DriveHub running");

    // ── Step 4: Graceful shutdown ────────────────────────────────
    shutdown_signal().await;
    tracing::info!("Shutdown signal received, starting graceful shutdown...");

    engine.tasks.shutdown().await;
    if let Err(e) = scheduler.shutdown().await {
        tracing::warn!("Scheduler shutdown failed: {}", e);
    }
    if let Some(pool) = &engine.database {
        pool.close().await;
    }

    tracing::info!("DriveHub shut down gracefully");
    Ok(())
}

/// Wait for shutdown signal (Ctrl+C or SIGTERM)
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!("Failed to listen for Ctrl+C: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                tracing::error!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}
