//! TreapKV - An In-Memory Key-Value Store with Positional Arrays
//!
//! This is the main entry point for the TreapKV server.
//! It loads configuration, restores the last snapshot, starts the sweeper and
//! handles incoming connections until Ctrl+C.

use anyhow::Context;
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio::signal;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;
use treapkv::commands::CommandHandler;
use treapkv::config::{help_text, Config, Invocation};
use treapkv::connection::{handle_connection, ConnectionStats};
use treapkv::storage::{ExpirySweeper, StorageEngine};

fn print_banner(config: &Config) {
    println!(
        r#"
TreapKV v{} - In-Memory Key-Value Store
──────────────────────────────────────────────────────────────
Server started on {}
Ready to accept connections.

Use Ctrl+C to shutdown gracefully.
"#,
        treapkv::VERSION,
        config.bind_address()
    );
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Parse environment and command-line arguments
    let config = match Config::load() {
        Ok(Invocation::Serve(config)) => config,
        Ok(Invocation::Help) => {
            println!("{}", help_text());
            return Ok(());
        }
        Ok(Invocation::Version) => {
            println!("TreapKV version {}", treapkv::VERSION);
            return Ok(());
        }
        Err(e) => {
            eprintln!("Error: {}", e);
            println!("{}", help_text());
            std::process::exit(1);
        }
    };

    // Set up logging; RUST_LOG takes precedence over --log-level
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&config.log_level))
        .context("invalid log level")?;
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_thread_ids(false)
        .with_file(false)
        .with_line_number(false)
        .init();

    // Create the storage engine (shared across all connections)
    let storage = Arc::new(StorageEngine::new());

    // Open snapshot stores and replay the newest snapshot
    let persistence = Arc::new(config.persistence().context("failed to open snapshot stores")?);
    if persistence.is_enabled() {
        let restored = persistence
            .restore(&storage)
            .context("failed to restore snapshot")?;
        info!(keys = restored, stores = persistence.store_count(), "Storage engine initialized");
    } else {
        warn!("No snapshot store configured, data will not survive a restart");
    }

    // Start the background expiry sweeper
    let sweeper = ExpirySweeper::start(
        Arc::clone(&storage),
        Some(Arc::clone(&persistence)),
        config.expiry(),
    );

    // Create connection statistics
    let stats = Arc::new(ConnectionStats::new());

    // Bind the TCP listener
    let listener = TcpListener::bind(config.bind_address())
        .await
        .with_context(|| format!("failed to bind {}", config.bind_address()))?;
    info!("Listening on {}", config.bind_address());

    print_banner(&config);

    // Set up graceful shutdown
    let shutdown = async {
        if let Err(e) = signal::ctrl_c().await {
            error!("Failed to listen for Ctrl+C: {}", e);
            std::future::pending::<()>().await;
        }
        info!("Shutdown signal received, stopping server...");
    };

    // Main accept loop
    tokio::select! {
        _ = accept_loop(listener, Arc::clone(&storage), stats) => {}
        _ = shutdown => {}
    }

    // Stop the sweeper before the final snapshot so the two never overlap
    sweeper.shutdown().await;

    if persistence.is_enabled() {
        let storage = Arc::clone(&storage);
        let persistence = Arc::clone(&persistence);
        tokio::task::spawn_blocking(move || persistence.save(&storage))
            .await
            .context("final snapshot task failed")?
            .context("failed to write final snapshot")?;
        info!("Final snapshot written");
    }

    info!("Server shutdown complete");
    Ok(())
}

/// Main loop that accepts incoming connections
async fn accept_loop(
    listener: TcpListener,
    storage: Arc<StorageEngine>,
    stats: Arc<ConnectionStats>,
) {
    loop {
        match listener.accept().await {
            Ok((stream, addr)) => {
                // Create a command handler for this connection
                let handler = CommandHandler::new(Arc::clone(&storage))
                    .with_connection_stats(Arc::clone(&stats));
                let stats = Arc::clone(&stats);

                // Spawn a task to handle this connection
                tokio::spawn(async move {
                    handle_connection(stream, addr, handler, stats).await;
                });
            }
            Err(e) => {
                error!("Failed to accept connection: {}", e);
            }
        }
    }
}
