//! Background Expiry Sweeper
//!
//! This module implements a background task that periodically removes expired
//! keys and then writes a snapshot. The removal half is "active expiry", as
//! opposed to the "lazy expiry" every command does on access.
//!
//! ## Why Do We Need This?
//!
//! Lazy expiry is cheap, but a key that expires and is never touched again
//! would stay in memory (and in every snapshot) forever. The sweeper reclaims
//! those keys.
//!
//! ## Design
//!
//! The sweeper runs as a Tokio task and, on every tick:
//! 1. Sleeps for the configured interval (default: 60s)
//! 2. Evicts every expired key under the engine lock
//! 3. Writes a snapshot to the configured stores on the blocking pool
//!
//! A snapshot failure is logged and the loop carries on; the next tick tries
//! again.

use crate::persistence::Persistence;
use crate::storage::StorageEngine;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

/// Configuration for the expiry sweeper.
#[derive(Debug, Clone)]
pub struct ExpiryConfig {
    /// Time between sweeps (default: 60s)
    pub interval: Duration,
}

impl Default for ExpiryConfig {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(60),
        }
    }
}

/// A handle to the running expiry sweeper.
///
/// Dropping the handle signals the task to stop but doesn't wait for it. Use
/// [`shutdown`](Self::shutdown) to wait for an in-flight sweep to finish.
#[derive(Debug)]
pub struct ExpirySweeper {
    /// Sender to signal shutdown
    shutdown_tx: watch::Sender<bool>,

    task: Option<JoinHandle<()>>,
}

impl ExpirySweeper {
    /// Starts the sweeper as a background task.
    ///
    /// Must be called from within a Tokio runtime.
    ///
    /// # Example
    ///
    /// ```ignore
    /// use treapkv::persistence::Persistence;
    /// use treapkv::storage::{ExpiryConfig, ExpirySweeper, StorageEngine};
    /// use std::sync::Arc;
    ///
    /// let engine = Arc::new(StorageEngine::new());
    /// let persistence = Arc::new(Persistence::new());
    /// let sweeper = ExpirySweeper::start(engine, Some(persistence), ExpiryConfig::default());
    ///
    /// // ...
    ///
    /// sweeper.shutdown().await;
    /// ```
    pub fn start(
        engine: Arc<StorageEngine>,
        persistence: Option<Arc<Persistence>>,
        config: ExpiryConfig,
    ) -> Self {
        let (shutdown_tx, shutdown_rx) = watch::channel(false);

        info!(
            interval_secs = config.interval.as_secs_f64(),
            snapshots = persistence.as_ref().map_or(false, |p| p.is_enabled()),
            "Background expiry sweeper started"
        );

        let task = tokio::spawn(sweeper_loop(engine, persistence, config, shutdown_rx));

        Self {
            shutdown_tx,
            task: Some(task),
        }
    }

    /// Signals the sweeper to stop without waiting for it.
    pub fn stop(&self) {
        let _ = self.shutdown_tx.send(true);
    }

    /// Signals the sweeper to stop and waits until the task has exited.
    ///
    /// A sweep that is already running completes first, so once this returns
    /// no background snapshot write is in flight.
    pub async fn shutdown(mut self) {
        self.stop();
        if let Some(task) = self.task.take() {
            if let Err(e) = task.await {
                warn!(error = %e, "Expiry sweeper task ended abnormally");
            }
        }
        info!("Background expiry sweeper stopped");
    }
}

impl Drop for ExpirySweeper {
    fn drop(&mut self) {
        self.stop();
    }
}

/// The main sweeper loop.
async fn sweeper_loop(
    engine: Arc<StorageEngine>,
    persistence: Option<Arc<Persistence>>,
    config: ExpiryConfig,
    mut shutdown_rx: watch::Receiver<bool>,
) {
    loop {
        // Wait for the interval or shutdown signal
        tokio::select! {
            _ = tokio::time::sleep(config.interval) => {}
            result = shutdown_rx.changed() => {
                if result.is_err() || *shutdown_rx.borrow() {
                    debug!("Expiry sweeper received shutdown signal");
                    return;
                }
            }
        }

        sweep_once(&engine, persistence.as_ref()).await;
    }
}

/// One sweep: evict expired keys, then snapshot.
async fn sweep_once(engine: &Arc<StorageEngine>, persistence: Option<&Arc<Persistence>>) {
    let expired = engine.cleanup_expired();
    if expired > 0 {
        debug!(
            expired = expired,
            keys_remaining = engine.len(),
            "Expired keys cleaned up"
        );
    }

    let Some(persistence) = persistence.filter(|p| p.is_enabled()) else {
        return;
    };

    // Snapshot writes hit the disk and block on the engine lock
    let engine = Arc::clone(engine);
    let persistence = Arc::clone(persistence);
    match tokio::task::spawn_blocking(move || persistence.save(&engine)).await {
        Ok(Ok(())) => debug!("Periodic snapshot written"),
        // Already logged per store by Persistence::save
        Ok(Err(_)) => {}
        Err(e) => error!(error = %e, "Snapshot task panicked"),
    }
}
