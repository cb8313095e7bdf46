//! Background Reaper
//!
//! Reads hide expired entries but never delete them, so an entry that is
//! never touched again would stay in the store forever. The reaper is a
//! Tokio task that wakes up on a fixed delay and calls
//! [`KvService::evict_expired`].
//!
//! Eviction is housekeeping: a failed pass is logged and the next pass runs
//! on schedule as usual. That includes a pass that panics inside a storage
//! backend; the lock does not poison, so the next pass can proceed.

use super::KvService;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::watch;
use tracing::{debug, error, info};

/// Default delay between the end of one pass and the start of the next.
pub const DEFAULT_REAP_INTERVAL: Duration = Duration::from_millis(1000);

/// Configuration for the reaper.
#[derive(Debug, Clone)]
pub struct ReaperConfig {
    /// Delay between passes
    pub interval: Duration,
}

impl Default for ReaperConfig {
    fn default() -> Self {
        Self {
            interval: DEFAULT_REAP_INTERVAL,
        }
    }
}

/// A handle to the running reaper.
///
/// Dropping the handle stops the task.
#[derive(Debug)]
pub struct Reaper {
    shutdown_tx: watch::Sender<bool>,
}

impl Reaper {
    /// Spawns the reaper on the current Tokio runtime.
    ///
    /// # Example
    ///
    /// ```ignore
    /// use ttlkv::service::{KvService, Reaper, ReaperConfig, ServiceConfig};
    /// use std::sync::Arc;
    ///
    /// let service = Arc::new(KvService::in_memory(ServiceConfig::default()));
    /// let reaper = Reaper::start(Arc::clone(&service), ReaperConfig::default());
    ///
    /// // ... serve requests ...
    ///
    /// reaper.stop();
    /// ```
    pub fn start(service: Arc<KvService>, config: ReaperConfig) -> Self {
        let (shutdown_tx, shutdown_rx) = watch::channel(false);

        info!(interval_ms = config.interval.as_millis() as u64, "Reaper started");
        tokio::spawn(reaper_loop(service, config, shutdown_rx));

        Self { shutdown_tx }
    }

    /// Signals the task to exit. Safe to call more than once.
    pub fn stop(&self) {
        if !self.shutdown_tx.send_replace(true) {
            info!("Reaper stopped");
        }
    }
}

impl Drop for Reaper {
    fn drop(&mut self) {
        self.stop();
    }
}

async fn reaper_loop(
    service: Arc<KvService>,
    config: ReaperConfig,
    mut shutdown_rx: watch::Receiver<bool>,
) {
    loop {
        tokio::select! {
            _ = tokio::time::sleep(config.interval) => {}
            result = shutdown_rx.changed() => {
                if result.is_err() || *shutdown_rx.borrow() {
                    debug!("Reaper received shutdown signal");
                    break;
                }
            }
        }

        run_pass(&service);
    }

    info!("Reaper task exited");
}

fn run_pass(service: &KvService) {
    let started = Instant::now();
    debug!("Eviction pass started");

    let outcome = panic::catch_unwind(AssertUnwindSafe(|| service.evict_expired()));

    match outcome {
        Ok(Ok(evicted)) => debug!(
            evicted,
            elapsed_us = started.elapsed().as_micros() as u64,
            "Eviction pass finished"
        ),
        Ok(Err(e)) => error!(
            error = %e,
            elapsed_us = started.elapsed().as_micros() as u64,
            "Eviction pass failed"
        ),
        Err(payload) => error!(
            panic = panic_message(payload.as_ref()),
            "Eviction pass panicked"
        ),
    }
}

fn panic_message(payload: &(dyn std::any::Any + Send)) -> &str {
    if let Some(msg) = payload.downcast_ref::<&str>() {
        msg
    } else if let Some(msg) = payload.downcast_ref::<String>() {
        msg
    } else {
        "unknown panic"
    }
}
