//! Background flush loop.

use crate::TransactionOutbox;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::{interval, MissedTickBehavior};
use tracing::{debug, error, info, warn};

/// Handle to a running flush loop.
pub struct FlushLoopHandle {
    shutdown: watch::Sender<bool>,
    handle: JoinHandle<()>,
}

impl FlushLoopHandle {
    /// Signal the loop to stop and wait for the current flush to finish.
    pub async fn stop(self) {
        let _ = self.shutdown.send(true);
        if let Err(e) = self.handle.await {
            warn!(error = %e, "Flush loop ended abnormally");
        }
    }
}

/// Flush `outbox` every `every` until stopped.
///
/// A flush that finds work is repeated immediately, so a backlog drains
/// without waiting for the next tick. Flushes run on the blocking pool.
pub fn spawn_flush_loop(outbox: TransactionOutbox, every: Duration) -> FlushLoopHandle {
    let (shutdown, mut shutdown_rx) = watch::channel(false);

    let handle = tokio::spawn(async move {
        let mut ticker = interval(every);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        info!(interval_ms = every.as_millis() as u64, "Flush loop started");

        loop {
            tokio::select! {
                _ = ticker.tick() => {}
                changed = shutdown_rx.changed() => {
                    if changed.is_err() || *shutdown_rx.borrow() {
                        break;
                    }
                    continue;
                }
            }

            loop {
                if outbox.is_shutting_down() || *shutdown_rx.borrow() {
                    break;
                }
                let flushing = outbox.clone();
                match tokio::task::spawn_blocking(move || flushing.flush()).await {
                    Ok(Ok(true)) => {
                        debug!("Flush found work, flushing again");
                    }
                    Ok(Ok(false)) => break,
                    Ok(Err(e)) => {
                        warn!(error = %e, "Flush failed");
                        break;
                    }
                    Err(e) => {
                        error!(error = %e, "Flush panicked");
                        break;
                    }
                }
            }
        }

        info!("Flush loop stopped");
    });

    FlushLoopHandle { shutdown, handle }
}
