//! The continuous read loop.
//!
//! Runs [`ReadCycle::read_once`] back to back while the active flag holds.
//! No cycle error escapes: each one is logged and followed by a fixed backoff.
//! Stopping is cooperative: a cycle in flight always runs to completion.

use std::time::Duration;
use tokio::sync::watch;
use tracing::{debug, error, info};

use crate::cycle::{ReadCycle, is_active};

/// Drive `cycle` until `active` turns false (or its sender is dropped).
pub async fn run(cycle: ReadCycle, mut active: watch::Receiver<bool>, backoff: Duration) {
    info!("Read loop started");

    while is_active(&active) {
        let Err(e) = cycle.read_once().await else {
            continue;
        };

        // Errors caused by a concurrent stop are not worth reporting.
        if !is_active(&active) {
            debug!(error = %e, "Cycle failed while stopping");
            break;
        }

        error!(error = %e, backoff_ms = backoff.as_millis() as u64, "Error in continuous read");
        tokio::select! {
            _ = tokio::time::sleep(backoff) => {}
            _ = stopped(&mut active) => {}
        }
    }

    info!("Read loop stopped");
}

/// Resolves once the flag is cleared or the bridge is gone.
async fn stopped(active: &mut watch::Receiver<bool>) {
    loop {
        let running = *active.borrow_and_update();
        if !running {
            return;
        }
        if active.changed().await.is_err() {
            return;
        }
    }
}
