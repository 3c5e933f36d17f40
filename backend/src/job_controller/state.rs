//! Drives the background import worker.
//!
//! Queued rows are processed outside the request/response cycle by a single
//! long-running scheduler task spawned in `main.rs`. The task wakes up on a
//! fixed interval and whenever the CSV reader dispatches a batch, and each
//! wake-up runs one bounded drain through [`ImportController::drain`].
//!
//! - `DrainSignal`: message sent on the scheduler channel to request an early
//!   drain. Senders use `try_send`; a full channel already holds a pending
//!   wake-up, so dropping the signal loses nothing.
//! - `start_drain_scheduler`: the loop itself. It never runs two drains at
//!   once; the controller's drain guard also turns concurrent calls made from
//!   elsewhere into no-ops.

use crate::controller::ImportController;
use log::{debug, error, info};
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::time::MissedTickBehavior;

/// Capacity of the scheduler channel. One pending signal is enough to
/// guarantee another drain.
pub const SIGNAL_BUFFER: usize = 16;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DrainSignal {
    /// The CSV reader wrote a batch to the queue.
    BatchQueued,
    /// The previous drain used its whole budget; work is probably left.
    Backlog,
}

/// Runs until the channel closes. Meant to be spawned once per process.
pub async fn start_drain_scheduler(
    controller: ImportController,
    mut rx: mpsc::Receiver<DrainSignal>,
    interval: Duration,
) {
    let mut ticker = tokio::time::interval(interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    info!("drain scheduler started, interval {:?}", interval);

    loop {
        tokio::select! {
            _ = ticker.tick() => {}
            signal = rx.recv() => match signal {
                Some(signal) => debug!("drain requested: {:?}", signal),
                None => break,
            },
        }

        match controller.drain().await {
            Ok(Some(report)) if report.claimed >= controller.drain_budget().max_items => {
                let _ = controller.signal().try_send(DrainSignal::Backlog);
            }
            Ok(_) => {}
            Err(e) => error!("drain failed: {}", e),
        }
    }
    info!("drain scheduler stopped");
}
