//! Shutdown sequence
//!
//! Runs once per session, after the shutdown signal is set. Every step is
//! bounded: the only waits are a single yield and, after a fault, the fixed
//! display window during which the watchdog keeps being fed.

use log::{error, info, warn};
use tokio::task::{JoinHandle, JoinSet};
use tokio::time::{sleep, Instant};

use crate::core::constants::{FAULT_DISPLAY_WINDOW, WATCHDOG_FEED_INTERVAL};
use crate::hardware::{Hardware, Tune};
use crate::validation::Fault;

use super::context::DeviceContext;
use super::signal::Outcome;

/// Keep the fault on screen for the display window, feeding the watchdog
async fn hold_fault_display<H: Hardware>(ctx: &DeviceContext<H>, fault: &Fault) {
    ctx.hw.show_info(&fault.summary());
    let until = Instant::now() + FAULT_DISPLAY_WINDOW;
    while Instant::now() < until {
        sleep(WATCHDOG_FEED_INTERVAL).await;
        if ctx.hw.is_armed() {
            if let Err(e) = ctx.hw.feed() {
                warn!("Watchdog feed failed during fault display: {}", e);
            }
        }
    }
}

/// Tear the session down. Returns whether it ended cleanly.
pub async fn shutdown_sequence<H: Hardware>(
    ctx: &DeviceContext<H>,
    monitors: &mut JoinSet<()>,
    foreground: Option<JoinHandle<()>>,
) -> bool {
    let outcome = ctx.shutdown.outcome();
    ctx.shutdown.close();

    monitors.abort_all();
    if let Some(task) = foreground {
        task.abort();
    }
    ctx.laser.cancel_flash();

    if let Err(e) = ctx.config.borrow_mut().save_if_dirty(&ctx.storage) {
        warn!("Configuration not saved: {}", e);
    }
    tokio::task::yield_now().await;

    let clean = match &outcome {
        Outcome::Planned(reason) => {
            info!("Shutting down: {}", reason);
            true
        }
        Outcome::Fault(fault) => {
            error!("Shutting down after fault:\n{}", fault.report());
            ctx.storage.write_diagnostic(&fault.report());
            hold_fault_display(ctx, fault).await;
            false
        }
        Outcome::Continue => {
            warn!("Shutting down without a recorded reason");
            true
        }
    };

    if let Err(e) = ctx.trip_log.borrow_mut().flush() {
        warn!("Trip log not flushed: {}", e);
    }
    ctx.hw.play(if clean { Tune::Shutdown } else { Tune::Sad }).await;
    ctx.hw.disable();
    info!("Shutdown complete ({})", if clean { "clean" } else { "unclean" });
    clean
}
