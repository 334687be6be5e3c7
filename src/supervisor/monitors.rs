//! Background monitors
//!
//! Each monitor runs for the whole session and only ends by asking for a
//! shutdown or by being aborted from the shutdown sequence. None of them
//! holds a `RefCell` borrow across a suspension point.

use std::rc::Rc;

use log::{debug, info, warn};
use nalgebra::Vector3;
use tokio::time::{interval, sleep, timeout, Duration, MissedTickBehavior};

use crate::api::wireless::battery_percent;
use crate::core::constants::{
    BATTERY_POLL_INTERVAL, DOUBLE_CLICK_LOCKOUT, LOW_BATTERY_VOLTAGE, ORIENTATION_POLL_INTERVAL,
    WATCHDOG_FEED_INTERVAL, WIRELESS_POLL_INTERVAL,
};
use crate::core::{Button, Click, InputEvent, RemoteCommand};
use crate::hardware::Hardware;
use crate::measurement::set_pointer;
use crate::validation::ErrorKind;

use super::context::{DeviceContext, ModeRequest};
use super::signal::ShutdownReason;

/// Shut down after `config.timeout` seconds without any button or remote event
pub async fn inactivity<H: Hardware>(ctx: Rc<DeviceContext<H>>) {
    debug!("Inactivity monitor started");
    let mut input = ctx.inputs.subscribe();
    loop {
        let seconds = ctx.config.borrow().config().timeout;
        if timeout(Duration::from_secs(seconds), input.next()).await.is_err() {
            ctx.request_shutdown(ShutdownReason::Inactivity { seconds });
            return;
        }
    }
}

/// Double-click A quits, except for the tail of the wake gesture
pub async fn quit_on_double_click<H: Hardware>(ctx: Rc<DeviceContext<H>>) {
    debug!("Quit monitor started");
    let mut input = ctx.inputs.subscribe();
    loop {
        input.wait_click(Button::A, Click::Double).await;
        if ctx.uptime() < DOUBLE_CLICK_LOCKOUT {
            debug!("Ignoring double click {:?} after wake", ctx.uptime());
            continue;
        }
        ctx.request_shutdown(ShutdownReason::Quit);
        return;
    }
}

/// Long press on B swaps between measuring and the menu
pub async fn mode_toggle<H: Hardware>(ctx: Rc<DeviceContext<H>>) {
    debug!("Mode toggle monitor started");
    let mut input = ctx.inputs.subscribe();
    loop {
        input.wait_click(Button::B, Click::Long).await;
        ctx.request_mode(ModeRequest::Toggle);
    }
}

/// Feed the hardware watchdog once per interval.
///
/// The first failed feed is the watchdog's own grace tick after firing and
/// is tolerated. Any second failure in the session is fatal.
pub async fn watchdog_feeder<H: Hardware>(ctx: Rc<DeviceContext<H>>) {
    debug!("Watchdog feeder started");
    let mut ticker = interval(WATCHDOG_FEED_INTERVAL);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    let mut missed = 0u32;
    loop {
        ticker.tick().await;
        if let Err(e) = ctx.hw.feed() {
            missed += 1;
            if missed > 1 {
                ctx.raise(ErrorKind::UnclassifiedFault, "watchdog", format!("{} ({} failed feeds)", e, missed));
                return;
            }
            warn!("Watchdog feed failed, tolerating once: {}", e);
        }
    }
}

/// Track the wireless link and keep the peer's battery level current
pub async fn wireless_status<H: Hardware>(ctx: Rc<DeviceContext<H>>) {
    debug!("Wireless monitor started");
    let mut ticker = interval(WIRELESS_POLL_INTERVAL);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    let mut connected = None;
    loop {
        ticker.tick().await;
        let now = ctx.hw.is_connected();
        if connected != Some(now) {
            if now {
                info!("Wireless peer connected");
            } else if connected.is_some() {
                info!("Wireless peer disconnected");
            }
            connected = Some(now);
        }
        match ctx.hw.voltage() {
            Ok(volts) => ctx.hw.set_battery_level(battery_percent(volts)),
            Err(e) => debug!("Battery level not updated: {}", e),
        }
        let depth = ctx.hw.queue_depth();
        if depth > 0 {
            debug!("{} legs waiting for the peer", depth);
        }
    }
}

/// Escalate once the battery drops below the running floor
pub async fn battery_floor<H: Hardware>(ctx: Rc<DeviceContext<H>>) {
    debug!("Battery monitor started");
    loop {
        match ctx.hw.voltage() {
            Ok(volts) if volts < LOW_BATTERY_VOLTAGE => {
                ctx.raise(
                    ErrorKind::LowBattery,
                    "battery",
                    format!("{:.2}V is below the {:.1}V floor", volts, LOW_BATTERY_VOLTAGE),
                );
                return;
            }
            Ok(_) => {}
            Err(e) => warn!("Battery voltage unavailable: {}", e),
        }
        sleep(BATTERY_POLL_INTERVAL).await;
    }
}

/// Next display orientation. The screen flips once gravity along the
/// screen normal passes `-threshold` and only unflips past `+threshold`.
pub fn flip_state(flipped: bool, grav: &Vector3<f64>, threshold: f64) -> bool {
    let Some(up) = grav.try_normalize(f64::EPSILON) else {
        return flipped;
    };
    if flipped {
        up.z <= threshold
    } else {
        up.z < -threshold
    }
}

pub async fn orientation_flip<H: Hardware>(ctx: Rc<DeviceContext<H>>) {
    debug!("Orientation monitor started");
    let mut ticker = interval(ORIENTATION_POLL_INTERVAL);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    let mut flipped = false;
    loop {
        ticker.tick().await;
        let raw = match ctx.hw.acceleration() {
            Ok(raw) => raw,
            Err(e) => {
                debug!("Orientation skipped: {}", e);
                continue;
            }
        };
        let (grav, threshold) = {
            let config = ctx.config.borrow();
            let config = config.config();
            (config.grav_axes.apply(&raw), config.flip_threshold)
        };
        let next = flip_state(flipped, &grav, threshold);
        if next != flipped {
            debug!("Display flipped: {}", next);
            ctx.hw.set_flipped(next);
            flipped = next;
        }
    }
}

fn is_mode_independent(event: &InputEvent) -> bool {
    matches!(
        event,
        InputEvent::Remote(RemoteCommand::Shutdown | RemoteCommand::PointerOn | RemoteCommand::PointerOff)
    )
}

/// Remote commands honoured in every mode
pub async fn remote_commands<H: Hardware>(ctx: Rc<DeviceContext<H>>) {
    debug!("Remote command monitor started");
    let mut input = ctx.inputs.subscribe();
    loop {
        let on = match input.wait_for(is_mode_independent).await {
            InputEvent::Remote(RemoteCommand::Shutdown) => {
                ctx.request_shutdown(ShutdownReason::Remote);
                return;
            }
            InputEvent::Remote(RemoteCommand::PointerOff) => false,
            _ => true,
        };
        if let Err(e) = set_pointer(&ctx.laser, &ctx.hw, on).await {
            warn!("Remote pointer command failed: {}", e);
        }
    }
}
