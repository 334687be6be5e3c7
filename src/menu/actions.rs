//! Menu item actions
//!
//! Each action owns the screen and both buttons until it returns. None of
//! them persists anything except through the config store, the calibration
//! sample file and the calibration-due marker.

use std::rc::Rc;

use log::{debug, info, warn};
use tokio::time::{interval, MissedTickBehavior};

use crate::calibration::{CalibrationOptions, CalibrationOutcome, SampleBatch};
use crate::core::constants::{INFO_REFRESH_INTERVAL, LASER_CAL_DISTANCE, LASER_CAL_SHOTS};
use crate::core::{Button, Click, InputEvent, InputReceiver};
use crate::hardware::{Hardware, Tune};
use crate::measurement::{acquire, read_distance, read_vectors, set_pointer, MeasureError};
use crate::supervisor::{DeviceContext, ShutdownReason};
use crate::validation::error::summarize;

const NOT_CALIBRATED: &str = "Device not\ncalibrated";

fn a_or_b(event: &InputEvent) -> bool {
    event.is_click(Button::A, Click::Single) || event.is_click(Button::B, Click::Single)
}

/// True for A, false for B
async fn confirm(input: &mut InputReceiver) -> bool {
    input.wait_for(a_or_b).await.is_click(Button::A, Click::Single)
}

async fn complain<H: Hardware>(ctx: &DeviceContext<H>, text: &str) {
    ctx.hw.show_info(text);
    ctx.hw.play(Tune::Sad).await;
}

/// Record raw sample pairs until B, then restart into the calibration run
pub async fn calibrate_sensors<H: Hardware>(ctx: &Rc<DeviceContext<H>>) {
    let min_samples = CalibrationOptions::default().min_samples;
    let mut input = ctx.inputs.subscribe();
    let mut batch = SampleBatch::default();
    loop {
        ctx.hw.show_info(&format!("Calibration\nShots: {}\nA: record\nB: finish", batch.len()));
        if input.wait_for(a_or_b).await.is_click(Button::A, Click::Single) {
            match acquire(ctx.as_ref(), false).await {
                Ok(raw) => {
                    batch.push(raw.mag, raw.grav);
                    debug!("Calibration sample {}: {:?} {:?}", batch.len(), raw.mag.as_slice(), raw.grav.as_slice());
                    ctx.hw.play(Tune::Bip).await;
                }
                Err(e) => {
                    warn!("Calibration sample not taken: {}", e);
                    complain(ctx, e.kind().operator_message()).await;
                }
            }
            continue;
        }
        if batch.len() >= min_samples {
            break;
        }
        complain(ctx, &format!("Need at least\n{} shots\nHave {}", min_samples, batch.len())).await;
    }

    let path = ctx.storage.calibration_data_path();
    if let Err(e) = ctx.storage.write(&path, batch.to_json().as_bytes()) {
        warn!("Calibration samples not saved: {}", e);
        complain(ctx, "Could not\nsave samples").await;
        return;
    }
    info!("Saved {} calibration samples", batch.len());
    ctx.markers.set_calibration_due();
    ctx.hw.show_info("Restarting\nto calibrate");
    ctx.request_shutdown(ShutdownReason::CalibrationRestart);
}

/// Re-run the fit on the last saved capture
pub async fn cal_from_saved<H: Hardware>(ctx: &Rc<DeviceContext<H>>) {
    if !ctx.storage.calibration_data_path().exists() {
        complain(ctx, "No saved\ncalibration data").await;
        return;
    }
    ctx.markers.set_calibration_due();
    ctx.hw.show_info("Restarting\nto calibrate");
    ctx.request_shutdown(ShutdownReason::CalibrationRestart);
}

/// Average shots at a known distance and derive the laser offset
pub async fn calibrate_laser<H: Hardware>(ctx: &Rc<DeviceContext<H>>) {
    let mut input = ctx.inputs.subscribe();
    ctx.hw.show_info("Place device\n1m from an object\nand press A");
    input.wait_click(Button::A, Click::Single).await;
    if let Err(e) = set_pointer(&ctx.laser, &ctx.hw, true).await {
        warn!("Pointer did not switch on: {}", e);
    }

    let mut total = 0.0;
    for shot in 0..LASER_CAL_SHOTS {
        ctx.hw.show_info(&format!("Measuring\n{}/{}", shot + 1, LASER_CAL_SHOTS));
        match read_distance(ctx.as_ref()).await {
            Ok(distance) => {
                total += distance;
                ctx.hw.play(Tune::Bip).await;
            }
            Err(e) => {
                warn!("Laser calibration aborted: {}", e);
                complain(ctx, e.kind().operator_message()).await;
                return;
            }
        }
    }
    let offset = LASER_CAL_DISTANCE - total / LASER_CAL_SHOTS as f64;
    info!("Laser offset measured as {:.3}m", offset);

    if !(-0.05..=0.2).contains(&offset) {
        ctx.hw.show_info(&format!("Offset is {:.3}m\nAre you sure?\nA: yes  B: no", offset));
        if !confirm(&mut input).await {
            ctx.hw.show_info("Laser offset\nunchanged");
            return;
        }
    }
    let result = ctx.config.borrow_mut().set_laser_offset(offset);
    match result {
        Ok(_) => {
            ctx.hw.show_info(&format!("Laser offset\n{:.3}m", offset));
            ctx.hw.play(Tune::Bip).await;
        }
        Err(e) => {
            warn!("Laser offset rejected: {}", e);
            complain(ctx, "Offset out\nof range").await;
        }
    }
}

/// Live screen, redrawn until A is clicked
async fn live_view<H, F>(ctx: &DeviceContext<H>, render: F)
where
    H: Hardware,
    F: Fn(&DeviceContext<H>) -> String,
{
    let mut input = ctx.inputs.subscribe();
    let mut refresh = interval(INFO_REFRESH_INTERVAL);
    refresh.set_missed_tick_behavior(MissedTickBehavior::Delay);
    loop {
        tokio::select! {
            _ = input.wait_click(Button::A, Click::Single) => return,
            _ = refresh.tick() => ctx.hw.show_info(&render(ctx)),
        }
    }
}

fn raw_text<H: Hardware>(ctx: &DeviceContext<H>) -> String {
    match read_vectors(ctx) {
        Ok((m, g)) => format!(
            "Mag\n{:.1} {:.1} {:.1}\nGrav\n{:.2} {:.2} {:.2}",
            m.x, m.y, m.z, g.x, g.y, g.z
        ),
        Err(e) => e.kind().operator_message().to_string(),
    }
}

fn calibrated_text<H: Hardware>(ctx: &DeviceContext<H>) -> String {
    let (mag, grav) = match read_vectors(ctx) {
        Ok(vectors) => vectors,
        Err(e) => return e.kind().operator_message().to_string(),
    };
    let config = ctx.config.borrow();
    let Some(model) = config.config().calibration.as_ref() else {
        return NOT_CALIBRATED.to_string();
    };
    let (m, g) = model.correct(&mag, &grav);
    let seen = model.observe(&mag, &grav);
    format!(
        "Mag {:.3} {:.3} {:.3}\nGrav {:.3} {:.3} {:.3}\n|m| {:.3} |g| {:.3}\nDip {:.1}°",
        m.x, m.y, m.z, g.x, g.y, g.z, seen.mag_strength, seen.grav_strength, seen.dip
    )
}

fn orientation_text<H: Hardware>(ctx: &DeviceContext<H>) -> String {
    let (mag, grav) = match read_vectors(ctx) {
        Ok(vectors) => vectors,
        Err(e) => return e.kind().operator_message().to_string(),
    };
    let config = ctx.config.borrow();
    let Some(model) = config.config().calibration.as_ref() else {
        return NOT_CALIBRATED.to_string();
    };
    match model.orientation(&mag, &grav) {
        Some(o) => format!(
            "Compass {:.1}°\nClino {:+.1}°\nRoll {:.1}°\nDip {:.1}°",
            o.azimuth,
            o.inclination,
            o.roll,
            model.observe(&mag, &grav).dip
        ),
        None => MeasureError::Degenerate.kind().operator_message().to_string(),
    }
}

fn device_text<H: Hardware>(ctx: &DeviceContext<H>) -> String {
    let (major, minor, patch) = ctx.markers.hardware_version();
    let battery = match ctx.hw.voltage() {
        Ok(volts) => format!("{:.2}V", volts),
        Err(_) => "unknown".to_string(),
    };
    let config = ctx.config.borrow();
    let calibration = match config.config().calibration.as_ref() {
        Some(model) => format!("{:.3}°", model.accuracy),
        None => "none".to_string(),
    };
    format!(
        "HW v{}.{}.{}  SW v{}\nBattery {}\nCal {}\nLegs {}",
        major,
        minor,
        patch,
        env!("CARGO_PKG_VERSION"),
        battery,
        calibration,
        ctx.readings.borrow().len()
    )
}

pub async fn raw_readings<H: Hardware>(ctx: &Rc<DeviceContext<H>>) {
    live_view(ctx.as_ref(), raw_text).await;
}

pub async fn calibrated_readings<H: Hardware>(ctx: &Rc<DeviceContext<H>>) {
    live_view(ctx.as_ref(), calibrated_text).await;
}

pub async fn orientation<H: Hardware>(ctx: &Rc<DeviceContext<H>>) {
    live_view(ctx.as_ref(), orientation_text).await;
}

pub async fn device_info<H: Hardware>(ctx: &Rc<DeviceContext<H>>) {
    live_view(ctx.as_ref(), device_text).await;
}

fn result_text(outcome: &CalibrationOutcome) -> String {
    format!(
        "Accuracy is {:.3}°\nThis is {}\nPress A to Save\nB to Discard",
        outcome.accuracy(),
        outcome.band.label()
    )
}

/// Let the operator accept or discard the fit from this session's start
pub async fn show_calibration_result<H: Hardware>(ctx: &Rc<DeviceContext<H>>) {
    let mut input = ctx.inputs.subscribe();
    let outcome = match ctx.take_calibration_result() {
        Some(Ok(outcome)) => outcome,
        Some(Err(e)) => {
            warn!("Calibration failed: {}", e);
            complain(ctx, &format!("Calibration\nfailed\n{}", summarize(&e.to_string(), 18, 3))).await;
            input.wait_click(Button::A, Click::Single).await;
            return;
        }
        None => {
            warn!("No calibration result to show");
            return;
        }
    };

    ctx.hw.show_info(&result_text(&outcome));
    if confirm(&mut input).await {
        let previous = ctx.config.borrow_mut().set_calibration(outcome.model);
        info!("Calibration accepted, replacing {}", if previous.is_some() { "the old model" } else { "no model" });
        ctx.hw.show_info("Calibration\nsaved");
        ctx.hw.play(Tune::Bip).await;
    } else {
        info!("Calibration discarded");
        ctx.hw.show_info("Calibration\ndiscarded");
        ctx.hw.play(Tune::Bop).await;
    }
}
