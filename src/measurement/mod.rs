//! Measurement state machine
//!
//! One pass per trigger: arm the pointer, acquire the raw vectors and a
//! bounded distance read, run them through the calibration model, check for
//! field anomalies, then commit the leg or reject the shot. Every failure
//! here is handled locally: the operator sees a message and hears a sad
//! tone, the buffer and the model stay as they were.

pub mod laser;

use std::rc::Rc;
use std::time::Duration;

use log::{debug, info, warn};
use nalgebra::Vector3;
use tokio::time::sleep;

use crate::api::formatting::{LegView, TripFormatter};
use crate::api::wireless::forward_leg;
use crate::core::constants::POINTER_SETTLE;
use crate::core::{Button, Click, InputEvent, Leg, RemoteCommand};
use crate::hardware::{Hardware, HardwareError, Tune};
use crate::supervisor::DeviceContext;
use crate::utils::Config;
use crate::validation::{check_anomaly, Anomaly, ErrorKind};

pub use laser::{flash_pointer, read_distance, set_pointer, DisplayPause, LaserGate};

/// Why a shot was rejected
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum MeasureError {
    #[error("rangefinder gave no answer within {0:?}")]
    SensorTimeout(Duration),
    #[error(transparent)]
    SensorFault(#[from] HardwareError),
    #[error(transparent)]
    Anomaly(#[from] Anomaly),
    #[error("no calibration loaded")]
    NotCalibrated,
    /// Field vectors parallel or zero, so no heading exists
    #[error("orientation is undefined for this reading")]
    Degenerate,
}

impl MeasureError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            MeasureError::SensorTimeout(_) => ErrorKind::SensorTimeout,
            MeasureError::SensorFault(_) | MeasureError::Degenerate => ErrorKind::SensorFault,
            MeasureError::Anomaly(Anomaly::Magnetic { .. }) => ErrorKind::MagneticAnomaly,
            MeasureError::Anomaly(Anomaly::Gravity { .. }) => ErrorKind::GravityAnomaly,
            MeasureError::Anomaly(Anomaly::Dip { .. }) => ErrorKind::DipAnomaly,
            MeasureError::NotCalibrated => ErrorKind::NotCalibrated,
        }
    }

    /// Timeouts skip the pointer flash: the rangefinder is already not answering
    pub fn flashes_pointer(&self) -> bool {
        !matches!(self, MeasureError::SensorTimeout(_))
    }
}

/// Sensor values for one shot, axis-mapped but uncalibrated
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RawReading {
    pub mag: Vector3<f64>,
    pub grav: Vector3<f64>,
    /// Raw laser distance (metres), absent when the read was skipped
    pub distance: Option<f64>,
}

/// Both field vectors in device axes
pub fn read_vectors<H: Hardware>(ctx: &DeviceContext<H>) -> Result<(Vector3<f64>, Vector3<f64>), MeasureError> {
    let mag = ctx.hw.magnetic()?;
    let grav = ctx.hw.acceleration()?;
    let config = ctx.config.borrow();
    let config = config.config();
    Ok((config.mag_axes.apply(&mag), config.grav_axes.apply(&grav)))
}

pub async fn acquire<H: Hardware>(ctx: &DeviceContext<H>, with_distance: bool) -> Result<RawReading, MeasureError> {
    let (mag, grav) = read_vectors(ctx)?;
    debug!("Mag: {:?} Grav: {:?}", mag.as_slice(), grav.as_slice());
    let distance = if with_distance { Some(read_distance(ctx).await?) } else { None };
    Ok(RawReading { mag, grav, distance })
}

/// Calibrate, validate, and apply the laser offset
pub fn compute_leg(config: &Config, raw: &RawReading) -> Result<Leg, MeasureError> {
    let model = config.calibration.as_ref().ok_or(MeasureError::NotCalibrated)?;
    let orientation = model.orientation(&raw.mag, &raw.grav).ok_or(MeasureError::Degenerate)?;
    if let Some(thresholds) = config.anomaly_strictness.thresholds() {
        check_anomaly(&model.observe(&raw.mag, &raw.grav), &model.reference(), &thresholds)?;
    }
    let distance = raw.distance.unwrap_or(0.0) + config.laser_offset;
    Ok(Leg::new(orientation.azimuth, orientation.inclination, distance))
}

/// Arm, acquire and transform one shot. Nothing is stored.
pub async fn take_reading<H: Hardware>(ctx: &Rc<DeviceContext<H>>) -> Result<Leg, MeasureError> {
    // A new shot supersedes any diagnostic still blinking
    ctx.laser.cancel_flash();
    set_pointer(&ctx.laser, &ctx.hw, true).await?;
    sleep(POINTER_SETTLE).await;
    let raw = acquire(ctx, true).await?;
    let config = ctx.config.borrow();
    compute_leg(config.config(), &raw)
}

fn show_current<H: Hardware>(ctx: &DeviceContext<H>) {
    let readings = ctx.readings.borrow();
    let (Some(leg), Some(index)) = (readings.current(), readings.cursor()) else {
        return;
    };
    let config = ctx.config.borrow();
    let config = config.config();
    ctx.hw.show_leg(&LegView::new(leg, index, config.units, config.angles));
}

pub async fn commit<H: Hardware>(ctx: &DeviceContext<H>, leg: Leg) {
    info!("Leg: {:.1}° {:+.1}° {:.2}m", leg.azimuth, leg.inclination, leg.distance);
    let (triple, index) = {
        let mut readings = ctx.readings.borrow_mut();
        readings.store(leg);
        (readings.triple_shot(), readings.cursor().unwrap_or(-1))
    };
    forward_leg(&ctx.hw, &leg);

    let (units, angles, save) = {
        let config = ctx.config.borrow();
        let config = config.config();
        (config.units, config.angles, config.save_readings)
    };
    ctx.hw.show_leg(&LegView::new(&leg, index, units, angles).with_triple(triple));
    if save {
        let formatter = TripFormatter::new(units, angles);
        if let Err(e) = ctx.trip_log.borrow_mut().append(&ctx.storage, &formatter, &leg) {
            warn!("Leg not written to trip log: {}", e);
        }
    }

    ctx.hw.play(Tune::Bip).await;
    if triple {
        debug!("Triple shot");
        ctx.hw.play(Tune::TripleShot).await;
    }
}

pub async fn reject<H: Hardware>(ctx: &Rc<DeviceContext<H>>, error: &MeasureError) {
    let kind = error.kind();
    info!("Shot rejected ({}): {}", kind, error);
    ctx.hw.show_info(kind.operator_message());
    if error.flashes_pointer() {
        flash_pointer(ctx);
    }
    ctx.hw.play(Tune::Sad).await;
}

/// Full per-shot pipeline
pub async fn shoot<H: Hardware>(ctx: &Rc<DeviceContext<H>>) -> Result<Leg, MeasureError> {
    match take_reading(ctx).await {
        Ok(leg) => {
            commit(ctx, leg).await;
            Ok(leg)
        }
        Err(e) => {
            reject(ctx, &e).await;
            Err(e)
        }
    }
}

/// Shot timer: one `Bop` per second of countdown
async fn countdown<H: Hardware>(ctx: &DeviceContext<H>) {
    let seconds = ctx.config.borrow().config().shot_timer;
    for remaining in (1..=seconds).rev() {
        ctx.hw.show_info(&format!("Shot in\n{}s", remaining));
        let tick = sleep(Duration::from_secs(1));
        ctx.hw.play(Tune::Bop).await;
        tick.await;
    }
}

fn is_trigger(event: &InputEvent) -> bool {
    event.is_click(Button::A, Click::Single)
        || event.is_click(Button::B, Click::Single)
        || event.is_click(Button::B, Click::Double)
        || *event == InputEvent::Remote(RemoteCommand::TakeShot)
}

/// Measure-mode foreground task. A shoots, B steps back through the buffer,
/// a B double-click jumps back to the newest leg, a remote take-shot command
/// shoots without the timer.
pub async fn measure_task<H: Hardware>(ctx: Rc<DeviceContext<H>>) {
    info!("Measure task started");
    let mut input = ctx.inputs.subscribe();
    ctx.hw.show_start_screen();
    if let Err(e) = set_pointer(&ctx.laser, &ctx.hw, true).await {
        warn!("Pointer did not switch on: {}", e);
    }
    show_current(&ctx);

    loop {
        match input.wait_for(is_trigger).await {
            InputEvent::Button(Button::A, _) => {
                countdown(&ctx).await;
                let _ = shoot(&ctx).await;
            }
            InputEvent::Remote(_) => {
                let _ = shoot(&ctx).await;
            }
            InputEvent::Button(Button::B, Click::Double) => {
                debug!("Reviewing newest leg");
                ctx.readings.borrow_mut().review_newest();
                show_current(&ctx);
            }
            _ => {
                debug!("Reviewing previous leg");
                ctx.readings.borrow_mut().previous();
                show_current(&ctx);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hardware::mock::{LaserResponse, ScreenEvent};
    use crate::supervisor::testing::{calibrated_config, rig, run_local};
    use crate::utils::ConfigStore;
    use approx::assert_abs_diff_eq;
    use std::fs;

    #[tokio::test(start_paused = true)]
    async fn test_slow_rangefinder_times_out_without_flash() {
        run_local(async {
            let rig = rig(calibrated_config());
            rig.ctx.hw.push_laser(LaserResponse::Hang);

            let started = tokio::time::Instant::now();
            let err = shoot(&rig.ctx).await.unwrap_err();
            assert_eq!(err.kind(), ErrorKind::SensorTimeout);
            assert!(started.elapsed() >= Duration::from_secs(3));

            assert!(rig.ctx.readings.borrow().is_empty());
            assert_eq!(rig.ctx.hw.tunes(), vec![Tune::Sad]);
            assert!(!rig.ctx.laser.is_flashing());
            sleep(Duration::from_secs(2)).await;
            assert!(!rig.ctx.hw.pointer_log().contains(&false));
            assert_eq!(rig.ctx.hw.last_info().as_deref(), Some("Laser\nTimeout"));
            // Display refresh resumed even though the read was abandoned
            let events = rig.ctx.hw.screen_events();
            let sleep_at = events.iter().position(|e| *e == ScreenEvent::Sleep).unwrap();
            assert!(events[sleep_at..].contains(&ScreenEvent::Wake));
        })
        .await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_successful_shot_is_committed() {
        run_local(async {
            let mut config = calibrated_config();
            config.set_laser_offset(0.12).unwrap();
            let rig = rig(config);
            rig.ctx.hw.set_default_distance(4.5);

            let leg = shoot(&rig.ctx).await.unwrap();
            assert_abs_diff_eq!(leg.azimuth, 0.0, epsilon = 1e-9);
            assert_abs_diff_eq!(leg.inclination, 0.0, epsilon = 1e-9);
            assert_abs_diff_eq!(leg.distance, 4.62, epsilon = 1e-12);

            assert_eq!(rig.ctx.readings.borrow().len(), 1);
            assert_eq!(rig.ctx.hw.sent_legs(), vec![leg]);
            assert_eq!(rig.ctx.hw.tunes(), vec![Tune::Bip]);

            let events = rig.ctx.hw.screen_events();
            let sleep_at = events.iter().position(|e| *e == ScreenEvent::Sleep).unwrap();
            let wake_at = events.iter().position(|e| *e == ScreenEvent::Wake).unwrap();
            assert!(sleep_at < wake_at);
            match events.last() {
                Some(ScreenEvent::Leg(view)) => {
                    assert_eq!(view.index, -1);
                    assert_eq!(view.distance, "4.62m");
                    assert!(!view.triple);
                }
                other => panic!("expected a leg on screen, got {other:?}"),
            }
        })
        .await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_uncalibrated_device_refuses_and_flashes() {
        run_local(async {
            let rig = rig(ConfigStore::default());
            let err = shoot(&rig.ctx).await.unwrap_err();
            assert_eq!(err, MeasureError::NotCalibrated);
            assert_eq!(rig.ctx.hw.last_info().as_deref(), Some("Calibration\nneeded\nHold B 3s"));

            sleep(Duration::from_secs(2)).await;
            let log = rig.ctx.hw.pointer_log();
            assert_eq!(log.iter().filter(|on| !**on).count(), 5);
            assert!(rig.ctx.hw.pointer());
            assert!(!rig.ctx.hw.saw_interleaving());
            assert!(rig.ctx.readings.borrow().is_empty());
        })
        .await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_anomalies_are_classified() {
        run_local(async {
            let rig = rig(calibrated_config());
            rig.ctx.hw.set_field(Vector3::new(0.0, 30.0, -67.5), Vector3::new(0.0, 0.0, 9.81));
            assert_eq!(shoot(&rig.ctx).await.unwrap_err().kind(), ErrorKind::MagneticAnomaly);

            rig.ctx.hw.set_field(Vector3::new(0.0, 20.0, -45.0), Vector3::new(0.0, 0.0, 11.0));
            assert_eq!(shoot(&rig.ctx).await.unwrap_err().kind(), ErrorKind::GravityAnomaly);

            // Same strength, dip rotated by roughly 10°
            rig.ctx.hw.set_field(Vector3::new(0.0, 27.4, -41.0), Vector3::new(0.0, 0.0, 9.81));
            assert_eq!(shoot(&rig.ctx).await.unwrap_err().kind(), ErrorKind::DipAnomaly);

            assert!(rig.ctx.readings.borrow().is_empty());
            assert_eq!(rig.ctx.hw.tunes(), vec![Tune::Sad; 3]);
        })
        .await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_anomaly_checks_can_be_disabled() {
        run_local(async {
            let mut config = calibrated_config();
            config.set_anomaly_strictness(crate::validation::StrictnessLevel::Off);
            let rig = rig(config);
            rig.ctx.hw.set_field(Vector3::new(0.0, 30.0, -67.5), Vector3::new(0.0, 0.0, 9.81));
            assert!(shoot(&rig.ctx).await.is_ok());
        })
        .await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_sensor_fault_is_reported() {
        run_local(async {
            let rig = rig(calibrated_config());
            rig.ctx.hw.set_sensor_fault(Some(HardwareError::NotResponding { device: "magnetometer" }));
            let err = shoot(&rig.ctx).await.unwrap_err();
            assert_eq!(err.kind(), ErrorKind::SensorFault);
            assert!(err.flashes_pointer());
            assert_eq!(rig.ctx.hw.measure_calls(), 0);
        })
        .await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_third_matching_shot_plays_triple_cue() {
        run_local(async {
            let rig = rig(calibrated_config());
            for _ in 0..3 {
                shoot(&rig.ctx).await.unwrap();
            }
            assert_eq!(rig.ctx.hw.tunes(), vec![Tune::Bip, Tune::Bip, Tune::Bip, Tune::TripleShot]);
        })
        .await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_saved_readings_go_to_trip_log() {
        run_local(async {
            let mut config = calibrated_config();
            config.set_save_readings(true);
            let rig = rig(config);
            shoot(&rig.ctx).await.unwrap();
            rig.ctx.trip_log.borrow_mut().flush().unwrap();
            let text = fs::read_to_string(rig.ctx.storage.readings_dir().join("Trip00001.csv")).unwrap();
            assert_eq!(text, "Distance, Compass, Clino\n5.0, 0.0, 0.000\n");
        })
        .await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_measure_task_buttons_and_remote() {
        run_local(async {
            let mut config = calibrated_config();
            config.set_shot_timer(3).unwrap();
            let rig = rig(config);
            let task = tokio::task::spawn_local(measure_task(rig.ctx.clone()));
            sleep(Duration::from_millis(10)).await;
            assert!(rig.ctx.hw.pointer());

            rig.ctx.inputs.publish(InputEvent::Button(Button::A, Click::Single));
            sleep(Duration::from_secs(2)).await;
            assert_eq!(rig.ctx.hw.measure_calls(), 0, "countdown still running");
            sleep(Duration::from_secs(2)).await;
            assert_eq!(rig.ctx.hw.measure_calls(), 1);
            assert_eq!(rig.ctx.hw.tunes(), vec![Tune::Bop, Tune::Bop, Tune::Bop, Tune::Bip]);

            // Remote shots skip the timer
            rig.ctx.inputs.publish(InputEvent::Remote(RemoteCommand::TakeShot));
            sleep(Duration::from_millis(500)).await;
            assert_eq!(rig.ctx.readings.borrow().len(), 2);

            rig.ctx.inputs.publish(InputEvent::Button(Button::B, Click::Single));
            sleep(Duration::from_millis(10)).await;
            assert_eq!(rig.ctx.readings.borrow().cursor(), Some(-2));
            rig.ctx.inputs.publish(InputEvent::Button(Button::B, Click::Single));
            sleep(Duration::from_millis(10)).await;
            assert_eq!(rig.ctx.readings.borrow().cursor(), Some(-2));

            rig.ctx.inputs.publish(InputEvent::Button(Button::B, Click::Double));
            sleep(Duration::from_millis(10)).await;
            assert_eq!(rig.ctx.readings.borrow().cursor(), Some(-1));
            assert_eq!(rig.ctx.readings.borrow().len(), 2);

            task.abort();
        })
        .await;
    }
}
