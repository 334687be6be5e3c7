//! Wake-to-sleep session lifecycle
//!
//! A session starts when the device wakes and ends with the supervisor's
//! shutdown sequence. Around it sit the steps that only make sense between
//! sessions: the start-up battery gate, a calibration run requested by the
//! previous session, and the choice between resetting and light sleep.

use std::rc::Rc;

use log::{info, warn};

use crate::calibration::{CalibrationEngine, CalibrationOutcome, CalibrationResult, SampleBatch};
use crate::core::constants::{IDLE_SLEEP, READING_CAPACITY, STARTUP_MIN_VOLTAGE};
use crate::core::Mode;
use crate::hardware::{Battery, DeepSleep, Hardware, WakeAlarm};
use crate::menu::MenuAction;
use crate::processing::ReadingBuffer;

use super::context::{DeviceContext, ModeRequests};
use super::signal::{Outcome, ShutdownReason};
use super::Supervisor;

/// The device refuses to start on a nearly flat battery
pub fn startup_allowed<B: Battery>(battery: &B) -> bool {
    match battery.voltage() {
        Ok(volts) if volts < STARTUP_MIN_VOLTAGE => {
            warn!("Battery at {:.2}V, not starting", volts);
            false
        }
        Ok(_) => true,
        Err(e) => {
            warn!("Battery voltage unavailable, starting anyway: {}", e);
            true
        }
    }
}

/// Fit the saved samples if the previous session asked for it.
///
/// The marker is cleared before fitting, so a fit that brings the device
/// down is not retried on every wake.
pub fn calibrate_if_due<H>(
    ctx: &DeviceContext<H>,
    engine: &CalibrationEngine,
) -> Option<CalibrationResult<CalibrationOutcome>> {
    if !ctx.markers.calibration_due() {
        return None;
    }
    ctx.markers.clear();
    info!("Calibration due, fitting saved samples");
    let result = SampleBatch::load(&ctx.storage.calibration_data_path()).and_then(|batch| engine.calibrate(&batch));
    match &result {
        Ok(outcome) => info!("Calibration accuracy {:.3}° ({})", outcome.accuracy(), outcome.band.label()),
        Err(e) => warn!("Calibration failed: {}", e),
    }
    Some(result)
}

/// What a finished session leaves behind
#[derive(Debug, Clone, PartialEq)]
pub struct SessionReport {
    pub clean: bool,
    pub outcome: Outcome,
    /// Reading buffer, encoded for retained memory
    pub readings: Vec<u8>,
    /// Any operator or remote input arrived during the session
    pub used: bool,
}

impl SessionReport {
    /// A reset is needed after a fault or to run a pending calibration
    pub fn needs_reset(&self) -> bool {
        !self.clean || self.outcome == Outcome::Planned(ShutdownReason::CalibrationRestart)
    }
}

/// Run one session from wake to shutdown
pub async fn run_session<H: Hardware>(
    ctx: Rc<DeviceContext<H>>,
    modes: ModeRequests,
    retained: &[u8],
    initial: Mode,
    engine: &CalibrationEngine,
) -> SessionReport {
    ctx.readings.replace(ReadingBuffer::from_bytes(retained, READING_CAPACITY));
    let mut initial = initial;
    match calibrate_if_due(&ctx, engine) {
        Some(Err(e)) if e.kind().escalates() => {
            ctx.raise(e.kind(), "calibration", e.to_string());
        }
        Some(result) => {
            ctx.set_calibration_result(result);
            ctx.set_pending_action(MenuAction::ShowCalibrationResult);
            initial = Mode::MenuItem;
        }
        None => {}
    }

    let clean = Supervisor::new(Rc::clone(&ctx), modes).run(initial).await;
    SessionReport {
        clean,
        outcome: ctx.shutdown.outcome(),
        readings: ctx.readings.borrow().to_bytes(),
        used: ctx.inputs.published() > 0,
    }
}

/// Reset or sleep once a session is over. Returns the wake alarm after a
/// light sleep, `None` after a reset.
pub fn after_session<S: DeepSleep>(report: &SessionReport, sleep: &S) -> Option<WakeAlarm> {
    if report.needs_reset() {
        info!("Resetting device");
        sleep.reset();
        return None;
    }
    let mut alarms = vec![WakeAlarm::Button, WakeAlarm::UsbPower];
    if report.used {
        alarms.push(WakeAlarm::Timer(IDLE_SLEEP));
    }
    let alarm = sleep.light_sleep(&alarms);
    info!("Woken by {:?}", alarm);
    Some(alarm)
}
