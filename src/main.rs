use std::path::PathBuf;
use std::rc::Rc;
use std::time::Duration;

use clap::{Parser, ValueEnum};
use log::{debug, info, warn};
use nalgebra::Vector3;

use cave_survey::api::dispatch_inbound;
use cave_survey::calibration::model::dip_angle;
use cave_survey::core::READING_CAPACITY;
use cave_survey::hardware::{Accelerometer, Magnetometer, MockNvm, MockSleep, NonVolatileMemory, WakeAlarm};
use cave_survey::processing::ReadingBuffer;
use cave_survey::supervisor::{Outcome, ShutdownReason};
use cave_survey::{
    after_session, run_session, startup_allowed, Button, CalibrationEngine, CalibrationModel, Click,
    DeviceContext, InputEvent, MockHardware, Mode, Storage,
};

/// Run one instrument session against simulated hardware
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Storage root holding config.json, calibration data and trip logs
    #[arg(long, default_value = "sim-storage")]
    storage: PathBuf,

    /// Input script, one event per line
    #[arg(long)]
    script: Option<PathBuf>,

    /// Foreground mode to start in
    #[arg(long, value_enum, default_value_t = StartMode::Measure)]
    mode: StartMode,

    /// Use an identity calibration when the stored config has none
    #[arg(long, default_value_t = false)]
    identity_cal: bool,

    /// Log at debug level unless RUST_LOG says otherwise
    #[arg(short, long, default_value_t = false)]
    verbose: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum StartMode {
    Measure,
    Menu,
}

impl From<StartMode> for Mode {
    fn from(mode: StartMode) -> Self {
        match mode {
            StartMode::Measure => Mode::Measure,
            StartMode::Menu => Mode::Menu,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
enum Step {
    Input(InputEvent),
    Remote(Vec<u8>),
    Wait(Duration),
}

fn parse_hex(text: &str) -> Result<Vec<u8>, String> {
    let text = text.trim();
    if text.is_empty() || text.len() % 2 != 0 {
        return Err(format!("'{}' is not a whole number of hex bytes", text));
    }
    (0..text.len())
        .step_by(2)
        .map(|i| u8::from_str_radix(&text[i..i + 2], 16).map_err(|e| format!("'{}': {}", text, e)))
        .collect()
}

fn parse_step(line: &str) -> Result<Step, String> {
    let click = |button, kind| Ok(Step::Input(InputEvent::Button(button, kind)));
    match line {
        "a" => click(Button::A, Click::Single),
        "aa" => click(Button::A, Click::Double),
        "A" => click(Button::A, Click::Long),
        "b" => click(Button::B, Click::Single),
        "bb" => click(Button::B, Click::Double),
        "B" => click(Button::B, Click::Long),
        _ => {
            if let Some(hex) = line.strip_prefix("remote:") {
                return parse_hex(hex).map(Step::Remote);
            }
            if let Some(ms) = line.strip_prefix("wait:") {
                let ms = ms.trim().parse::<u64>().map_err(|e| format!("'{}': {}", line, e))?;
                return Ok(Step::Wait(Duration::from_millis(ms)));
            }
            Err(format!("unknown script event '{}'", line))
        }
    }
}

/// Parse a script, skipping blank lines and `#` comments
fn parse_script(text: &str) -> Result<Vec<Step>, String> {
    text.lines()
        .enumerate()
        .map(|(n, line)| (n + 1, line.trim()))
        .filter(|(_, line)| !line.is_empty() && !line.starts_with('#'))
        .map(|(n, line)| parse_step(line).map_err(|e| format!("line {}: {}", n, e)))
        .collect()
}

fn identity_model(hw: &MockHardware) -> Option<CalibrationModel> {
    let mag: Vector3<f64> = hw.magnetic().ok()?;
    let grav: Vector3<f64> = hw.acceleration().ok()?;
    Some(CalibrationModel::identity(mag.norm(), grav.norm(), dip_angle(&mag, &grav)))
}

async fn play_script(ctx: Rc<DeviceContext<MockHardware>>, steps: Vec<Step>) {
    for step in steps {
        if ctx.shutdown.is_set() {
            return;
        }
        match step {
            Step::Input(event) => ctx.inputs.publish(event),
            Step::Remote(bytes) => {
                dispatch_inbound(&bytes, &ctx.commands, &ctx.inputs);
            }
            Step::Wait(duration) => tokio::time::sleep(duration).await,
        }
    }
    // Let the last event play out before ending the session
    tokio::time::sleep(Duration::from_secs(1)).await;
    info!("Script finished");
    ctx.request_shutdown(ShutdownReason::Quit);
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();

    let default_level = if args.verbose { "debug" } else { "info" };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(default_level)).init();

    let steps = match &args.script {
        Some(path) => parse_script(&std::fs::read_to_string(path)?)?,
        None => Vec::new(),
    };

    let hw = MockHardware::new();
    if !startup_allowed(&hw) {
        return Err("battery too low to start".into());
    }

    std::fs::create_dir_all(&args.storage)?;
    let nvm: Rc<dyn NonVolatileMemory> = Rc::new(MockNvm::new(256));
    let identity = identity_model(&hw);
    let (ctx, modes) = DeviceContext::new(hw, Storage::new(&args.storage), nvm);
    if args.identity_cal && ctx.config.borrow().config().calibration.is_none() {
        if let Some(model) = identity {
            info!("No stored calibration, using identity model");
            ctx.config.borrow_mut().set_calibration(model);
        }
    }
    let ctx = Rc::new(ctx);

    let runtime = tokio::runtime::Builder::new_current_thread().enable_time().build()?;
    let local = tokio::task::LocalSet::new();
    let report = local.block_on(&runtime, async {
        let feeder = tokio::task::spawn_local(play_script(Rc::clone(&ctx), steps));
        let report = run_session(Rc::clone(&ctx), modes, &[], args.mode.into(), &CalibrationEngine::new()).await;
        feeder.abort();
        report
    });

    match &report.outcome {
        Outcome::Planned(reason) => println!("Session ended: {}", reason),
        Outcome::Fault(fault) => println!("Session faulted: {}", fault),
        Outcome::Continue => println!("Session ended without a recorded reason"),
    }
    println!("Clean shutdown: {}", report.clean);
    println!("Operator input: {}", if report.used { "yes" } else { "no" });
    debug!("Buzzer notes played: {:?}", ctx.hw.buzzer_frequencies());

    let readings = ReadingBuffer::from_bytes(&report.readings, READING_CAPACITY);
    println!("Retained legs: {}", readings.len());
    for leg in readings.iter() {
        println!("  {:>7.2} m  {:>6.1}°  {:>+6.1}°", leg.distance, leg.azimuth, leg.inclination);
    }

    match after_session(&report, &MockSleep::new(WakeAlarm::Button)) {
        Some(alarm) => println!("Light sleep, woken by {:?}", alarm),
        None => println!("Device reset"),
    }
    if !report.clean {
        warn!("Diagnostic written to {}", ctx.storage.diagnostic_path().display());
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use cave_survey::RemoteCommand;

    #[test]
    fn test_script_events_parse() {
        let script = "# take two shots\na\nwait:250\n\naa\nB\nremote:3438\n";
        let steps = parse_script(script).unwrap();
        assert_eq!(
            steps,
            vec![
                Step::Input(InputEvent::Button(Button::A, Click::Single)),
                Step::Wait(Duration::from_millis(250)),
                Step::Input(InputEvent::Button(Button::A, Click::Double)),
                Step::Input(InputEvent::Button(Button::B, Click::Long)),
                Step::Remote(vec![0x34, 0x38]),
            ]
        );
    }

    #[test]
    fn test_bad_script_lines_are_reported() {
        assert_eq!(parse_script("a\nc\n").unwrap_err(), "line 2: unknown script event 'c'");
        assert!(parse_script("remote:343").is_err());
        assert!(parse_script("remote:zz").is_err());
        assert!(parse_script("wait:soon").is_err());
    }

    #[test]
    fn test_start_mode_maps_to_foreground() {
        assert_eq!(Mode::from(StartMode::Menu), Mode::Menu);
        let args = Args::parse_from(["cave-survey-sim", "--mode", "menu", "--verbose"]);
        assert_eq!(args.mode, StartMode::Menu);
        assert!(args.verbose);
        assert_eq!(args.storage, PathBuf::from("sim-storage"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_script_drives_a_remote_shot() {
        let dir = tempfile::TempDir::new().unwrap();
        let nvm: Rc<dyn NonVolatileMemory> = Rc::new(MockNvm::new(256));
        let hw = MockHardware::new();
        let model = identity_model(&hw).unwrap();
        let (ctx, modes) = DeviceContext::new(hw, Storage::new(dir.path()), nvm);
        ctx.config.borrow_mut().set_calibration(model);
        let ctx = Rc::new(ctx);

        let steps = parse_script("wait:500\nremote:38\nwait:1000").unwrap();
        let report = tokio::task::LocalSet::new()
            .run_until(async {
                tokio::task::spawn_local(play_script(Rc::clone(&ctx), steps));
                run_session(Rc::clone(&ctx), modes, &[], Mode::Measure, &CalibrationEngine::new()).await
            })
            .await;

        assert!(report.clean);
        assert!(report.used);
        assert_eq!(report.outcome, Outcome::Planned(ShutdownReason::Quit));
        assert_eq!(ReadingBuffer::from_bytes(&report.readings, READING_CAPACITY).len(), 1);
        assert_eq!(ctx.commands.decode(0x38), Some(RemoteCommand::TakeShot));
    }
}
