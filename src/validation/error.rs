//! Error taxonomy and fault reports
//!
//! Every failure the device can experience is classified into one
//! [`ErrorKind`]. The kind alone decides how far the failure travels: the
//! measurement loop absorbs sensor problems, the calibration engine absorbs
//! fit failures, and everything else becomes a [`Fault`] for the supervisor.

use std::fmt;
use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Error classification shared by every subsystem
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ErrorKind {
    SensorTimeout,
    SensorFault,
    MagneticAnomaly,
    DipAnomaly,
    GravityAnomaly,
    NotCalibrated,
    CalibrationFitFailure,
    LowBattery,
    ResourceExhaustion,
    UnclassifiedFault,
}

/// How far an error of a given kind propagates
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Propagation {
    /// Feedback to the operator, measurement loop carries on
    HandledLocally,
    /// Only the running calibration attempt is abandoned
    AbortsCalibration,
    /// Raised to the supervisor, which shuts the device down
    Escalates,
}

/// Error severity levels
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum ErrorSeverity {
    Warning,
    Medium,
    Critical,
}

impl ErrorKind {
    pub fn propagation(self) -> Propagation {
        match self {
            ErrorKind::SensorTimeout
            | ErrorKind::SensorFault
            | ErrorKind::MagneticAnomaly
            | ErrorKind::DipAnomaly
            | ErrorKind::GravityAnomaly
            | ErrorKind::NotCalibrated => Propagation::HandledLocally,
            ErrorKind::CalibrationFitFailure => Propagation::AbortsCalibration,
            ErrorKind::LowBattery | ErrorKind::ResourceExhaustion | ErrorKind::UnclassifiedFault => {
                Propagation::Escalates
            }
        }
    }

    pub fn escalates(self) -> bool {
        self.propagation() == Propagation::Escalates
    }

    pub fn severity(self) -> ErrorSeverity {
        match self.propagation() {
            Propagation::HandledLocally => ErrorSeverity::Warning,
            Propagation::AbortsCalibration => ErrorSeverity::Medium,
            Propagation::Escalates => ErrorSeverity::Critical,
        }
    }

    /// Short operator-facing message, sized for the device screen
    pub fn operator_message(self) -> &'static str {
        match self {
            ErrorKind::SensorTimeout => "Laser\nTimeout",
            ErrorKind::SensorFault => "Sensor\nFail",
            ErrorKind::MagneticAnomaly => "Magnetic\nAnomaly:\nIron nearby?",
            ErrorKind::DipAnomaly => "Magnetic\nAnomaly:\nDip changed",
            ErrorKind::GravityAnomaly => "Device\nMovement\nDetected",
            ErrorKind::NotCalibrated => "Calibration\nneeded\nHold B 3s",
            ErrorKind::CalibrationFitFailure => "Calibration\nFailed",
            ErrorKind::LowBattery => "Battery\nLow",
            ErrorKind::ResourceExhaustion => "Out of\nMemory",
            ErrorKind::UnclassifiedFault => "Internal\nError",
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ErrorKind::SensorTimeout => "sensor timeout",
            ErrorKind::SensorFault => "sensor fault",
            ErrorKind::MagneticAnomaly => "magnetic anomaly",
            ErrorKind::DipAnomaly => "dip anomaly",
            ErrorKind::GravityAnomaly => "gravity anomaly",
            ErrorKind::NotCalibrated => "not calibrated",
            ErrorKind::CalibrationFitFailure => "calibration fit failure",
            ErrorKind::LowBattery => "low battery",
            ErrorKind::ResourceExhaustion => "resource exhaustion",
            ErrorKind::UnclassifiedFault => "unclassified fault",
        };
        f.write_str(name)
    }
}

/// An escalated failure, captured by the supervisor for reporting
#[derive(Debug, Clone, PartialEq)]
pub struct Fault {
    pub kind: ErrorKind,
    /// Task that raised it
    pub origin: &'static str,
    pub message: String,
    /// Time since wake when it was raised
    pub uptime: Duration,
}

impl Fault {
    pub fn new(kind: ErrorKind, origin: &'static str, message: impl Into<String>) -> Self {
        Self { kind, origin, message: message.into(), uptime: Duration::ZERO }
    }

    pub fn at(mut self, uptime: Duration) -> Self {
        self.uptime = uptime;
        self
    }

    /// Full text written to the diagnostic file
    pub fn report(&self) -> String {
        format!(
            "Fault: {}\nTask: {}\nUptime: {:.1}s\nSeverity: {:?}\nDetail: {}\n",
            self.kind,
            self.origin,
            self.uptime.as_secs_f64(),
            self.kind.severity(),
            self.message
        )
    }

    /// Abbreviated text for the device screen
    pub fn summary(&self) -> String {
        let headline = self.kind.operator_message().replace('\n', " ");
        format!("{}\n{}", headline, summarize(&self.message, SUMMARY_WIDTH, SUMMARY_LINES))
    }
}

impl fmt::Display for Fault {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} in {}: {}", self.kind, self.origin, self.message)
    }
}

const SUMMARY_WIDTH: usize = 18;
const SUMMARY_LINES: usize = 4;

/// Word-wrap `text` into at most `max_lines` lines of `width` characters,
/// marking truncation with `...`.
pub fn summarize(text: &str, width: usize, max_lines: usize) -> String {
    let mut lines: Vec<String> = Vec::new();
    let mut current = String::new();
    let mut truncated = false;

    for word in text.split_whitespace() {
        let word: String = word.chars().take(width).collect();
        let needed = if current.is_empty() { word.chars().count() } else { current.chars().count() + 1 + word.chars().count() };
        if needed > width && !current.is_empty() {
            lines.push(std::mem::take(&mut current));
            if lines.len() == max_lines {
                truncated = true;
                break;
            }
        }
        if !current.is_empty() {
            current.push(' ');
        }
        current.push_str(&word);
    }
    if !truncated && !current.is_empty() {
        if lines.len() < max_lines {
            lines.push(current);
        } else {
            truncated = true;
        }
    }
    if truncated {
        if let Some(last) = lines.last_mut() {
            let keep = width.saturating_sub(3);
            *last = last.chars().take(keep).collect::<String>() + "...";
        }
    }
    lines.join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_measurement_errors_stay_local() {
        for kind in [
            ErrorKind::SensorTimeout,
            ErrorKind::SensorFault,
            ErrorKind::MagneticAnomaly,
            ErrorKind::DipAnomaly,
            ErrorKind::GravityAnomaly,
            ErrorKind::NotCalibrated,
        ] {
            assert_eq!(kind.propagation(), Propagation::HandledLocally, "{kind}");
        }
        assert_eq!(ErrorKind::CalibrationFitFailure.propagation(), Propagation::AbortsCalibration);
    }

    #[test]
    fn test_escalating_kinds() {
        assert!(ErrorKind::LowBattery.escalates());
        assert!(ErrorKind::ResourceExhaustion.escalates());
        assert!(ErrorKind::UnclassifiedFault.escalates());
        assert!(!ErrorKind::SensorTimeout.escalates());
        assert_eq!(ErrorKind::LowBattery.severity(), ErrorSeverity::Critical);
    }

    #[test]
    fn test_fault_report_contents() {
        let fault = Fault::new(ErrorKind::LowBattery, "battery", "3.21V below floor")
            .at(Duration::from_millis(12_340));
        let report = fault.report();
        assert!(report.contains("Fault: low battery"));
        assert!(report.contains("Task: battery"));
        assert!(report.contains("Uptime: 12.3s"));
        assert!(report.contains("3.21V below floor"));
        assert!(fault.summary().starts_with("Battery Low\n"));
    }

    #[test]
    fn test_summarize_wraps_and_truncates() {
        assert_eq!(summarize("short text", 18, 4), "short text");
        assert_eq!(summarize("one two three", 7, 4), "one two\nthree");

        let long = "watchdog feed failed twice in a row while the measurement task held the bus";
        let summary = summarize(long, 12, 2);
        let lines: Vec<&str> = summary.lines().collect();
        assert_eq!(lines.len(), 2);
        assert!(lines[1].ends_with("..."));
        assert!(lines.iter().all(|l| l.chars().count() <= 12));
    }
}
