//! Timing constants and fixed device parameters

use std::time::Duration;

/// Longest a rangefinder read may take before it is reported as a timeout
pub const LASER_TIMEOUT: Duration = Duration::from_secs(3);

/// Settle delay after the pointer is switched on
pub const POINTER_SETTLE: Duration = Duration::from_millis(100);

/// Hardware watchdog period
pub const WATCHDOG_TIMEOUT: Duration = Duration::from_secs(5);

/// How often the watchdog feeder runs
pub const WATCHDOG_FEED_INTERVAL: Duration = Duration::from_secs(1);

/// Double clicks this soon after wake are the tail of the start gesture
pub const DOUBLE_CLICK_LOCKOUT: Duration = Duration::from_millis(500);

/// How long an escalated fault stays on screen
pub const FAULT_DISPLAY_WINDOW: Duration = Duration::from_secs(10);

/// Wireless link and battery percentage poll interval
pub const WIRELESS_POLL_INTERVAL: Duration = Duration::from_secs(1);

/// Battery floor poll interval
pub const BATTERY_POLL_INTERVAL: Duration = Duration::from_secs(5);

/// Orientation poll interval
pub const ORIENTATION_POLL_INTERVAL: Duration = Duration::from_millis(250);

/// Refresh interval of live info screens
pub const INFO_REFRESH_INTERVAL: Duration = Duration::from_millis(500);

/// How long a clean session may sleep before a timer wake resets the device
pub const IDLE_SLEEP: Duration = Duration::from_secs(6 * 60 * 60);

/// Below this the running device escalates a low battery fault (volts)
pub const LOW_BATTERY_VOLTAGE: f64 = 3.3;

/// Below this the device refuses to start at all (volts)
pub const STARTUP_MIN_VOLTAGE: f64 = 3.2;

/// Battery voltage reported as 0 %
pub const MIN_VOLTAGE: f64 = 3.5;

/// Battery voltage reported as 100 %
pub const MAX_VOLTAGE: f64 = 4.2;

/// Default capacity of the reading buffer
pub const READING_CAPACITY: usize = 10;

/// Largest distance difference between legs of a triple shot (metres)
pub const TRIPLE_SHOT_DISTANCE: f64 = 0.05;

/// Largest direction chord between legs of a triple shot
pub const TRIPLE_SHOT_ANGLE: f64 = 0.03;

/// Number of pointer blinks shown after a failed shot
pub const FLASH_COUNT: u32 = 5;

/// Half period of a pointer blink
pub const FLASH_PERIOD: Duration = Duration::from_millis(100);

/// Shots averaged by the laser distance calibration
pub const LASER_CAL_SHOTS: usize = 10;

/// Reference distance for the laser distance calibration (metres)
pub const LASER_CAL_DISTANCE: f64 = 1.0;
