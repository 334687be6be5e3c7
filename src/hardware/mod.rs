//! Hardware abstraction layer
//!
//! Every peripheral the core touches sits behind a small trait. Receivers
//! take `&self`: the device runs on a single thread and drivers use interior
//! mutability, so one handle can be shared by the foreground task and the
//! monitors through the device context. Anything that can block on a bus is
//! `async` so the caller can put a timeout around it.

pub mod buzzer;
pub mod error;
pub mod markers;
pub mod mock;
pub mod storage;

use std::time::Duration;

use nalgebra::Vector3;

use crate::api::formatting::LegView;

pub use buzzer::{PwmBuzzer, Tune};
pub use error::{HardwareError, HardwareResult, StorageError, WatchdogExpired};
pub use markers::PersistentMarkers;
pub use mock::{MockHardware, MockNvm, MockPwm, MockSleep};
pub use storage::Storage;

/// Laser rangefinder with a visible pointer
#[allow(async_fn_in_trait)]
pub trait Rangefinder {
    /// Raw distance in metres, without any offset applied
    async fn measure(&self) -> HardwareResult<f64>;

    async fn set_pointer(&self, on: bool) -> HardwareResult<()>;
}

pub trait Magnetometer {
    fn magnetic(&self) -> HardwareResult<Vector3<f64>>;
}

pub trait Accelerometer {
    fn acceleration(&self) -> HardwareResult<Vector3<f64>>;
}

pub trait Battery {
    fn voltage(&self) -> HardwareResult<f64>;
}

/// Display collaborator. Layout and rendering are its own business.
pub trait Screen {
    fn show_start_screen(&self);
    fn show_leg(&self, view: &LegView);
    fn show_info(&self, text: &str);
    fn show_menu(&self, labels: &[String], selected: usize);
    /// Stop refreshing; used while the rangefinder bus is busy
    fn sleep(&self);
    fn wake(&self);
    fn set_flipped(&self, flipped: bool);
}

/// Audible feedback
#[allow(async_fn_in_trait)]
pub trait Feedback {
    /// Play to completion
    async fn play(&self, tune: Tune);
}

pub trait Watchdog {
    fn arm(&self, timeout: Duration);
    /// Fails once the watchdog has fired
    fn feed(&self) -> Result<(), WatchdogExpired>;
    fn disable(&self);
    fn is_armed(&self) -> bool;
}

/// Wireless peer link. Pairing and transport are handled elsewhere.
pub trait WirelessLink {
    fn send_leg(&self, leg: &crate::core::Leg) -> HardwareResult<()>;
    fn is_connected(&self) -> bool;
    /// Legs waiting to be delivered
    fn queue_depth(&self) -> usize;
    fn set_battery_level(&self, percent: u8);
}

/// Two-pin PWM output driving a piezo differentially
pub trait DifferentialPwm {
    fn set_frequency(&self, hz: u32);
    fn set_duty_cycle(&self, duty: u16);
}

/// Byte-addressable memory that survives a reset
pub trait NonVolatileMemory {
    fn len(&self) -> usize;
    fn read(&self, offset: usize, buf: &mut [u8]);
    fn write(&self, offset: usize, data: &[u8]);
}

impl<N: NonVolatileMemory + ?Sized> NonVolatileMemory for std::rc::Rc<N> {
    fn len(&self) -> usize {
        (**self).len()
    }

    fn read(&self, offset: usize, buf: &mut [u8]) {
        (**self).read(offset, buf)
    }

    fn write(&self, offset: usize, data: &[u8]) {
        (**self).write(offset, data)
    }
}

/// Conditions that end a light sleep
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WakeAlarm {
    Button,
    UsbPower,
    Timer(Duration),
}

pub trait DeepSleep {
    /// Sleep until one of `alarms` fires and report which
    fn light_sleep(&self, alarms: &[WakeAlarm]) -> WakeAlarm;
    fn reset(&self);
}

/// Everything the supervisor and its tasks need from the board
pub trait Hardware:
    Rangefinder + Magnetometer + Accelerometer + Battery + Screen + Feedback + Watchdog + WirelessLink + 'static
{
}

impl<T> Hardware for T where
    T: Rangefinder + Magnetometer + Accelerometer + Battery + Screen + Feedback + Watchdog + WirelessLink + 'static
{
}
