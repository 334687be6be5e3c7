//! Core data types shared by the measurement, calibration and supervisor layers

use nalgebra::Vector3;
use serde::{Deserialize, Serialize};

/// One committed survey shot.
///
/// Angles are in degrees, distance in metres. A `Leg` is only ever created
/// by a successful measurement and is never mutated afterwards.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Leg {
    /// Compass bearing, degrees clockwise from magnetic north in `[0, 360)`
    pub azimuth: f64,
    /// Clino angle, degrees above the horizontal in `[-90, 90]`
    pub inclination: f64,
    /// Distance including the configured laser offset (metres)
    pub distance: f64,
}

impl Leg {
    pub fn new(azimuth: f64, inclination: f64, distance: f64) -> Self {
        Self { azimuth, inclination, distance }
    }

    /// Unit vector along the shot in an east/north/up frame
    pub fn direction(&self) -> Vector3<f64> {
        let az = self.azimuth.to_radians();
        let inc = self.inclination.to_radians();
        Vector3::new(inc.cos() * az.sin(), inc.cos() * az.cos(), inc.sin())
    }
}

/// Foreground activity selected by the supervisor
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Mode {
    /// Taking shots
    Measure,
    /// Browsing the menu
    Menu,
    /// Running the action picked from the menu
    MenuItem,
}

/// Physical buttons on the instrument
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Button {
    A,
    B,
}

/// Click patterns recognised by the button driver
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Click {
    Single,
    Double,
    Long,
}

/// Commands a connected wireless peer may send
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RemoteCommand {
    Shutdown,
    PointerOn,
    PointerOff,
    TakeShot,
}

/// Anything that counts as operator activity
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InputEvent {
    Button(Button, Click),
    Remote(RemoteCommand),
}

impl InputEvent {
    pub fn is_click(&self, button: Button, click: Click) -> bool {
        *self == InputEvent::Button(button, click)
    }
}
