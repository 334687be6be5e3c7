//! Outward-facing surfaces: text formatting and the wireless peer

pub mod formatting;
pub mod wireless;

pub use formatting::{AngleUnit, DistanceUnit, LegView, TripFormatter};
pub use wireless::{battery_percent, dispatch_inbound, forward_leg, CommandMap};
