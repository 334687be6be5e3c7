//! Wireless peer dispatch
//!
//! Byte values belong to the transport collaborator; this module only maps
//! them to [`RemoteCommand`]s and pushes committed legs out.

use log::{debug, warn};
use serde::{Deserialize, Serialize};

use crate::core::constants::{MAX_VOLTAGE, MIN_VOLTAGE};
use crate::core::{InputBus, InputEvent, Leg, RemoteCommand};
use crate::hardware::WirelessLink;

/// Inbound command bytes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommandMap {
    pub shutdown: u8,
    pub pointer_on: u8,
    pub pointer_off: u8,
    pub take_shot: u8,
}

impl Default for CommandMap {
    fn default() -> Self {
        Self { shutdown: 0x34, pointer_on: 0x36, pointer_off: 0x37, take_shot: 0x38 }
    }
}

impl CommandMap {
    pub fn decode(&self, byte: u8) -> Option<RemoteCommand> {
        match byte {
            b if b == self.shutdown => Some(RemoteCommand::Shutdown),
            b if b == self.pointer_on => Some(RemoteCommand::PointerOn),
            b if b == self.pointer_off => Some(RemoteCommand::PointerOff),
            b if b == self.take_shot => Some(RemoteCommand::TakeShot),
            _ => None,
        }
    }
}

/// Publish every recognised byte as a remote input event.
///
/// Returns the number of commands dispatched.
pub fn dispatch_inbound(bytes: &[u8], map: &CommandMap, bus: &InputBus) -> usize {
    let mut dispatched = 0;
    for &byte in bytes {
        match map.decode(byte) {
            Some(command) => {
                debug!("Remote command {:?}", command);
                bus.publish(InputEvent::Remote(command));
                dispatched += 1;
            }
            None => warn!("Ignoring unknown remote command 0x{:02X}", byte),
        }
    }
    dispatched
}

/// Forward a committed leg; a missing peer is not an error worth surfacing
pub fn forward_leg<W: WirelessLink>(link: &W, leg: &Leg) -> bool {
    if !link.is_connected() {
        debug!("No wireless peer, leg kept locally");
        return false;
    }
    match link.send_leg(leg) {
        Ok(()) => true,
        Err(e) => {
            warn!("Failed to forward leg: {}", e);
            false
        }
    }
}

/// Battery percentage for the standard battery characteristic
pub fn battery_percent(voltage: f64) -> u8 {
    let fraction = (voltage - MIN_VOLTAGE) / (MAX_VOLTAGE - MIN_VOLTAGE);
    (fraction.clamp(0.0, 1.0) * 100.0).round() as u8
}
