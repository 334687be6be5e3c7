//! Serialised access to the rangefinder
//!
//! The pointer and the distance read share one serial link. Everything that
//! talks to the rangefinder holds the [`LaserGate`] first, so a background
//! flash sequence and a foreground shot never interleave commands.

use std::cell::RefCell;
use std::rc::Rc;

use log::debug;
use tokio::sync::{Mutex, MutexGuard};
use tokio::task::JoinHandle;
use tokio::time::{sleep, timeout};

use crate::core::constants::{FLASH_COUNT, FLASH_PERIOD, LASER_TIMEOUT};
use crate::hardware::{Hardware, Rangefinder, Screen};
use crate::supervisor::DeviceContext;

use super::MeasureError;

#[derive(Debug, Default)]
pub struct LaserGate {
    lock: Mutex<()>,
    flash: RefCell<Option<JoinHandle<()>>>,
}

impl LaserGate {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn lock(&self) -> MutexGuard<'_, ()> {
        self.lock.lock().await
    }

    /// Abort a running flash sequence, if any
    pub fn cancel_flash(&self) {
        if let Some(handle) = self.flash.borrow_mut().take() {
            handle.abort();
        }
    }

    pub fn is_flashing(&self) -> bool {
        self.flash.borrow().as_ref().is_some_and(|handle| !handle.is_finished())
    }
}

/// Bounded pointer command, without taking the gate
async fn pointer_command<R: Rangefinder>(laser: &R, on: bool) -> Result<(), MeasureError> {
    match timeout(LASER_TIMEOUT, laser.set_pointer(on)).await {
        Ok(result) => Ok(result?),
        Err(_) => Err(MeasureError::SensorTimeout(LASER_TIMEOUT)),
    }
}

/// Switch the pointer through the gate
pub async fn set_pointer<R: Rangefinder>(gate: &LaserGate, laser: &R, on: bool) -> Result<(), MeasureError> {
    let _gate = gate.lock().await;
    pointer_command(laser, on).await
}

/// Screen refresh is suspended for as long as this lives
pub struct DisplayPause<'a, S: Screen> {
    screen: &'a S,
}

impl<'a, S: Screen> DisplayPause<'a, S> {
    pub fn new(screen: &'a S) -> Self {
        screen.sleep();
        Self { screen }
    }
}

impl<S: Screen> Drop for DisplayPause<'_, S> {
    fn drop(&mut self) {
        self.screen.wake();
    }
}

/// One bounded distance read, in metres, with the display paused
pub async fn read_distance<H: Hardware>(ctx: &DeviceContext<H>) -> Result<f64, MeasureError> {
    let _gate = ctx.laser.lock().await;
    let _pause = DisplayPause::new(&ctx.hw);
    match timeout(LASER_TIMEOUT, ctx.hw.measure()).await {
        Ok(result) => Ok(result?),
        Err(_) => Err(MeasureError::SensorTimeout(LASER_TIMEOUT)),
    }
}

/// Blink the pointer as a failure cue. Runs in the background, replacing
/// any sequence already running, and leaves the pointer on.
pub fn flash_pointer<H: Hardware>(ctx: &Rc<DeviceContext<H>>) {
    ctx.laser.cancel_flash();
    let task_ctx = Rc::clone(ctx);
    let handle = tokio::task::spawn_local(async move {
        let _gate = task_ctx.laser.lock().await;
        debug!("Flashing pointer");
        for _ in 0..FLASH_COUNT {
            for on in [false, true] {
                if pointer_command(&task_ctx.hw, on).await.is_err() {
                    return;
                }
                sleep(FLASH_PERIOD).await;
            }
        }
    });
    ctx.laser.flash.replace(Some(handle));
}
