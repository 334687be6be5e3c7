//! Task supervisor
//!
//! Owns the monitors and exactly one foreground task. Monitors live in a
//! [`JoinSet`] for the whole session; the foreground task is replaced on
//! every mode switch. The old task is aborted and awaited before the new one
//! is spawned, but new tasks still re-assert the peripherals they rely on.
//!
//! A task that panics ends up as an `UnclassifiedFault`: the supervisor sees
//! the panic in the task's join result and raises it like any other fault.

pub mod context;
pub mod lifecycle;
pub mod monitors;
pub mod shutdown;
pub mod signal;

#[cfg(test)]
pub(crate) mod testing;

use std::rc::Rc;

use log::{debug, error, info};
use tokio::task::{spawn_local, JoinError, JoinHandle, JoinSet};

use crate::core::constants::WATCHDOG_TIMEOUT;
use crate::core::Mode;
use crate::hardware::{Hardware, Tune};
use crate::measurement::measure_task;
use crate::menu::{menu_item_task, menu_task};
use crate::validation::ErrorKind;

pub use context::{DeviceContext, ModeRequest, ModeRequests};
pub use lifecycle::{after_session, run_session, startup_allowed, SessionReport};
pub use signal::{Outcome, ShutdownReason, ShutdownSignal};
pub use shutdown::shutdown_sequence;
pub use crate::validation::Fault;

fn task_name(mode: Mode) -> &'static str {
    match mode {
        Mode::Measure => "measure",
        Mode::Menu => "menu",
        Mode::MenuItem => "menu item",
    }
}

/// What woke the supervisor loop
enum Event {
    Shutdown,
    Mode(Option<ModeRequest>),
    MonitorExit(Result<(), JoinError>),
    ForegroundExit(Result<(), JoinError>),
}

async fn join_foreground(task: &mut Option<JoinHandle<()>>) -> Result<(), JoinError> {
    match task.as_mut() {
        Some(handle) => {
            let result = handle.await;
            *task = None;
            result
        }
        None => std::future::pending().await,
    }
}

pub struct Supervisor<H> {
    ctx: Rc<DeviceContext<H>>,
    modes: ModeRequests,
    mode: Option<Mode>,
    foreground: Option<JoinHandle<()>>,
    monitors: JoinSet<()>,
}

impl<H: Hardware> Supervisor<H> {
    pub fn new(ctx: Rc<DeviceContext<H>>, modes: ModeRequests) -> Self {
        Self { ctx, modes, mode: None, foreground: None, monitors: JoinSet::new() }
    }

    pub fn context(&self) -> &Rc<DeviceContext<H>> {
        &self.ctx
    }

    /// Current foreground mode, once one has been started
    pub fn mode(&self) -> Option<Mode> {
        self.mode
    }

    fn spawn_monitors(&mut self) {
        let ctx = &self.ctx;
        self.monitors.spawn_local(monitors::watchdog_feeder(Rc::clone(ctx)));
        self.monitors.spawn_local(monitors::inactivity(Rc::clone(ctx)));
        self.monitors.spawn_local(monitors::quit_on_double_click(Rc::clone(ctx)));
        self.monitors.spawn_local(monitors::mode_toggle(Rc::clone(ctx)));
        self.monitors.spawn_local(monitors::wireless_status(Rc::clone(ctx)));
        self.monitors.spawn_local(monitors::battery_floor(Rc::clone(ctx)));
        self.monitors.spawn_local(monitors::orientation_flip(Rc::clone(ctx)));
        self.monitors.spawn_local(monitors::remote_commands(Rc::clone(ctx)));
        debug!("{} monitors running", self.monitors.len());
    }

    /// Raise a fault for a task that panicked; other exits are just logged
    fn task_exited(&self, origin: &'static str, result: Result<(), JoinError>) {
        match result {
            Ok(()) => debug!("Task {} finished", origin),
            Err(e) if e.is_panic() => {
                let payload = e.into_panic();
                let message = payload
                    .downcast_ref::<&str>()
                    .map(|s| s.to_string())
                    .or_else(|| payload.downcast_ref::<String>().cloned())
                    .unwrap_or_else(|| "task panicked".to_string());
                error!("Task {} panicked: {}", origin, message);
                self.ctx.raise(ErrorKind::UnclassifiedFault, origin, message);
            }
            Err(_) => debug!("Task {} cancelled", origin),
        }
    }

    /// Replace the foreground task
    pub async fn switch_mode(&mut self, mode: Mode) {
        if let Some(old) = self.foreground.take() {
            old.abort();
            let result = old.await;
            if let Some(previous) = self.mode {
                self.task_exited(task_name(previous), result);
            }
        }
        info!("Mode: {:?} -> {:?}", self.mode, mode);
        self.mode = Some(mode);
        let ctx = Rc::clone(&self.ctx);
        self.foreground = Some(match mode {
            Mode::Measure => spawn_local(measure_task(ctx)),
            Mode::Menu => spawn_local(menu_task(ctx)),
            Mode::MenuItem => spawn_local(menu_item_task(ctx)),
        });
    }

    async fn handle_request(&mut self, request: ModeRequest) {
        let next = match request {
            // A long press from a running action leaves it for the menu
            ModeRequest::Toggle if self.mode == Some(Mode::Menu) => Mode::Measure,
            ModeRequest::Toggle => Mode::Menu,
            ModeRequest::Switch(mode) => mode,
        };
        self.switch_mode(next).await;
    }

    /// Run the session until shutdown. Returns whether it ended cleanly.
    pub async fn run(mut self, initial: Mode) -> bool {
        info!("Supervisor starting in {:?} mode", initial);
        self.ctx.hw.arm(WATCHDOG_TIMEOUT);
        self.spawn_monitors();
        self.ctx.hw.play(Tune::Happy).await;
        if !self.ctx.shutdown.is_set() {
            self.switch_mode(initial).await;
        }

        let shutdown = Rc::clone(&self.ctx.shutdown);
        loop {
            let event = tokio::select! {
                biased;
                _ = shutdown.wait() => Event::Shutdown,
                request = self.modes.recv() => Event::Mode(request),
                Some(result) = self.monitors.join_next() => Event::MonitorExit(result),
                result = join_foreground(&mut self.foreground) => Event::ForegroundExit(result),
            };
            match event {
                Event::Shutdown => break,
                Event::Mode(Some(request)) => self.handle_request(request).await,
                // Every sender lives in the context, which outlives this loop
                Event::Mode(None) => break,
                Event::MonitorExit(result) => self.task_exited("monitor", result),
                Event::ForegroundExit(result) => {
                    let name = self.mode.map(task_name).unwrap_or("foreground");
                    self.task_exited(name, result);
                }
            }
        }

        let foreground = self.foreground.take();
        shutdown_sequence(&self.ctx, &mut self.monitors, foreground).await
    }
}
