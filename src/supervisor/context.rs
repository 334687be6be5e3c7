//! Device context shared by every task
//!
//! Built once per session and handed to each task as an `Rc`. Shared mutable
//! state lives in `RefCell`s; no borrow is ever held across an `.await`.

use std::cell::{Cell, RefCell};
use std::rc::Rc;
use std::time::Duration;

use tokio::sync::mpsc;
use tokio::time::Instant;

use crate::api::wireless::CommandMap;
use crate::calibration::{CalibrationOutcome, CalibrationResult};
use crate::core::{InputBus, Mode};
use crate::hardware::{NonVolatileMemory, PersistentMarkers, Storage};
use crate::measurement::LaserGate;
use crate::menu::MenuAction;
use crate::processing::{ReadingBuffer, TripLog};
use crate::utils::ConfigStore;
use crate::validation::{ErrorKind, Fault};

use super::signal::{ShutdownReason, ShutdownSignal};

/// Foreground change requested of the supervisor
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ModeRequest {
    /// Swap between measuring and the menu
    Toggle,
    Switch(Mode),
}

/// Receiving end of the mode channel, owned by the supervisor
#[derive(Debug)]
pub struct ModeRequests {
    rx: mpsc::UnboundedReceiver<ModeRequest>,
}

impl ModeRequests {
    pub async fn recv(&mut self) -> Option<ModeRequest> {
        self.rx.recv().await
    }
}

pub type Markers = PersistentMarkers<Rc<dyn NonVolatileMemory>>;

pub struct DeviceContext<H> {
    pub hw: H,
    pub storage: Storage,
    pub markers: Markers,
    pub config: RefCell<ConfigStore>,
    pub readings: RefCell<ReadingBuffer>,
    pub trip_log: RefCell<TripLog>,
    pub shutdown: Rc<ShutdownSignal>,
    pub inputs: InputBus,
    pub laser: LaserGate,
    pub commands: CommandMap,
    modes: mpsc::UnboundedSender<ModeRequest>,
    woke_at: Instant,
    pending_action: Cell<Option<MenuAction>>,
    calibration: RefCell<Option<CalibrationResult<CalibrationOutcome>>>,
}

impl<H> DeviceContext<H> {
    /// Load the configuration from `storage` and wire up the channels
    pub fn new(hw: H, storage: Storage, nvm: Rc<dyn NonVolatileMemory>) -> (Self, ModeRequests) {
        let config = ConfigStore::load(&storage);
        Self::with_config(hw, storage, nvm, config)
    }

    pub fn with_config(
        hw: H,
        storage: Storage,
        nvm: Rc<dyn NonVolatileMemory>,
        config: ConfigStore,
    ) -> (Self, ModeRequests) {
        let (tx, rx) = mpsc::unbounded_channel();
        let ctx = Self {
            hw,
            storage,
            markers: PersistentMarkers::new(nvm),
            config: RefCell::new(config),
            readings: RefCell::new(ReadingBuffer::default()),
            trip_log: RefCell::new(TripLog::new()),
            shutdown: Rc::new(ShutdownSignal::new()),
            inputs: InputBus::default(),
            laser: LaserGate::new(),
            commands: CommandMap::default(),
            modes: tx,
            woke_at: Instant::now(),
            pending_action: Cell::new(None),
            calibration: RefCell::new(None),
        };
        (ctx, ModeRequests { rx })
    }

    pub fn woke_at(&self) -> Instant {
        self.woke_at
    }

    pub fn uptime(&self) -> Duration {
        self.woke_at.elapsed()
    }

    pub fn request_mode(&self, request: ModeRequest) {
        // Only fails once the supervisor has gone, when nobody cares
        let _ = self.modes.send(request);
    }

    pub fn request_shutdown(&self, reason: ShutdownReason) -> bool {
        self.shutdown.request_shutdown(reason)
    }

    /// Escalate to the supervisor
    pub fn raise(&self, kind: ErrorKind, origin: &'static str, message: impl Into<String>) -> bool {
        self.shutdown.fault(Fault::new(kind, origin, message).at(self.uptime()))
    }

    /// Remember `action` and ask for the MenuItem foreground
    pub fn start_action(&self, action: MenuAction) {
        self.pending_action.set(Some(action));
        self.request_mode(ModeRequest::Switch(Mode::MenuItem));
    }

    pub fn set_pending_action(&self, action: MenuAction) {
        self.pending_action.set(Some(action));
    }

    pub fn take_pending_action(&self) -> Option<MenuAction> {
        self.pending_action.take()
    }

    pub fn set_calibration_result(&self, result: CalibrationResult<CalibrationOutcome>) {
        self.calibration.replace(Some(result));
    }

    pub fn take_calibration_result(&self) -> Option<CalibrationResult<CalibrationOutcome>> {
        self.calibration.take()
    }
}
