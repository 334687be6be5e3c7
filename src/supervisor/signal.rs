//! One-shot shutdown signal
//!
//! Any task may ask for a shutdown, planned or because of a fault. The first
//! request wins; later ones are logged and counted, never queued.

use std::cell::Cell;
use std::fmt;

use log::{info, warn};
use tokio::sync::watch;

use crate::validation::Fault;

/// Why a planned shutdown happened
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ShutdownReason {
    Inactivity { seconds: u64 },
    /// Operator double-clicked A
    Quit,
    /// Wireless peer asked for it
    Remote,
    /// Reset so the calibration engine can run on fresh memory
    CalibrationRestart,
}

impl fmt::Display for ShutdownReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ShutdownReason::Inactivity { seconds } => write!(f, "timeout after {} seconds inactivity", seconds),
            ShutdownReason::Quit => f.write_str("quit"),
            ShutdownReason::Remote => f.write_str("remote shutdown"),
            ShutdownReason::CalibrationRestart => f.write_str("restart to calibrate"),
        }
    }
}

/// State of the shutdown channel
#[derive(Debug, Clone, PartialEq)]
pub enum Outcome {
    Continue,
    Planned(ShutdownReason),
    Fault(Fault),
}

impl Outcome {
    pub fn is_continue(&self) -> bool {
        matches!(self, Outcome::Continue)
    }
}

#[derive(Debug)]
pub struct ShutdownSignal {
    tx: watch::Sender<Outcome>,
    closed: Cell<bool>,
    dropped: Cell<usize>,
}

impl Default for ShutdownSignal {
    fn default() -> Self {
        Self::new()
    }
}

impl ShutdownSignal {
    pub fn new() -> Self {
        let (tx, _) = watch::channel(Outcome::Continue);
        Self { tx, closed: Cell::new(false), dropped: Cell::new(0) }
    }

    fn set(&self, outcome: Outcome) -> bool {
        if self.closed.get() || !self.tx.borrow().is_continue() {
            warn!("Dropping shutdown request {:?}, already shutting down", outcome);
            self.dropped.set(self.dropped.get() + 1);
            return false;
        }
        self.tx.send_replace(outcome);
        true
    }

    /// Returns false if a shutdown was already underway
    pub fn request_shutdown(&self, reason: ShutdownReason) -> bool {
        info!("Shutdown requested: {}", reason);
        self.set(Outcome::Planned(reason))
    }

    pub fn fault(&self, fault: Fault) -> bool {
        warn!("Fault raised: {}", fault);
        self.set(Outcome::Fault(fault))
    }

    /// Stop accepting requests of either kind
    pub fn close(&self) {
        self.closed.set(true);
    }

    pub fn is_set(&self) -> bool {
        !self.tx.borrow().is_continue()
    }

    pub fn outcome(&self) -> Outcome {
        self.tx.borrow().clone()
    }

    /// Requests refused since the signal was set
    pub fn dropped(&self) -> usize {
        self.dropped.get()
    }

    /// Resolves once the signal is set
    pub async fn wait(&self) -> Outcome {
        let mut rx = self.tx.subscribe();
        let outcome = match rx.wait_for(|outcome| !outcome.is_continue()).await {
            Ok(outcome) => outcome.clone(),
            // The sender lives in `self`, so the channel outlives this future
            Err(_) => self.outcome(),
        };
        outcome
    }
}
