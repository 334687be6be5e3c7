//! Operator input fan-out
//!
//! Button drivers and the wireless link publish [`InputEvent`]s here; every
//! task that waits on input holds its own [`InputReceiver`]. Each wait is a
//! separate suspension point, so cancelling a task mid-wait is always safe.

use std::cell::Cell;

use log::{debug, warn};
use tokio::sync::broadcast::{self, error::RecvError};

use super::types::{Button, Click, InputEvent};

/// Broadcast channel for operator activity
#[derive(Debug)]
pub struct InputBus {
    tx: broadcast::Sender<InputEvent>,
    published: Cell<usize>,
}

impl InputBus {
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity);
        Self { tx, published: Cell::new(0) }
    }

    /// Deliver an event to every current subscriber
    pub fn publish(&self, event: InputEvent) {
        self.published.set(self.published.get() + 1);
        if self.tx.send(event).is_err() {
            debug!("Input {:?} dropped, no listeners", event);
        }
    }

    /// Events published so far, listened to or not
    pub fn published(&self) -> usize {
        self.published.get()
    }

    /// Receive events published from now on
    pub fn subscribe(&self) -> InputReceiver {
        InputReceiver { rx: self.tx.subscribe() }
    }
}

impl Default for InputBus {
    fn default() -> Self {
        Self::new(16)
    }
}

/// One task's view of the input bus
#[derive(Debug)]
pub struct InputReceiver {
    rx: broadcast::Receiver<InputEvent>,
}

impl InputReceiver {
    /// Next event of any kind
    pub async fn next(&mut self) -> InputEvent {
        loop {
            match self.rx.recv().await {
                Ok(event) => return event,
                Err(RecvError::Lagged(missed)) => {
                    warn!("Input receiver lagged, skipped {} events", missed);
                }
                // The bus lives as long as the device context, which outlives every task
                Err(RecvError::Closed) => return std::future::pending::<InputEvent>().await,
            }
        }
    }

    /// Next event matching `pred`; everything else is discarded
    pub async fn wait_for<F>(&mut self, mut pred: F) -> InputEvent
    where
        F: FnMut(&InputEvent) -> bool,
    {
        loop {
            let event = self.next().await;
            if pred(&event) {
                return event;
            }
        }
    }

    pub async fn wait_click(&mut self, button: Button, click: Click) {
        self.wait_for(|event| event.is_click(button, click)).await;
    }
}
