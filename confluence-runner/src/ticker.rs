//! Cancellable fixed-interval ticker and the shutdown signal that stops it.
//!
//! Shutdown is only observed between cycles: a running cycle always finishes.

use std::time::Duration;
use tokio::sync::watch;
use tokio::time::{interval, Interval, MissedTickBehavior};

/// Sender half. Cloneable so Ctrl-C handlers and tests can both hold one.
#[derive(Debug, Clone)]
pub struct ShutdownHandle {
    tx: std::sync::Arc<watch::Sender<bool>>,
}

impl ShutdownHandle {
    pub fn trigger(&self) {
        // No receivers left means nobody is waiting; nothing to do.
        let _ = self.tx.send(true);
    }
}

/// Receiver half, owned by the loop.
#[derive(Debug, Clone)]
pub struct ShutdownSignal {
    rx: watch::Receiver<bool>,
}

impl ShutdownSignal {
    pub fn is_triggered(&self) -> bool {
        *self.rx.borrow()
    }

    /// Resolves once shutdown is requested (or the handle is dropped).
    pub async fn triggered(&mut self) {
        while !*self.rx.borrow_and_update() {
            if self.rx.changed().await.is_err() {
                return;
            }
        }
    }
}

pub fn shutdown_channel() -> (ShutdownHandle, ShutdownSignal) {
    let (tx, rx) = watch::channel(false);
    (ShutdownHandle { tx: std::sync::Arc::new(tx) }, ShutdownSignal { rx })
}

#[derive(Debug)]
pub struct Ticker {
    interval: Interval,
}

impl Ticker {
    /// First tick fires immediately. A cycle that overruns delays the next
    /// tick rather than bursting to catch up.
    pub fn new(period: Duration) -> Self {
        let mut interval = interval(period.max(Duration::from_millis(1)));
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
        Self { interval }
    }

    /// Wait for the next tick. `false` when shutdown won the race.
    pub async fn tick(&mut self, shutdown: &mut ShutdownSignal) -> bool {
        if shutdown.is_triggered() {
            return false;
        }
        tokio::select! {
            _ = self.interval.tick() => true,
            _ = shutdown.triggered() => false,
        }
    }
}
