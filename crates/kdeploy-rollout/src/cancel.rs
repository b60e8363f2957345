//! Cooperative cancellation.
//!
//! Wraps one or more `watch::Receiver<bool>` shutdown signals. A rollout
//! checks it before every step that mutates the cluster; requests already
//! in flight are allowed to finish.

use tokio::sync::watch;

use crate::error::{RolloutError, RolloutResult};

#[derive(Debug, Clone, Default)]
pub struct Cancellation {
    signals: Vec<watch::Receiver<bool>>,
}

impl Cancellation {
    pub fn new(signal: watch::Receiver<bool>) -> Self {
        Self {
            signals: vec![signal],
        }
    }

    /// A cancellation that never fires.
    pub fn never() -> Self {
        Self::default()
    }

    /// This cancellation, also fired by `signal`.
    pub fn with(&self, signal: watch::Receiver<bool>) -> Self {
        let mut signals = self.signals.clone();
        signals.push(signal);
        Self { signals }
    }

    pub fn is_cancelled(&self) -> bool {
        self.signals.iter().any(|rx| *rx.borrow())
    }

    pub fn check(&self) -> RolloutResult<()> {
        if self.is_cancelled() {
            Err(RolloutError::Cancelled)
        } else {
            Ok(())
        }
    }
}
