//! One-shot device-ready gate.
//!
//! A link record is published in the topology before its kernel device
//! exists. The creator closes the record's gate once the kernel create call
//! has returned (success or failure), publishing the device index; every
//! other caller that lost the reservation race waits on the gate instead of
//! issuing its own create. A gate never reopens.

use std::time::Duration;
use tokio::sync::watch;

/// One-shot publication of a kernel device index.
#[derive(Debug)]
pub struct ReadyGate {
    tx: watch::Sender<Option<u32>>,
}

impl ReadyGate {
    /// An open gate: the device has not been realized yet.
    pub fn new() -> Self {
        let (tx, _rx) = watch::channel(None);
        Self { tx }
    }

    /// A gate born closed, for devices discovered already in the kernel.
    pub fn closed(index: u32) -> Self {
        let (tx, _rx) = watch::channel(Some(index));
        Self { tx }
    }

    /// Closes the gate, publishing the device index (0 when the create
    /// failed). Only the first close takes effect.
    pub fn close(&self, index: u32) {
        self.tx.send_if_modified(|state| {
            if state.is_none() {
                *state = Some(index);
                true
            } else {
                false
            }
        });
    }

    /// Whether the gate has been closed.
    pub fn is_closed(&self) -> bool {
        self.tx.borrow().is_some()
    }

    /// Waits until the gate closes and returns the published index, or
    /// `None` if `timeout` expires first.
    pub async fn wait(&self, timeout: Duration) -> Option<u32> {
        let mut rx = self.tx.subscribe();
        let result = match tokio::time::timeout(timeout, rx.wait_for(|state| state.is_some())).await {
            Ok(Ok(state)) => *state,
            _ => None,
        };
        result
    }
}

impl Default for ReadyGate {
    fn default() -> Self {
        Self::new()
    }
}
