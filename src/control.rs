//! Run control and progress reporting.
//!
//! The engine never owns a channel or a thread. The caller hands it a
//! [`RunControl`] (shared through an `Arc`) to cancel, pause or resume a
//! run, and a [`ProgressObserver`] that receives periodic snapshots.

use parking_lot::{Condvar, Mutex};
use serde::{Deserialize, Serialize};

/// Snapshot of the search emitted every `progress_interval` generations
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProgressEvent {
    pub generation: usize,
    /// Share of the generation budget consumed, in percent
    pub progress_percent: f64,
    pub best_fitness: f64,
    pub work_days: usize,
    pub balance: f64,
    pub violations: usize,
}

/// Receives progress events from a running engine
pub trait ProgressObserver {
    fn on_progress(&mut self, event: &ProgressEvent);
}

impl<F: FnMut(&ProgressEvent)> ProgressObserver for F {
    fn on_progress(&mut self, event: &ProgressEvent) {
        self(event)
    }
}

/// Observer that drops every event
#[derive(Debug, Default, Clone, Copy)]
pub struct SilentObserver;

impl ProgressObserver for SilentObserver {
    fn on_progress(&mut self, _event: &ProgressEvent) {}
}

/// Observer that keeps every event, handy for tests and replays
#[derive(Debug, Default, Clone)]
pub struct RecordingObserver {
    pub events: Vec<ProgressEvent>,
}

impl ProgressObserver for RecordingObserver {
    fn on_progress(&mut self, event: &ProgressEvent) {
        self.events.push(event.clone());
    }
}

#[derive(Debug, Default)]
struct ControlState {
    cancelled: bool,
    paused: bool,
}

/// What the engine should do after a checkpoint
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Signal {
    Continue,
    Cancel,
}

/// Cancel / pause / resume commands for one run.
///
/// Pausing parks the engine thread on a condition variable until
/// [`resume`](Self::resume) or [`cancel`](Self::cancel) is called.
#[derive(Debug, Default)]
pub struct RunControl {
    state: Mutex<ControlState>,
    wake: Condvar,
}

impl RunControl {
    pub fn new() -> Self {
        Self::default()
    }

    /// Request cancellation; also releases a paused run
    pub fn cancel(&self) {
        let mut state = self.state.lock();
        state.cancelled = true;
        self.wake.notify_all();
    }

    pub fn pause(&self) {
        self.state.lock().paused = true;
    }

    pub fn resume(&self) {
        let mut state = self.state.lock();
        state.paused = false;
        self.wake.notify_all();
    }

    pub fn is_cancelled(&self) -> bool {
        self.state.lock().cancelled
    }

    pub fn is_paused(&self) -> bool {
        self.state.lock().paused
    }

    /// Block while paused, then report whether the run may go on
    pub fn checkpoint(&self) -> Signal {
        let mut state = self.state.lock();
        while state.paused && !state.cancelled {
            self.wake.wait(&mut state);
        }
        if state.cancelled {
            Signal::Cancel
        } else {
            Signal::Continue
        }
    }
}
