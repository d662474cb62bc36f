//! Cooperative cancellation and the input-pause rendezvous.
//!
//! Shared between the worker thread and whoever drives it. A single
//! condvar wakes sleepers on stop and input, so neither needs to poll.

use parking_lot::{Condvar, Mutex};
use std::time::{Duration, Instant};

#[derive(Debug, Default)]
struct ControlState {
    stopped: bool,
    input: Option<String>,
}

#[derive(Debug, Default)]
pub struct RunControl {
    state: Mutex<ControlState>,
    wake: Condvar,
}

impl RunControl {
    pub fn new() -> Self {
        Self::default()
    }

    /// Sticky: once stopped, every later wait returns immediately.
    pub fn stop(&self) {
        self.state.lock().stopped = true;
        self.wake.notify_all();
    }

    pub fn is_stopped(&self) -> bool {
        self.state.lock().stopped
    }

    /// Sleeps for `duration` unless stopped first. Returns `true` when the
    /// full duration elapsed.
    pub fn sleep(&self, duration: Duration) -> bool {
        let deadline = Instant::now() + duration;
        let mut state = self.state.lock();
        loop {
            if state.stopped {
                return false;
            }
            if self.wake.wait_until(&mut state, deadline).timed_out() {
                return !state.stopped;
            }
        }
    }

    /// Answers the pending (or next) input request.
    pub fn provide_input(&self, value: impl Into<String>) {
        self.state.lock().input = Some(value.into());
        self.wake.notify_all();
    }

    /// Blocks until input arrives. `None` when stopped first.
    pub fn await_input(&self) -> Option<String> {
        let mut state = self.state.lock();
        loop {
            if state.stopped {
                return None;
            }
            if let Some(value) = state.input.take() {
                return Some(value);
            }
            self.wake.wait(&mut state);
        }
    }
}
