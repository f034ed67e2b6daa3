//! Completion gate: a counter + waiter for asynchronous host callbacks.
//!
//! The test-execution thread arms the gate with an expected signal count
//! and parks in [`CompletionGate::wait_for`]; host callbacks (running on
//! the privileged thread) call [`CompletionGate::signal`]. The waiter and
//! the signalers must be different threads or the wait deadlocks. The
//! gate is single-use per logical wait and is reused sequentially by
//! re-arming.
//!
//! Signals that land while the gate is disarmed still count: a host
//! callback may fire between listener registration and the waiter
//! reaching `wait_for`, and that delivery must not be lost.

use std::sync::{Condvar, Mutex};
use std::time::{Duration, Instant};
use thiserror::Error;

/// Errors raised by [`CompletionGate::wait_for`].
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum GateError {
    /// The wait elapsed before enough signals were delivered. Carries the
    /// last-known delivered count for diagnostics.
    #[error("completion gate timed out after {waited:?} with {delivered}/{expected} signals")]
    Timeout {
        expected: u32,
        delivered: u32,
        waited: Duration,
    },
}

#[derive(Debug, Default)]
struct GateState {
    expected: u32,
    delivered: u32,
}

/// Thread-safe counter + waiter. See module docs.
#[derive(Debug, Default)]
pub struct CompletionGate {
    state: Mutex<GateState>,
    wakeup: Condvar,
}

impl CompletionGate {
    /// Create a disarmed gate: `wait_for` returns immediately until
    /// [`arm`](Self::arm) sets an expectation.
    pub fn new() -> Self {
        Self::default()
    }

    /// Reset the gate for a new logical wait expecting `expected` signals.
    pub fn arm(&self, expected: u32) {
        let mut state = self.state.lock().expect("gate lock poisoned");
        state.expected = expected;
        state.delivered = 0;
    }

    /// Deliver one signal and wake the waiter. Safe to call from any
    /// thread, any number of times; extra signals after a resolved wait
    /// have no effect on that wait.
    pub fn signal(&self) {
        let mut state = self.state.lock().expect("gate lock poisoned");
        state.delivered = state.delivered.saturating_add(1);
        self.wakeup.notify_all();
    }

    /// Signals delivered since the last [`arm`](Self::arm).
    pub fn delivered(&self) -> u32 {
        self.state.lock().expect("gate lock poisoned").delivered
    }

    /// Block until the armed expectation is met or `timeout` elapses.
    pub fn wait_for(&self, timeout: Duration) -> Result<(), GateError> {
        let expected = self.state.lock().expect("gate lock poisoned").expected;
        self.wait_until(expected, timeout)
    }

    /// Block until at least `count` signals have been delivered since the
    /// last arm, independent of the armed expectation.
    pub fn wait_for_count(&self, count: u32, timeout: Duration) -> Result<(), GateError> {
        self.wait_until(count, timeout)
    }

    fn wait_until(&self, target: u32, timeout: Duration) -> Result<(), GateError> {
        let started = Instant::now();
        let mut state = self.state.lock().expect("gate lock poisoned");
        loop {
            if state.delivered >= target {
                return Ok(());
            }
            let waited = started.elapsed();
            let Some(remaining) = timeout.checked_sub(waited) else {
                return Err(GateError::Timeout {
                    expected: target,
                    delivered: state.delivered,
                    waited,
                });
            };
            let (guard, timed_out) = self
                .wakeup
                .wait_timeout(state, remaining)
                .expect("gate lock poisoned");
            state = guard;
            if timed_out.timed_out() && state.delivered < target {
                return Err(GateError::Timeout {
                    expected: target,
                    delivered: state.delivered,
                    waited: started.elapsed(),
                });
            }
        }
    }
}
