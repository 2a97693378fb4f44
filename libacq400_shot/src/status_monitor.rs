use parking_lot::{Condvar, Mutex};
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Observed transport state of a UUT over one shot
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum UutState {
    #[default]
    Idle,
    Arming,
    Armed,
    Running,
    Stopped,
}

/// A binary event which can be set, cleared and waited on with a bound.
///
/// Cloning shares the underlying flag.
#[derive(Debug, Clone, Default)]
pub struct EventFlag {
    inner: Arc<(Mutex<bool>, Condvar)>,
}

impl EventFlag {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(&self) {
        let (flag, condvar) = &*self.inner;
        *flag.lock() = true;
        condvar.notify_all();
    }

    pub fn clear(&self) {
        *self.inner.0.lock() = false;
    }

    pub fn is_set(&self) -> bool {
        *self.inner.0.lock()
    }

    /// Block until the flag is set or `timeout` elapses. Returns the state of the flag
    pub fn wait_timeout(&self, timeout: Duration) -> bool {
        match Instant::now().checked_add(timeout) {
            Some(deadline) => self.wait_until(deadline),
            None => self.wait(),
        }
    }

    /// Block until the flag is set
    pub fn wait(&self) -> bool {
        let (flag, condvar) = &*self.inner;
        let mut guard = flag.lock();
        while !*guard {
            condvar.wait(&mut guard);
        }
        true
    }

    /// Block until the flag is set or `deadline` passes. Returns the state of the flag
    pub fn wait_until(&self, deadline: Instant) -> bool {
        let (flag, condvar) = &*self.inner;
        let mut guard = flag.lock();
        while !*guard {
            if condvar.wait_until(&mut guard, deadline).timed_out() {
                return *guard;
            }
        }
        true
    }
}

/// Tracks the state of one UUT and exposes the `armed` and `stopped` events a shot
/// controller waits on.
///
/// Whatever watches the hardware calls [`StatusMonitor::observe`] with each new state.
/// Entering `Armed` sets `armed`; entering `Stopped` sets `stopped`. Neither is cleared
/// by the monitor itself.
#[derive(Debug, Clone, Default)]
pub struct StatusMonitor {
    pub armed: EventFlag,
    pub stopped: EventFlag,
    state: Arc<Mutex<UutState>>,
}

impl StatusMonitor {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn state(&self) -> UutState {
        *self.state.lock()
    }

    pub fn observe(&self, state: UutState) {
        let previous = std::mem::replace(&mut *self.state.lock(), state);
        if previous == state {
            return;
        }
        log::debug!("UUT state {previous:?} -> {state:?}");
        match state {
            UutState::Armed => self.armed.set(),
            UutState::Stopped => self.stopped.set(),
            _ => (),
        }
    }

    pub fn wait_armed(&self, timeout: Duration) -> bool {
        self.armed.wait_timeout(timeout)
    }

    pub fn wait_stopped(&self, timeout: Duration) -> bool {
        self.stopped.wait_timeout(timeout)
    }
}
