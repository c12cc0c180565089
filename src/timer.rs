//! Time source for virtual node expiry
//!
//! The tree does not run timers of its own. It consumes a wheel-timer-like
//! seam: it asks for the current time when stamping expiries and requests a
//! wakeup at each new deadline. The owning session is expected to call
//! [`crate::PriorityTree::expire_nodes`] when a requested deadline passes;
//! the tree re-checks every expiry at that point, so spurious or late
//! wakeups are harmless.

use std::cell::{Cell, RefCell};
use std::time::{Duration, Instant};

/// Scheduling seam consumed by the priority tree
pub trait WheelTimer {
    /// Current time on the connection's event loop clock
    fn now(&self) -> Instant;

    /// Request a wakeup at `deadline`
    ///
    /// The owner should arrange for [`crate::PriorityTree::expire_nodes`] to
    /// run at or after `deadline`. Requests may be coalesced; firing late or
    /// more than once is fine.
    fn schedule(&self, deadline: Instant);
}

/// Manually advanced timer for tests and simulations
///
/// Time starts at construction and only moves when [`ManualTimer::advance`]
/// is called. Scheduled deadlines are recorded and can be inspected.
#[derive(Debug)]
pub struct ManualTimer {
    start: Instant,
    elapsed: Cell<Duration>,
    deadlines: RefCell<Vec<Instant>>,
}

impl ManualTimer {
    /// Create a timer frozen at the current instant
    pub fn new() -> Self {
        ManualTimer {
            start: Instant::now(),
            elapsed: Cell::new(Duration::ZERO),
            deadlines: RefCell::new(Vec::new()),
        }
    }

    /// Move the clock forward by `step`
    pub fn advance(&self, step: Duration) {
        self.elapsed.set(self.elapsed.get() + step);
    }

    /// Deadlines requested so far, in request order
    pub fn scheduled(&self) -> Vec<Instant> {
        self.deadlines.borrow().clone()
    }
}

impl Default for ManualTimer {
    fn default() -> Self {
        Self::new()
    }
}

impl WheelTimer for ManualTimer {
    fn now(&self) -> Instant {
        self.start + self.elapsed.get()
    }

    fn schedule(&self, deadline: Instant) {
        self.deadlines.borrow_mut().push(deadline);
    }
}
