//! Deterministic timer service for tests.
//!
//! [`ManualTimers`] never fires on its own: tests inspect what is scheduled
//! with [`pending`](ManualTimers::pending) and fire a timer explicitly with
//! [`fire`](ManualTimers::fire). Removal behaves exactly like the
//! production service.

use std::sync::Mutex;
use std::time::Duration;

use aircap_core::{TimerId, TimerService};

struct Entry {
    id: TimerId,
    delay: Duration,
    cb: Box<dyn FnOnce() + Send>,
}

/// A [`TimerService`] driven by the test.
pub struct ManualTimers {
    state: Mutex<(u64, Vec<Entry>)>,
}

impl ManualTimers {
    /// Create an empty timer service.
    pub fn new() -> Self {
        ManualTimers {
            state: Mutex::new((1, Vec::new())),
        }
    }

    /// Scheduled timers as `(id, delay)` pairs, in registration order.
    pub fn pending(&self) -> Vec<(TimerId, Duration)> {
        self.state
            .lock()
            .unwrap()
            .1
            .iter()
            .map(|e| (e.id, e.delay))
            .collect()
    }

    /// Number of scheduled timers.
    pub fn len(&self) -> usize {
        self.state.lock().unwrap().1.len()
    }

    /// Whether nothing is scheduled.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Fire one timer now. Returns false if the id is not scheduled.
    ///
    /// The callback runs outside the internal lock, so it may freely
    /// register or remove timers.
    pub fn fire(&self, id: TimerId) -> bool {
        let entry = {
            let mut state = self.state.lock().unwrap();
            let pos = state.1.iter().position(|e| e.id == id);
            pos.map(|pos| state.1.remove(pos))
        };
        match entry {
            Some(entry) => {
                (entry.cb)();
                true
            }
            None => false,
        }
    }

    /// Fire the earliest-registered timer, if any.
    pub fn fire_next(&self) -> bool {
        let id = self.state.lock().unwrap().1.first().map(|e| e.id);
        match id {
            Some(id) => self.fire(id),
            None => false,
        }
    }
}

impl Default for ManualTimers {
    fn default() -> Self {
        Self::new()
    }
}

impl TimerService for ManualTimers {
    fn register_timer(&self, delay: Duration, cb: Box<dyn FnOnce() + Send>) -> TimerId {
        let mut state = self.state.lock().unwrap();
        let id = state.0;
        state.0 += 1;
        state.1.push(Entry { id, delay, cb });
        id
    }

    fn remove_timer(&self, id: TimerId) {
        self.state.lock().unwrap().1.retain(|e| e.id != id);
    }
}
