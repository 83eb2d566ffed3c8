//! One-shot timer scheduling.
//!
//! The controller needs exactly one kind of timer: the cancellable reopen
//! timer armed after a source error when retry is enabled. [`TimerService`]
//! keeps that dependency injectable so tests can fire timers
//! deterministically; [`TokioTimers`] is the production implementation.

use std::collections::HashMap;
use std::sync::Mutex;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

/// Opaque handle to a scheduled timer.
pub type TimerId = u64;

/// One-shot timer scheduling service.
pub trait TimerService: Send + Sync {
    /// Schedule `cb` to run once after `delay`. Returns a handle usable
    /// with [`remove_timer`](TimerService::remove_timer).
    fn register_timer(&self, delay: Duration, cb: Box<dyn FnOnce() + Send>) -> TimerId;

    /// Cancel a scheduled timer. Removing an already-fired or unknown
    /// timer is a no-op.
    fn remove_timer(&self, id: TimerId);
}

/// [`TimerService`] backed by spawned tokio tasks.
///
/// Must be used from within a tokio runtime. Cancellation aborts the
/// sleeping task; fired tasks are pruned lazily on the next registration.
pub struct TokioTimers {
    next_id: AtomicU64,
    tasks: Mutex<HashMap<TimerId, tokio::task::JoinHandle<()>>>,
}

impl TokioTimers {
    /// Create a new timer service.
    pub fn new() -> Self {
        TokioTimers {
            next_id: AtomicU64::new(1),
            tasks: Mutex::new(HashMap::new()),
        }
    }
}

impl Default for TokioTimers {
    fn default() -> Self {
        Self::new()
    }
}

impl TimerService for TokioTimers {
    fn register_timer(&self, delay: Duration, cb: Box<dyn FnOnce() + Send>) -> TimerId {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);

        let handle = tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            cb();
        });

        let mut tasks = self.tasks.lock().unwrap();
        tasks.retain(|_, h| !h.is_finished());
        tasks.insert(id, handle);

        id
    }

    fn remove_timer(&self, id: TimerId) {
        let handle = self.tasks.lock().unwrap().remove(&id);
        if let Some(handle) = handle {
            handle.abort();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::sync::atomic::AtomicBool;

    #[tokio::test]
    async fn timer_fires_after_delay() {
        let timers = TokioTimers::new();
        let fired = Arc::new(AtomicBool::new(false));

        let flag = Arc::clone(&fired);
        timers.register_timer(
            Duration::from_millis(10),
            Box::new(move || flag.store(true, Ordering::SeqCst)),
        );

        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(fired.load(Ordering::SeqCst));
    }

    #[tokio::test]
    async fn removed_timer_does_not_fire() {
        let timers = TokioTimers::new();
        let fired = Arc::new(AtomicBool::new(false));

        let flag = Arc::clone(&fired);
        let id = timers.register_timer(
            Duration::from_millis(20),
            Box::new(move || flag.store(true, Ordering::SeqCst)),
        );
        timers.remove_timer(id);

        tokio::time::sleep(Duration::from_millis(60)).await;
        assert!(!fired.load(Ordering::SeqCst));
    }

    #[tokio::test]
    async fn removing_unknown_timer_is_noop() {
        let timers = TokioTimers::new();
        timers.remove_timer(99);
    }

    #[tokio::test]
    async fn timer_ids_are_unique() {
        let timers = TokioTimers::new();
        let a = timers.register_timer(Duration::from_secs(10), Box::new(|| {}));
        let b = timers.register_timer(Duration::from_secs(10), Box::new(|| {}));
        assert_ne!(a, b);
        timers.remove_timer(a);
        timers.remove_timer(b);
    }
}
