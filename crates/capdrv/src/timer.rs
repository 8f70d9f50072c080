use std::collections::HashSet;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::thread;
use std::time::Duration;

/// Opaque handle to a scheduled one-shot task.
pub type TimerId = u64;

/// One-shot timer scheduling consumed by the driver.
///
/// The driver uses timers for command timeouts and error-retry reopens.
/// The host supplies its own implementation when it already runs a timer
/// wheel; [`ThreadTimers`] is a standalone default.
pub trait TimerService: Send + Sync {
    /// Run `task` once after `delay`, unless cancelled first.
    fn schedule(&self, delay: Duration, task: Box<dyn FnOnce() + Send>) -> TimerId;

    /// Cancel a scheduled task. Cancelling a fired or unknown id is a no-op.
    fn cancel(&self, id: TimerId);
}

/// Thread-per-task timer service.
#[derive(Debug, Default)]
pub struct ThreadTimers {
    next_id: AtomicU64,
    live: Arc<Mutex<HashSet<TimerId>>>,
}

impl ThreadTimers {
    pub fn new() -> Self {
        Self::default()
    }
}

impl TimerService for ThreadTimers {
    fn schedule(&self, delay: Duration, task: Box<dyn FnOnce() + Send>) -> TimerId {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed) + 1;
        lock(&self.live).insert(id);

        let live = Arc::clone(&self.live);
        thread::spawn(move || {
            thread::sleep(delay);
            // Cancelled timers are removed from the live set before we wake.
            if lock(&live).remove(&id) {
                task();
            }
        });

        id
    }

    fn cancel(&self, id: TimerId) {
        lock(&self.live).remove(&id);
    }
}

fn lock(live: &Mutex<HashSet<TimerId>>) -> std::sync::MutexGuard<'_, HashSet<TimerId>> {
    live.lock().unwrap_or_else(PoisonError::into_inner)
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::AtomicBool;
    use std::sync::mpsc;

    use super::*;

    #[test]
    fn scheduled_task_fires() {
        let timers = ThreadTimers::new();
        let (tx, rx) = mpsc::channel();

        timers.schedule(
            Duration::from_millis(5),
            Box::new(move || tx.send(()).unwrap()),
        );

        rx.recv_timeout(Duration::from_secs(2)).unwrap();
    }

    #[test]
    fn cancelled_task_does_not_fire() {
        let timers = ThreadTimers::new();
        let fired = Arc::new(AtomicBool::new(false));
        let flag = Arc::clone(&fired);

        let id = timers.schedule(
            Duration::from_millis(20),
            Box::new(move || flag.store(true, Ordering::SeqCst)),
        );
        timers.cancel(id);

        thread::sleep(Duration::from_millis(60));
        assert!(!fired.load(Ordering::SeqCst));
    }
}
