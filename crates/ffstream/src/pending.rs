use std::sync::{Condvar, Mutex};
use std::time::{Duration, Instant};

/// Count of outstanding background work with a blocking wait for zero.
///
/// The count lives under the same mutex the condvar waits on, so a `done()` can
/// never slip between a waiter's check and its sleep.
#[derive(Debug, Default)]
pub struct Pending {
    count: Mutex<usize>,
    cv: Condvar,
}

impl Pending {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&self) {
        let mut g = self.count.lock().unwrap();
        *g += 1;
    }

    /// Mark one unit finished. Extra calls at zero are ignored.
    pub fn done(&self) {
        let mut g = self.count.lock().unwrap();
        *g = g.saturating_sub(1);
        let reached_zero = *g == 0;
        drop(g);
        if reached_zero {
            self.cv.notify_all();
        }
    }

    pub fn count(&self) -> usize {
        *self.count.lock().unwrap()
    }

    /// Block until the count reaches zero.
    pub fn wait(&self) {
        let mut g = self.count.lock().unwrap();
        while *g > 0 {
            g = self.cv.wait(g).unwrap();
        }
    }

    /// Block until the count reaches zero or `timeout` passes.
    ///
    /// Returns `true` if the count reached zero.
    pub fn wait_timeout(&self, timeout: Duration) -> bool {
        let deadline = Instant::now() + timeout;
        let mut g = self.count.lock().unwrap();
        while *g > 0 {
            let now = Instant::now();
            if now >= deadline {
                return false;
            }
            let (ng, _timeout) = self.cv.wait_timeout(g, deadline - now).unwrap();
            g = ng;
        }
        true
    }
}
