use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

/// Nanoseconds on the host's monotonic uptime clock
pub type Timestamp = u64;

pub const NS_PER_MS: u64 = 1_000_000;

/// Monotonic time source the driver timestamps events with and sleeps on.
///
/// Keyboard activity timestamps handed to the driver must come from the
/// same clock.
pub trait Clock: Send {
    fn now_ns(&self) -> Timestamp;
    fn sleep(&self, duration: Duration);
}

/// Host clock backed by `Instant`, counting from its creation.
///
/// Clones share the epoch.
#[derive(Clone, Copy)]
pub struct SystemClock {
    epoch: Instant,
}

impl SystemClock {
    pub fn new() -> Self {
        Self {
            epoch: Instant::now(),
        }
    }
}

impl Clock for SystemClock {
    fn now_ns(&self) -> Timestamp {
        self.epoch.elapsed().as_nanos() as Timestamp
    }

    fn sleep(&self, duration: Duration) {
        std::thread::sleep(duration);
    }
}

/// Manually driven clock. Sleeping advances time instantly.
///
/// Clones share the same time, so a test can keep a handle while the driver
/// owns another.
#[derive(Clone, Default)]
pub struct ManualClock {
    now: Arc<AtomicU64>,
}

impl ManualClock {
    pub fn new(start: Timestamp) -> Self {
        Self {
            now: Arc::new(AtomicU64::new(start)),
        }
    }

    pub fn set(&self, now: Timestamp) {
        self.now.store(now, Ordering::SeqCst);
    }

    pub fn advance(&self, duration: Duration) {
        self.now
            .fetch_add(duration.as_nanos() as u64, Ordering::SeqCst);
    }
}

impl Clock for ManualClock {
    fn now_ns(&self) -> Timestamp {
        self.now.load(Ordering::SeqCst)
    }

    fn sleep(&self, duration: Duration) {
        self.advance(duration);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn manual_clock_shared() {
        let a = ManualClock::new(5);
        let b = a.clone();
        b.sleep(Duration::from_millis(2));
        assert_eq!(a.now_ns(), 5 + 2 * NS_PER_MS);
    }

    #[test]
    fn system_clock_monotonic() {
        let c = SystemClock::new();
        let t1 = c.now_ns();
        let t2 = c.now_ns();
        assert!(t2 >= t1);
    }
}
