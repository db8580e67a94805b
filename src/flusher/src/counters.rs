//! Progress counters
//!
//! Thread-safe (files, bytes) accumulators with two views: a window that is
//! read and zeroed at every report, and a lifetime total that only grows.

use parking_lot::Mutex;
use std::ops::{Add, AddAssign};
use std::sync::Arc;
use std::time::{Duration, Instant};

/// A (files, bytes) pair
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Tally {
    pub files: u64,
    pub bytes: u64,
}

impl Tally {
    pub const fn new(files: u64, bytes: u64) -> Self {
        Self { files, bytes }
    }
}

impl Add for Tally {
    type Output = Tally;

    fn add(self, rhs: Tally) -> Tally {
        Tally {
            files: self.files + rhs.files,
            bytes: self.bytes + rhs.bytes,
        }
    }
}

impl AddAssign for Tally {
    fn add_assign(&mut self, rhs: Tally) {
        *self = *self + rhs;
    }
}

/// Windowed and lifetime counters shared by a worker pool
#[derive(Debug, Clone)]
pub struct Counters {
    inner: Arc<CountersInner>,
}

#[derive(Debug)]
struct CountersInner {
    tallies: Mutex<Tallies>,
    start: Instant,
}

#[derive(Debug, Default)]
struct Tallies {
    window: Tally,
    lifetime: Tally,
}

impl Default for Counters {
    fn default() -> Self {
        Self::new()
    }
}

impl Counters {
    /// Create zeroed counters; elapsed time starts now
    pub fn new() -> Self {
        Self {
            inner: Arc::new(CountersInner {
                tallies: Mutex::new(Tallies::default()),
                start: Instant::now(),
            }),
        }
    }

    /// Add to both the window and the lifetime total
    pub fn add(&self, files: u64, bytes: u64) {
        let delta = Tally::new(files, bytes);
        let mut tallies = self.inner.tallies.lock();
        tallies.window += delta;
        tallies.lifetime += delta;
    }

    /// Return the window accumulated since the previous reset and zero it
    pub fn reset(&self) -> Tally {
        std::mem::take(&mut self.inner.tallies.lock().window)
    }

    /// Lifetime total, unaffected by resets
    pub fn total(&self) -> Tally {
        self.inner.tallies.lock().lifetime
    }

    /// Time since these counters were created
    pub fn elapsed(&self) -> Duration {
        self.inner.start.elapsed()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;

    #[test]
    fn test_counters_initialization() {
        let counters = Counters::new();
        assert_eq!(counters.total(), Tally::default());
        assert_eq!(counters.reset(), Tally::default());
    }

    #[test]
    fn test_reset_returns_window_and_zeroes_it() {
        let counters = Counters::new();
        counters.add(3, 300);
        counters.add(2, 50);

        assert_eq!(counters.reset(), Tally::new(5, 350));
        assert_eq!(counters.reset(), Tally::new(0, 0));

        counters.add(1, 10);
        assert_eq!(counters.reset(), Tally::new(1, 10));
    }

    #[test]
    fn test_total_ignores_resets() {
        let counters = Counters::new();
        let deltas = [(1, 100), (0, 0), (7, 3), (12, 4096), (1, 1)];

        for (i, (files, bytes)) in deltas.iter().enumerate() {
            counters.add(*files, *bytes);
            if i % 2 == 0 {
                counters.reset();
            }
        }

        assert_eq!(counters.total(), Tally::new(21, 4200));
    }

    #[test]
    fn test_clone_shares_state() {
        let counters = Counters::new();
        let shared = counters.clone();
        shared.add(1, 2);
        assert_eq!(counters.total(), Tally::new(1, 2));
    }

    #[test]
    fn test_elapsed_advances() {
        let counters = Counters::new();
        thread::sleep(Duration::from_millis(5));
        assert!(counters.elapsed() >= Duration::from_millis(5));
    }

    #[test]
    fn test_counters_thread_safety() {
        let counters = Counters::new();
        let mut handles = vec![];

        // 10 threads, each adding 100 times while one of them resets
        for t in 0..10 {
            let counters = counters.clone();
            handles.push(thread::spawn(move || {
                let mut seen = Tally::default();
                for _ in 0..100 {
                    counters.add(1, 10);
                    if t == 0 {
                        seen += counters.reset();
                    }
                }
                seen
            }));
        }

        let mut windows = Tally::default();
        for handle in handles {
            windows += handle.join().unwrap();
        }
        windows += counters.reset();

        assert_eq!(counters.total(), Tally::new(1000, 10_000));
        // Every add landed in exactly one window
        assert_eq!(windows, Tally::new(1000, 10_000));
    }
}
