//! Bounded spin-then-yield backoff for CAS retry loops.

use std::sync::OnceLock;
use std::{hint, thread};

use tracing::trace;

/// Every `YIELD_FREQUENCY`-th spin yields the thread instead of spinning.
pub const YIELD_FREQUENCY: u32 = 4000;

/// Extra spin iterations per consecutive failure.
pub const SPIN_STEP: f32 = 0.032;

fn is_single_cpu() -> bool {
    static CPUS: OnceLock<usize> = OnceLock::new();
    *CPUS.get_or_init(|| thread::available_parallelism().map_or(1, |n| n.get())) == 1
}

/// Backoff state for one operation's retry loop.
///
/// Each failed CAS calls [`Backoff::spin`]. The spin count grows linearly
/// with the number of failures and resets to a yield every
/// [`YIELD_FREQUENCY`] failures. On a single CPU spinning cannot help, so
/// every call yields.
#[derive(Debug, Default)]
pub struct Backoff {
    count: u32,
}

impl Backoff {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Failures seen so far.
    #[must_use]
    pub fn count(&self) -> u32 {
        self.count
    }

    pub fn spin(&mut self) {
        self.count = (self.count + 1) % (i32::MAX as u32);

        if is_single_cpu() {
            thread::yield_now();
            return;
        }

        let step = self.count % YIELD_FREQUENCY;
        if step > 0 {
            let iterations = (1.0 + step as f32 * SPIN_STEP) as u32;
            for _ in 0..iterations {
                hint::spin_loop();
            }
        } else {
            trace!(failures = self.count, "backoff yielding");
            thread::yield_now();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_count_grows() {
        let mut backoff = Backoff::new();
        for _ in 0..10 {
            backoff.spin();
        }
        assert_eq!(backoff.count(), 10);
    }

    #[test]
    fn test_yield_boundary_does_not_panic() {
        let mut backoff = Backoff {
            count: YIELD_FREQUENCY - 1,
        };
        backoff.spin();
        assert_eq!(backoff.count() % YIELD_FREQUENCY, 0);
        backoff.spin();
        assert_eq!(backoff.count(), YIELD_FREQUENCY + 1);
    }
}
