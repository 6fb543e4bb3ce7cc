//! Deterministic scheduling of logical threads.
//!
//! Simulated threads never run in parallel: one runs until the scheduler
//! decides to switch. The decision sequence is a function of the seed.

use crate::random::DeterministicRng;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScheduleDecision {
    /// Keep running the current thread.
    Continue,
    /// Switch to the given thread.
    SwitchTo(usize),
}

#[derive(Debug, Clone)]
pub struct Scheduler {
    rng: DeterministicRng,
    threads_count: usize,
    current: usize,
    yield_probability: f64,
}

impl Scheduler {
    #[must_use]
    pub fn new(rng: DeterministicRng, threads_count: usize, yield_probability: f64) -> Self {
        debug_assert!(threads_count > 0, "Scheduler needs at least one thread");
        Self {
            rng,
            threads_count,
            current: 0,
            yield_probability,
        }
    }

    #[must_use]
    pub fn current_thread(&self) -> usize {
        self.current
    }

    #[must_use]
    pub fn threads_count(&self) -> usize {
        self.threads_count
    }

    /// Decide at a yield point whether to switch.
    pub fn decide(&mut self) -> ScheduleDecision {
        if self.threads_count < 2 || !self.rng.gen_bool(self.yield_probability) {
            return ScheduleDecision::Continue;
        }
        self.switch_to_other()
    }

    /// Switch unconditionally (to some other thread when there is one).
    pub fn force_switch(&mut self) -> ScheduleDecision {
        if self.threads_count < 2 {
            return ScheduleDecision::Continue;
        }
        self.switch_to_other()
    }

    fn switch_to_other(&mut self) -> ScheduleDecision {
        let offset = self.rng.gen_range(1..self.threads_count);
        self.current = (self.current + offset) % self.threads_count;
        ScheduleDecision::SwitchTo(self.current)
    }
}
