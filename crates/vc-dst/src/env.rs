//! The simulation environment: one seed, every source of nondeterminism.

use crate::clock::SimClock;
use crate::fault::{FaultConfig, FaultInjector};
use crate::random::DeterministicRng;
use crate::scheduler::Scheduler;

/// Deterministic environment handed to simulated operations.
#[derive(Debug)]
pub struct DstEnv {
    seed: u64,
    rng: DeterministicRng,
    clock: SimClock,
    fault: FaultInjector,
    scheduler: Option<Scheduler>,
}

impl DstEnv {
    /// Environment with the default fault configuration and no scheduler.
    #[must_use]
    pub fn new(seed: u64) -> Self {
        Self::with_fault_config(seed, FaultConfig::default())
    }

    #[must_use]
    pub fn with_fault_config(seed: u64, config: FaultConfig) -> Self {
        let mut rng = DeterministicRng::new(seed);
        let fault = FaultInjector::new(rng.fork(), config);
        Self {
            seed,
            rng,
            clock: SimClock::new(),
            fault,
            scheduler: None,
        }
    }

    /// Environment that also schedules `threads_count` logical threads.
    #[must_use]
    pub fn with_scheduler(seed: u64, threads_count: usize) -> Self {
        Self::new(seed).scheduled(threads_count, 0.2)
    }

    /// Attach a scheduler.
    #[must_use]
    pub fn scheduled(mut self, threads_count: usize, yield_probability: f64) -> Self {
        let rng = self.rng.fork();
        self.scheduler = Some(Scheduler::new(rng, threads_count, yield_probability));
        self
    }

    #[must_use]
    pub fn seed(&self) -> u64 {
        self.seed
    }

    pub fn rng(&mut self) -> &mut DeterministicRng {
        &mut self.rng
    }

    pub fn clock(&mut self) -> &mut SimClock {
        &mut self.clock
    }

    pub fn fault(&mut self) -> &mut FaultInjector {
        &mut self.fault
    }

    pub fn scheduler(&mut self) -> Option<&mut Scheduler> {
        self.scheduler.as_mut()
    }

    /// Advance the clock by an injected delay, if one fires.
    pub fn maybe_delay(&mut self) -> Option<u64> {
        let delay = self.fault.maybe_delay()?;
        self.clock.advance_ns(delay);
        Some(delay)
    }

    /// `DST_SEED=<seed>`, for assertion messages.
    #[must_use]
    pub fn format_seed(&self) -> String {
        format!("DST_SEED={}", self.seed)
    }

    /// One-line summary of simulated time and injected faults.
    #[must_use]
    pub fn stats(&self) -> String {
        let faults = self.fault.stats();
        format!(
            "{} time_ns={} fault_checks={} faults={} delays={}",
            self.format_seed(),
            self.clock.now_ns(),
            faults.checks_count,
            faults.faults_count,
            faults.delays_count
        )
    }
}
