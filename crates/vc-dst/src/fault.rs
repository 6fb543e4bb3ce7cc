//! Probabilistic fault injection driven by a `DeterministicRng`.

use crate::random::DeterministicRng;

/// How often faults fire.
#[derive(Debug, Clone)]
pub struct FaultConfig {
    /// Probability that `should_fail` returns true.
    pub failure_probability: f64,
    /// Probability that `maybe_delay` yields a delay.
    pub delay_probability: f64,
    /// Upper bound for a single injected delay.
    pub max_delay_ns: u64,
}

impl Default for FaultConfig {
    fn default() -> Self {
        Self {
            failure_probability: 0.05,
            delay_probability: 0.1,
            max_delay_ns: 1_000_000,
        }
    }
}

impl FaultConfig {
    /// No faults at all.
    #[must_use]
    pub fn none() -> Self {
        Self {
            failure_probability: 0.0,
            delay_probability: 0.0,
            max_delay_ns: 0,
        }
    }

    #[must_use]
    pub fn aggressive() -> Self {
        Self {
            failure_probability: 0.25,
            delay_probability: 0.5,
            max_delay_ns: 10_000_000,
        }
    }
}

/// Counters for injected faults.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FaultStats {
    pub checks_count: u64,
    pub faults_count: u64,
    pub delays_count: u64,
}

#[derive(Debug, Clone)]
pub struct FaultInjector {
    rng: DeterministicRng,
    config: FaultConfig,
    stats: FaultStats,
}

impl FaultInjector {
    #[must_use]
    pub fn new(rng: DeterministicRng, config: FaultConfig) -> Self {
        debug_assert!(
            (0.0..=1.0).contains(&config.failure_probability),
            "failure_probability out of range: {}",
            config.failure_probability
        );
        Self {
            rng,
            config,
            stats: FaultStats::default(),
        }
    }

    #[must_use]
    pub fn config(&self) -> &FaultConfig {
        &self.config
    }

    /// Decide whether the next operation fails.
    pub fn should_fail(&mut self) -> bool {
        self.stats.checks_count += 1;
        if self.config.failure_probability <= 0.0 {
            return false;
        }
        let fail = self.rng.gen_bool(self.config.failure_probability);
        if fail {
            self.stats.faults_count += 1;
        }
        fail
    }

    /// A delay in nanoseconds, or `None`.
    pub fn maybe_delay(&mut self) -> Option<u64> {
        if self.config.delay_probability <= 0.0 || self.config.max_delay_ns == 0 {
            return None;
        }
        if !self.rng.gen_bool(self.config.delay_probability) {
            return None;
        }
        self.stats.delays_count += 1;
        Some(self.rng.gen_range(1..=self.config.max_delay_ns))
    }

    /// Pick one of `choices` uniformly; used to choose a fault type.
    pub fn pick<T: Copy>(&mut self, choices: &[T]) -> Option<T> {
        self.rng.choose(choices).copied()
    }

    #[must_use]
    pub fn stats(&self) -> FaultStats {
        self.stats
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_none_never_fails() {
        let mut injector = FaultInjector::new(DeterministicRng::new(3), FaultConfig::none());
        for _ in 0..1_000 {
            assert!(!injector.should_fail());
            assert!(injector.maybe_delay().is_none());
        }
        assert_eq!(injector.stats().faults_count, 0);
        assert_eq!(injector.stats().checks_count, 1_000);
    }

    #[test]
    fn test_aggressive_fails_sometimes() {
        let mut injector =
            FaultInjector::new(DeterministicRng::new(3), FaultConfig::aggressive());
        let failures = (0..1_000).filter(|_| injector.should_fail()).count();
        assert!(failures > 100 && failures < 500, "failures = {}", failures);
    }

    #[test]
    fn test_same_seed_same_faults() {
        let run = |seed| {
            let mut injector = FaultInjector::new(DeterministicRng::new(seed), FaultConfig::default());
            (0..200).map(|_| injector.should_fail()).collect::<Vec<_>>()
        };
        assert_eq!(run(11), run(11));
    }
}
