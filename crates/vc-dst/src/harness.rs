//! Simulated logical threads over one seeded environment.
//!
//! A run interleaves operations from `threads_count` logical threads on the
//! calling OS thread. The scheduler picks who goes next, the fault injector
//! may add simulated delays between operations, and a caller-supplied check
//! runs every `invariant_check_interval` operations. The last few actions
//! are kept so a failure can be shown as a step-by-thread table.

use std::collections::VecDeque;
use std::fmt::{Debug, Write as _};

use vc_core::{Counterexample, StateSnapshot, ThreadAction};

use crate::{DstEnv, FaultConfig, ScheduleDecision};

const TRAIL_LEN: usize = 32;

#[derive(Debug, Clone)]
pub struct HarnessConfig {
    pub threads_count: usize,
    pub operations_per_thread: u64,
    /// Chance of a context switch after each operation.
    pub yield_probability: f64,
    pub fault_config: FaultConfig,
    /// 0 checks only once, at the end.
    pub invariant_check_interval: u64,
}

impl Default for HarnessConfig {
    fn default() -> Self {
        Self {
            threads_count: 4,
            operations_per_thread: 100,
            yield_probability: 0.2,
            fault_config: FaultConfig::default(),
            invariant_check_interval: 10,
        }
    }
}

impl HarnessConfig {
    /// Many threads, long runs, aggressive faults.
    #[must_use]
    pub fn stress() -> Self {
        Self {
            threads_count: 8,
            operations_per_thread: 1000,
            yield_probability: 0.3,
            fault_config: FaultConfig::aggressive(),
            invariant_check_interval: 100,
        }
    }

    /// Two threads, short runs, no faults.
    #[must_use]
    pub fn quick() -> Self {
        Self {
            threads_count: 2,
            operations_per_thread: 50,
            yield_probability: 0.1,
            fault_config: FaultConfig::none(),
            ..Self::default()
        }
    }
}

#[derive(Debug, Clone)]
pub struct HarnessResult {
    pub seed: u64,
    pub operations_count: u64,
    pub context_switches_count: u64,
    /// Simulated delays injected between operations.
    pub faults_injected_count: u64,
    pub invariant_checks_count: u64,
    pub all_invariants_held: bool,
    pub first_violation: Option<String>,
    pub counterexample: Option<Counterexample>,
}

impl HarnessResult {
    /// One summary line, then the violation and its trail if the run
    /// failed.
    #[must_use]
    pub fn format(&self) -> String {
        let mut out = format!(
            "[{}] DST_SEED={} ops={} switches={} faults={} checks={}",
            if self.all_invariants_held { "PASS" } else { "FAIL" },
            self.seed,
            self.operations_count,
            self.context_switches_count,
            self.faults_injected_count,
            self.invariant_checks_count
        );
        if let Some(violation) = &self.first_violation {
            let _ = write!(out, "\n  Violation: {}", violation);
        }
        if let Some(ce) = &self.counterexample {
            let _ = write!(out, "\n{}", ce.render_diagram());
        }
        out
    }
}

#[derive(Debug, Default)]
struct Tally {
    operations: u64,
    switches: u64,
    checks: u64,
    delays: u64,
}

/// Replays the same interleaving for the same seed and config.
pub struct DstHarness {
    env: DstEnv,
    config: HarnessConfig,
    tally: Tally,
    trail: VecDeque<ThreadAction>,
    violation: Option<String>,
}

impl DstHarness {
    #[must_use]
    pub fn new(seed: u64, config: HarnessConfig) -> Self {
        debug_assert!(seed != 0, "seed 0 is reserved");
        debug_assert!(
            (1..=16).contains(&config.threads_count),
            "threads_count {} outside 1..=16",
            config.threads_count
        );

        let env = DstEnv::with_fault_config(seed, config.fault_config.clone())
            .scheduled(config.threads_count, config.yield_probability);
        Self {
            env,
            config,
            tally: Tally::default(),
            trail: VecDeque::with_capacity(TRAIL_LEN),
            violation: None,
        }
    }

    #[must_use]
    pub fn seed(&self) -> u64 {
        self.env.seed()
    }

    pub fn env(&mut self) -> &mut DstEnv {
        &mut self.env
    }

    /// Runs `operations_per_thread` steps on logical thread 0. The generator
    /// may return `None` to skip a step.
    pub fn run_single_threaded<F, T, R>(&mut self, mut generate_op: F, mut execute: R) -> HarnessResult
    where
        F: FnMut(&mut DstEnv, u64) -> Option<T>,
        R: FnMut(&mut DstEnv, T) -> Result<(), String>,
        T: Debug,
    {
        for step in 0..self.config.operations_per_thread {
            if let Some(op) = generate_op(&mut self.env, step) {
                if !self.apply(0, op, |env, op| execute(env, op)) {
                    break;
                }
            }
            self.delay();
        }
        self.finish()
    }

    /// Interleaves `operations_per_thread` steps from every logical thread.
    ///
    /// `check_invariants` runs every `invariant_check_interval` executed
    /// operations and once more at the end. The first `Err` from `execute`
    /// or `check_invariants` stops the run.
    pub fn run_concurrent<F, T, R, I>(
        &mut self,
        mut generate_op: F,
        mut execute: R,
        mut check_invariants: I,
    ) -> HarnessResult
    where
        F: FnMut(&mut DstEnv, usize, u64) -> Option<T>,
        R: FnMut(&mut DstEnv, usize, T) -> Result<(), String>,
        I: FnMut() -> Result<(), String>,
        T: Debug,
    {
        let per_thread = self.config.operations_per_thread;
        let mut done = vec![0u64; self.config.threads_count];

        while done.iter().any(|&n| n < per_thread) {
            let thread = self.env.scheduler().map_or(0, |s| s.current_thread());
            if done[thread] == per_thread {
                if let Some(scheduler) = self.env.scheduler() {
                    scheduler.force_switch();
                }
                continue;
            }

            if let Some(op) = generate_op(&mut self.env, thread, done[thread]) {
                if !self.apply(thread, op, |env, op| execute(env, thread, op)) {
                    break;
                }
                if self.check_due() && !self.check(&mut check_invariants) {
                    break;
                }
            }

            done[thread] += 1;
            self.delay();
            self.switch();
        }

        if self.violation.is_none() {
            self.check(&mut check_invariants);
        }
        self.finish()
    }

    /// Executes one operation and records it. False once the run failed.
    fn apply<T: Debug>(
        &mut self,
        thread: usize,
        op: T,
        execute: impl FnOnce(&mut DstEnv, T) -> Result<(), String>,
    ) -> bool {
        let label = format!("{:?}", op);
        let outcome = execute(&mut self.env, op);

        self.tally.operations += 1;
        if self.trail.len() == TRAIL_LEN {
            self.trail.pop_front();
        }
        self.trail.push_back(ThreadAction {
            thread_id: thread as u64,
            step: self.tally.operations,
            action: label,
            success: outcome.is_ok(),
        });

        match outcome {
            Ok(()) => true,
            Err(e) => {
                self.fail(format!("Thread {}: {}", thread, e));
                false
            }
        }
    }

    fn check_due(&self) -> bool {
        let every = self.config.invariant_check_interval;
        every != 0 && self.tally.operations % every == 0
    }

    fn check(&mut self, check_invariants: &mut impl FnMut() -> Result<(), String>) -> bool {
        self.tally.checks += 1;
        match check_invariants() {
            Ok(()) => true,
            Err(e) => {
                self.fail(e);
                false
            }
        }
    }

    fn fail(&mut self, message: String) {
        self.violation.get_or_insert(message);
    }

    fn delay(&mut self) {
        if self.env.maybe_delay().is_some() {
            self.tally.delays += 1;
        }
    }

    fn switch(&mut self) {
        let decision = self
            .env
            .scheduler()
            .map_or(ScheduleDecision::Continue, |s| s.decide());
        if let ScheduleDecision::SwitchTo(_) = decision {
            self.tally.switches += 1;
        }
    }

    fn finish(&self) -> HarnessResult {
        let counterexample = self.violation.as_ref().map(|violation| {
            let mut ce = Counterexample::with_seed(self.seed()).with_description(violation.clone());
            for action in &self.trail {
                ce.add_action(action.clone());
            }
            ce.add_state(StateSnapshot {
                step: self.tally.operations,
                description: "violation detected".to_string(),
                variables: vec![],
            });
            ce
        });

        HarnessResult {
            seed: self.seed(),
            operations_count: self.tally.operations,
            context_switches_count: self.tally.switches,
            faults_injected_count: self.tally.delays,
            invariant_checks_count: self.tally.checks,
            all_invariants_held: self.violation.is_none(),
            first_violation: self.violation.clone(),
            counterexample,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_single_threaded_skips_none() {
        let mut harness = DstHarness::new(12345, HarnessConfig::quick());
        let mut sum = 0u64;

        let result = harness.run_single_threaded(
            |_env, step| (step < 10).then_some(step),
            |_env, op| {
                sum += op;
                Ok(())
            },
        );

        assert!(result.all_invariants_held);
        assert_eq!(sum, 45);
        assert_eq!(result.operations_count, 10);
    }

    #[test]
    fn test_failure_keeps_trail() {
        let mut harness = DstHarness::new(12345, HarnessConfig::quick());

        let result = harness.run_single_threaded(
            |_env, step| Some(step),
            |_env, op| {
                if op == 5 {
                    Err("bucket 5 lost item".to_string())
                } else {
                    Ok(())
                }
            },
        );

        assert!(!result.all_invariants_held);
        assert_eq!(result.operations_count, 6);
        let ce = result.counterexample.as_ref().unwrap();
        assert_eq!(ce.dst_seed, Some(12345));
        assert_eq!(ce.interleaving.len(), 6);
        assert!(!ce.interleaving[5].success);
        assert!(result.format().contains("bucket 5 lost item"));
    }

    #[test]
    fn test_concurrent_runs_every_thread() {
        let config = HarnessConfig {
            threads_count: 2,
            operations_per_thread: 10,
            yield_probability: 0.5,
            invariant_check_interval: 5,
            ..HarnessConfig::quick()
        };
        let mut harness = DstHarness::new(12345, config);
        let mut per_thread = vec![0u64; 2];

        let result = harness.run_concurrent(
            |_env, _thread, step| Some(step),
            |_env, thread, _op| {
                per_thread[thread] += 1;
                Ok(())
            },
            || Ok(()),
        );

        assert!(result.all_invariants_held, "{}", result.format());
        assert_eq!(per_thread, vec![10, 10]);
        assert!(result.context_switches_count > 0);
        // Four interval checks plus the final one.
        assert_eq!(result.invariant_checks_count, 5);
    }

    #[test]
    fn test_failed_check_stops_run() {
        let mut harness = DstHarness::new(9, HarnessConfig::quick());
        let mut checks = 0;

        let result = harness.run_concurrent(
            |_env, _thread, step| Some(step),
            |_env, _thread, _op| Ok(()),
            || {
                checks += 1;
                if checks == 2 {
                    Err("index out of date".to_string())
                } else {
                    Ok(())
                }
            },
        );

        assert!(!result.all_invariants_held);
        assert_eq!(result.operations_count, 20);
        assert_eq!(result.first_violation.as_deref(), Some("index out of date"));
    }

    #[test]
    fn test_same_seed_same_interleaving() {
        let run = || {
            let config = HarnessConfig {
                threads_count: 3,
                operations_per_thread: 20,
                yield_probability: 0.4,
                ..HarnessConfig::quick()
            };
            let mut harness = DstHarness::new(777, config);
            let mut order = Vec::new();
            harness.run_concurrent(
                |_env, thread, step| Some((thread, step)),
                |_env, thread, _op| {
                    order.push(thread);
                    Ok(())
                },
                || Ok(()),
            );
            order
        };
        assert_eq!(run(), run());
    }
}
