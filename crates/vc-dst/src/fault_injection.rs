//! Fault injection for lock-free containers.
//!
//! Faults are injected at OPERATION BOUNDARIES, never inside a CAS
//! sequence. The container under test is the production type, unchanged.
//!
//! | Concern | Tool | Level |
//! |---------|------|-------|
//! | CAS races | loom | Instruction |
//! | Allocation failure | DST | Operation boundary |
//! | Thread crash | DST | Operation boundary |
//! | Epoch reclamation timing | DST | Between operations |
//!
//! ```text
//!   FaultPoint (pre-op) ──> insert()/remove() ──> FaultPoint (post-op)
//!        │                                              │
//!   "allocation fails?"                      "caller crashes before
//!   "thread crashes?"                         seeing the result?"
//! ```

use std::collections::HashSet;

use vc_core::invariants::{History, QueueProperties, QueuePropertyChecker, StackProperties, StackPropertyChecker};
use vc_core::{PropertyChecker, PropertyResult};

use crate::fault::{FaultConfig, FaultInjector};
use crate::random::DeterministicRng;

/// Fault injection points (between operations, not inside).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FaultPoint {
    BeforeOperation,
    AfterOperation,
}

/// Types of faults that can be injected.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FaultType {
    /// Node allocation fails; the operation never starts
    AllocationFailure,
    /// The calling thread dies; before the op it never runs, after the op
    /// its effect stands but the caller never sees the result
    ThreadCrash,
    /// Slow thread; no effect on a sequential run
    Delay,
    /// Force an epoch advance so retired nodes get reclaimed now
    EpochGcTrigger,
}

const FAULT_TYPES: [FaultType; 4] = [
    FaultType::AllocationFailure,
    FaultType::ThreadCrash,
    FaultType::Delay,
    FaultType::EpochGcTrigger,
];

/// Removal order of a container.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContainerOrder {
    Lifo,
    Fifo,
}

/// Containers testable with DST.
///
/// Minimal interface: the implementation knows nothing about DST.
pub trait DstTestableContainer: Send + Sync {
    const ORDER: ContainerOrder;

    fn new() -> Self;
    fn insert(&self, value: u64);
    fn remove(&self) -> Option<u64>;
    fn is_empty(&self) -> bool;
    /// Contents in removal order.
    fn contents(&self) -> Vec<u64>;
    /// Reclaim retired memory now, if the container defers it.
    fn collect_garbage(&self) {}
}

/// DST runner wrapping a container and injecting faults around each call.
pub struct DstRunner<C> {
    container: C,
    fault_injector: FaultInjector,
    seed: u64,
    inserted: HashSet<u64>,
    removed: HashSet<u64>,
    history: History,
    operations_count: u64,
    faults_injected: u64,
    abandoned_operations: u64,
}

impl<C: DstTestableContainer> DstRunner<C> {
    #[must_use]
    pub fn new(seed: u64) -> Self {
        Self::with_fault_config(seed, FaultConfig::default())
    }

    #[must_use]
    pub fn with_fault_config(seed: u64, config: FaultConfig) -> Self {
        Self {
            container: C::new(),
            fault_injector: FaultInjector::new(DeterministicRng::new(seed.wrapping_add(1)), config),
            seed,
            inserted: HashSet::new(),
            removed: HashSet::new(),
            history: History::new(),
            operations_count: 0,
            faults_injected: 0,
            abandoned_operations: 0,
        }
    }

    #[must_use]
    pub fn seed(&self) -> u64 {
        self.seed
    }

    #[must_use]
    pub fn container(&self) -> &C {
        &self.container
    }

    /// Insert with fault injection at the boundaries.
    pub fn insert(&mut self, thread_id: u64, value: u64) -> Result<(), FaultType> {
        if let Some(fault) = self.maybe_inject_fault(FaultPoint::BeforeOperation) {
            match fault {
                FaultType::ThreadCrash => {
                    self.abandoned_operations += 1;
                    return Err(fault);
                }
                FaultType::AllocationFailure => return Err(fault),
                FaultType::Delay | FaultType::EpochGcTrigger => {}
            }
        }

        self.container.insert(value);
        self.operations_count += 1;
        // The effect is in the container whether or not the caller survives.
        self.inserted.insert(value);
        let step = self.history.next_step();
        self.history.record_insert(thread_id, value, step);

        if let Some(FaultType::ThreadCrash) = self.maybe_inject_fault(FaultPoint::AfterOperation) {
            self.abandoned_operations += 1;
            return Err(FaultType::ThreadCrash);
        }
        Ok(())
    }

    /// Remove with fault injection at the boundaries.
    pub fn remove(&mut self, thread_id: u64) -> Result<Option<u64>, FaultType> {
        if let Some(FaultType::ThreadCrash) = self.maybe_inject_fault(FaultPoint::BeforeOperation) {
            self.abandoned_operations += 1;
            return Err(FaultType::ThreadCrash);
        }

        let result = self.container.remove();
        self.operations_count += 1;
        self.removed.extend(result);
        let step = self.history.next_step();
        self.history.record_remove(thread_id, result, step);

        if let Some(FaultType::ThreadCrash) = self.maybe_inject_fault(FaultPoint::AfterOperation) {
            // Value left the container; the caller dies holding it.
            self.abandoned_operations += 1;
            return Err(FaultType::ThreadCrash);
        }
        Ok(result)
    }

    fn maybe_inject_fault(&mut self, _point: FaultPoint) -> Option<FaultType> {
        if !self.fault_injector.should_fail() {
            return None;
        }
        let fault = self.fault_injector.pick(&FAULT_TYPES)?;
        self.faults_injected += 1;
        if fault == FaultType::EpochGcTrigger {
            self.container.collect_garbage();
        }
        Some(fault)
    }

    /// Evaluate the stack or queue properties, depending on the container.
    #[must_use]
    pub fn check_invariants(&self) -> Vec<PropertyResult> {
        match C::ORDER {
            ContainerOrder::Lifo => StackPropertyChecker::new(self).with_seed(self.seed).check_all(),
            ContainerOrder::Fifo => QueuePropertyChecker::new(self).with_seed(self.seed).check_all(),
        }
    }

    #[must_use]
    pub fn stats(&self) -> DstStats {
        DstStats {
            seed: self.seed,
            operations_count: self.operations_count,
            faults_injected: self.faults_injected,
            abandoned_operations: self.abandoned_operations,
        }
    }
}

impl<C: DstTestableContainer> StackProperties for DstRunner<C> {
    fn pushed_elements(&self) -> HashSet<u64> {
        self.inserted.clone()
    }

    fn popped_elements(&self) -> HashSet<u64> {
        self.removed.clone()
    }

    fn current_contents(&self) -> Vec<u64> {
        self.container.contents()
    }

    fn history(&self) -> History {
        self.history.clone()
    }
}

impl<C: DstTestableContainer> QueueProperties for DstRunner<C> {
    fn enqueued_elements(&self) -> HashSet<u64> {
        self.inserted.clone()
    }

    fn dequeued_elements(&self) -> HashSet<u64> {
        self.removed.clone()
    }

    fn current_contents(&self) -> Vec<u64> {
        self.container.contents()
    }

    fn history(&self) -> History {
        self.history.clone()
    }
}

/// Statistics from a DST run.
#[derive(Debug, Clone)]
pub struct DstStats {
    pub seed: u64,
    pub operations_count: u64,
    pub faults_injected: u64,
    pub abandoned_operations: u64,
}

impl DstStats {
    #[must_use]
    pub fn format(&self) -> String {
        format!(
            "DST_SEED={} ops={} faults={} abandoned={}",
            self.seed, self.operations_count, self.faults_injected, self.abandoned_operations
        )
    }
}

/// DST operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DstOp {
    Insert(u64),
    Remove,
}

/// Generate `count` operations: roughly 60% inserts of fresh values.
#[must_use]
pub fn generate_ops(rng: &mut DeterministicRng, count: usize) -> Vec<DstOp> {
    let mut next_value = 0u64;
    (0..count)
        .map(|_| {
            if rng.gen_bool(0.6) {
                next_value += 1;
                DstOp::Insert(next_value)
            } else {
                DstOp::Remove
            }
        })
        .collect()
}

/// Outcome of a DST scenario.
#[derive(Debug)]
pub struct DstResult {
    pub passed: bool,
    pub violations: Vec<PropertyResult>,
    pub stats: DstStats,
    pub fault_errors: Vec<String>,
}

impl DstResult {
    #[must_use]
    pub fn format(&self) -> String {
        let status = if self.passed { "PASS" } else { "FAIL" };
        let mut result = format!("[{}] {}", status, self.stats.format());
        for violation in &self.violations {
            result.push_str(&format!("\n  VIOLATION: {}", violation));
        }
        result
    }
}

/// Run `operations` on a fresh container with fault injection, then check
/// every invariant.
pub fn run_dst_scenario<C: DstTestableContainer>(seed: u64, operations: &[DstOp]) -> DstResult {
    run_dst_scenario_with::<C>(seed, FaultConfig::default(), operations)
}

pub fn run_dst_scenario_with<C: DstTestableContainer>(
    seed: u64,
    config: FaultConfig,
    operations: &[DstOp],
) -> DstResult {
    let mut runner: DstRunner<C> = DstRunner::with_fault_config(seed, config);
    let mut fault_errors = Vec::new();

    for op in operations {
        let result = match *op {
            DstOp::Insert(v) => runner.insert(0, v),
            DstOp::Remove => runner.remove(0).map(|_| ()),
        };
        // Faults are part of the test.
        if let Err(fault) = result {
            fault_errors.push(format!("{:?}", fault));
        }
    }

    let violations: Vec<PropertyResult> = runner
        .check_invariants()
        .into_iter()
        .filter(|r| !r.holds)
        .collect();

    DstResult {
        passed: violations.is_empty(),
        violations,
        stats: runner.stats(),
        fault_errors,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::VecDeque;
    use std::sync::Mutex;

    struct MockStack {
        values: Mutex<Vec<u64>>,
    }

    impl DstTestableContainer for MockStack {
        const ORDER: ContainerOrder = ContainerOrder::Lifo;

        fn new() -> Self {
            Self {
                values: Mutex::new(Vec::new()),
            }
        }
        fn insert(&self, value: u64) {
            self.values.lock().unwrap().push(value);
        }
        fn remove(&self) -> Option<u64> {
            self.values.lock().unwrap().pop()
        }
        fn is_empty(&self) -> bool {
            self.values.lock().unwrap().is_empty()
        }
        fn contents(&self) -> Vec<u64> {
            self.values.lock().unwrap().iter().rev().copied().collect()
        }
    }

    struct MockQueue {
        values: Mutex<VecDeque<u64>>,
    }

    impl DstTestableContainer for MockQueue {
        const ORDER: ContainerOrder = ContainerOrder::Fifo;

        fn new() -> Self {
            Self {
                values: Mutex::new(VecDeque::new()),
            }
        }
        fn insert(&self, value: u64) {
            self.values.lock().unwrap().push_back(value);
        }
        fn remove(&self) -> Option<u64> {
            self.values.lock().unwrap().pop_front()
        }
        fn is_empty(&self) -> bool {
            self.values.lock().unwrap().is_empty()
        }
        fn contents(&self) -> Vec<u64> {
            self.values.lock().unwrap().iter().copied().collect()
        }
    }

    /// Reports FIFO while behaving as a stack.
    struct MislabelledStack(MockStack);

    impl DstTestableContainer for MislabelledStack {
        const ORDER: ContainerOrder = ContainerOrder::Fifo;

        fn new() -> Self {
            Self(MockStack::new())
        }
        fn insert(&self, value: u64) {
            self.0.insert(value);
        }
        fn remove(&self) -> Option<u64> {
            self.0.remove()
        }
        fn is_empty(&self) -> bool {
            self.0.is_empty()
        }
        fn contents(&self) -> Vec<u64> {
            self.0.contents()
        }
    }

    #[test]
    fn test_scenarios_pass_under_faults() {
        let mut rng = DeterministicRng::new(2024);
        let ops = generate_ops(&mut rng, 200);

        let stack = run_dst_scenario_with::<MockStack>(2024, FaultConfig::aggressive(), &ops);
        assert!(stack.passed, "{}", stack.format());
        assert!(stack.stats.faults_injected > 0);

        let queue = run_dst_scenario_with::<MockQueue>(2024, FaultConfig::aggressive(), &ops);
        assert!(queue.passed, "{}", queue.format());
    }

    #[test]
    fn test_order_violation_detected() {
        let ops = [DstOp::Insert(1), DstOp::Insert(2), DstOp::Remove];
        let result = run_dst_scenario_with::<MislabelledStack>(5, FaultConfig::none(), &ops);
        assert!(!result.passed);
        assert!(result.violations.iter().any(|v| v.name == "FIFO_Order"));
    }

    #[test]
    fn test_default_config_matches_explicit_default() {
        let mut rng = DeterministicRng::new(77);
        let ops = generate_ops(&mut rng, 100);
        let implicit = run_dst_scenario::<MockQueue>(77, &ops);
        let explicit = run_dst_scenario_with::<MockQueue>(77, FaultConfig::default(), &ops);
        assert!(implicit.passed, "{}", implicit.format());
        assert_eq!(implicit.stats.faults_injected, explicit.stats.faults_injected);
        assert_eq!(implicit.fault_errors, explicit.fault_errors);
    }

    #[test]
    fn test_determinism() {
        let ops = [DstOp::Insert(1), DstOp::Insert(2), DstOp::Remove, DstOp::Insert(3)];
        let a = run_dst_scenario::<MockStack>(42, &ops);
        let b = run_dst_scenario::<MockStack>(42, &ops);
        assert_eq!(a.stats.faults_injected, b.stats.faults_injected);
        assert_eq!(a.fault_errors, b.fault_errors);
    }
}
