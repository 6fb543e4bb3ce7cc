//! # vc-dst
//!
//! Deterministic Simulation Testing for the verified collections.
//!
//! Time, randomness, scheduling and faults all come from one seed, so any
//! failing run can be replayed exactly.
//!
//! ## Runners
//!
//! - `harness`: simulated logical threads with invariant checks every N ops
//! - `fault_injection`: lock-free containers with faults at operation
//!   boundaries
//!
//! ## Usage
//!
//! ```rust
//! use vc_dst::DstEnv;
//!
//! let mut env = DstEnv::new(12345);
//!
//! env.clock().advance_ns(1_000_000);
//! let choice: u32 = env.rng().gen_range(0..10);
//! if env.fault().should_fail() {
//!     // simulate a failure
//! }
//! # let _ = choice;
//! ```
//!
//! ## Reproducibility
//!
//! ```bash
//! DST_SEED=12345 cargo test
//! ```

pub mod clock;
pub mod env;
pub mod fault;
pub mod fault_injection;
pub mod harness;
pub mod random;
pub mod scheduler;

pub use clock::SimClock;
pub use env::DstEnv;
pub use fault::{FaultConfig, FaultInjector, FaultStats};
pub use fault_injection::{
    generate_ops, run_dst_scenario, run_dst_scenario_with, ContainerOrder, DstOp, DstResult,
    DstRunner, DstStats, DstTestableContainer, FaultPoint, FaultType,
};
pub use harness::{DstHarness, HarnessConfig, HarnessResult};
pub use random::DeterministicRng;
pub use scheduler::{ScheduleDecision, Scheduler};

/// Get DST seed from environment or generate random one.
///
/// Prints the seed for reproduction. Use `DST_SEED=<seed>` to reproduce.
#[must_use]
pub fn get_or_generate_seed() -> u64 {
    match std::env::var("DST_SEED") {
        Ok(s) => {
            let seed: u64 = s.trim().parse().expect("DST_SEED must be a valid u64");
            println!("DST_SEED={} (from environment)", seed);
            seed
        }
        Err(_) => {
            // Zero is reserved as "no seed".
            let seed = rand::random::<u64>().max(1);
            println!("DST_SEED={} (randomly generated)", seed);
            seed
        }
    }
}

/// Iteration count from `DST_ITERATIONS`, or `default` when unset or
/// unparsable.
#[must_use]
pub fn iterations_from_env(default: usize) -> usize {
    std::env::var("DST_ITERATIONS")
        .ok()
        .and_then(|s| s.trim().parse().ok())
        .unwrap_or(default)
}
