//! # vc-core
//!
//! Core types and invariants for the verified collections.
//!
//! This crate provides:
//! - `PropertyResult` and `PropertyChecker` for verifying invariants
//! - `Counterexample` for rendering failure paths
//! - Invariant traits for each data structure (e.g., `StackProperties`)
//!
//! Structures implement the `*Properties` traits (or are wrapped by a test
//! runner that does); the matching `*PropertyChecker` evaluates every
//! invariant against that state.

pub mod counterexample;
pub mod invariants;
pub mod property;

pub use counterexample::{Counterexample, StateSnapshot, ThreadAction};
pub use property::{PropertyChecker, PropertyResult};
