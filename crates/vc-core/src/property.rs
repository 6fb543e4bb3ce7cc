//! Property results and the checker trait.
//!
//! Every invariant checker in [`crate::invariants`] reports one
//! [`PropertyResult`] per property. A result either holds, or carries a
//! violation message and (optionally) a [`Counterexample`] explaining how
//! the structure got into the bad state.

use std::fmt;

use crate::counterexample::Counterexample;

/// Outcome of checking a single named property.
#[derive(Debug, Clone)]
pub struct PropertyResult {
    /// Property name, e.g. `"NoLostElements"`.
    pub name: &'static str,
    /// Structure the property belongs to, e.g. `"lockfree_stack"`.
    pub structure: &'static str,
    /// Whether the property held.
    pub holds: bool,
    /// Human-readable violation, present iff `holds` is false.
    pub violation: Option<String>,
    /// Failure path, when the checker could reconstruct one.
    pub counterexample: Option<Counterexample>,
}

impl PropertyResult {
    /// A passing result.
    #[must_use]
    pub fn pass(name: &'static str, structure: &'static str) -> Self {
        Self {
            name,
            structure,
            holds: true,
            violation: None,
            counterexample: None,
        }
    }

    /// A failing result.
    #[must_use]
    pub fn fail(
        name: &'static str,
        structure: &'static str,
        violation: impl Into<String>,
        counterexample: Option<Counterexample>,
    ) -> Self {
        let violation = violation.into();
        debug_assert!(!violation.is_empty(), "violation message must not be empty");
        Self {
            name,
            structure,
            holds: false,
            violation: Some(violation),
            counterexample,
        }
    }
}

impl fmt::Display for PropertyResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.holds {
            return write!(f, "[PASS] {}::{}", self.structure, self.name);
        }

        write!(f, "[FAIL] {}::{}", self.structure, self.name)?;
        if let Some(ref violation) = self.violation {
            write!(f, ": {}", violation)?;
        }
        if let Some(ref ce) = self.counterexample {
            write!(f, "\n{}", ce.render_diagram())?;
        }
        Ok(())
    }
}

/// A checker that evaluates every property of one structure.
pub trait PropertyChecker {
    /// Evaluate all properties.
    fn check_all(&self) -> Vec<PropertyResult>;

    /// True when every property holds.
    fn all_hold(&self) -> bool {
        self.check_all().iter().all(|r| r.holds)
    }

    /// Only the failing results.
    fn violations(&self) -> Vec<PropertyResult> {
        self.check_all().into_iter().filter(|r| !r.holds).collect()
    }

    /// `Ok(())` when every property holds, otherwise all violations joined
    /// into one message. Convenient inside DST closures that return
    /// `Result<(), String>`.
    fn ensure_all_hold(&self) -> Result<(), String> {
        let violations = self.violations();
        if violations.is_empty() {
            return Ok(());
        }
        Err(violations
            .iter()
            .map(ToString::to_string)
            .collect::<Vec<_>>()
            .join("\n"))
    }
}
