//! Counterexample representation and rendering.
//!
//! When a property violation is detected, a counterexample shows the
//! state that exposed it and, for simulated concurrent runs, the trail of
//! logical-thread actions that led there.

use std::collections::BTreeSet;
use std::fmt::Write as _;

/// A counterexample showing the failure path.
#[derive(Debug, Clone, Default)]
pub struct Counterexample {
    /// Sequence of state snapshots
    pub states: Vec<StateSnapshot>,
    /// Logical-thread actions, oldest first
    pub interleaving: Vec<ThreadAction>,
    /// DST seed for reproduction (if applicable)
    pub dst_seed: Option<u64>,
    /// Human-readable description of the failure
    pub description: Option<String>,
}

/// Snapshot of structure state at a point in time.
#[derive(Debug, Clone)]
pub struct StateSnapshot {
    /// Step number in the execution
    pub step: u64,
    /// Description of the state
    pub description: String,
    /// Named values at this point
    pub variables: Vec<(String, String)>,
}

/// Action taken by a logical thread.
#[derive(Debug, Clone)]
pub struct ThreadAction {
    pub thread_id: u64,
    pub step: u64,
    /// e.g. `"add(17)"`, `"try_pop() -> Some(3)"`
    pub action: String,
    pub success: bool,
}

impl Counterexample {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a counterexample with DST seed for reproduction.
    #[must_use]
    pub fn with_seed(seed: u64) -> Self {
        debug_assert!(seed != 0, "DST seed should not be zero");
        Self {
            dst_seed: Some(seed),
            ..Self::default()
        }
    }

    /// Start from an optional seed, as the checkers carry one.
    #[must_use]
    pub fn for_seed(seed: Option<u64>) -> Self {
        match seed {
            Some(seed) => Self::with_seed(seed),
            None => Self::new(),
        }
    }

    #[must_use]
    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    /// Add a state snapshot. Steps must be strictly increasing.
    pub fn add_state(&mut self, state: StateSnapshot) {
        debug_assert!(
            self.states.last().map_or(true, |last| state.step > last.step),
            "States must be added in order"
        );
        self.states.push(state);
    }

    pub fn add_action(&mut self, action: ThreadAction) {
        self.interleaving.push(action);
    }

    /// Render as a step-by-thread table, one column per logical thread.
    ///
    /// ```text
    /// DST_SEED=12345
    ///
    /// Step | Thread 0 | Thread 1  | State
    /// -----|----------|-----------|------
    ///    1 | add(4)   |           |
    ///    2 |          | remove(4) | len=0
    /// ```
    ///
    /// Without thread actions only the state snapshots are listed.
    #[must_use]
    pub fn render_diagram(&self) -> String {
        let mut out = String::new();
        if let Some(seed) = self.dst_seed {
            let _ = writeln!(out, "DST_SEED={}\n", seed);
        }
        if let Some(description) = &self.description {
            let _ = writeln!(out, "Failure: {}\n", description);
        }

        if self.interleaving.is_empty() {
            self.render_states(&mut out);
            return out;
        }

        let threads: BTreeSet<u64> = self.interleaving.iter().map(|a| a.thread_id).collect();
        let cell = |action: &ThreadAction| {
            if action.success {
                action.action.clone()
            } else {
                format!("{} [FAIL]", action.action)
            }
        };
        let widths: Vec<usize> = threads
            .iter()
            .map(|tid| {
                self.interleaving
                    .iter()
                    .filter(|a| a.thread_id == *tid)
                    .map(|a| cell(a).len())
                    .chain([format!("Thread {}", tid).len()])
                    .max()
                    .unwrap_or(0)
            })
            .collect();

        out.push_str("Step |");
        for (tid, width) in threads.iter().zip(&widths) {
            let _ = write!(out, " {:<width$} |", format!("Thread {}", tid), width = *width);
        }
        out.push_str(" State\n-----|");
        for width in &widths {
            let _ = write!(out, "{}|", "-".repeat(width + 2));
        }
        out.push_str("------\n");

        let steps: BTreeSet<u64> = self
            .interleaving
            .iter()
            .map(|a| a.step)
            .chain(self.states.iter().map(|s| s.step))
            .collect();
        for step in steps {
            let _ = write!(out, "{:4} |", step);
            for (tid, width) in threads.iter().zip(&widths) {
                let text = self
                    .interleaving
                    .iter()
                    .find(|a| a.step == step && a.thread_id == *tid)
                    .map(cell)
                    .unwrap_or_default();
                let _ = write!(out, " {:<width$} |", text, width = *width);
            }
            if let Some(state) = self.states.iter().find(|s| s.step == step) {
                let _ = write!(out, " {}", state.description);
            }
            out.push('\n');
        }
        out
    }

    fn render_states(&self, out: &mut String) {
        if self.states.is_empty() {
            out.push_str("(no thread actions recorded)\n");
        }
        for state in &self.states {
            let _ = writeln!(out, "{:4} | {}", state.step, state.description);
            for (name, value) in &state.variables {
                let _ = writeln!(out, "     |   {} = {}", name, value);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_counterexample_with_seed() {
        let ce = Counterexample::with_seed(12345);
        assert_eq!(ce.dst_seed, Some(12345));
        assert!(Counterexample::for_seed(None).dst_seed.is_none());
    }

    #[test]
    fn test_render_diagram_with_threads() {
        let mut ce = Counterexample::with_seed(42).with_description("item 4 in two buckets");

        ce.add_action(ThreadAction {
            thread_id: 0,
            step: 1,
            action: "add(4)".to_string(),
            success: true,
        });
        ce.add_action(ThreadAction {
            thread_id: 1,
            step: 2,
            action: "remove(4)".to_string(),
            success: false,
        });
        ce.add_state(StateSnapshot {
            step: 2,
            description: "len=1".to_string(),
            variables: vec![],
        });

        let diagram = ce.render_diagram();
        assert!(diagram.contains("DST_SEED=42"));
        assert!(diagram.contains("Failure: item 4 in two buckets"));
        assert!(diagram.contains("Thread 0"));
        assert!(diagram.contains("remove(4) [FAIL]"));
        assert!(diagram.contains("len=1"));
    }

    #[test]
    fn test_render_states_only() {
        let mut ce = Counterexample::new();
        ce.add_state(StateSnapshot {
            step: 1,
            description: "Element 3 lost".to_string(),
            variables: vec![("contents".to_string(), "[2]".to_string())],
        });

        let diagram = ce.render_diagram();
        assert!(diagram.contains("Element 3 lost"));
        assert!(diagram.contains("contents = [2]"));
    }
}
