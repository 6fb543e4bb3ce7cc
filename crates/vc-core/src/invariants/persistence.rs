//! Persistence: no operation changes a version that already exists.

use crate::property::{PropertyChecker, PropertyResult};

/// Contents of one version, captured when it was created and re-read later.
#[derive(Debug, Clone)]
pub struct VersionRecord {
    /// e.g. `"after add(17)"`
    pub label: String,
    pub contents_at_creation: Vec<u64>,
    pub contents_now: Vec<u64>,
}

/// Structures that keep their old versions around for checking.
pub trait PersistenceProperties {
    /// Structure name used in results, e.g. `"persistent_stack"`.
    const STRUCTURE: &'static str;

    fn versions(&self) -> Vec<VersionRecord>;
}

pub struct PersistencePropertyChecker<'a, T: PersistenceProperties> {
    structure: &'a T,
}

impl<'a, T: PersistenceProperties> PersistencePropertyChecker<'a, T> {
    #[must_use]
    pub fn new(structure: &'a T) -> Self {
        Self { structure }
    }

    fn check_versions_unchanged(&self) -> PropertyResult {
        let changed = self
            .structure
            .versions()
            .into_iter()
            .find(|v| v.contents_at_creation != v.contents_now);
        match changed {
            Some(v) => PropertyResult::fail(
                "VersionsUnchanged",
                T::STRUCTURE,
                format!(
                    "version '{}' changed from {:?} to {:?}",
                    v.label, v.contents_at_creation, v.contents_now
                ),
                None,
            ),
            None => PropertyResult::pass("VersionsUnchanged", T::STRUCTURE),
        }
    }
}

impl<'a, T: PersistenceProperties> PropertyChecker for PersistencePropertyChecker<'a, T> {
    fn check_all(&self) -> Vec<PropertyResult> {
        vec![self.check_versions_unchanged()]
    }
}
