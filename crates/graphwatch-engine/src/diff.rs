//! Snapshot comparison.

use crate::snapshot::Snapshot;

/// Keys classified by comparing two snapshots.
///
/// Every key lands in at most one list.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SnapshotDiff {
    pub added: Vec<String>,
    pub changed: Vec<String>,
    pub removed: Vec<String>,
}

impl SnapshotDiff {
    pub fn is_empty(&self) -> bool {
        self.added.is_empty() && self.changed.is_empty() && self.removed.is_empty()
    }

    pub fn len(&self) -> usize {
        self.added.len() + self.changed.len() + self.removed.len()
    }
}

/// Classify every key of `old` and `new` by record equivalence.
///
/// Linear in the size of both snapshots; file contents are never compared.
pub fn diff(old: &Snapshot, new: &Snapshot) -> SnapshotDiff {
    let mut result = SnapshotDiff::default();

    for (key, entry) in new.iter() {
        match old.get(key) {
            None => result.added.push(key.clone()),
            Some(prev) if prev.record != entry.record => result.changed.push(key.clone()),
            Some(_) => {}
        }
    }

    for (key, _) in old.iter() {
        if !new.contains(key) {
            result.removed.push(key.clone());
        }
    }

    result
}
