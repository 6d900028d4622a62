/// Paths a walk could not read, with the reason.
///
/// Kept apart from the `Tree` so a failed read never feeds into an
/// ancestor's aggregate.
use super::path::IndexPath;
use crate::error::AccessErrorKind;
use std::collections::BTreeMap;

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Forbidden {
    entries: BTreeMap<IndexPath, AccessErrorKind>,
}

impl Forbidden {
    pub fn insert(&mut self, path: IndexPath, kind: AccessErrorKind) {
        self.entries.insert(path, kind);
    }

    pub fn get(&self, path: &IndexPath) -> Option<AccessErrorKind> {
        self.entries.get(path).copied()
    }

    pub fn contains(&self, path: &IndexPath) -> bool {
        self.entries.contains_key(path)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&IndexPath, AccessErrorKind)> {
        self.entries.iter().map(|(p, k)| (p, *k))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// How many paths failed for each reason.
    pub fn counts_by_kind(&self) -> BTreeMap<AccessErrorKind, usize> {
        let mut counts = BTreeMap::new();
        for kind in self.entries.values() {
            *counts.entry(*kind).or_insert(0) += 1;
        }
        counts
    }
}
