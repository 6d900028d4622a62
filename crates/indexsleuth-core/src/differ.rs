/// Incremental differ — re-walk a root against its previous tree.
///
/// The previous tree doubles as the hash cache: a file whose size and
/// mtime both match its cached entry keeps the cached hash and is never
/// opened. Everything else is re-hashed.
///
/// Caveat: a rewrite that leaves both size and mtime untouched is reported
/// as `unchanged`. Set [`IndexConfig::force_rehash`] to re-read every file.
///
/// A known path that cannot be read this time is absent from the new tree,
/// so it is classified `removed` and shows up in the new forbidden set.
use crate::config::IndexConfig;
use crate::error::Result;
use crate::model::{Entry, Forbidden, IndexPath, Tree};
use crate::scanner::{WalkOutcome, WalkStats, Walker};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;
use tracing::info;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChangeKind {
    Unchanged,
    Modified,
    Added,
    Removed,
}

impl ChangeKind {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Unchanged => "unchanged",
            Self::Modified => "modified",
            Self::Added => "added",
            Self::Removed => "removed",
        }
    }
}

/// Per-kind totals.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ChangeCounts {
    pub unchanged: usize,
    pub modified: usize,
    pub added: usize,
    pub removed: usize,
}

/// Classification of every path present in either of two trees.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ChangeSet {
    changes: BTreeMap<IndexPath, ChangeKind>,
}

impl ChangeSet {
    /// Compare two trees path by path. Files and directories are both
    /// classified; an entry that switched between file and directory
    /// counts as modified.
    pub fn between(old: &Tree, new: &Tree) -> Self {
        let mut changes = BTreeMap::new();
        for (path, old_entry) in old.iter() {
            let kind = match new.get(path) {
                None => ChangeKind::Removed,
                Some(new_entry) if same_content(old_entry, new_entry) => ChangeKind::Unchanged,
                Some(_) => ChangeKind::Modified,
            };
            changes.insert(path.clone(), kind);
        }
        for path in new.paths() {
            if !old.contains(path) {
                changes.insert(path.clone(), ChangeKind::Added);
            }
        }
        Self { changes }
    }

    pub fn iter(&self) -> impl Iterator<Item = (&IndexPath, ChangeKind)> {
        self.changes.iter().map(|(p, k)| (p, *k))
    }

    pub fn get(&self, path: &IndexPath) -> Option<ChangeKind> {
        self.changes.get(path).copied()
    }

    pub fn counts(&self) -> ChangeCounts {
        let mut counts = ChangeCounts::default();
        for kind in self.changes.values() {
            match kind {
                ChangeKind::Unchanged => counts.unchanged += 1,
                ChangeKind::Modified => counts.modified += 1,
                ChangeKind::Added => counts.added += 1,
                ChangeKind::Removed => counts.removed += 1,
            }
        }
        counts
    }

    /// Paths of one kind, in path order.
    pub fn of_kind(&self, kind: ChangeKind) -> impl Iterator<Item = &IndexPath> {
        self.changes
            .iter()
            .filter(move |(_, k)| **k == kind)
            .map(|(p, _)| p)
    }

    /// Everything except `unchanged`.
    pub fn changed(&self) -> impl Iterator<Item = (&IndexPath, ChangeKind)> {
        self.iter().filter(|(_, k)| *k != ChangeKind::Unchanged)
    }

    pub fn len(&self) -> usize {
        self.changes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.changes.is_empty()
    }
}

fn same_content(old: &Entry, new: &Entry) -> bool {
    old.is_dir() == new.is_dir() && old.hash() == new.hash() && old.size() == new.size()
}

/// Result of an incremental diff. `tree` is the complete new state.
#[derive(Debug, Clone)]
pub struct DiffOutcome {
    pub changes: ChangeSet,
    pub tree: Tree,
    pub forbidden: Forbidden,
    pub stats: WalkStats,
}

impl DiffOutcome {
    /// Classify a walk that already ran against `previous`.
    pub fn from_walk(previous: &Tree, outcome: WalkOutcome) -> Self {
        let changes = ChangeSet::between(previous, &outcome.tree);
        Self {
            changes,
            tree: outcome.tree,
            forbidden: outcome.forbidden,
            stats: outcome.stats,
        }
    }
}

/// Re-walk `root` using `previous` as the hash cache and classify every
/// path.
pub fn diff(previous: &Tree, root: &Path, config: &IndexConfig) -> Result<DiffOutcome> {
    let outcome = Walker::new(config).with_cache(previous).walk(root)?;
    let result = DiffOutcome::from_walk(previous, outcome);
    let c = result.changes.counts();
    info!(
        "Diff: {} added, {} removed, {} modified, {} unchanged",
        c.added, c.removed, c.modified, c.unchanged
    );
    Ok(result)
}
