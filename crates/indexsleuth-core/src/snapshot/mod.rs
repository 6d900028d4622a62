/// Snapshot persistence — timestamp-tagged JSON files under a hidden
/// directory of the indexed root.
///
/// A snapshot is up to three files sharing one tag:
/// `<tag>_listing.json`, `<tag>_forbidden.json` and `<tag>_tree.json`.
/// The tree is written last and is what makes a snapshot visible, so an
/// interrupted save never produces a half-readable snapshot.
pub mod format;
pub mod store;

pub use store::SnapshotStore;

use crate::config::IndexConfig;
use crate::model::{Forbidden, IndexPath, Listing, Tree};
use chrono::{DateTime, Duration, NaiveDateTime, Utc};
use serde::Serialize;
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};

/// `chrono` format of a snapshot tag. Fixed width, so tags sort
/// chronologically as plain strings.
pub const TAG_FORMAT: &str = "%Y%m%dT%H%M%S%.6fZ";

const TAG_LEN: usize = 23;

/// Timestamp tag identifying one snapshot.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(transparent)]
pub struct SnapshotId(String);

impl SnapshotId {
    pub fn from_time(time: DateTime<Utc>) -> Self {
        Self(time.format(TAG_FORMAT).to_string())
    }

    /// Accept only well-formed tags.
    pub fn parse(tag: &str) -> Option<Self> {
        if tag.len() != TAG_LEN {
            return None;
        }
        NaiveDateTime::parse_from_str(tag, TAG_FORMAT).ok()?;
        Some(Self(tag.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn time(&self) -> Option<DateTime<Utc>> {
        NaiveDateTime::parse_from_str(&self.0, TAG_FORMAT)
            .ok()
            .map(|naive| naive.and_utc())
    }

    /// A tag for "now" that sorts strictly after `latest`.
    pub fn next_after(latest: Option<&SnapshotId>) -> Self {
        let now = Utc::now();
        match latest.and_then(SnapshotId::time) {
            Some(prev) if prev >= now => Self::from_time(prev + Duration::microseconds(1)),
            _ => Self::from_time(now),
        }
    }

    pub(crate) fn file_name(&self, kind: &str) -> String {
        format!("{}_{kind}.json", self.0)
    }
}

impl fmt::Display for SnapshotId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// A loaded snapshot.
#[derive(Debug, Clone)]
pub struct Snapshot {
    pub id: SnapshotId,
    /// Directory the files were read from.
    pub location: PathBuf,
    pub tree: Tree,
    pub listing: Option<Listing>,
    pub forbidden: Option<Forbidden>,
}

/// Where a save ended up.
#[derive(Debug, Clone, Serialize)]
pub struct SaveReport {
    pub id: SnapshotId,
    pub location: PathBuf,
    /// Set when the primary location failed and the fallback was used.
    pub warning: Option<String>,
}

/// One snapshot found on disk.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SnapshotInfo {
    pub id: SnapshotId,
    pub location: PathBuf,
    pub has_listing: bool,
    pub has_forbidden: bool,
}

/// Most recent tree for `root`, or an empty tree if there is none or it
/// cannot be read. Never fails.
pub fn load_latest(root: &Path, config: &IndexConfig) -> Tree {
    let store = SnapshotStore::for_root(root, config);
    match store.load_latest_snapshot() {
        Some(snapshot) => snapshot.tree,
        None => Tree::new(store.root().clone()),
    }
}

/// Normalised key for `root`, canonicalised when possible.
pub(crate) fn root_key(root: &Path) -> (PathBuf, IndexPath) {
    let canonical = fs::canonicalize(root).unwrap_or_else(|_| root.to_path_buf());
    let key = IndexPath::from_path(&canonical);
    (canonical, key)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn tags_are_fixed_width_and_parse_back() {
        let t = Utc.with_ymd_and_hms(2024, 3, 5, 7, 8, 9).unwrap();
        let id = SnapshotId::from_time(t);
        assert_eq!(id.as_str(), "20240305T070809.000000Z");
        assert_eq!(SnapshotId::parse(id.as_str()), Some(id.clone()));
        assert_eq!(id.time(), Some(t));
    }

    #[test]
    fn malformed_tags_are_rejected() {
        assert_eq!(SnapshotId::parse("latest"), None);
        assert_eq!(SnapshotId::parse("20240305T070809Z"), None);
        assert_eq!(SnapshotId::parse("2024030XT070809.000000Z"), None);
    }

    #[test]
    fn next_tag_is_strictly_later_than_a_future_one() {
        let future = SnapshotId::from_time(Utc::now() + Duration::hours(1));
        let next = SnapshotId::next_after(Some(&future));
        assert!(next > future);
        assert_eq!(next.time().unwrap() - future.time().unwrap(), Duration::microseconds(1));
    }

    #[test]
    fn file_names_carry_the_kind_suffix() {
        let id = SnapshotId::parse("20240305T070809.000000Z").unwrap();
        assert_eq!(id.file_name("tree"), "20240305T070809.000000Z_tree.json");
    }
}
