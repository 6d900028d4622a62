/// Snapshot directory management: save, list, load, prune.
///
/// Saves go to the primary directory (`<root>/.indexsleuth` unless
/// configured). If any file there cannot be written, the whole snapshot is
/// written once more to the fallback directory and the report carries a
/// warning. Reads consider both directories.
use super::format::{
    forbidden_from_record, forbidden_to_record, listing_from_record, listing_to_record,
    ForbiddenRecord, ListingRecord, TreeRecord,
};
use super::{root_key, SaveReport, Snapshot, SnapshotId, SnapshotInfo};
use crate::config::IndexConfig;
use crate::error::{IndexError, Result};
use crate::hasher::HashAlgorithm;
use crate::model::{Forbidden, IndexPath, Listing, Tree};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs::{self, File, OpenOptions};
use std::io::{BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

const TREE: &str = "tree";
const LISTING: &str = "listing";
const FORBIDDEN: &str = "forbidden";

/// The `root` field of a tree file; the rest is skipped.
#[derive(Deserialize)]
struct TreeHeader {
    root: IndexPath,
}

/// Snapshot files for one indexed root.
#[derive(Debug, Clone)]
pub struct SnapshotStore {
    root: IndexPath,
    primary: PathBuf,
    fallback: PathBuf,
}

impl SnapshotStore {
    pub fn for_root(root: &Path, config: &IndexConfig) -> Self {
        let (canonical, key) = root_key(root);
        let primary = config
            .snapshot_dir
            .clone()
            .unwrap_or_else(|| canonical.join(&config.snapshot_dir_name));
        let fallback = config.fallback_dir.clone().unwrap_or_else(|| {
            let digest = HashAlgorithm::Sha256.digest_bytes(key.as_str().as_bytes());
            std::env::temp_dir().join("indexsleuth").join(digest.short(16))
        });
        Self {
            root: key,
            primary,
            fallback,
        }
    }

    pub fn root(&self) -> &IndexPath {
        &self.root
    }

    pub fn primary_dir(&self) -> &Path {
        &self.primary
    }

    pub fn fallback_dir(&self) -> &Path {
        &self.fallback
    }

    /// Persist a snapshot. The tree file is always written, last.
    pub fn save(
        &self,
        tree: &Tree,
        listing: Option<&Listing>,
        forbidden: Option<&Forbidden>,
    ) -> Result<SaveReport> {
        // Tags stay unique across every root sharing these directories.
        let latest = tags_in(&self.fallback)
            .into_iter()
            .chain(tags_in(&self.primary))
            .max();
        let id = SnapshotId::next_after(latest.as_ref());

        match write_snapshot(&self.primary, &id, tree, listing, forbidden) {
            Ok(()) => {
                info!("Saved snapshot {id} to {}", self.primary.display());
                Ok(SaveReport {
                    id,
                    location: self.primary.clone(),
                    warning: None,
                })
            }
            Err(primary_err) => {
                warn!(
                    "Cannot write snapshot to {}: {primary_err}; trying {}",
                    self.primary.display(),
                    self.fallback.display()
                );
                match write_snapshot(&self.fallback, &id, tree, listing, forbidden) {
                    Ok(()) => {
                        let warning = format!(
                            "snapshot written to fallback location {} ({primary_err})",
                            self.fallback.display()
                        );
                        warn!("{warning}");
                        Ok(SaveReport {
                            id,
                            location: self.fallback.clone(),
                            warning: Some(warning),
                        })
                    }
                    Err(fallback_err) => Err(IndexError::SnapshotWrite {
                        primary: primary_err.to_string(),
                        fallback: fallback_err.to_string(),
                    }),
                }
            }
        }
    }

    /// Complete snapshots of this root in both locations, oldest first.
    /// Snapshots of other roots sharing a directory are left out. A tag
    /// present in both is reported once, from the primary directory.
    pub fn list(&self) -> Vec<SnapshotInfo> {
        let mut found: BTreeMap<SnapshotId, SnapshotInfo> = BTreeMap::new();
        for dir in [&self.fallback, &self.primary] {
            for id in tags_in(dir) {
                if !self.owns(dir, &id) {
                    continue;
                }
                let info = SnapshotInfo {
                    has_listing: dir.join(id.file_name(LISTING)).is_file(),
                    has_forbidden: dir.join(id.file_name(FORBIDDEN)).is_file(),
                    location: dir.clone(),
                    id: id.clone(),
                };
                found.insert(id, info);
            }
        }
        found.into_values().collect()
    }

    /// Load one snapshot. Missing or corrupt optional files come back as
    /// `None` with a warning; a bad tree file is an error.
    pub fn load(&self, id: &SnapshotId) -> Result<Snapshot> {
        let location = [&self.primary, &self.fallback]
            .into_iter()
            .find(|dir| dir.join(id.file_name(TREE)).is_file())
            .ok_or_else(|| IndexError::SnapshotNotFound(id.to_string()))?
            .clone();

        let record: TreeRecord = read_json(&location.join(id.file_name(TREE)), "tree_snapshot_load")?;
        let tree = record.into_tree()?;
        if *tree.root() != self.root {
            return Err(IndexError::serialization(
                "tree_snapshot_root",
                format!("snapshot is for {}, not {}", tree.root(), self.root),
            ));
        }

        let listing = read_optional::<ListingRecord>(&location, id, LISTING, "listing_snapshot_load")
            .and_then(|record| match listing_from_record(record) {
                Ok(listing) => Some(listing),
                Err(e) => {
                    warn!("Ignoring listing of snapshot {id}: {e}");
                    None
                }
            });
        let forbidden = read_optional::<ForbiddenRecord>(&location, id, FORBIDDEN, "forbidden_snapshot_load")
            .map(forbidden_from_record);

        Ok(Snapshot {
            id: id.clone(),
            location,
            tree,
            listing,
            forbidden,
        })
    }

    /// The snapshot with the greatest tag, if it loads. A corrupt latest
    /// snapshot yields `None`; older ones are not consulted.
    pub fn load_latest_snapshot(&self) -> Option<Snapshot> {
        let latest = self.list().pop()?;
        match self.load(&latest.id) {
            Ok(snapshot) => Some(snapshot),
            Err(e) => {
                warn!("Latest snapshot {} is unusable, starting empty: {e}", latest.id);
                None
            }
        }
    }

    /// Delete all but the newest `keep` snapshots from the primary
    /// directory. Returns how many were removed.
    pub fn prune(&self, keep: usize) -> Result<usize> {
        let mut ids: Vec<SnapshotId> = tags_in(&self.primary)
            .into_iter()
            .filter(|id| self.owns(&self.primary, id))
            .collect();
        ids.sort();
        let excess = ids.len().saturating_sub(keep);
        for id in &ids[..excess] {
            for kind in [TREE, LISTING, FORBIDDEN] {
                let path = self.primary.join(id.file_name(kind));
                match fs::remove_file(&path) {
                    Ok(()) => {}
                    Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
                    Err(e) => return Err(IndexError::io(&path, e)),
                }
            }
            debug!("Pruned snapshot {id}");
        }
        if excess > 0 {
            info!("Pruned {excess} snapshot(s) from {}", self.primary.display());
        }
        Ok(excess)
    }

    /// `false` only when the tree file names a different root. An unreadable
    /// tree still counts as ours so the loader can report it.
    fn owns(&self, dir: &Path, id: &SnapshotId) -> bool {
        match read_json::<TreeHeader>(&dir.join(id.file_name(TREE)), "tree_snapshot_header") {
            Ok(header) => header.root == self.root,
            Err(_) => true,
        }
    }
}

/// Write listing, forbidden, then tree into `dir`.
fn write_snapshot(
    dir: &Path,
    id: &SnapshotId,
    tree: &Tree,
    listing: Option<&Listing>,
    forbidden: Option<&Forbidden>,
) -> Result<()> {
    fs::create_dir_all(dir).map_err(|e| IndexError::io(dir, e))?;
    if let Some(listing) = listing {
        write_json(&dir.join(id.file_name(LISTING)), &listing_to_record(listing), "listing_snapshot_write")?;
    }
    if let Some(forbidden) = forbidden {
        write_json(
            &dir.join(id.file_name(FORBIDDEN)),
            &forbidden_to_record(forbidden),
            "forbidden_snapshot_write",
        )?;
    }
    write_json(&dir.join(id.file_name(TREE)), &TreeRecord::from_tree(tree), "tree_snapshot_write")
}

/// Pretty JSON written to a temp file and renamed into place.
fn write_json<T: Serialize>(path: &Path, value: &T, context: &'static str) -> Result<()> {
    let temp_path = path.with_extension("json.tmp");
    let result = write_temp(&temp_path, value, context)
        .and_then(|()| fs::rename(&temp_path, path).map_err(|e| IndexError::io(path, e)));
    if result.is_err() {
        let _ = fs::remove_file(&temp_path);
    }
    result
}

fn write_temp<T: Serialize>(temp_path: &Path, value: &T, context: &'static str) -> Result<()> {
    let file = OpenOptions::new()
        .write(true)
        .create(true)
        .truncate(true)
        .open(temp_path)
        .map_err(|e| IndexError::io(temp_path, e))?;
    let mut writer = BufWriter::new(file);
    serde_json::to_writer_pretty(&mut writer, value).map_err(|e| IndexError::serialization(context, e))?;
    writer.flush().map_err(|e| IndexError::io(temp_path, e))
}

fn read_json<T: DeserializeOwned>(path: &Path, context: &'static str) -> Result<T> {
    let file = File::open(path).map_err(|e| IndexError::io(path, e))?;
    serde_json::from_reader(BufReader::new(file)).map_err(|e| IndexError::serialization(context, e))
}

fn read_optional<T: DeserializeOwned>(
    dir: &Path,
    id: &SnapshotId,
    kind: &str,
    context: &'static str,
) -> Option<T> {
    let path = dir.join(id.file_name(kind));
    if !path.is_file() {
        return None;
    }
    match read_json(&path, context) {
        Ok(value) => Some(value),
        Err(e) => {
            warn!("Ignoring {kind} of snapshot {id}: {e}");
            None
        }
    }
}

/// Tags that have a tree file in `dir`. Missing directories are empty.
fn tags_in(dir: &Path) -> Vec<SnapshotId> {
    let Ok(entries) = fs::read_dir(dir) else {
        return Vec::new();
    };
    entries
        .filter_map(|entry| entry.ok())
        .filter_map(|entry| {
            let name = entry.file_name();
            let tag = name.to_str()?.strip_suffix("_tree.json")?.to_string();
            SnapshotId::parse(&tag)
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{build_listing, Entry, FileEntry};
    use tempfile::TempDir;

    fn store_in(tmp: &TempDir) -> (SnapshotStore, Tree) {
        let root = tmp.path().join("root");
        fs::create_dir_all(&root).unwrap();
        let config = IndexConfig::default().with_fallback_dir(tmp.path().join("fallback"));
        let store = SnapshotStore::for_root(&root, &config);
        let mut tree = Tree::new(store.root().clone());
        tree.insert(
            store.root().join("a"),
            Entry::File(FileEntry {
                hash: HashAlgorithm::Sha256.digest_bytes(b"a"),
                size: 1,
                mtime: 12.5,
            }),
        );
        (store, tree)
    }

    #[test]
    fn save_then_load_returns_the_same_tree() {
        let tmp = TempDir::new().unwrap();
        let (store, tree) = store_in(&tmp);
        let listing = build_listing(&tree);
        let report = store.save(&tree, Some(&listing), None).unwrap();
        assert!(report.warning.is_none());
        assert_eq!(report.location, store.primary_dir());

        let snapshot = store.load(&report.id).unwrap();
        assert_eq!(snapshot.tree, tree);
        assert_eq!(snapshot.listing, Some(listing));
        assert!(snapshot.forbidden.is_none());
    }

    #[test]
    fn consecutive_saves_get_increasing_tags() {
        let tmp = TempDir::new().unwrap();
        let (store, tree) = store_in(&tmp);
        let first = store.save(&tree, None, None).unwrap().id;
        let second = store.save(&tree, None, None).unwrap().id;
        assert!(second > first);
        let ids: Vec<SnapshotId> = store.list().into_iter().map(|i| i.id).collect();
        assert_eq!(ids, vec![first, second.clone()]);
        assert_eq!(store.load_latest_snapshot().unwrap().id, second);
    }

    #[test]
    fn orphaned_listing_without_tree_is_invisible() {
        let tmp = TempDir::new().unwrap();
        let (store, _) = store_in(&tmp);
        fs::create_dir_all(store.primary_dir()).unwrap();
        fs::write(
            store.primary_dir().join("20240101T000000.000000Z_listing.json"),
            "{}",
        )
        .unwrap();
        assert!(store.list().is_empty());
    }

    #[test]
    fn prune_keeps_the_newest() {
        let tmp = TempDir::new().unwrap();
        let (store, tree) = store_in(&tmp);
        let ids: Vec<SnapshotId> = (0..4)
            .map(|_| store.save(&tree, None, Some(&Forbidden::default())).unwrap().id)
            .collect();
        assert_eq!(store.prune(2).unwrap(), 2);
        let left: Vec<SnapshotId> = store.list().into_iter().map(|i| i.id).collect();
        assert_eq!(left, ids[2..].to_vec());
        assert_eq!(store.prune(5).unwrap(), 0);
    }

    #[test]
    fn roots_sharing_a_directory_see_only_their_own_snapshots() {
        let tmp = TempDir::new().unwrap();
        let shared = tmp.path().join("shared");
        let config = IndexConfig::default()
            .with_snapshot_dir(&shared)
            .with_fallback_dir(tmp.path().join("fallback"));
        let open = |name: &str| {
            let root = tmp.path().join(name);
            fs::create_dir_all(&root).unwrap();
            let store = SnapshotStore::for_root(&root, &config);
            let tree = Tree::new(store.root().clone());
            (store, tree)
        };
        let (alpha, alpha_tree) = open("alpha");
        let (beta, beta_tree) = open("beta");

        let alpha_old = alpha.save(&alpha_tree, None, None).unwrap().id;
        let alpha_new = alpha.save(&alpha_tree, None, None).unwrap().id;
        let beta_id = beta.save(&beta_tree, None, None).unwrap().id;
        assert!(beta_id > alpha_new);

        let latest = alpha.load_latest_snapshot().unwrap();
        assert_eq!(latest.id, alpha_new);
        assert_eq!(latest.tree, alpha_tree);
        assert_eq!(alpha.list().len(), 2);

        assert_eq!(alpha.prune(1).unwrap(), 1);
        assert!(!shared.join(alpha_old.file_name(TREE)).exists());
        assert!(shared.join(beta_id.file_name(TREE)).exists());
        assert_eq!(beta.load_latest_snapshot().unwrap().id, beta_id);
    }

    #[test]
    fn missing_snapshot_is_not_found() {
        let tmp = TempDir::new().unwrap();
        let (store, _) = store_in(&tmp);
        let id = SnapshotId::parse("20240101T000000.000000Z").unwrap();
        assert!(matches!(store.load(&id), Err(IndexError::SnapshotNotFound(_))));
    }
}
