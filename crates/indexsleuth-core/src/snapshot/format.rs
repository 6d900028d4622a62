/// On-disk JSON shapes for the three snapshot files.
///
/// Every map is a `BTreeMap`, so output is key-sorted and two snapshots of
/// the same state are byte-identical. Entries are positional
/// `[hash, size, mtime]` triples to keep large trees compact while still
/// diffable by eye.
use crate::error::{AccessErrorKind, IndexError, Result};
use crate::hasher::ContentHash;
use crate::model::{ContentKey, DirEntry, Entry, FileEntry, Forbidden, IndexPath, Listing, Tree};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Bumped whenever the tree layout changes incompatibly.
pub const FORMAT_VERSION: u32 = 1;

type Triple = (ContentHash, u64, f64);

/// `<tag>_tree.json`. Fields are declared in key order.
#[derive(Debug, Serialize, Deserialize)]
pub(crate) struct TreeRecord {
    pub dirs: BTreeMap<IndexPath, Triple>,
    pub files: BTreeMap<IndexPath, Triple>,
    pub root: IndexPath,
    pub version: u32,
}

impl TreeRecord {
    pub fn from_tree(tree: &Tree) -> Self {
        let mut record = Self {
            dirs: BTreeMap::new(),
            files: BTreeMap::new(),
            root: tree.root().clone(),
            version: FORMAT_VERSION,
        };
        for (path, entry) in tree.iter() {
            let triple = (entry.hash().clone(), entry.size(), entry.mtime());
            if entry.is_dir() {
                record.dirs.insert(path.clone(), triple);
            } else {
                record.files.insert(path.clone(), triple);
            }
        }
        record
    }

    /// Validate and rebuild the tree. Anything that could not have come
    /// from a walk is rejected as corrupt.
    pub fn into_tree(self) -> Result<Tree> {
        if self.version != FORMAT_VERSION {
            return Err(IndexError::Serialization {
                context: "tree_snapshot_version",
                details: format!(
                    "unsupported snapshot version {} (expected {FORMAT_VERSION})",
                    self.version
                ),
            });
        }

        let mut tree = Tree::new(self.root.clone());
        for (path, (hash, size, mtime)) in self.files {
            check_entry(&self.root, &path, &hash)?;
            tree.insert(path, Entry::File(FileEntry { hash, size, mtime }));
        }
        for (path, (hash, size, mtime)) in self.dirs {
            check_entry(&self.root, &path, &hash)?;
            let entry = Entry::Dir(DirEntry {
                combined_hash: hash,
                total_size: size,
                latest_mtime: mtime,
            });
            if tree.insert(path.clone(), entry).is_some() {
                return Err(IndexError::serialization(
                    "tree_snapshot_entries",
                    format!("{path} is listed as both file and directory"),
                ));
            }
        }
        Ok(tree)
    }
}

fn check_entry(root: &IndexPath, path: &IndexPath, hash: &ContentHash) -> Result<()> {
    if !path.starts_with(root) {
        return Err(IndexError::serialization(
            "tree_snapshot_entries",
            format!("{path} lies outside root {root}"),
        ));
    }
    if !is_hex(hash.as_str()) {
        return Err(IndexError::serialization(
            "tree_snapshot_entries",
            format!("{path} has a malformed hash"),
        ));
    }
    Ok(())
}

fn is_hex(s: &str) -> bool {
    !s.is_empty() && s.bytes().all(|b| b.is_ascii_digit() || (b'a'..=b'f').contains(&b))
}

/// `<tag>_listing.json`: `"<hash>:<size>"` → `[[path, mtime], ...]`.
pub(crate) type ListingRecord = BTreeMap<String, Vec<(IndexPath, f64)>>;

pub(crate) fn listing_to_record(listing: &Listing) -> ListingRecord {
    listing
        .buckets()
        .map(|(key, locations)| {
            let members = locations.iter().map(|(p, m)| (p.clone(), *m)).collect();
            (key.encode(), members)
        })
        .collect()
}

pub(crate) fn listing_from_record(record: ListingRecord) -> Result<Listing> {
    let mut listing = Listing::default();
    for (raw_key, members) in record {
        let key = ContentKey::parse(&raw_key).ok_or_else(|| {
            IndexError::serialization("listing_snapshot_key", format!("bad bucket key {raw_key:?}"))
        })?;
        for (path, mtime) in members {
            listing.insert_location(key.clone(), path, mtime);
        }
    }
    Ok(listing)
}

/// `<tag>_forbidden.json`: path → classification.
pub(crate) type ForbiddenRecord = BTreeMap<IndexPath, AccessErrorKind>;

pub(crate) fn forbidden_to_record(forbidden: &Forbidden) -> ForbiddenRecord {
    forbidden.iter().map(|(p, k)| (p.clone(), k)).collect()
}

pub(crate) fn forbidden_from_record(record: ForbiddenRecord) -> Forbidden {
    let mut forbidden = Forbidden::default();
    for (path, kind) in record {
        forbidden.insert(path, kind);
    }
    forbidden
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hasher::HashAlgorithm;
    use crate::model::build_listing;

    fn sample() -> Tree {
        let root = IndexPath::from_normalized("/r");
        let h = |b: &[u8]| HashAlgorithm::Sha256.digest_bytes(b);
        let mut tree = Tree::new(root.clone());
        tree.insert(
            root.join("a.txt"),
            Entry::File(FileEntry {
                hash: h(b"hello"),
                size: 5,
                mtime: 1_700_000_000.123_456_7,
            }),
        );
        tree.insert(
            root.clone(),
            Entry::Dir(DirEntry {
                combined_hash: HashAlgorithm::Sha256.combine([("a.txt", &h(b"hello"))]),
                total_size: 5,
                latest_mtime: 1_700_000_000.123_456_7,
            }),
        );
        tree
    }

    #[test]
    fn tree_json_has_documented_shape() {
        let json = serde_json::to_value(TreeRecord::from_tree(&sample())).unwrap();
        assert_eq!(json["version"], 1);
        assert_eq!(json["root"], "/r");
        let a = &json["files"]["/r/a.txt"];
        assert_eq!(a[0].as_str().unwrap().len(), 64);
        assert_eq!(a[1], 5);
        assert!(json["dirs"]["/r"].is_array());
    }

    #[test]
    fn tree_survives_text_round_trip_exactly() {
        let tree = sample();
        let text = serde_json::to_string_pretty(&TreeRecord::from_tree(&tree)).unwrap();
        let back: TreeRecord = serde_json::from_str(&text).unwrap();
        assert_eq!(back.into_tree().unwrap(), tree);
    }

    #[test]
    fn wrong_version_is_rejected() {
        let mut record = TreeRecord::from_tree(&sample());
        record.version = 99;
        assert!(matches!(
            record.into_tree(),
            Err(IndexError::Serialization { context: "tree_snapshot_version", .. })
        ));
    }

    #[test]
    fn entries_outside_root_are_rejected() {
        let mut record = TreeRecord::from_tree(&sample());
        let hash = HashAlgorithm::Sha256.digest_bytes(b"x");
        record
            .files
            .insert(IndexPath::from_normalized("/elsewhere/x"), (hash, 1, 0.0));
        assert!(record.into_tree().is_err());
    }

    #[test]
    fn listing_record_uses_hash_size_keys() {
        let listing = build_listing(&sample());
        let record = listing_to_record(&listing);
        let key = format!("{}:5", HashAlgorithm::Sha256.digest_bytes(b"hello"));
        assert_eq!(record[&key].len(), 1);
        assert_eq!(listing_from_record(record).unwrap(), listing);
    }

    #[test]
    fn malformed_listing_key_is_an_error() {
        let mut record = ListingRecord::new();
        record.insert("zz-not-a-key".to_string(), vec![]);
        assert!(listing_from_record(record).is_err());
    }
}
