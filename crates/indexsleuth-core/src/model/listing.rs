/// Reverse index: content identity → every location holding that content.
///
/// Buckets are keyed by `(hash, size)`. Each bucket is a path-keyed set of
/// `(path, mtime)` memberships; a path appears in at most one bucket, and a
/// bucket that loses its last member is removed.
use super::entry::FileEntry;
use super::path::IndexPath;
use super::tree::Tree;
use crate::differ::{ChangeKind, ChangeSet};
use crate::hasher::ContentHash;
use std::collections::BTreeMap;

/// Bucket key.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ContentKey {
    pub hash: ContentHash,
    pub size: u64,
}

impl ContentKey {
    pub fn new(hash: ContentHash, size: u64) -> Self {
        Self { hash, size }
    }

    /// `"<hash>:<size>"`, the key form used in listing snapshots.
    pub fn encode(&self) -> String {
        format!("{}:{}", self.hash, self.size)
    }

    pub fn parse(s: &str) -> Option<Self> {
        let (hash, size) = s.rsplit_once(':')?;
        if hash.is_empty() || !hash.chars().all(|c| c.is_ascii_hexdigit()) {
            return None;
        }
        Some(Self {
            hash: ContentHash::from_hex(hash),
            size: size.parse().ok()?,
        })
    }
}

/// Members of one bucket: path → mtime.
pub type Locations = BTreeMap<IndexPath, f64>;

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Listing {
    buckets: BTreeMap<ContentKey, Locations>,
}

/// Invert a tree. Directories are ignored; O(n) in files, no I/O.
pub fn build_listing(tree: &Tree) -> Listing {
    let mut listing = Listing::default();
    for (path, file) in tree.files() {
        listing.insert(path.clone(), file);
    }
    listing
}

impl Listing {
    pub fn insert(&mut self, path: IndexPath, file: &FileEntry) {
        self.insert_location(
            ContentKey::new(file.hash.clone(), file.size),
            path,
            file.mtime,
        );
    }

    /// Raw insert, used when rebuilding from a persisted listing.
    pub fn insert_location(&mut self, key: ContentKey, path: IndexPath, mtime: f64) {
        self.buckets.entry(key).or_default().insert(path, mtime);
    }

    /// Drop `path` from the bucket `file` belongs to. Returns whether a
    /// membership was removed.
    pub fn remove(&mut self, path: &IndexPath, file: &FileEntry) -> bool {
        let key = ContentKey::new(file.hash.clone(), file.size);
        let Some(bucket) = self.buckets.get_mut(&key) else {
            return false;
        };
        let removed = bucket.remove(path).is_some();
        if bucket.is_empty() {
            self.buckets.remove(&key);
        }
        removed
    }

    /// Bring the listing from `old` to `new` using a precomputed change set,
    /// touching only the paths that appear in it.
    pub fn apply_changes(&mut self, changes: &ChangeSet, old: &Tree, new: &Tree) {
        for (path, kind) in changes.iter() {
            match kind {
                ChangeKind::Removed => {
                    if let Some(file) = old.get_file(path) {
                        self.remove(path, file);
                    }
                }
                ChangeKind::Added => {
                    if let Some(file) = new.get_file(path) {
                        self.insert(path.clone(), file);
                    }
                }
                // Unchanged content can still carry a new mtime.
                ChangeKind::Modified | ChangeKind::Unchanged => {
                    if let Some(file) = old.get_file(path) {
                        self.remove(path, file);
                    }
                    if let Some(file) = new.get_file(path) {
                        self.insert(path.clone(), file);
                    }
                }
            }
        }
    }

    pub fn bucket(&self, key: &ContentKey) -> Option<&Locations> {
        self.buckets.get(key)
    }

    pub fn buckets(&self) -> impl Iterator<Item = (&ContentKey, &Locations)> {
        self.buckets.iter()
    }

    pub fn bucket_count(&self) -> usize {
        self.buckets.len()
    }

    /// Total memberships across all buckets (= indexed files).
    pub fn location_count(&self) -> usize {
        self.buckets.values().map(BTreeMap::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.buckets.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hasher::HashAlgorithm;
    use crate::model::entry::Entry;

    fn fe(content: &[u8], mtime: f64) -> FileEntry {
        FileEntry {
            hash: HashAlgorithm::Sha256.digest_bytes(content),
            size: content.len() as u64,
            mtime,
        }
    }

    fn sample_tree() -> Tree {
        let root = IndexPath::from_normalized("/r");
        let mut tree = Tree::new(root.clone());
        tree.insert(root.join("a.txt"), Entry::File(fe(b"hello", 1.0)));
        tree.insert(root.join("b").join("c.txt"), Entry::File(fe(b"hello", 2.0)));
        tree.insert(root.join("b").join("d.txt"), Entry::File(fe(b"world", 3.0)));
        tree
    }

    #[test]
    fn identical_content_shares_a_bucket() {
        let listing = build_listing(&sample_tree());
        assert_eq!(listing.bucket_count(), 2);
        assert_eq!(listing.location_count(), 3);
        let hello = listing
            .bucket(&ContentKey::new(HashAlgorithm::Sha256.digest_bytes(b"hello"), 5))
            .unwrap();
        let paths: Vec<&str> = hello.keys().map(IndexPath::as_str).collect();
        assert_eq!(paths, vec!["/r/a.txt", "/r/b/c.txt"]);
    }

    #[test]
    fn removing_last_member_drops_bucket() {
        let mut listing = build_listing(&sample_tree());
        let world = fe(b"world", 3.0);
        let path = IndexPath::from_normalized("/r/b/d.txt");
        assert!(listing.remove(&path, &world));
        assert!(!listing.remove(&path, &world));
        assert_eq!(listing.bucket_count(), 1);
    }

    #[test]
    fn same_hash_different_size_are_distinct_keys() {
        let h = HashAlgorithm::Sha256.digest_bytes(b"x");
        let mut listing = Listing::default();
        listing.insert_location(ContentKey::new(h.clone(), 1), IndexPath::from_normalized("/a"), 0.0);
        listing.insert_location(ContentKey::new(h, 2), IndexPath::from_normalized("/b"), 0.0);
        assert_eq!(listing.bucket_count(), 2);
    }

    #[test]
    fn content_key_round_trips_through_its_string_form() {
        let key = ContentKey::new(HashAlgorithm::Sha256.digest_bytes(b"x"), 42);
        assert_eq!(ContentKey::parse(&key.encode()), Some(key));
        assert_eq!(ContentKey::parse("nothex:1"), None);
        assert_eq!(ContentKey::parse("abcd"), None);
        assert_eq!(ContentKey::parse("abcd:x"), None);
    }

    #[test]
    fn apply_changes_matches_a_full_rebuild() {
        let old = sample_tree();
        let root = old.root().clone();
        // Drop d, add e with d's content, touch a.
        let d = root.join("b").join("d.txt");
        let mut new = Tree::new(root.clone());
        for (p, e) in old.iter().filter(|(p, _)| **p != d) {
            new.insert(p.clone(), e.clone());
        }
        new.insert(root.join("b").join("e.txt"), Entry::File(fe(b"world", 9.0)));
        new.insert(root.join("a.txt"), Entry::File(fe(b"hello", 5.0)));

        let changes = ChangeSet::between(&old, &new);
        let mut listing = build_listing(&old);
        listing.apply_changes(&changes, &old, &new);
        assert_eq!(listing, build_listing(&new));
    }
}
