/// The flat, path-keyed index of one directory tree.
///
/// The hierarchy is implicit in path prefixes; a `BTreeMap` keeps
/// iteration (and therefore serialisation) in a stable order.
use super::entry::{DirEntry, Entry, FileEntry};
use super::path::IndexPath;
use std::collections::BTreeMap;

#[derive(Debug, Clone, PartialEq)]
pub struct Tree {
    root: IndexPath,
    entries: BTreeMap<IndexPath, Entry>,
}

impl Tree {
    /// An empty tree for `root`. Also what a failed snapshot load yields.
    pub fn new(root: IndexPath) -> Self {
        Self {
            root,
            entries: BTreeMap::new(),
        }
    }

    pub fn root(&self) -> &IndexPath {
        &self.root
    }

    pub fn insert(&mut self, path: IndexPath, entry: Entry) -> Option<Entry> {
        self.entries.insert(path, entry)
    }

    pub fn get(&self, path: &IndexPath) -> Option<&Entry> {
        self.entries.get(path)
    }

    pub fn get_file(&self, path: &IndexPath) -> Option<&FileEntry> {
        self.entries.get(path).and_then(Entry::as_file)
    }

    pub fn contains(&self, path: &IndexPath) -> bool {
        self.entries.contains_key(path)
    }

    /// Aggregate for the root directory, if the tree has one.
    pub fn root_entry(&self) -> Option<&DirEntry> {
        self.entries.get(&self.root).and_then(Entry::as_dir)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&IndexPath, &Entry)> {
        self.entries.iter()
    }

    pub fn paths(&self) -> impl Iterator<Item = &IndexPath> {
        self.entries.keys()
    }

    pub fn files(&self) -> impl Iterator<Item = (&IndexPath, &FileEntry)> {
        self.entries
            .iter()
            .filter_map(|(p, e)| e.as_file().map(|f| (p, f)))
    }

    pub fn dirs(&self) -> impl Iterator<Item = (&IndexPath, &DirEntry)> {
        self.entries
            .iter()
            .filter_map(|(p, e)| e.as_dir().map(|d| (p, d)))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn file_count(&self) -> usize {
        self.files().count()
    }

    pub fn dir_count(&self) -> usize {
        self.dirs().count()
    }

    /// Bytes under the root, or the sum over files when the root aggregate
    /// is missing.
    pub fn total_size(&self) -> u64 {
        match self.root_entry() {
            Some(root) => root.total_size,
            None => self.files().map(|(_, f)| f.size).sum(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hasher::HashAlgorithm;

    fn file(content: &[u8], mtime: f64) -> Entry {
        Entry::File(FileEntry {
            hash: HashAlgorithm::Sha256.digest_bytes(content),
            size: content.len() as u64,
            mtime,
        })
    }

    #[test]
    fn files_and_dirs_are_separated() {
        let root = IndexPath::from_normalized("/r");
        let mut tree = Tree::new(root.clone());
        tree.insert(root.join("a.txt"), file(b"hello", 1.0));
        tree.insert(root.join("b.txt"), file(b"hi", 2.0));
        tree.insert(
            root.clone(),
            Entry::Dir(DirEntry {
                combined_hash: HashAlgorithm::Sha256.empty(),
                total_size: 7,
                latest_mtime: 2.0,
            }),
        );
        assert_eq!(tree.len(), 3);
        assert_eq!(tree.file_count(), 2);
        assert_eq!(tree.dir_count(), 1);
        assert_eq!(tree.total_size(), 7);
        assert!(tree.get_file(&root.join("a.txt")).is_some());
        assert!(tree.get_file(&root).is_none());
    }

    #[test]
    fn total_size_without_root_falls_back_to_file_sum() {
        let root = IndexPath::from_normalized("/r");
        let mut tree = Tree::new(root.clone());
        tree.insert(root.join("a"), file(b"abc", 1.0));
        assert_eq!(tree.total_size(), 3);
    }
}
