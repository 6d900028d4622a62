/// Arena-backed scan tree with O(n) bottom-up aggregation.
///
/// All nodes live in a single `Vec<ScanNode>`. Relationships use
/// `NodeIndex` rather than heap pointers. The walker always inserts a
/// child after its parent, so iterating the arena in reverse visits every
/// child before its parent: that is the per-directory join the aggregate
/// hash depends on, done without recursion or an explicit stack.
use super::entry::{DirEntry, Entry, FileEntry};
use super::forbidden::Forbidden;
use super::path::IndexPath;
use super::scan_node::{NodeIndex, ScanNode};
use super::tree::Tree;
use crate::error::AccessErrorKind;
use crate::hasher::{ContentHash, HashAlgorithm};
use compact_str::CompactString;

#[derive(Debug, Clone, Default)]
pub struct ScanArena {
    pub nodes: Vec<ScanNode>,
    pub root: Option<NodeIndex>,
}

impl ScanArena {
    /// Pre-allocate room for roughly `estimated_nodes` entries.
    pub fn with_capacity(estimated_nodes: usize) -> Self {
        Self {
            nodes: Vec::with_capacity(estimated_nodes),
            root: None,
        }
    }

    pub fn add_node(&mut self, node: ScanNode) -> NodeIndex {
        let idx = NodeIndex::new(self.nodes.len());
        self.nodes.push(node);
        idx
    }

    /// Insert the scan root. `path` is the whole normalised root path.
    pub fn add_root(&mut self, path: &IndexPath, mtime: f64) -> NodeIndex {
        let idx = self.add_node(ScanNode::new_dir(CompactString::new(path.as_str()), mtime, None));
        self.root = Some(idx);
        idx
    }

    /// Attach `child` under `parent`, prepending to the sibling list. O(1).
    pub fn add_child(&mut self, parent: NodeIndex, child: NodeIndex) {
        let old_first = self.nodes[parent.idx()].first_child;
        self.nodes[child.idx()].next_sibling = old_first;
        self.nodes[child.idx()].parent = Some(parent);
        self.nodes[parent.idx()].first_child = Some(child);
    }

    /// Record that `index` could not be read.
    pub fn mark_error(&mut self, index: NodeIndex, kind: AccessErrorKind) {
        let node = &mut self.nodes[index.idx()];
        node.error = Some(kind);
        node.hash = None;
    }

    /// Reconstruct the full path of a node by walking up to the root.
    pub fn full_path(&self, index: NodeIndex) -> IndexPath {
        let mut segments = Vec::new();
        let mut current = Some(index);
        while let Some(idx) = current {
            segments.push(self.nodes[idx.idx()].name.as_str());
            current = self.nodes[idx.idx()].parent;
        }
        let mut iter = segments.into_iter().rev();
        let base = IndexPath::from_normalized(iter.next().unwrap_or_default());
        iter.fold(base, |acc, name| acc.join(name))
    }

    #[inline]
    pub fn node(&self, index: NodeIndex) -> &ScanNode {
        &self.nodes[index.idx()]
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Compute every directory's combined hash, total size, latest mtime and
    /// file count in a single reverse pass.
    ///
    /// Errored children are skipped, so an unreadable subtree leaves its
    /// ancestors aggregated over the reachable remainder. A directory with
    /// no readable children gets size 0, the algorithm's empty hash, and
    /// keeps its own mtime.
    pub fn aggregate(&mut self, algorithm: HashAlgorithm) {
        for i in (0..self.nodes.len()).rev() {
            if !self.nodes[i].is_dir || !self.nodes[i].is_readable() {
                continue;
            }

            let mut pairs: Vec<(&str, &ContentHash)> = Vec::new();
            let mut size = 0u64;
            let mut latest: Option<f64> = None;
            let mut files = 0u64;

            let mut child = self.nodes[i].first_child;
            while let Some(idx) = child {
                let node = &self.nodes[idx.idx()];
                child = node.next_sibling;
                let Some(hash) = node.hash.as_ref().filter(|_| node.is_readable()) else {
                    continue;
                };
                pairs.push((node.name.as_str(), hash));
                size += node.size;
                latest = Some(latest.map_or(node.mtime, |m: f64| m.max(node.mtime)));
                files += if node.is_dir { node.descendant_files } else { 1 };
            }

            let combined = algorithm.combine(pairs);
            let dir = &mut self.nodes[i];
            dir.hash = Some(combined);
            dir.size = size;
            dir.descendant_files = files;
            if let Some(m) = latest {
                dir.mtime = m;
            }
        }
    }

    /// Flatten into the path-keyed `Tree` plus the `Forbidden` set.
    ///
    /// Call after [`aggregate`](Self::aggregate). Anything below an errored
    /// directory is reported with that directory's reason.
    pub fn into_tree(&self, root: IndexPath) -> (Tree, Forbidden) {
        let mut tree = Tree::new(root);
        let mut forbidden = Forbidden::default();

        // Parents precede children, so one forward pass can carry both the
        // path and any inherited error down the tree.
        let mut paths: Vec<IndexPath> = Vec::with_capacity(self.nodes.len());
        let mut inherited: Vec<Option<AccessErrorKind>> = Vec::with_capacity(self.nodes.len());

        for node in &self.nodes {
            let (path, parent_err) = match node.parent {
                Some(p) => (paths[p.idx()].join(&node.name), inherited[p.idx()]),
                None => (IndexPath::from_normalized(node.name.as_str()), None),
            };
            let err = parent_err.or(node.error);

            match (err, &node.hash) {
                (Some(kind), _) => forbidden.insert(path.clone(), kind),
                (None, Some(hash)) => {
                    let entry = if node.is_dir {
                        Entry::Dir(DirEntry {
                            combined_hash: hash.clone(),
                            total_size: node.size,
                            latest_mtime: node.mtime,
                        })
                    } else {
                        Entry::File(FileEntry {
                            hash: hash.clone(),
                            size: node.size,
                            mtime: node.mtime,
                        })
                    };
                    tree.insert(path.clone(), entry);
                }
                (None, None) => {}
            }

            paths.push(path);
            inherited.push(err);
        }

        (tree, forbidden)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const ALG: HashAlgorithm = HashAlgorithm::Sha256;

    fn file(arena: &mut ScanArena, parent: NodeIndex, name: &str, content: &[u8], mtime: f64) -> NodeIndex {
        let mut node = ScanNode::new_file(CompactString::new(name), content.len() as u64, mtime, Some(parent));
        node.hash = Some(ALG.digest_bytes(content));
        let idx = arena.add_node(node);
        arena.add_child(parent, idx);
        idx
    }

    fn dir(arena: &mut ScanArena, parent: NodeIndex, name: &str) -> NodeIndex {
        let idx = arena.add_node(ScanNode::new_dir(CompactString::new(name), 0.0, Some(parent)));
        arena.add_child(parent, idx);
        idx
    }

    #[test]
    fn aggregation_sums_sizes_and_takes_latest_mtime() {
        let mut arena = ScanArena::with_capacity(8);
        let root = arena.add_root(&IndexPath::from_normalized("/r"), 0.0);
        let b = dir(&mut arena, root, "b");
        file(&mut arena, root, "a.txt", b"hello", 10.0);
        file(&mut arena, b, "c.txt", b"hello", 20.0);
        file(&mut arena, b, "d.txt", b"world", 15.0);

        arena.aggregate(ALG);

        assert_eq!(arena.node(b).size, 10);
        assert_eq!(arena.node(b).mtime, 20.0);
        assert_eq!(arena.node(root).size, 15);
        assert_eq!(arena.node(root).descendant_files, 3);

        let hello = ALG.digest_bytes(b"hello");
        let world = ALG.digest_bytes(b"world");
        let b_hash = ALG.combine([("c.txt", &hello), ("d.txt", &world)]);
        assert_eq!(arena.node(b).hash.as_ref(), Some(&b_hash));
        let root_hash = ALG.combine([("a.txt", &hello), ("b", &b_hash)]);
        assert_eq!(arena.node(root).hash.as_ref(), Some(&root_hash));
    }

    #[test]
    fn insertion_order_does_not_change_combined_hash() {
        let build = |names: &[&str]| {
            let mut arena = ScanArena::with_capacity(4);
            let root = arena.add_root(&IndexPath::from_normalized("/r"), 0.0);
            for name in names {
                file(&mut arena, root, name, name.as_bytes(), 1.0);
            }
            arena.aggregate(ALG);
            arena.node(root).hash.clone()
        };
        assert_eq!(build(&["x", "y", "z"]), build(&["z", "x", "y"]));
    }

    #[test]
    fn empty_directory_gets_empty_hash_and_own_mtime() {
        let mut arena = ScanArena::with_capacity(2);
        let root = arena.add_root(&IndexPath::from_normalized("/r"), 0.0);
        let e = arena.add_node(ScanNode::new_dir(CompactString::new("empty"), 42.0, Some(root)));
        arena.add_child(root, e);
        arena.aggregate(ALG);
        assert_eq!(arena.node(e).hash, Some(ALG.empty()));
        assert_eq!(arena.node(e).size, 0);
        assert_eq!(arena.node(e).mtime, 42.0);
    }

    #[test]
    fn errored_subtree_is_excluded_and_reported() {
        let mut arena = ScanArena::with_capacity(8);
        let root = arena.add_root(&IndexPath::from_normalized("/r"), 0.0);
        let ok = dir(&mut arena, root, "ok");
        file(&mut arena, ok, "f", b"data", 1.0);
        let locked = dir(&mut arena, root, "locked");
        file(&mut arena, locked, "secret", b"zzz", 1.0);
        arena.mark_error(locked, AccessErrorKind::PermissionDenied);

        arena.aggregate(ALG);
        let (tree, forbidden) = arena.into_tree(IndexPath::from_normalized("/r"));

        assert!(tree.contains(&IndexPath::from_normalized("/r/ok/f")));
        assert!(!tree.contains(&IndexPath::from_normalized("/r/locked")));
        assert!(!tree.contains(&IndexPath::from_normalized("/r/locked/secret")));
        assert_eq!(
            forbidden.get(&IndexPath::from_normalized("/r/locked")),
            Some(AccessErrorKind::PermissionDenied)
        );
        assert!(forbidden.contains(&IndexPath::from_normalized("/r/locked/secret")));
        assert_eq!(tree.root_entry().unwrap().total_size, 4);
        for path in tree.paths() {
            assert!(!forbidden.contains(path));
        }
    }

    #[test]
    fn full_path_joins_segments() {
        let mut arena = ScanArena::with_capacity(4);
        let root = arena.add_root(&IndexPath::from_normalized("/data"), 0.0);
        let d = dir(&mut arena, root, "Users");
        let f = file(&mut arena, d, "test.txt", b"x", 0.0);
        assert_eq!(arena.full_path(f).as_str(), "/data/Users/test.txt");
        assert_eq!(arena.full_path(root).as_str(), "/data");
    }

    #[test]
    fn aggregation_is_idempotent() {
        let mut arena = ScanArena::with_capacity(4);
        let root = arena.add_root(&IndexPath::from_normalized("/r"), 0.0);
        file(&mut arena, root, "a", b"a", 3.0);
        arena.aggregate(ALG);
        let first = (arena.node(root).hash.clone(), arena.node(root).size, arena.node(root).mtime);
        arena.aggregate(ALG);
        let second = (arena.node(root).hash.clone(), arena.node(root).size, arena.node(root).mtime);
        assert_eq!(first, second);
    }
}
