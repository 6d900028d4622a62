/// A single node in the arena-allocated scan tree.
///
/// Nodes are stored in a flat `Vec<ScanNode>` while a walk is in flight.
/// Parent-child relationships use indices rather than pointers, so the
/// bottom-up aggregation is a plain reverse loop with no recursion.
use crate::error::AccessErrorKind;
use crate::hasher::ContentHash;
use compact_str::CompactString;

/// Lightweight index into the arena `Vec<ScanNode>`.
///
/// `u32` keeps nodes small; ~4 billion entries is beyond any real tree.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeIndex(pub u32);

impl NodeIndex {
    #[inline]
    pub fn new(index: usize) -> Self {
        debug_assert!(index <= u32::MAX as usize, "NodeIndex overflow");
        Self(index as u32)
    }

    #[inline]
    pub fn idx(self) -> usize {
        self.0 as usize
    }
}

/// A file or directory discovered by the metadata pass.
#[derive(Debug, Clone)]
pub struct ScanNode {
    /// Name only. For the root node this is the whole normalised root path.
    pub name: CompactString,

    pub is_dir: bool,

    /// Files: byte length from metadata. Directories: sum of readable
    /// descendants once aggregated.
    pub size: u64,

    /// Files: own mtime. Directories: own mtime until aggregation replaces
    /// it with the latest readable descendant mtime.
    pub mtime: f64,

    /// Content hash (files) or combined hash (directories). `None` until
    /// hashed / aggregated.
    pub hash: Option<ContentHash>,

    /// Set when the node could not be read. Errored nodes never contribute
    /// to an ancestor's aggregate.
    pub error: Option<AccessErrorKind>,

    pub parent: Option<NodeIndex>,

    /// First child (directories only). Children form a singly-linked list
    /// via `next_sibling`.
    pub first_child: Option<NodeIndex>,

    pub next_sibling: Option<NodeIndex>,

    /// Readable descendant files (directories only).
    pub descendant_files: u64,
}

impl ScanNode {
    pub fn new_file(name: CompactString, size: u64, mtime: f64, parent: Option<NodeIndex>) -> Self {
        Self {
            name,
            is_dir: false,
            size,
            mtime,
            hash: None,
            error: None,
            parent,
            first_child: None,
            next_sibling: None,
            descendant_files: 0,
        }
    }

    pub fn new_dir(name: CompactString, mtime: f64, parent: Option<NodeIndex>) -> Self {
        Self {
            is_dir: true,
            ..Self::new_file(name, 0, mtime, parent)
        }
    }

    /// Placeholder for something that could not be read.
    pub fn new_error(
        name: CompactString,
        is_dir: bool,
        kind: AccessErrorKind,
        parent: Option<NodeIndex>,
    ) -> Self {
        Self {
            is_dir,
            error: Some(kind),
            ..Self::new_file(name, 0, 0.0, parent)
        }
    }

    /// `true` if this node should appear in the finished tree.
    #[inline]
    pub fn is_readable(&self) -> bool {
        self.error.is_none()
    }
}
