/// Duplicate groups — a derived query over the listing.
///
/// Every listing bucket with enough members is a group of files with
/// identical content. No file is read here; the walk already hashed them.
use crate::hasher::ContentHash;
use crate::model::{IndexPath, Listing};
use serde::Serialize;

/// Files sharing one `(hash, size)`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DuplicateGroup {
    pub hash: ContentHash,
    /// Size of each file in the group.
    pub size: u64,
    /// Members in path order.
    pub paths: Vec<IndexPath>,
    /// Bytes that would be freed by keeping a single copy.
    pub wasted_bytes: u64,
}

impl DuplicateGroup {
    pub fn count(&self) -> usize {
        self.paths.len()
    }
}

/// Groups with at least `min_group_size` members (never fewer than two),
/// most wasteful first.
pub fn find_duplicates(listing: &Listing, min_group_size: usize) -> Vec<DuplicateGroup> {
    let threshold = min_group_size.max(2);
    let mut groups: Vec<DuplicateGroup> = listing
        .buckets()
        .filter(|(_, locations)| locations.len() >= threshold)
        .map(|(key, locations)| DuplicateGroup {
            hash: key.hash.clone(),
            size: key.size,
            paths: locations.keys().cloned().collect(),
            wasted_bytes: key.size * (locations.len() as u64 - 1),
        })
        .collect();
    groups.sort_by(|a, b| {
        b.wasted_bytes
            .cmp(&a.wasted_bytes)
            .then_with(|| a.hash.cmp(&b.hash))
            .then_with(|| a.size.cmp(&b.size))
    });
    groups
}

impl Listing {
    /// Shorthand for [`find_duplicates`].
    pub fn duplicate_groups(&self, min_group_size: usize) -> Vec<DuplicateGroup> {
        find_duplicates(self, min_group_size)
    }
}

/// Totals over a set of groups.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct DuplicateSummary {
    pub groups: usize,
    /// Files beyond the first copy in each group.
    pub redundant_files: usize,
    pub wasted_bytes: u64,
}

impl DuplicateSummary {
    pub fn of(groups: &[DuplicateGroup]) -> Self {
        groups.iter().fold(Self::default(), |mut acc, g| {
            acc.groups += 1;
            acc.redundant_files += g.count().saturating_sub(1);
            acc.wasted_bytes += g.wasted_bytes;
            acc
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hasher::HashAlgorithm;
    use crate::model::{build_listing, Entry, FileEntry, Tree};

    fn tree_of(files: &[(&str, &[u8])]) -> Tree {
        let root = IndexPath::from_normalized("/r");
        let mut tree = Tree::new(root.clone());
        for (name, content) in files {
            tree.insert(
                root.join(name),
                Entry::File(FileEntry {
                    hash: HashAlgorithm::Sha256.digest_bytes(content),
                    size: content.len() as u64,
                    mtime: 0.0,
                }),
            );
        }
        tree
    }

    #[test]
    fn groups_only_shared_content() {
        let tree = tree_of(&[("a.txt", b"hello"), ("c.txt", b"hello"), ("d.txt", b"world")]);
        let groups = find_duplicates(&build_listing(&tree), 2);
        assert_eq!(groups.len(), 1);
        let paths: Vec<&str> = groups[0].paths.iter().map(IndexPath::as_str).collect();
        assert_eq!(paths, vec!["/r/a.txt", "/r/c.txt"]);
        assert_eq!(groups[0].wasted_bytes, 5);
    }

    #[test]
    fn threshold_below_two_still_excludes_singletons() {
        let tree = tree_of(&[("a", b"x"), ("b", b"y")]);
        assert!(find_duplicates(&build_listing(&tree), 0).is_empty());
        assert!(find_duplicates(&build_listing(&tree), 1).is_empty());
    }

    #[test]
    fn min_group_size_filters_small_groups() {
        let tree = tree_of(&[("a", b"xx"), ("b", b"xx"), ("c", b"y"), ("d", b"y"), ("e", b"y")]);
        let listing = build_listing(&tree);
        assert_eq!(listing.duplicate_groups(2).len(), 2);
        let big = listing.duplicate_groups(3);
        assert_eq!(big.len(), 1);
        assert_eq!(big[0].count(), 3);
    }

    #[test]
    fn most_wasteful_group_comes_first() {
        let tree = tree_of(&[("a", b"x"), ("b", b"x"), ("c", b"longer"), ("d", b"longer")]);
        let groups = find_duplicates(&build_listing(&tree), 2);
        assert_eq!(groups[0].size, 6);
        let summary = DuplicateSummary::of(&groups);
        assert_eq!(summary.groups, 2);
        assert_eq!(summary.redundant_files, 2);
        assert_eq!(summary.wasted_bytes, 7);
    }
}
