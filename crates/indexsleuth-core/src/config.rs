/// Indexing configuration — the explicit context object handed to the
/// walker, differ and snapshot store.
///
/// Nothing in the core crate reads ambient global state; everything that
/// can vary between runs lives here.
use crate::hasher::HashAlgorithm;
use std::path::PathBuf;

/// Name of the hidden directory (under the indexed root) holding snapshots.
pub const DEFAULT_SNAPSHOT_DIR_NAME: &str = ".indexsleuth";

/// Default read buffer for streaming hashes.
pub const DEFAULT_CHUNK_SIZE: usize = 64 * 1024;

/// Smallest accepted chunk size. Anything lower just burns syscalls.
pub const MIN_CHUNK_SIZE: usize = 4 * 1024;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IndexConfig {
    /// Hidden subdirectory of the root used for snapshots. Always excluded
    /// from walks.
    pub snapshot_dir_name: String,
    /// Explicit snapshot directory. Overrides `<root>/<snapshot_dir_name>`.
    pub snapshot_dir: Option<PathBuf>,
    /// Where to write when the primary snapshot directory is not writable.
    /// `None` uses a per-root directory under the system temp dir.
    pub fallback_dir: Option<PathBuf>,
    /// Hashing worker threads.
    pub workers: usize,
    pub algorithm: HashAlgorithm,
    /// Bytes read per chunk when hashing.
    pub chunk_size: usize,
    /// Follow symbolic links while walking. Loops are reported, not fatal.
    pub follow_links: bool,
    /// Ignore cached hashes and re-read every file.
    pub force_rehash: bool,
    /// Persist the listing alongside the tree.
    pub save_listing: bool,
    /// Persist the forbidden set alongside the tree.
    pub save_forbidden: bool,
}

impl Default for IndexConfig {
    fn default() -> Self {
        Self {
            snapshot_dir_name: DEFAULT_SNAPSHOT_DIR_NAME.to_string(),
            snapshot_dir: None,
            fallback_dir: None,
            workers: num_cpus::get().max(1),
            algorithm: HashAlgorithm::default(),
            chunk_size: DEFAULT_CHUNK_SIZE,
            follow_links: false,
            force_rehash: false,
            save_listing: true,
            save_forbidden: true,
        }
    }
}

impl IndexConfig {
    pub fn with_workers(mut self, workers: usize) -> Self {
        self.workers = workers.max(1);
        self
    }

    pub fn with_algorithm(mut self, algorithm: HashAlgorithm) -> Self {
        self.algorithm = algorithm;
        self
    }

    pub fn with_chunk_size(mut self, chunk_size: usize) -> Self {
        self.chunk_size = chunk_size.max(MIN_CHUNK_SIZE);
        self
    }

    pub fn with_snapshot_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.snapshot_dir = Some(dir.into());
        self
    }

    pub fn with_fallback_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.fallback_dir = Some(dir.into());
        self
    }

    pub fn with_follow_links(mut self, follow: bool) -> Self {
        self.follow_links = follow;
        self
    }

    pub fn with_force_rehash(mut self, force: bool) -> Self {
        self.force_rehash = force;
        self
    }

    pub fn with_save_listing(mut self, save: bool) -> Self {
        self.save_listing = save;
        self
    }

    pub fn with_save_forbidden(mut self, save: bool) -> Self {
        self.save_forbidden = save;
        self
    }
}
