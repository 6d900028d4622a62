/// Scanner module — turns a directory tree into a `Tree` plus `Forbidden`.
///
/// A walk runs three phases over one scan arena:
/// - **Metadata** ([`parallel`]): `jwalk` traversal recording names, sizes
///   and mtimes, parent-first.
/// - **Content** (`hashing`): files hashed on a dedicated rayon pool, with
///   cached hashes reused when size and mtime are unchanged.
/// - **Aggregate**: one reverse pass over the arena computing every
///   directory's combined hash after all of its children are final.
///
/// [`Walker`] runs a walk on the calling thread; [`start_scan`] runs one on
/// a background thread and hands back a [`ScanHandle`].
pub mod parallel;
pub mod progress;

mod hashing;

use crate::config::IndexConfig;
use crate::error::{IndexError, Result};
use crate::hasher::{ContentHasher, StreamHasher};
use crate::model::{Forbidden, IndexPath, Tree};
use progress::ScanProgress;

use crossbeam_channel::{Receiver, Sender};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};
use tracing::{debug, info};

/// Maximum number of progress messages that may queue up in the channel.
///
/// The CLI drains continuously, so this only bounds memory if the consumer
/// stalls; the scanner then blocks on `send` until it catches up.
pub const PROGRESS_CHANNEL_CAPACITY: usize = 4_096;

/// Counters describing one walk.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct WalkStats {
    pub files: u64,
    pub dirs: u64,
    pub bytes: u64,
    /// Files whose content was read.
    pub hashed: u64,
    /// Files whose cached hash was reused without opening them.
    pub reused: u64,
    /// Paths recorded in the forbidden set.
    pub skipped: u64,
    /// Symlinks passed over because `follow_links` is off.
    pub skipped_links: u64,
    pub duration: Duration,
}

/// Result of a completed walk.
#[derive(Debug, Clone)]
pub struct WalkOutcome {
    pub tree: Tree,
    pub forbidden: Forbidden,
    pub stats: WalkStats,
}

/// Configurable walk over one root.
///
/// ```ignore
/// let outcome = Walker::new(&config).with_cache(&previous).walk(root)?;
/// ```
pub struct Walker<'a> {
    config: &'a IndexConfig,
    hasher: Option<&'a dyn ContentHasher>,
    cache: Option<&'a Tree>,
    cancel: Arc<AtomicBool>,
    progress: Option<Sender<ScanProgress>>,
}

impl<'a> Walker<'a> {
    pub fn new(config: &'a IndexConfig) -> Self {
        Self {
            config,
            hasher: None,
            cache: None,
            cancel: Arc::new(AtomicBool::new(false)),
            progress: None,
        }
    }

    /// Replace the default streaming hasher.
    pub fn with_hasher(mut self, hasher: &'a dyn ContentHasher) -> Self {
        self.hasher = Some(hasher);
        self
    }

    /// Reuse hashes from a previous tree when size and mtime still match.
    pub fn with_cache(mut self, previous: &'a Tree) -> Self {
        self.cache = Some(previous);
        self
    }

    pub fn with_cancel_flag(mut self, cancel: Arc<AtomicBool>) -> Self {
        self.cancel = cancel;
        self
    }

    pub fn with_progress(mut self, tx: Sender<ScanProgress>) -> Self {
        self.progress = Some(tx);
        self
    }

    /// Walk `root`. Per-path failures land in the outcome's forbidden set;
    /// only an invalid root or cancellation is an error.
    pub fn walk(&self, root: &Path) -> Result<WalkOutcome> {
        let start = Instant::now();
        let root_path = validate_root(root)?;
        let root_key = IndexPath::from_path(&root_path);
        info!("Walking {root_key}");

        let default_hasher = StreamHasher::new(self.config.algorithm, self.config.chunk_size);
        let hasher: &dyn ContentHasher = match self.hasher {
            Some(h) => h,
            None => &default_hasher,
        };

        let cache = self.cache.filter(|prev| {
            let same_root = *prev.root() == root_key;
            if !same_root {
                debug!("ignoring cache for {}: root differs", prev.root());
            }
            same_root
        });

        let result = self.run_phases(&root_path, &root_key, hasher, cache, start);
        if matches!(result, Err(IndexError::Cancelled)) {
            info!("Walk of {root_key} cancelled");
            self.send(ScanProgress::Cancelled);
        }
        result
    }

    fn run_phases(
        &self,
        root_path: &Path,
        root_key: &IndexPath,
        hasher: &dyn ContentHasher,
        cache: Option<&Tree>,
        start: Instant,
    ) -> Result<WalkOutcome> {
        let metadata = parallel::scan_metadata(&parallel::MetadataPass {
            root_path,
            root: root_key,
            workers: self.config.workers,
            follow_links: self.config.follow_links,
            excluded: snapshot_exclusions(root_path, self.config),
            cancel: &self.cancel,
            progress: self.progress.as_ref(),
        })?;
        info!(
            "Metadata pass: {} files, {} dirs in {:.2?}",
            metadata.files_found,
            metadata.dirs_found,
            start.elapsed()
        );

        let mut arena = metadata.arena;
        let counts = hashing::hash_files(
            &mut arena,
            &metadata.files,
            &hashing::HashPass {
                hasher,
                cache,
                force_rehash: self.config.force_rehash,
                workers: self.config.workers,
                cancel: &self.cancel,
                progress: self.progress.as_ref(),
            },
        )?;
        info!(
            "Content pass: {} hashed, {} reused, {} failed",
            counts.hashed, counts.reused, counts.failed
        );

        arena.aggregate(hasher.algorithm());
        let (tree, forbidden) = arena.into_tree(root_key.clone());

        let stats = WalkStats {
            files: tree.file_count() as u64,
            dirs: tree.dir_count() as u64,
            bytes: tree.total_size(),
            hashed: counts.hashed,
            reused: counts.reused,
            skipped: forbidden.len() as u64,
            skipped_links: metadata.skipped_links,
            duration: start.elapsed(),
        };
        info!(
            "Walk complete: {} files, {} dirs, {} bytes, {} skipped in {:.2?}",
            stats.files, stats.dirs, stats.bytes, stats.skipped, stats.duration
        );
        self.send(ScanProgress::Complete {
            duration: stats.duration,
            error_count: stats.skipped,
        });

        Ok(WalkOutcome {
            tree,
            forbidden,
            stats,
        })
    }

    fn send(&self, message: ScanProgress) {
        if let Some(tx) = &self.progress {
            let _ = tx.send(message);
        }
    }
}

/// Walk `root` with the default hasher and no cache.
pub fn walk(root: &Path, config: &IndexConfig) -> Result<WalkOutcome> {
    Walker::new(config).walk(root)
}

/// Check the walk preconditions and return the canonical root.
pub fn validate_root(root: &Path) -> Result<PathBuf> {
    let meta = match fs::metadata(root) {
        Ok(meta) => meta,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            return Err(IndexError::RootNotFound(root.to_path_buf()));
        }
        Err(e) => {
            return Err(IndexError::RootUnreadable {
                path: root.to_path_buf(),
                source: e,
            });
        }
    };
    if !meta.is_dir() {
        return Err(IndexError::RootNotDirectory(root.to_path_buf()));
    }
    let canonical = fs::canonicalize(root).map_err(|e| IndexError::RootUnreadable {
        path: root.to_path_buf(),
        source: e,
    })?;
    fs::read_dir(&canonical).map_err(|e| IndexError::RootUnreadable {
        path: canonical.clone(),
        source: e,
    })?;
    Ok(canonical)
}

/// Snapshot locations that must never be indexed.
fn snapshot_exclusions(root_path: &Path, config: &IndexConfig) -> Vec<PathBuf> {
    let mut excluded = vec![root_path.join(&config.snapshot_dir_name)];
    if let Some(dir) = &config.snapshot_dir {
        let dir = fs::canonicalize(dir).unwrap_or_else(|_| dir.clone());
        if dir.starts_with(root_path) && !excluded.contains(&dir) {
            excluded.push(dir);
        }
    }
    excluded
}

/// Handle to a walk running on a background thread.
pub struct ScanHandle {
    /// Receiver for progress updates from the scan thread.
    pub progress_rx: Receiver<ScanProgress>,
    cancel_flag: Arc<AtomicBool>,
    thread: thread::JoinHandle<Result<WalkOutcome>>,
}

impl ScanHandle {
    /// Request the walk to stop as soon as possible.
    pub fn cancel(&self) {
        self.cancel_flag.store(true, Ordering::Relaxed);
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancel_flag.load(Ordering::Relaxed)
    }

    /// The shared flag, for wiring into a signal handler.
    pub fn cancel_flag(&self) -> Arc<AtomicBool> {
        self.cancel_flag.clone()
    }

    /// `true` once the scan thread has returned.
    pub fn is_finished(&self) -> bool {
        self.thread.is_finished()
    }

    /// Block until the walk ends and take its outcome.
    pub fn wait(self) -> Result<WalkOutcome> {
        self.thread
            .join()
            .map_err(|_| IndexError::Worker("scanner thread panicked".to_string()))?
    }
}

/// Start a walk on a background thread.
///
/// `previous`, when given, is used as the hash cache exactly as in an
/// incremental diff.
pub fn start_scan(root: PathBuf, config: IndexConfig, previous: Option<Tree>) -> Result<ScanHandle> {
    let (progress_tx, progress_rx) =
        crossbeam_channel::bounded::<ScanProgress>(PROGRESS_CHANNEL_CAPACITY);
    let cancel_flag = Arc::new(AtomicBool::new(false));
    let cancel_clone = cancel_flag.clone();

    let thread = thread::Builder::new()
        .name("indexsleuth-scanner".into())
        .spawn(move || {
            let mut walker = Walker::new(&config)
                .with_cancel_flag(cancel_clone)
                .with_progress(progress_tx);
            if let Some(prev) = previous.as_ref() {
                walker = walker.with_cache(prev);
            }
            walker.walk(&root)
        })
        .map_err(|e| IndexError::Worker(format!("failed to spawn scanner thread: {e}")))?;

    Ok(ScanHandle {
        progress_rx,
        cancel_flag,
        thread,
    })
}
