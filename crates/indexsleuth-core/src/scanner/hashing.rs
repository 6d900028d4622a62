/// Content pass — hash every readable file on a fixed-size rayon pool.
///
/// Each worker folds its results into a local [`HashBatch`]; batches are
/// reduced pairwise when the pool joins and only then written back into
/// the arena, so workers never contend on shared state.
///
/// Files whose size and mtime match the cached tree reuse the cached hash
/// and are never opened (fast path). This trusts metadata: a rewrite that
/// preserves both size and mtime goes unnoticed unless `force_rehash` is set.
use crate::error::{AccessError, IndexError, Result};
use crate::hasher::{ContentHash, ContentHasher};
use crate::model::{IndexPath, NodeIndex, ScanArena, Tree};
use std::path::{Path, PathBuf};
use crate::scanner::progress::ScanProgress;
use crossbeam_channel::Sender;
use rayon::prelude::*;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use tracing::debug;

/// Files between progress messages.
const PROGRESS_INTERVAL: u64 = 1_000;

pub(crate) struct HashPass<'a> {
    pub hasher: &'a dyn ContentHasher,
    /// Previous tree used for fast-path lookups.
    pub cache: Option<&'a Tree>,
    pub force_rehash: bool,
    pub workers: usize,
    pub cancel: &'a AtomicBool,
    pub progress: Option<&'a Sender<ScanProgress>>,
}

#[derive(Debug, Default)]
pub(crate) struct HashCounts {
    pub hashed: u64,
    pub reused: u64,
    pub failed: u64,
}

enum HashResult {
    Reused(ContentHash),
    Hashed(ContentHash),
    Failed(AccessError),
    Skipped,
}

/// One worker's local accumulator.
#[derive(Default)]
struct HashBatch {
    results: Vec<(NodeIndex, HashResult)>,
}

impl HashBatch {
    fn merge(mut self, mut other: HashBatch) -> HashBatch {
        if self.results.len() < other.results.len() {
            std::mem::swap(&mut self, &mut other);
        }
        self.results.append(&mut other.results);
        self
    }
}

/// Hash `files`, each given as its arena node and the native path to open.
pub(crate) fn hash_files(
    arena: &mut ScanArena,
    files: &[(NodeIndex, PathBuf)],
    pass: &HashPass<'_>,
) -> Result<HashCounts> {
    let pending: Vec<(NodeIndex, IndexPath, &Path)> = files
        .iter()
        .map(|(idx, native)| (*idx, arena.full_path(*idx), native.as_path()))
        .collect();
    let total = pending.len() as u64;
    let done = AtomicU64::new(0);
    let hex_len = pass.hasher.algorithm().hex_len();

    let pool = rayon::ThreadPoolBuilder::new()
        .num_threads(pass.workers.max(1))
        .thread_name(|i| format!("indexsleuth-hash-{i}"))
        .build()
        .map_err(|e| IndexError::Worker(e.to_string()))?;

    let shared: &ScanArena = arena;
    let batch = pool.install(|| {
        pending
            .par_iter()
            .fold(HashBatch::default, |mut batch, (idx, key, native)| {
                if pass.cancel.load(Ordering::Relaxed) {
                    batch.results.push((*idx, HashResult::Skipped));
                    return batch;
                }

                let node = shared.node(*idx);
                let cached = pass
                    .cache
                    .filter(|_| !pass.force_rehash)
                    .and_then(|tree| tree.get_file(key))
                    .filter(|f| f.size == node.size && f.mtime == node.mtime)
                    .filter(|f| f.hash.as_str().len() == hex_len);

                let result = match cached {
                    Some(f) => HashResult::Reused(f.hash.clone()),
                    None => match pass.hasher.hash_file(native) {
                        Ok(hash) => HashResult::Hashed(hash),
                        Err(err) => HashResult::Failed(err),
                    },
                };
                batch.results.push((*idx, result));

                let n = done.fetch_add(1, Ordering::Relaxed) + 1;
                if n % PROGRESS_INTERVAL == 0 {
                    if let Some(tx) = pass.progress {
                        let _ = tx.send(ScanProgress::Hashing { done: n, total });
                    }
                }
                batch
            })
            .reduce(HashBatch::default, HashBatch::merge)
    });

    if pass.cancel.load(Ordering::Relaxed) {
        return Err(IndexError::Cancelled);
    }

    let mut counts = HashCounts::default();
    for (idx, result) in batch.results {
        match result {
            HashResult::Reused(hash) => {
                arena.nodes[idx.idx()].hash = Some(hash);
                counts.reused += 1;
            }
            HashResult::Hashed(hash) => {
                arena.nodes[idx.idx()].hash = Some(hash);
                counts.hashed += 1;
            }
            HashResult::Failed(err) => {
                debug!("hash failed: {err}");
                if let Some(tx) = pass.progress {
                    let _ = tx.send(ScanProgress::Error {
                        path: err.path.to_string_lossy().into_owned(),
                        message: err.message.clone(),
                    });
                }
                arena.mark_error(idx, err.kind);
                counts.failed += 1;
            }
            // Only produced after cancellation, which returned above.
            HashResult::Skipped => {}
        }
    }

    if let Some(tx) = pass.progress {
        let _ = tx.send(ScanProgress::Hashing { done: total, total });
    }
    debug!(
        "Content pass complete: {} hashed, {} reused, {} failed",
        counts.hashed, counts.reused, counts.failed
    );
    Ok(counts)
}
