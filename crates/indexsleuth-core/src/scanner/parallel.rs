/// Metadata pass — parallel directory walk using `jwalk`.
///
/// Builds the scan arena parent-first with size and mtime for every regular
/// file, without reading any file content. Directory listing runs on a
/// rayon pool inside `jwalk`; results arrive in sorted, depth-first order
/// on this thread, so arena insertion needs no locking.
///
/// Unreadable directories and files become error nodes: they stay in the
/// arena so the flattening step can report them, but they never feed an
/// ancestor's aggregate.
use crate::error::{AccessErrorKind, IndexError, Result};
use crate::model::{mtime_seconds, os_str_key, IndexPath, NodeIndex, ScanArena, ScanNode};
use crate::scanner::progress::ScanProgress;
use compact_str::CompactString;
use crossbeam_channel::Sender;
use std::collections::HashMap;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::debug;

/// Entries between cancellation checks.
const CANCEL_CHECK_INTERVAL: u64 = 1_000;

/// Entries between progress messages.
const PROGRESS_INTERVAL: u64 = 5_000;

/// Inputs for one metadata pass.
pub(crate) struct MetadataPass<'a> {
    pub root_path: &'a Path,
    pub root: &'a IndexPath,
    pub workers: usize,
    pub follow_links: bool,
    /// Absolute paths pruned from traversal (the snapshot directory).
    pub excluded: Vec<PathBuf>,
    pub cancel: &'a AtomicBool,
    pub progress: Option<&'a Sender<ScanProgress>>,
}

/// What the metadata pass found.
pub(crate) struct MetadataScan {
    pub arena: ScanArena,
    /// Every readable regular file with the native path jwalk returned.
    /// Hashing opens these, never a path rebuilt from arena names.
    pub files: Vec<(NodeIndex, PathBuf)>,
    pub files_found: u64,
    pub dirs_found: u64,
    pub total_size: u64,
    pub skipped_links: u64,
    pub error_count: u64,
}

pub(crate) fn scan_metadata(pass: &MetadataPass<'_>) -> Result<MetadataScan> {
    let root_mtime = fs::metadata(pass.root_path)
        .and_then(|m| m.modified())
        .map(mtime_seconds)
        .unwrap_or(0.0);

    let mut scan = MetadataScan {
        arena: ScanArena::with_capacity(4_096),
        files: Vec::with_capacity(4_096),
        files_found: 0,
        dirs_found: 1,
        total_size: 0,
        skipped_links: 0,
        error_count: 0,
    };
    let root_idx = scan.arena.add_root(pass.root, root_mtime);

    // Directory path → arena index. Scan-lifetime only.
    let mut dir_map: HashMap<PathBuf, NodeIndex> = HashMap::with_capacity(1_024);
    dir_map.insert(pass.root_path.to_path_buf(), root_idx);

    let excluded = Arc::new(pass.excluded.clone());
    let walker = jwalk::WalkDir::new(pass.root_path)
        .skip_hidden(false)
        .follow_links(pass.follow_links)
        .sort(true)
        .parallelism(jwalk::Parallelism::RayonNewPool(pass.workers.max(1)))
        .process_read_dir(move |_depth, _dir, _state, children| {
            children.retain(|child| match child {
                Ok(entry) => {
                    let path = entry.path();
                    !excluded.iter().any(|x| *x == path)
                }
                Err(_) => true,
            });
        });

    let mut seen: u64 = 0;
    for entry_result in walker {
        seen += 1;
        if seen % CANCEL_CHECK_INTERVAL == 0 && pass.cancel.load(Ordering::Relaxed) {
            return Err(IndexError::Cancelled);
        }

        let entry = match entry_result {
            Ok(e) => e,
            Err(err) => {
                record_walk_error(pass, &mut scan, &mut dir_map, root_idx, &err)?;
                continue;
            }
        };

        if entry.depth == 0 {
            if let Some(err) = entry.read_children_error.as_ref() {
                return Err(IndexError::RootUnreadable {
                    path: pass.root_path.to_path_buf(),
                    source: io::Error::new(io::ErrorKind::Other, err.to_string()),
                });
            }
            continue;
        }

        let path = entry.path();
        let Some(parent_path) = path.parent() else {
            continue;
        };
        let parent_idx = match dir_map.get(parent_path) {
            Some(&idx) => idx,
            None => ensure_ancestors(&mut scan.arena, &mut dir_map, parent_path, pass.root_path, root_idx),
        };

        let name = CompactString::new(os_str_key(entry.file_name()));
        let file_type = entry.file_type();

        if file_type.is_dir() {
            let mtime = entry
                .metadata()
                .ok()
                .and_then(|m| m.modified().ok())
                .map(mtime_seconds)
                .unwrap_or(0.0);
            let idx = scan.arena.add_node(ScanNode::new_dir(name, mtime, Some(parent_idx)));
            scan.arena.add_child(parent_idx, idx);
            if let Some(err) = entry.read_children_error.as_ref() {
                scan.arena.mark_error(idx, classify_walk_error(err));
                scan.error_count += 1;
                report_error(pass.progress, &path, err);
            }
            dir_map.insert(path.clone(), idx);
            scan.dirs_found += 1;
        } else if file_type.is_file() {
            match entry.metadata() {
                Ok(meta) => {
                    let size = meta.len();
                    let mtime = meta.modified().map(mtime_seconds).unwrap_or(0.0);
                    let idx = scan.arena.add_node(ScanNode::new_file(name, size, mtime, Some(parent_idx)));
                    scan.arena.add_child(parent_idx, idx);
                    scan.files.push((idx, path.clone()));
                    scan.files_found += 1;
                    scan.total_size += size;
                }
                Err(err) => {
                    let kind = classify_walk_error(&err);
                    let idx = scan.arena.add_node(ScanNode::new_error(name, false, kind, Some(parent_idx)));
                    scan.arena.add_child(parent_idx, idx);
                    scan.error_count += 1;
                    report_error(pass.progress, &path, &err);
                }
            }
        } else if file_type.is_symlink() {
            // Only reachable with follow_links off; links are not content.
            debug!("skipping symlink {}", path.display());
            scan.skipped_links += 1;
        } else {
            // FIFOs, sockets, devices: opening them can block or never end.
            debug!("skipping special file {}", path.display());
            let idx = scan.arena.add_node(ScanNode::new_error(
                name,
                false,
                AccessErrorKind::NotAFile,
                Some(parent_idx),
            ));
            scan.arena.add_child(parent_idx, idx);
            scan.error_count += 1;
        }

        if seen % PROGRESS_INTERVAL == 0 {
            if let Some(tx) = pass.progress {
                let _ = tx.send(ScanProgress::Update {
                    files_found: scan.files_found,
                    dirs_found: scan.dirs_found,
                    total_size: scan.total_size,
                    current_path: path.to_string_lossy().into_owned(),
                });
            }
        }
    }

    if pass.cancel.load(Ordering::Relaxed) {
        return Err(IndexError::Cancelled);
    }

    debug!(
        "Metadata pass complete: {} files, {} dirs, {} errors",
        scan.files_found, scan.dirs_found, scan.error_count
    );
    Ok(scan)
}

/// Fold a `jwalk` error into the arena.
///
/// A failed directory read arrives after the directory's own entry, so the
/// usual case is flagging a node that already exists. Anything else gets an
/// error placeholder under its parent.
fn record_walk_error(
    pass: &MetadataPass<'_>,
    scan: &mut MetadataScan,
    dir_map: &mut HashMap<PathBuf, NodeIndex>,
    root_idx: NodeIndex,
    err: &jwalk::Error,
) -> Result<()> {
    let kind = classify_walk_error(err);
    let Some(err_path) = err.path().map(Path::to_path_buf) else {
        debug!("walk error without a path: {err}");
        scan.error_count += 1;
        return Ok(());
    };

    if err_path == pass.root_path {
        return Err(IndexError::RootUnreadable {
            path: err_path,
            source: io::Error::new(io::ErrorKind::Other, err.to_string()),
        });
    }

    report_error(pass.progress, &err_path, err);
    scan.error_count += 1;

    if let Some(&idx) = dir_map.get(&err_path) {
        scan.arena.mark_error(idx, kind);
        return Ok(());
    }

    let Some(parent_path) = err_path.parent() else {
        return Ok(());
    };
    let parent_idx = match dir_map.get(parent_path) {
        Some(&idx) => idx,
        None => ensure_ancestors(&mut scan.arena, dir_map, parent_path, pass.root_path, root_idx),
    };
    let name = err_path
        .file_name()
        .map(|n| CompactString::new(os_str_key(n)))
        .unwrap_or_else(|| CompactString::new("<unreadable>"));
    let idx = scan
        .arena
        .add_node(ScanNode::new_error(name, true, kind, Some(parent_idx)));
    scan.arena.add_child(parent_idx, idx);
    Ok(())
}

/// Map a `jwalk` error onto the forbidden classification.
fn classify_walk_error(err: &jwalk::Error) -> AccessErrorKind {
    if err.loop_ancestor().is_some() {
        AccessErrorKind::SymlinkLoop
    } else if let Some(io_err) = err.io_error() {
        AccessErrorKind::from_io(io_err)
    } else {
        AccessErrorKind::IoError
    }
}

fn report_error(progress: Option<&Sender<ScanProgress>>, path: &Path, err: &jwalk::Error) {
    debug!("unreadable: {}: {err}", path.display());
    if let Some(tx) = progress {
        let _ = tx.send(ScanProgress::Error {
            path: path.to_string_lossy().into_owned(),
            message: err.to_string(),
        });
    }
}

/// Ensure all ancestor directories of `target` exist in the arena.
///
/// `jwalk` yields parents before children, so this only fires if that
/// ordering is ever broken; the chain is recreated from the nearest known
/// ancestor so the arena stays parent-first.
fn ensure_ancestors(
    arena: &mut ScanArena,
    dir_map: &mut HashMap<PathBuf, NodeIndex>,
    target: &Path,
    root_path: &Path,
    root_idx: NodeIndex,
) -> NodeIndex {
    let mut missing: Vec<PathBuf> = Vec::new();
    let mut current = target.to_path_buf();

    while !dir_map.contains_key(&current) && current != root_path {
        missing.push(current.clone());
        match current.parent() {
            Some(p) => current = p.to_path_buf(),
            None => break,
        }
    }

    let mut parent_idx = dir_map.get(&current).copied().unwrap_or(root_idx);

    for ancestor in missing.into_iter().rev() {
        let name = ancestor
            .file_name()
            .map(|n| CompactString::new(os_str_key(n)))
            .unwrap_or_default();
        let mtime = fs::metadata(&ancestor)
            .and_then(|m| m.modified())
            .map(mtime_seconds)
            .unwrap_or(0.0);
        let idx = arena.add_node(ScanNode::new_dir(name, mtime, Some(parent_idx)));
        arena.add_child(parent_idx, idx);
        dir_map.insert(ancestor, idx);
        parent_idx = idx;
    }

    parent_idx
}
