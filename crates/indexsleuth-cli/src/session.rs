/// Runs one background walk and drains its progress channel into logs.
///
/// Ctrl-C sets the walk's cancel flag; a second Ctrl-C terminates the
/// process immediately.
use crossbeam_channel::RecvTimeoutError;
use indexsleuth_core::config::IndexConfig;
use indexsleuth_core::model::Tree;
use indexsleuth_core::scanner::progress::ScanProgress;
use indexsleuth_core::scanner::{start_scan, WalkOutcome};
use signal_hook::consts::SIGINT;
use std::path::Path;
use std::sync::atomic::AtomicBool;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

/// How often a quiet walk logs a heartbeat.
const HEARTBEAT: Duration = Duration::from_secs(5);

/// Counters accumulated from progress messages, for heartbeat and summary
/// logging. The outcome itself carries the authoritative forbidden set.
#[derive(Debug, Default)]
struct ScanState {
    files_found: u64,
    dirs_found: u64,
    total_size: u64,
    hashed: u64,
    to_hash: u64,
    error_count: u64,
    cancelled: bool,
}

impl ScanState {
    fn apply(&mut self, msg: ScanProgress) {
        match msg {
            ScanProgress::Update {
                files_found,
                dirs_found,
                total_size,
                current_path,
            } => {
                self.files_found = files_found;
                self.dirs_found = dirs_found;
                self.total_size = total_size;
                debug!("{files_found} files, {dirs_found} dirs so far; at {current_path}");
            }
            ScanProgress::Hashing { done, total } => {
                self.hashed = done;
                self.to_hash = total;
                debug!("hashed {done}/{total}");
            }
            ScanProgress::Error { path, message } => {
                self.error_count += 1;
                debug!("skipped {path}: {message}");
            }
            ScanProgress::Complete { duration, error_count } => {
                debug!("walk finished in {duration:.2?} with {error_count} skipped paths");
            }
            ScanProgress::Cancelled => {
                self.cancelled = true;
            }
        }
    }
}

/// Wire SIGINT to `flag`.
fn register_interrupt(flag: &Arc<AtomicBool>) {
    // Order matters: the first SIGINT only sets the flag, a second one exits.
    if let Err(e) = signal_hook::flag::register_conditional_shutdown(SIGINT, 130, Arc::clone(flag)) {
        warn!("failed to register SIGINT shutdown: {e}");
    }
    if let Err(e) = signal_hook::flag::register(SIGINT, Arc::clone(flag)) {
        warn!("failed to register SIGINT: {e}");
    }
}

/// Walk `root` on a background thread, logging progress until it ends.
pub fn run_scan(
    root: &Path,
    config: &IndexConfig,
    previous: Option<Tree>,
) -> anyhow::Result<WalkOutcome> {
    let handle = start_scan(root.to_path_buf(), config.clone(), previous)?;
    register_interrupt(&handle.cancel_flag());

    let mut state = ScanState::default();
    let mut last_beat = Instant::now();
    loop {
        match handle.progress_rx.recv_timeout(HEARTBEAT) {
            Ok(msg) => state.apply(msg),
            Err(RecvTimeoutError::Timeout) => {}
            Err(RecvTimeoutError::Disconnected) => break,
        }
        if last_beat.elapsed() >= HEARTBEAT {
            info!(
                "Still walking: {} files, {} dirs, {} bytes, {}/{} hashed",
                state.files_found, state.dirs_found, state.total_size, state.hashed, state.to_hash
            );
            last_beat = Instant::now();
        }
    }

    if state.cancelled {
        warn!("Walk of {} cancelled; nothing will be saved", root.display());
    } else if state.error_count > 0 {
        warn!("{} paths could not be read", state.error_count);
    }
    Ok(handle.wait()?)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn progress_messages_update_the_counters() {
        let mut state = ScanState::default();
        state.apply(ScanProgress::Update {
            files_found: 10,
            dirs_found: 2,
            total_size: 400,
            current_path: "/p/x".to_string(),
        });
        for i in 0..3 {
            state.apply(ScanProgress::Error {
                path: format!("/p/{i}"),
                message: "denied".to_string(),
            });
        }
        state.apply(ScanProgress::Hashing { done: 3, total: 4 });
        state.apply(ScanProgress::Complete {
            duration: Duration::from_millis(7),
            error_count: 3,
        });
        assert_eq!((state.files_found, state.dirs_found, state.total_size), (10, 2, 400));
        assert_eq!((state.hashed, state.to_hash), (3, 4));
        assert_eq!(state.error_count, 3);
        assert!(!state.cancelled);
        state.apply(ScanProgress::Cancelled);
        assert!(state.cancelled);
    }
}
