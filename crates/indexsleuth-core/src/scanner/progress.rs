/// Scan progress reporting — lightweight messages sent from the scan
/// thread to whoever is driving it via a crossbeam channel.
use std::time::Duration;

/// Progress updates sent from the scan thread.
///
/// The finished index is returned from [`ScanHandle::wait`]; these
/// messages carry only counters and status.
///
/// [`ScanHandle::wait`]: super::ScanHandle::wait
#[derive(Debug, Clone)]
pub enum ScanProgress {
    /// Periodic update from the metadata pass.
    Update {
        files_found: u64,
        dirs_found: u64,
        total_size: u64,
        current_path: String,
    },
    /// Periodic update from the content pass.
    Hashing { done: u64, total: u64 },
    /// A non-fatal error (e.g. permission denied on one file).
    Error { path: String, message: String },
    /// Walk finished; the outcome is ready.
    Complete { duration: Duration, error_count: u64 },
    /// Walk was cancelled; nothing was produced.
    Cancelled,
}
