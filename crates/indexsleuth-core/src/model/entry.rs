/// Typed index records.
///
/// A file and a directory carry the same three facts (hash, size, mtime)
/// but mean different things by them, so they are distinct types rather
/// than one positional tuple.
use crate::hasher::ContentHash;
use std::time::{SystemTime, UNIX_EPOCH};

/// One regular file at index time.
#[derive(Debug, Clone, PartialEq)]
pub struct FileEntry {
    pub hash: ContentHash,
    pub size: u64,
    /// Seconds since the Unix epoch.
    pub mtime: f64,
}

/// One directory, aggregated over its readable descendants.
#[derive(Debug, Clone, PartialEq)]
pub struct DirEntry {
    pub combined_hash: ContentHash,
    pub total_size: u64,
    pub latest_mtime: f64,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Entry {
    File(FileEntry),
    Dir(DirEntry),
}

impl Entry {
    pub fn hash(&self) -> &ContentHash {
        match self {
            Self::File(f) => &f.hash,
            Self::Dir(d) => &d.combined_hash,
        }
    }

    pub fn size(&self) -> u64 {
        match self {
            Self::File(f) => f.size,
            Self::Dir(d) => d.total_size,
        }
    }

    pub fn mtime(&self) -> f64 {
        match self {
            Self::File(f) => f.mtime,
            Self::Dir(d) => d.latest_mtime,
        }
    }

    pub fn is_dir(&self) -> bool {
        matches!(self, Self::Dir(_))
    }

    pub fn as_file(&self) -> Option<&FileEntry> {
        match self {
            Self::File(f) => Some(f),
            Self::Dir(_) => None,
        }
    }

    pub fn as_dir(&self) -> Option<&DirEntry> {
        match self {
            Self::Dir(d) => Some(d),
            Self::File(_) => None,
        }
    }
}

/// Convert a filesystem timestamp to float seconds since the epoch.
///
/// Pre-epoch timestamps come out negative rather than failing.
pub fn mtime_seconds(time: SystemTime) -> f64 {
    match time.duration_since(UNIX_EPOCH) {
        Ok(d) => d.as_secs_f64(),
        Err(e) => -e.duration().as_secs_f64(),
    }
}
