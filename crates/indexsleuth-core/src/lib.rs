/// IndexSleuth Core — content-addressed indexing, diffing and snapshots.
///
/// This crate contains all indexing logic with no CLI dependencies, so it
/// can sit behind any frontend.
///
/// # Modules
///
/// - [`model`] — Index data model: paths, entries, tree, listing, arena.
/// - [`hasher`] — Streaming file digests and directory combination.
/// - [`scanner`] — Parallel walk producing a tree and forbidden set.
/// - [`differ`] — Incremental re-walk against a previous tree.
/// - [`snapshot`] — Timestamped JSON snapshots under the indexed root.
/// - [`analysis`] — Derived queries such as duplicate groups.
pub mod analysis;
pub mod config;
pub mod differ;
pub mod error;
pub mod hasher;
pub mod model;
pub mod scanner;
pub mod snapshot;

pub use config::IndexConfig;
pub use error::{AccessError, AccessErrorKind, IndexError, Result};
