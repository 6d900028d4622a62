/// Data model for the index.
///
/// - [`Tree`] — the flat path-keyed index a walk produces.
/// - [`Listing`] — reverse index from content to locations.
/// - [`Forbidden`] — paths that could not be read.
/// - [`ScanArena`] — the arena the walker fills before flattening.
pub mod entry;
pub mod forbidden;
pub mod listing;
pub mod path;
pub mod scan_arena;
pub mod scan_node;
pub mod tree;

pub use entry::{mtime_seconds, DirEntry, Entry, FileEntry};
pub use forbidden::Forbidden;
pub use listing::{build_listing, ContentKey, Listing, Locations};
pub use path::{os_str_key, IndexPath};
pub use scan_arena::ScanArena;
pub use scan_node::{NodeIndex, ScanNode};
pub use tree::Tree;
