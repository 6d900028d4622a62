/// Analysis modules — queries derived from a finished index.
pub mod duplicates;

pub use duplicates::{find_duplicates, DuplicateGroup, DuplicateSummary};
