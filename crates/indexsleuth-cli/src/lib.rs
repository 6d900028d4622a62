/// IndexSleuth CLI — argument parsing, scan orchestration and reports.
///
/// All indexing logic lives in `indexsleuth-core`; this crate only turns
/// command lines into engine calls and results into text.
pub mod args;
pub mod commands;
pub mod format;
pub mod report;
pub mod session;

pub use args::Cli;
pub use commands::run;
