/// Command-line surface.
use clap::{Args, Parser, Subcommand, ValueEnum};
use indexsleuth_core::config::{IndexConfig, DEFAULT_CHUNK_SIZE};
use indexsleuth_core::hasher::HashAlgorithm;
use std::path::PathBuf;

#[derive(Debug, Parser)]
#[command(
    name = "indexsleuth",
    author,
    version,
    about = "Content-addressed directory indexer with incremental diffs and duplicate detection",
    long_about = None,
    arg_required_else_help = true
)]
pub struct Cli {
    #[command(flatten)]
    pub global: GlobalArgs,
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Clone, Args)]
pub struct GlobalArgs {
    /// Snapshot directory (default: <ROOT>/.indexsleuth).
    #[arg(long, global = true, value_name = "PATH")]
    pub snapshot_dir: Option<PathBuf>,
    /// Hashing threads (default: number of CPUs).
    #[arg(long, global = true, value_name = "N")]
    pub workers: Option<usize>,
    /// Digest algorithm: sha256 or sha512.
    #[arg(long, global = true, default_value_t = HashAlgorithm::Sha256, value_name = "NAME")]
    pub algorithm: HashAlgorithm,
    /// Read buffer size in bytes.
    #[arg(long, global = true, default_value_t = DEFAULT_CHUNK_SIZE, value_name = "BYTES")]
    pub chunk_size: usize,
    /// Follow symbolic links while walking.
    #[arg(long, global = true)]
    pub follow_links: bool,
    /// Emit JSON instead of text.
    #[arg(long, global = true)]
    pub json: bool,
    /// Debug logging.
    #[arg(short, long, global = true, conflicts_with = "quiet")]
    pub verbose: bool,
    /// Warnings and errors only.
    #[arg(short, long, global = true, conflicts_with = "verbose")]
    pub quiet: bool,
}

#[derive(Debug, Clone, Subcommand)]
pub enum Command {
    /// Walk ROOT from scratch and save a snapshot.
    Index(IndexArgs),
    /// Compare ROOT against its latest snapshot.
    Diff(DiffArgs),
    /// List groups of files with identical content.
    Dupes(DupesArgs),
    /// List saved snapshots for ROOT.
    Snapshots(SnapshotsArgs),
}

#[derive(Debug, Clone, Args)]
pub struct IndexArgs {
    #[arg(value_name = "ROOT")]
    pub root: PathBuf,
    /// Do not save the content listing.
    #[arg(long)]
    pub no_listing: bool,
    /// Do not save the list of unreadable paths.
    #[arg(long)]
    pub no_forbidden: bool,
    /// Keep only the newest N snapshots after saving.
    #[arg(long, value_name = "N")]
    pub keep: Option<usize>,
    /// Minimum members for a reported duplicate group.
    #[arg(long, default_value_t = 2, value_name = "N")]
    pub min_group: usize,
}

#[derive(Debug, Clone, Args)]
pub struct DiffArgs {
    #[arg(value_name = "ROOT")]
    pub root: PathBuf,
    /// Re-read every file instead of trusting size and mtime.
    #[arg(long)]
    pub full_rehash: bool,
    /// Do not save the new state as a snapshot.
    #[arg(long)]
    pub no_save: bool,
    /// Minimum members for a reported duplicate group.
    #[arg(long, default_value_t = 2, value_name = "N")]
    pub min_group: usize,
}

#[derive(Debug, Clone, Args)]
pub struct DupesArgs {
    #[arg(value_name = "ROOT")]
    pub root: PathBuf,
    /// Minimum members for a reported group.
    #[arg(long, default_value_t = 2, value_name = "N")]
    pub min_group: usize,
    /// Walk ROOT now instead of reading the latest snapshot.
    #[arg(long)]
    pub rescan: bool,
    #[arg(long, value_enum, default_value_t = OutputFormat::Text)]
    pub format: OutputFormat,
}

#[derive(Debug, Clone, Args)]
pub struct SnapshotsArgs {
    #[arg(value_name = "ROOT")]
    pub root: PathBuf,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    Text,
    Json,
    Csv,
}

impl GlobalArgs {
    /// Map the global flags onto an engine configuration.
    pub fn to_config(&self) -> IndexConfig {
        let mut config = IndexConfig::default()
            .with_algorithm(self.algorithm)
            .with_chunk_size(self.chunk_size)
            .with_follow_links(self.follow_links);
        if let Some(workers) = self.workers {
            config = config.with_workers(workers);
        }
        if let Some(dir) = &self.snapshot_dir {
            config = config.with_snapshot_dir(dir);
        }
        config
    }

    /// Maximum log level implied by `-v` / `-q`.
    pub fn log_level(&self) -> tracing::Level {
        if self.verbose {
            tracing::Level::DEBUG
        } else if self.quiet {
            tracing::Level::WARN
        } else {
            tracing::Level::INFO
        }
    }
}

impl Cli {
    pub fn log_level(&self) -> tracing::Level {
        self.global.log_level()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn cli_definition_is_consistent() {
        Cli::command().debug_assert();
    }

    #[test]
    fn global_flags_reach_the_config() {
        let cli = Cli::parse_from([
            "indexsleuth",
            "diff",
            "/tmp/x",
            "--workers",
            "3",
            "--algorithm",
            "sha512",
            "--follow-links",
            "--full-rehash",
        ]);
        let config = cli.global.to_config();
        assert_eq!(config.workers, 3);
        assert_eq!(config.algorithm, HashAlgorithm::Sha512);
        assert!(config.follow_links);
        match cli.command {
            Command::Diff(args) => assert!(args.full_rehash),
            other => panic!("unexpected command {other:?}"),
        }
    }

    #[test]
    fn verbose_and_quiet_conflict() {
        assert!(Cli::try_parse_from(["indexsleuth", "-v", "-q", "snapshots", "."]).is_err());
    }

    #[test]
    fn unknown_algorithm_is_rejected() {
        assert!(Cli::try_parse_from(["indexsleuth", "--algorithm", "md5", "index", "."]).is_err());
    }

    #[test]
    fn dupes_defaults() {
        let cli = Cli::parse_from(["indexsleuth", "dupes", "."]);
        match cli.command {
            Command::Dupes(args) => {
                assert_eq!(args.min_group, 2);
                assert_eq!(args.format, OutputFormat::Text);
                assert!(!args.rescan);
            }
            other => panic!("unexpected command {other:?}"),
        }
    }
}
