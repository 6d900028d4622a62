/// Command dispatch: one function per subcommand.
use crate::args::{Cli, Command, DiffArgs, DupesArgs, IndexArgs, OutputFormat, SnapshotsArgs};
use crate::report::{
    changed_paths, skipped_paths, write_diff_text, write_dupes_csv, write_dupes_text,
    write_index_text, write_json, write_snapshots_text, DiffReport, DupesReport, IndexReport,
    SnapshotsReport,
};
use crate::session::run_scan;
use anyhow::Context;
use indexsleuth_core::analysis::{find_duplicates, DuplicateSummary};
use indexsleuth_core::config::IndexConfig;
use indexsleuth_core::differ::DiffOutcome;
use indexsleuth_core::model::{build_listing, Tree};
use indexsleuth_core::scanner::validate_root;
use indexsleuth_core::snapshot::SnapshotStore;
use std::io::Write;
use tracing::{info, warn};

/// Execute `cli`, writing the report to `out`.
pub fn run(cli: &Cli, out: &mut dyn Write) -> anyhow::Result<()> {
    let config = cli.global.to_config();
    let json = cli.global.json;
    match &cli.command {
        Command::Index(args) => index(args, config, json, out),
        Command::Diff(args) => diff(args, config, json, out),
        Command::Dupes(args) => dupes(args, config, json, out),
        Command::Snapshots(args) => snapshots(args, config, json, out),
    }
}

fn index(args: &IndexArgs, config: IndexConfig, json: bool, out: &mut dyn Write) -> anyhow::Result<()> {
    let config = config
        .with_save_listing(!args.no_listing)
        .with_save_forbidden(!args.no_forbidden);
    let outcome = run_scan(&args.root, &config, None)
        .with_context(|| format!("failed to index {}", args.root.display()))?;

    let listing = build_listing(&outcome.tree);
    let store = SnapshotStore::for_root(&args.root, &config);
    let saved = store.save(
        &outcome.tree,
        config.save_listing.then_some(&listing),
        config.save_forbidden.then_some(&outcome.forbidden),
    );
    let (snapshot, save_error) = match saved {
        Ok(report) => (Some(report), None),
        Err(e) => (None, Some(e)),
    };
    let pruned = match (args.keep, &snapshot) {
        (Some(keep), Some(_)) => store.prune(keep.max(1)).context("failed to prune old snapshots")?,
        _ => 0,
    };

    let groups = find_duplicates(&listing, args.min_group);
    let report = IndexReport {
        root: outcome.tree.root().clone(),
        files: outcome.stats.files,
        dirs: outcome.stats.dirs,
        bytes: outcome.stats.bytes,
        root_hash: outcome
            .tree
            .root_entry()
            .map(|d| d.combined_hash.to_string()),
        hashed: outcome.stats.hashed,
        duration: outcome.stats.duration,
        snapshot,
        pruned,
        duplicates: DuplicateSummary::of(&groups),
        duplicate_groups: groups,
        skipped: skipped_paths(&outcome.forbidden),
    };
    if json {
        write_json(out, &report)?;
    } else {
        write_index_text(out, &report)?;
    }

    match save_error {
        Some(e) => Err(e).context("index built but the snapshot was not saved"),
        None => Ok(()),
    }
}

fn diff(args: &DiffArgs, config: IndexConfig, json: bool, out: &mut dyn Write) -> anyhow::Result<()> {
    let config = config.with_force_rehash(args.full_rehash);
    let store = SnapshotStore::for_root(&args.root, &config);

    let (previous_id, previous_tree, previous_listing) = match store.load_latest_snapshot() {
        Some(snapshot) => {
            info!("Comparing against snapshot {}", snapshot.id);
            (Some(snapshot.id), snapshot.tree, snapshot.listing)
        }
        None => {
            info!("No usable snapshot; every path will be reported as added");
            (None, Tree::new(store.root().clone()), None)
        }
    };

    let outcome = run_scan(&args.root, &config, Some(previous_tree.clone()))
        .with_context(|| format!("failed to walk {}", args.root.display()))?;
    let result = DiffOutcome::from_walk(&previous_tree, outcome);

    let listing = match previous_listing {
        Some(mut listing) => {
            listing.apply_changes(&result.changes, &previous_tree, &result.tree);
            listing
        }
        None => build_listing(&result.tree),
    };

    let mut save_error = None;
    let snapshot = if args.no_save {
        None
    } else {
        match store.save(
            &result.tree,
            config.save_listing.then_some(&listing),
            config.save_forbidden.then_some(&result.forbidden),
        ) {
            Ok(report) => Some(report),
            Err(e) => {
                warn!("Diff computed but not saved: {e}");
                save_error = Some(e);
                None
            }
        }
    };

    let groups = find_duplicates(&listing, args.min_group);
    let report = DiffReport {
        root: result.tree.root().clone(),
        previous: previous_id,
        counts: result.changes.counts(),
        changes: changed_paths(&result.changes),
        hashed: result.stats.hashed,
        reused: result.stats.reused,
        duration: result.stats.duration,
        snapshot,
        duplicates: DuplicateSummary::of(&groups),
        duplicate_groups: groups,
        skipped: skipped_paths(&result.forbidden),
    };
    if json {
        write_json(out, &report)?;
    } else {
        write_diff_text(out, &report)?;
    }

    match save_error {
        Some(e) => Err(e).context("diff computed but the snapshot was not saved"),
        None => Ok(()),
    }
}

fn dupes(args: &DupesArgs, config: IndexConfig, json: bool, out: &mut dyn Write) -> anyhow::Result<()> {
    let store = SnapshotStore::for_root(&args.root, &config);
    let latest = if args.rescan {
        None
    } else {
        store.load_latest_snapshot()
    };

    let (source, listing) = match latest {
        Some(snapshot) => {
            let listing = snapshot
                .listing
                .unwrap_or_else(|| build_listing(&snapshot.tree));
            (Some(snapshot.id), listing)
        }
        None => {
            let outcome = run_scan(&args.root, &config, None)
                .with_context(|| format!("failed to walk {}", args.root.display()))?;
            (None, build_listing(&outcome.tree))
        }
    };

    let groups = find_duplicates(&listing, args.min_group);
    let report = DupesReport {
        root: store.root().clone(),
        source,
        summary: DuplicateSummary::of(&groups),
        groups,
    };
    let format = if json { OutputFormat::Json } else { args.format };
    match format {
        OutputFormat::Text => write_dupes_text(out, &report),
        OutputFormat::Json => write_json(out, &report),
        OutputFormat::Csv => write_dupes_csv(out, &report),
    }
}

fn snapshots(args: &SnapshotsArgs, config: IndexConfig, json: bool, out: &mut dyn Write) -> anyhow::Result<()> {
    validate_root(&args.root).with_context(|| format!("cannot list snapshots for {}", args.root.display()))?;
    let store = SnapshotStore::for_root(&args.root, &config);
    let report = SnapshotsReport {
        root: store.root().clone(),
        snapshots: store.list(),
    };
    if json {
        write_json(out, &report)
    } else {
        write_snapshots_text(out, &report)
    }
}
