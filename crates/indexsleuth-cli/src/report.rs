/// Command results and their text / JSON / CSV renderings.
///
/// Each command builds one report struct; the same struct feeds every
/// output format so the formats never disagree.
use crate::format::{format_count, format_duration, format_size};
use anyhow::Context;
use indexsleuth_core::analysis::{DuplicateGroup, DuplicateSummary};
use indexsleuth_core::differ::{ChangeCounts, ChangeKind, ChangeSet};
use indexsleuth_core::model::{Forbidden, IndexPath};
use indexsleuth_core::snapshot::{SaveReport, SnapshotId, SnapshotInfo};
use serde::Serialize;
use std::io::Write;
use std::time::Duration;

/// Groups shown in text output before eliding the rest.
const TEXT_GROUP_LIMIT: usize = 10;

/// Changed paths shown in text output before eliding the rest.
const TEXT_CHANGE_LIMIT: usize = 200;

#[derive(Debug, Clone, Serialize)]
pub struct SkippedPath {
    pub path: IndexPath,
    pub reason: String,
}

pub fn skipped_paths(forbidden: &Forbidden) -> Vec<SkippedPath> {
    forbidden
        .iter()
        .map(|(path, kind)| SkippedPath {
            path: path.clone(),
            reason: kind.to_string(),
        })
        .collect()
}

#[derive(Debug, Clone, Serialize)]
pub struct IndexReport {
    pub root: IndexPath,
    pub files: u64,
    pub dirs: u64,
    pub bytes: u64,
    pub root_hash: Option<String>,
    pub hashed: u64,
    #[serde(serialize_with = "as_millis")]
    pub duration: Duration,
    pub snapshot: Option<SaveReport>,
    pub pruned: usize,
    pub duplicates: DuplicateSummary,
    pub duplicate_groups: Vec<DuplicateGroup>,
    pub skipped: Vec<SkippedPath>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ChangedPath {
    pub path: IndexPath,
    pub change: ChangeKind,
}

pub fn changed_paths(changes: &ChangeSet) -> Vec<ChangedPath> {
    changes
        .changed()
        .map(|(path, change)| ChangedPath {
            path: path.clone(),
            change,
        })
        .collect()
}

#[derive(Debug, Clone, Serialize)]
pub struct DiffReport {
    pub root: IndexPath,
    pub previous: Option<SnapshotId>,
    pub counts: ChangeCounts,
    pub changes: Vec<ChangedPath>,
    pub hashed: u64,
    pub reused: u64,
    #[serde(serialize_with = "as_millis")]
    pub duration: Duration,
    pub snapshot: Option<SaveReport>,
    pub duplicates: DuplicateSummary,
    pub duplicate_groups: Vec<DuplicateGroup>,
    pub skipped: Vec<SkippedPath>,
}

#[derive(Debug, Clone, Serialize)]
pub struct DupesReport {
    pub root: IndexPath,
    /// Snapshot the groups came from; `None` after a fresh walk.
    pub source: Option<SnapshotId>,
    pub summary: DuplicateSummary,
    pub groups: Vec<DuplicateGroup>,
}

#[derive(Debug, Clone, Serialize)]
pub struct SnapshotsReport {
    pub root: IndexPath,
    pub snapshots: Vec<SnapshotInfo>,
}

fn as_millis<S: serde::Serializer>(d: &Duration, s: S) -> Result<S::Ok, S::Error> {
    s.serialize_u64(d.as_millis() as u64)
}

pub fn write_json<T: Serialize>(out: &mut dyn Write, report: &T) -> anyhow::Result<()> {
    serde_json::to_writer_pretty(&mut *out, report).context("failed to encode JSON report")?;
    writeln!(out)?;
    Ok(())
}

fn display<'a>(path: &'a IndexPath, root: &IndexPath) -> &'a str {
    match path.relative_to(root) {
        Some("") => ".",
        Some(rel) => rel,
        None => path.as_str(),
    }
}

fn write_skipped(out: &mut dyn Write, root: &IndexPath, skipped: &[SkippedPath]) -> anyhow::Result<()> {
    writeln!(out, "{} paths skipped due to errors", format_count(skipped.len() as u64))?;
    for s in skipped {
        writeln!(out, "  {}: {}", display(&s.path, root), s.reason)?;
    }
    Ok(())
}

fn write_groups(
    out: &mut dyn Write,
    root: &IndexPath,
    groups: &[DuplicateGroup],
    limit: usize,
) -> anyhow::Result<()> {
    for g in groups.iter().take(limit) {
        writeln!(
            out,
            "  {} x {} ({} wasted)  {}",
            g.count(),
            format_size(g.size),
            format_size(g.wasted_bytes),
            g.hash.short(12)
        )?;
        for p in &g.paths {
            writeln!(out, "    {}", display(p, root))?;
        }
    }
    if groups.len() > limit {
        writeln!(out, "  ... {} more groups", groups.len() - limit)?;
    }
    Ok(())
}

fn write_duplicate_summary(out: &mut dyn Write, summary: &DuplicateSummary) -> anyhow::Result<()> {
    writeln!(
        out,
        "Duplicates: {} groups, {} redundant files, {} reclaimable",
        format_count(summary.groups as u64),
        format_count(summary.redundant_files as u64),
        format_size(summary.wasted_bytes)
    )?;
    Ok(())
}

fn write_snapshot_line(out: &mut dyn Write, snapshot: Option<&SaveReport>) -> anyhow::Result<()> {
    match snapshot {
        Some(s) => {
            writeln!(out, "Snapshot: {} in {}", s.id, s.location.display())?;
            if let Some(w) = &s.warning {
                writeln!(out, "Warning: {w}")?;
            }
        }
        None => writeln!(out, "Snapshot: not saved")?,
    }
    Ok(())
}

pub fn write_index_text(out: &mut dyn Write, r: &IndexReport) -> anyhow::Result<()> {
    writeln!(out, "Indexed {}", r.root)?;
    writeln!(
        out,
        "  {} files, {} directories, {} in {}",
        format_count(r.files),
        format_count(r.dirs),
        format_size(r.bytes),
        format_duration(r.duration)
    )?;
    if let Some(hash) = &r.root_hash {
        writeln!(out, "  root hash {hash}")?;
    }
    write_snapshot_line(out, r.snapshot.as_ref())?;
    if r.pruned > 0 {
        writeln!(out, "Pruned {} old snapshots", r.pruned)?;
    }
    write_duplicate_summary(out, &r.duplicates)?;
    write_groups(out, &r.root, &r.duplicate_groups, TEXT_GROUP_LIMIT)?;
    write_skipped(out, &r.root, &r.skipped)
}

pub fn write_diff_text(out: &mut dyn Write, r: &DiffReport) -> anyhow::Result<()> {
    match &r.previous {
        Some(id) => writeln!(out, "Compared {} against snapshot {id}", r.root)?,
        None => writeln!(out, "No usable snapshot for {}; everything is new", r.root)?,
    }
    let c = &r.counts;
    writeln!(
        out,
        "  {} added, {} removed, {} modified, {} unchanged",
        format_count(c.added as u64),
        format_count(c.removed as u64),
        format_count(c.modified as u64),
        format_count(c.unchanged as u64)
    )?;
    writeln!(
        out,
        "  {} files re-read, {} reused from snapshot in {}",
        format_count(r.hashed),
        format_count(r.reused),
        format_duration(r.duration)
    )?;
    for change in r.changes.iter().take(TEXT_CHANGE_LIMIT) {
        let mark = match change.change {
            ChangeKind::Added => '+',
            ChangeKind::Removed => '-',
            ChangeKind::Modified => '~',
            ChangeKind::Unchanged => ' ',
        };
        writeln!(out, "  {mark} {}", display(&change.path, &r.root))?;
    }
    if r.changes.len() > TEXT_CHANGE_LIMIT {
        writeln!(out, "  ... {} more changes", r.changes.len() - TEXT_CHANGE_LIMIT)?;
    }
    write_snapshot_line(out, r.snapshot.as_ref())?;
    write_duplicate_summary(out, &r.duplicates)?;
    write_groups(out, &r.root, &r.duplicate_groups, TEXT_GROUP_LIMIT)?;
    write_skipped(out, &r.root, &r.skipped)
}

pub fn write_dupes_text(out: &mut dyn Write, r: &DupesReport) -> anyhow::Result<()> {
    match &r.source {
        Some(id) => writeln!(out, "Duplicates in {} (snapshot {id})", r.root)?,
        None => writeln!(out, "Duplicates in {} (fresh walk)", r.root)?,
    }
    write_duplicate_summary(out, &r.summary)?;
    write_groups(out, &r.root, &r.groups, usize::MAX)
}

/// One row per group member.
pub fn write_dupes_csv(out: &mut dyn Write, r: &DupesReport) -> anyhow::Result<()> {
    let mut writer = csv::Writer::from_writer(out);
    writer.write_record(["group", "hash", "size", "wasted_bytes", "path"])?;
    for (i, g) in r.groups.iter().enumerate() {
        let group = (i + 1).to_string();
        let size = g.size.to_string();
        let wasted = g.wasted_bytes.to_string();
        for p in &g.paths {
            writer.write_record([group.as_str(), g.hash.as_str(), size.as_str(), wasted.as_str(), p.as_str()])?;
        }
    }
    writer.flush().context("failed to write CSV")?;
    Ok(())
}

pub fn write_snapshots_text(out: &mut dyn Write, r: &SnapshotsReport) -> anyhow::Result<()> {
    if r.snapshots.is_empty() {
        writeln!(out, "No snapshots for {}", r.root)?;
        return Ok(());
    }
    writeln!(out, "Snapshots for {}", r.root)?;
    for s in &r.snapshots {
        let mut extras = Vec::new();
        if s.has_listing {
            extras.push("listing");
        }
        if s.has_forbidden {
            extras.push("forbidden");
        }
        let extras = if extras.is_empty() {
            String::new()
        } else {
            format!(" [+{}]", extras.join(", "))
        };
        writeln!(out, "  {}  {}{extras}", s.id, s.location.display())?;
    }
    Ok(())
}
