//! Validate command - Check an output tree's layout and every table in it

use anyhow::{Context, bail};
use std::path::{Path, PathBuf};

use crate::error::{Result, TransformError};
use crate::layout::{self, DRIVES_DIR, SEQUENCES_DIR};
use crate::records::RecordKind;
use crate::schema::SchemaRegistry;
use crate::tables::read_table;

/// What a tree walk found.
#[derive(Debug, Default)]
pub struct TreeReport {
    pub diaries: usize,
    pub drives: usize,
    pub sequences: usize,
    pub tables: usize,
    pub problems: Vec<String>,
}

impl TreeReport {
    pub fn is_ok(&self) -> bool {
        self.problems.is_empty()
    }

    fn problem(&mut self, path: &Path, what: impl std::fmt::Display) {
        self.problems.push(format!("{}: {what}", path.display()));
    }
}

/// Sorted `(name, path)` of the sub-directories of `dir`. Plain files are
/// reported as problems.
fn subdirs(dir: &Path, report: &mut TreeReport) -> Result<Vec<(String, PathBuf)>> {
    let mut out = Vec::new();
    for entry in std::fs::read_dir(dir).map_err(|e| TransformError::io(dir, e))? {
        let entry = entry.map_err(|e| TransformError::io(dir, e))?;
        let name = entry.file_name().to_string_lossy().to_string();
        let path = entry.path();
        if path.is_dir() {
            out.push((name, path));
        } else {
            report.problem(&path, "unexpected file");
        }
    }
    out.sort();
    Ok(out)
}

fn check_table(registry: &SchemaRegistry, dir: &Path, kind: RecordKind, report: &mut TreeReport) {
    let path = dir.join(kind.file_name());
    if !path.is_file() {
        report.problem(&path, "missing table");
        return;
    }
    report.tables += 1;
    match read_table(&path) {
        Ok(rows) => {
            if let Err(e) = registry.validate(kind, &rows) {
                report.problem(&path, e);
            }
        }
        Err(e) => report.problem(&path, e),
    }
}

/// Walks `root` and checks directory names, table files and video segments.
pub fn validate_tree(root: &Path, registry: &SchemaRegistry) -> Result<TreeReport> {
    let mut report = TreeReport::default();
    for (name, diary_dir) in subdirs(root, &mut report)? {
        if layout::parse_diary_dir(&name).is_none() {
            report.problem(&diary_dir, "not a <date>_<token> diary directory");
            continue;
        }
        report.diaries += 1;
        for (name, vehicle_dir) in subdirs(&diary_dir, &mut report)? {
            if layout::parse_vehicle_dir(&name).is_none() {
                report.problem(&vehicle_dir, "not a vehicle_<id> directory");
                continue;
            }
            check_table(registry, &vehicle_dir, RecordKind::Diary, &mut report);
            validate_drives(registry, &vehicle_dir, &mut report)?;
        }
    }
    Ok(report)
}

fn validate_drives(
    registry: &SchemaRegistry,
    vehicle_dir: &Path,
    report: &mut TreeReport,
) -> Result<()> {
    let drives_dir = vehicle_dir.join(DRIVES_DIR);
    if !drives_dir.is_dir() {
        return Ok(());
    }
    for (name, drive_dir) in subdirs(&drives_dir, report)? {
        if !layout::is_token(&name) {
            report.problem(&drive_dir, "drive directory is not a token");
            continue;
        }
        report.drives += 1;
        check_table(registry, &drive_dir, RecordKind::Drive, report);

        let sequences_dir = drive_dir.join(SEQUENCES_DIR);
        if !sequences_dir.is_dir() {
            report.problem(&sequences_dir, "missing sequences directory");
            continue;
        }
        for (name, seq_dir) in subdirs(&sequences_dir, report)? {
            if layout::parse_sequence_dir(&name).is_none() {
                report.problem(&seq_dir, "not a <NNNNNN>_<token> sequence directory");
                continue;
            }
            report.sequences += 1;
            for kind in [RecordKind::Sequence, RecordKind::Element, RecordKind::Data, RecordKind::Sensor] {
                check_table(registry, &seq_dir, kind, report);
            }
            let segment = layout::FileSystemLayout::segment_path(&seq_dir);
            if !segment.is_file() {
                report.problem(&segment, "missing video segment");
            }
        }
    }
    Ok(())
}

/// Validate an output tree and print the outcome
pub fn validate_output(root: &Path, schema_dir: &Path) -> anyhow::Result<()> {
    if !root.is_dir() {
        bail!("{} is not a directory", root.display());
    }
    let registry = SchemaRegistry::load(schema_dir)
        .with_context(|| format!("loading schemas from {}", schema_dir.display()))?;
    let report = validate_tree(root, &registry)?;

    let verdict = if report.is_ok() { "PASSED" } else { "FAILED" };
    println!("Validation of {}: {verdict}", root.display());
    println!(
        "{} diaries, {} drives, {} sequences, {} tables",
        report.diaries, report.drives, report.sequences, report.tables
    );
    for p in &report.problems {
        println!("[ERROR] {p}");
    }
    if !report.is_ok() {
        bail!("{} problem(s) found", report.problems.len());
    }
    Ok(())
}
