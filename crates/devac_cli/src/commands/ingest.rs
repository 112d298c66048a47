//! Ingest command - apply parser records to a package's seed store.

use anyhow::{Context, Result};
use console::style;
use devac_core::ParsedFile;
use std::path::Path;

use super::{open_store, with_hint};

/// Applies parser output to the package: a full base analysis by default,
/// or a branch delta when `branch` is given.
pub fn run(package: &Path, records: &Path, branch: Option<&str>, force: bool) -> Result<()> {
    let (store, _config) = open_store(package)?;

    let content = std::fs::read_to_string(records)
        .with_context(|| format!("failed to read records from {}", records.display()))?;
    let files = parse_records(&content)?;

    let report = match branch {
        Some(branch) => store
            .incremental_update(&files, branch, force)
            .map_err(with_hint)?,
        None => store.full_analysis(&files).map_err(with_hint)?,
    };

    if report.wrote_partition {
        println!(
            "{} {} file(s): {} nodes, {} edges, {} refs",
            style("updated").green(),
            report.files_changed,
            report.changed_nodes,
            report.changed_edges,
            report.changed_refs
        );
        if report.tombstones > 0 {
            println!("  {} entities tombstoned on this branch", report.tombstones);
        }
        if report.files_removed > 0 {
            println!("  {} file(s) dropped from the base snapshot", report.files_removed);
        }
    } else {
        println!(
            "{} all {} file(s) unchanged, partition left untouched",
            style("no-op").dim(),
            report.files_received
        );
    }

    for warning in &report.warnings {
        eprintln!("{} {}", style("warning:").yellow(), warning);
    }

    Ok(())
}

/// Accepts either one ParsedFile object or an array of them.
fn parse_records(content: &str) -> Result<Vec<ParsedFile>> {
    if let Ok(files) = serde_json::from_str::<Vec<ParsedFile>>(content) {
        return Ok(files);
    }
    let single: ParsedFile =
        serde_json::from_str(content).context("records are not valid ParsedFile JSON")?;
    Ok(vec![single])
}
