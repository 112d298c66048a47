//! Hub commands - registry, federation, feedback tables.

use anyhow::{Context, Result};
use console::style;
use devac_core::{Config, FeedbackEntry, FeedbackKind, Hub};
use std::path::Path;

use super::with_hint;

fn open_hub() -> Result<Hub> {
    let config = Config::load(Path::new(".devac")).map_err(with_hint)?;
    Hub::open(config.hub.resolve_db_path()).map_err(with_hint)
}

pub fn register(path: &Path) -> Result<()> {
    let hub = open_hub()?;
    let report = hub.register_repository(path, None).map_err(with_hint)?;

    println!(
        "{} registered {} with {} package(s)",
        style("ok").green(),
        report.repo_id,
        report.packages.len()
    );
    for package in &report.packages {
        println!("  {:<40} seeds: {}", package.package_path, package.seed_state);
    }
    for failure in &report.failures {
        eprintln!(
            "{} {}: {}",
            style("warning:").yellow(),
            failure.package_path,
            failure.error
        );
    }
    Ok(())
}

pub fn status() -> Result<()> {
    let hub = open_hub()?;
    let repos = hub.status().map_err(with_hint)?;

    if repos.is_empty() {
        println!("no repositories registered");
        return Ok(());
    }

    for repo in repos {
        println!(
            "{} ({}) registered {}",
            style(&repo.repo_id).bold(),
            repo.local_path,
            repo.registered_at
        );
        for package in &repo.packages {
            let stale = if package.stale {
                style(" [stale]").yellow().to_string()
            } else {
                String::new()
            };
            println!(
                "  {:<40} seeds: {}{}",
                package.package_path, package.seed_state, stale
            );
        }
    }
    Ok(())
}

pub fn query(sql: &str) -> Result<()> {
    let hub = open_hub()?;
    let result = hub.query_all(sql).map_err(with_hint)?;

    println!("{}", serde_json::to_string_pretty(&result.rows)?);
    eprintln!(
        "{} row(s) from {} package(s)",
        result.rows.len(),
        result.packages_queried
    );
    for failure in &result.failures {
        eprintln!(
            "{} {}: {}",
            style("warning:").yellow(),
            failure.package_path,
            failure.error
        );
    }
    Ok(())
}

pub fn feedback_clear(repo: &str, table: &str, source: &str) -> Result<()> {
    let hub = open_hub()?;
    let kind = FeedbackKind::parse(table).map_err(with_hint)?;
    let removed = hub.clear_feedback(repo, kind, source).map_err(with_hint)?;
    println!("cleared {} row(s) for {}/{}", removed, repo, source);
    Ok(())
}

pub fn feedback_push(repo: &str, table: &str, source: &str, entries: &Path) -> Result<()> {
    let hub = open_hub()?;
    let kind = FeedbackKind::parse(table).map_err(with_hint)?;

    let content = std::fs::read_to_string(entries)
        .with_context(|| format!("failed to read entries from {}", entries.display()))?;
    let entries: Vec<FeedbackEntry> =
        serde_json::from_str(&content).context("entries are not a JSON array of {id, payload}")?;

    let written = hub
        .push_feedback(repo, kind, source, &entries)
        .map_err(with_hint)?;
    println!("pushed {} row(s) for {}/{}", written, repo, source);
    Ok(())
}

pub fn feedback_list(repo: &str, table: &str) -> Result<()> {
    let hub = open_hub()?;
    let kind = FeedbackKind::parse(table).map_err(with_hint)?;
    let rows = hub.feedback(repo, kind).map_err(with_hint)?;
    println!("{}", serde_json::to_string_pretty(&rows)?);
    Ok(())
}
