//! Affected command - change-impact analysis for a set of changed files.

use anyhow::Result;
use console::style;
use devac_core::analyze_affected;
use std::path::Path;

use super::{open_store, with_hint};

/// Runs affected-file analysis and prints the result.
///
/// A non-positive depth reports only the changed symbols, matching the
/// analyzer's `max_depth == 0` contract.
pub fn run(package: &Path, files: &str, depth: i64, format: &str) -> Result<()> {
    let (store, _config) = open_store(package)?;

    let changed: Vec<String> = files
        .split(',')
        .map(|f| f.trim().to_string())
        .filter(|f| !f.is_empty())
        .collect();
    let max_depth = depth.max(0) as u32;

    let report = analyze_affected(&store, &changed, max_depth).map_err(with_hint)?;

    match format {
        "json" => println!("{}", serde_json::to_string_pretty(&report)?),
        "text" => {
            println!(
                "{} changed symbol(s) across {} file(s)",
                report.changed_symbols.len(),
                changed.len()
            );
            for symbol in &report.changed_symbols {
                println!("  {} {} ({})", symbol.kind, symbol.name, symbol.file_path);
            }

            if report.affected_files.is_empty() {
                println!("no affected files within depth {}", max_depth);
            } else {
                println!("{} affected file(s):", report.affected_files.len());
                for file in &report.affected_files {
                    let label = match file.classification {
                        devac_core::ImpactClass::Direct => style(file.classification.as_str()).red(),
                        devac_core::ImpactClass::Transitive => {
                            style(file.classification.as_str()).yellow()
                        }
                    };
                    println!("  {} (depth {}, {})", file.file_path, file.depth, label);
                }
            }
        }
        _ => anyhow::bail!("unsupported format: {}. Use 'text' or 'json'.", format),
    }

    Ok(())
}
