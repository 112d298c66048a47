//! Symbols command - filtered symbol lookup.

use anyhow::Result;
use devac_core::{find_symbols, Granularity, Page, SymbolFilter, SymbolMatches};
use std::path::Path;

use super::{open_store, with_hint};

#[allow(clippy::too_many_arguments)]
pub fn run(
    package: &Path,
    name: Option<String>,
    kind: Option<String>,
    file: Option<String>,
    exported: bool,
    granularity: &str,
    limit: Option<usize>,
    offset: usize,
) -> Result<()> {
    let (store, config) = open_store(package)?;

    let filter = SymbolFilter {
        name,
        kind,
        file_path: file,
        exported_only: exported,
    };
    let granularity = Granularity::parse(granularity).map_err(with_hint)?;
    let page = Page {
        limit: limit.unwrap_or(config.query.default_limit),
        offset,
    };

    let matches =
        find_symbols(&store, &filter, granularity, page, &config.query).map_err(with_hint)?;

    match &matches {
        SymbolMatches::Counts { total, by_kind } => {
            println!("{} symbol(s)", total);
            for (kind, count) in by_kind {
                println!("  {:<12} {}", kind, count);
            }
        }
        SymbolMatches::Summary { total, symbols } => {
            println!("{} match(es), showing {}", total, symbols.len());
            for s in symbols {
                let exported = if s.is_exported { "pub " } else { "" };
                println!(
                    "  {}{} {} ({}:{})",
                    exported, s.kind, s.qualified_name, s.file_path, s.start_line
                );
            }
        }
        SymbolMatches::Full { .. } => {
            println!("{}", serde_json::to_string_pretty(&matches)?);
        }
    }

    Ok(())
}
