//! Calls command - CALLS-edge walk from an entity.

use anyhow::Result;
use devac_core::{call_graph, CallDirection};
use std::path::Path;

use super::{open_store, with_hint};

pub fn run(package: &Path, entity_id: &str, direction: &str, cap: Option<usize>) -> Result<()> {
    let (store, config) = open_store(package)?;

    let direction = CallDirection::parse(direction).map_err(with_hint)?;
    let cap = cap.unwrap_or(config.query.call_graph_cap);

    let graph = call_graph(&store, entity_id, direction, cap).map_err(with_hint)?;

    println!("call graph for {}", graph.root);
    for entry in &graph.entries {
        let arrow = match entry.direction {
            CallDirection::Callers => "<-",
            CallDirection::Callees => "->",
            CallDirection::Both => "--",
        };
        println!(
            "  {} [{}] {} ({}:{})",
            arrow, entry.depth, entry.name, entry.file_path, entry.start_line
        );
    }
    if graph.truncated {
        println!("  ... truncated at {} result(s)", graph.entries.len());
    }

    Ok(())
}
