//! Status command - seed state for one package.

use anyhow::Result;
use console::style;
use devac_core::{DevacError, Partition};
use std::path::Path;

use super::{open_store, with_hint};

pub fn run(package: &Path) -> Result<()> {
    let (store, _config) = open_store(package)?;

    println!("package: {}", package.display());
    println!("seed state: {}", style(store.seed_state()).bold());

    match store.read_merged() {
        Ok(merged) => {
            let (nodes, edges, refs) = merged.counts();
            println!("merged view: {} nodes, {} edges, {} external refs", nodes, edges, refs);
        }
        Err(DevacError::NoSeeds { .. }) => {
            println!("merged view: (not analyzed yet)");
        }
        Err(e) => return Err(with_hint(e)),
    }

    for partition in [Partition::Base, Partition::Branch] {
        if let Some(holder) = store.lock_holder(partition) {
            println!(
                "{} {} partition locked by pid {} on {} since {}",
                style("warning:").yellow(),
                partition,
                holder.pid,
                holder.hostname,
                holder.timestamp
            );
        }
    }

    Ok(())
}
