//! Unlock command - remove stale partition locks.

use anyhow::Result;
use console::style;
use devac_core::Partition;
use std::path::Path;

use super::{open_store, with_hint};

pub fn run(package: &Path, partition: &str) -> Result<()> {
    let (store, _config) = open_store(package)?;

    let targets: Vec<Partition> = match partition {
        "base" => vec![Partition::Base],
        "branch" => vec![Partition::Branch],
        "all" => vec![Partition::Base, Partition::Branch],
        other => anyhow::bail!("unknown partition '{}'. Use base, branch, or all.", other),
    };

    for target in targets {
        match store.force_unlock(target) {
            Ok(true) => println!("{} removed stale lock on {}", style("ok").green(), target),
            Ok(false) => println!("{} no lock on {}", style("ok").dim(), target),
            // A live holder is not stale; leave it alone and say so.
            Err(e) => return Err(with_hint(e)),
        }
    }

    Ok(())
}
