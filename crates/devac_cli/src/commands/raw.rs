//! Query command - raw read-only SQL over the merged view.

use anyhow::Result;
use devac_core::MergedView;
use std::path::Path;

use super::{open_store, with_hint};

pub fn run(package: &Path, sql: &str) -> Result<()> {
    let (store, _config) = open_store(package)?;

    let merged = store.read_merged().map_err(with_hint)?;
    let view = MergedView::build(&merged).map_err(with_hint)?;
    let rows = view.query(sql).map_err(with_hint)?;

    println!("{}", serde_json::to_string_pretty(&rows)?);
    Ok(())
}
