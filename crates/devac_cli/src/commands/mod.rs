//! CLI commands.

use devac_core::{Config, DevacError, SeedStore};
use std::path::Path;

pub mod affected;
pub mod calls;
pub mod hub;
pub mod ingest;
pub mod raw;
pub mod status;
pub mod symbols;
pub mod unlock;

/// Converts a core error into an anyhow error, appending the recovery
/// suggestion when one exists.
pub fn with_hint(err: DevacError) -> anyhow::Error {
    match err.recovery_suggestion() {
        Some(hint) => anyhow::anyhow!("{}\nhint: {}", err, hint),
        None => anyhow::anyhow!(err),
    }
}

/// Loads the package-level config (`<package>/.devac/config.toml`).
pub fn load_config(package: &Path) -> anyhow::Result<Config> {
    Config::load(&package.join(".devac")).map_err(with_hint)
}

/// Opens a seed store with the package's configured lock timing.
pub fn open_store(package: &Path) -> anyhow::Result<(SeedStore, Config)> {
    let config = load_config(package)?;
    let store = SeedStore::open(package).with_lock_config(config.lock.clone());
    Ok((store, config))
}
