//! # pimx-cli — Command-Line Exporter
//!
//! Runs the exporter against a catalog snapshot stored as JSON, writing
//! documents under a local directory.
//!
//! ## Subcommands
//!
//! - `pimx publish`: full channel export.
//! - `pimx notify`: replay a JSON array of notifications.
//! - `pimx schema`: print the JSON Schema of one or every entity type.
//! - `pimx mapping`: print the default export mapping for a catalog.
//!
//! ```bash
//! pimx --settings connector.yaml publish --catalog catalog.json --out ./export
//! pimx notify --catalog catalog.json --out ./export events.json
//! pimx schema --catalog catalog.json --entity-type Item
//! ```
//!
//! ## Exit codes
//!
//! | Code | Meaning |
//! |---|---|
//! | 0 | success |
//! | 1 | failure |
//! | 2 | completed with failed units |

pub mod mapping;
pub mod notify;
pub mod publish;
pub mod schema;

use std::path::Path;

use anyhow::{Context, Result};
use pimx_core::config::keys;
use pimx_core::{CatalogReader, ExportMapping, InMemoryCatalog, SettingsMap};

pub const EXIT_SUCCESS: u8 = 0;
pub const EXIT_FAILURE: u8 = 1;
pub const EXIT_PARTIAL: u8 = 2;

/// Load a catalog snapshot.
pub fn load_catalog(path: &Path) -> Result<InMemoryCatalog> {
    InMemoryCatalog::from_path(path)
        .with_context(|| format!("failed to load catalog: {}", path.display()))
}

/// Resolve settings: built-in defaults, then the settings file, then
/// `PIMX_` environment variables.
///
/// Without a configured `MAPPING` the default mapping of `reader` is used.
pub fn resolve_settings(settings_path: Option<&Path>, reader: &dyn CatalogReader) -> Result<SettingsMap> {
    let mut settings = SettingsMap::defaults();
    if let Some(path) = settings_path {
        let file = SettingsMap::from_path(path)
            .with_context(|| format!("failed to read settings: {}", path.display()))?;
        settings = settings.merge(file);
    }
    settings = settings.merge(SettingsMap::from_env());

    if settings.get(keys::MAPPING).map_or(true, |m| m.trim().is_empty()) {
        let mapping = ExportMapping::generate_default(reader).context("failed to derive default mapping")?;
        let yaml = mapping.to_yaml().context("failed to render default mapping")?;
        tracing::info!(
            exported_types = mapping.entity_types_to_export.len(),
            "no mapping configured, using the default mapping"
        );
        settings.set(keys::MAPPING, &yaml);
    }
    Ok(settings)
}
