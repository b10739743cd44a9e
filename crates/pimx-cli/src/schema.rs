//! # Schema CLI — Print generated JSON Schemas.
//!
//! Schemas admit the unique fields of the resolved mapping, so they match
//! what `publish` and `notify` validate against.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::Args;
use pimx_core::config::keys;
use pimx_core::{CatalogReader, ExportMapping, UniqueFieldMap};
use pimx_schema::SchemaDescriptor;
use serde_json::{Map, Value};

use crate::{load_catalog, resolve_settings, EXIT_SUCCESS};

/// Schema subcommand arguments.
#[derive(Args, Debug)]
pub struct SchemaArgs {
    /// Catalog snapshot (JSON).
    #[arg(long)]
    pub catalog: PathBuf,

    /// Print only this entity type. Without it, every type is printed as
    /// one object keyed by type id.
    #[arg(long)]
    pub entity_type: Option<String>,
}

/// JSON Schema of one entity type, or of every type keyed by id.
pub fn render_schemas(
    reader: &dyn CatalogReader,
    unique_fields: &UniqueFieldMap,
    entity_type: Option<&str>,
) -> Result<Value> {
    if let Some(id) = entity_type {
        let descriptor = SchemaDescriptor::build_with(reader, id, unique_fields)
            .with_context(|| format!("failed to build schema for {id}"))?;
        return Ok(descriptor.to_json_schema());
    }

    let mut all = Map::new();
    for entity_type in reader.entity_types().context("failed to list entity types")? {
        let descriptor = SchemaDescriptor::build_with(reader, &entity_type.id, unique_fields)
            .with_context(|| format!("failed to build schema for {}", entity_type.id))?;
        all.insert(entity_type.id, descriptor.to_json_schema());
    }
    Ok(Value::Object(all))
}

/// Execute the schema subcommand.
pub fn run_schema(args: &SchemaArgs, settings_path: Option<&Path>) -> Result<u8> {
    let catalog = load_catalog(&args.catalog)?;
    let settings = resolve_settings(settings_path, &catalog)?;
    let mapping = ExportMapping::from_yaml(settings.get(keys::MAPPING).unwrap_or_default())
        .context("failed to parse mapping")?;
    let schema = render_schemas(&catalog, &mapping.unique_field_map(), args.entity_type.as_deref())?;
    let text = serde_json::to_string_pretty(&schema).context("failed to encode schema")?;
    println!("{text}");
    Ok(EXIT_SUCCESS)
}
