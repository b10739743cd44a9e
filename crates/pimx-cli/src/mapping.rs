//! # Mapping CLI — Print the default export mapping.
//!
//! The output can be pasted under `MAPPING` in a settings file and edited.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::Args;
use pimx_core::ExportMapping;

use crate::{load_catalog, EXIT_SUCCESS};

/// Mapping subcommand arguments.
#[derive(Args, Debug)]
pub struct MappingArgs {
    /// Catalog snapshot (JSON).
    #[arg(long)]
    pub catalog: PathBuf,
}

/// Execute the mapping subcommand.
pub fn run_mapping(args: &MappingArgs, _settings_path: Option<&Path>) -> Result<u8> {
    let catalog = load_catalog(&args.catalog)?;
    let mapping = ExportMapping::generate_default(&catalog).context("failed to derive default mapping")?;
    print!("{}", mapping.to_yaml().context("failed to render mapping")?);
    Ok(EXIT_SUCCESS)
}
