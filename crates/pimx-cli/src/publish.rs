//! # Publish CLI — Full channel export.
//!
//! ```bash
//! pimx publish --catalog catalog.json --out ./export
//! pimx publish --catalog catalog.json --out ./export --channel 52906 --report report.json
//! ```

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Args;
use pimx_core::ChannelId;
use pimx_export::DirectoryStore;
use pimx_sync::{ExportEngine, PublishReport};

use crate::{load_catalog, resolve_settings, EXIT_FAILURE, EXIT_PARTIAL, EXIT_SUCCESS};

/// Publish subcommand arguments.
#[derive(Args, Debug)]
pub struct PublishArgs {
    /// Catalog snapshot (JSON).
    #[arg(long)]
    pub catalog: PathBuf,

    /// Directory documents are written under.
    #[arg(long)]
    pub out: PathBuf,

    /// Channel to publish. Defaults to the configured channel.
    #[arg(long)]
    pub channel: Option<i64>,

    /// Also write the publish report as JSON to this file.
    #[arg(long)]
    pub report: Option<PathBuf>,
}

/// Execute the publish subcommand.
pub fn run_publish(args: &PublishArgs, settings_path: Option<&Path>) -> Result<u8> {
    let catalog = Arc::new(load_catalog(&args.catalog)?);
    let settings = resolve_settings(settings_path, catalog.as_ref())?;
    let store = Arc::new(DirectoryStore::new(&args.out));
    let engine = ExportEngine::initialize(&settings, catalog, store);

    let Some(configured) = engine.settings().map(|s| s.channel_id) else {
        anyhow::bail!(
            "exporter not initialized: {}",
            engine.disabled_reason().unwrap_or("unknown reason")
        );
    };
    let channel = args.channel.map(ChannelId).unwrap_or(configured);

    let Some(report) = engine.publish(channel) else {
        eprintln!("publish of channel {channel} did not run (see log)");
        return Ok(EXIT_FAILURE);
    };
    print_report(channel, &report);

    if let Some(path) = &args.report {
        let json = serde_json::to_vec_pretty(&report).context("failed to encode publish report")?;
        std::fs::write(path, json)
            .with_context(|| format!("failed to write report: {}", path.display()))?;
    }

    Ok(if report.is_clean() { EXIT_SUCCESS } else { EXIT_PARTIAL })
}

fn print_report(channel: ChannelId, report: &PublishReport) {
    println!("  channel:        {channel}");
    println!("  documents:      {}", report.documents_written);
    println!("  cvl documents:  {}", report.cvl_documents_written);
    println!("  resources:      {}", report.resource_files);
    if !report.skipped_groups.is_empty() {
        println!("  skipped:        {}", report.skipped_groups.join(", "));
    }
    for unit in &report.failed_units {
        let location = match (unit.part, unit.entity_id) {
            (Some(part), _) => format!(" part {part}"),
            (None, Some(id)) => format!(" entity {id}"),
            (None, None) => String::new(),
        };
        println!("  FAILED:         {}{location} ({}): {}", unit.entity_type_id, unit.kind, unit.message);
    }
}
