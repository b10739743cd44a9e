//! # Notify CLI — Replay host notifications.
//!
//! Reads a JSON array of notifications and hands them to the exporter in
//! order:
//!
//! ```json
//! [
//!   { "kind": "EntityAdded", "channel_id": 52906, "entity_id": 10 },
//!   { "kind": "CvlValueUpdated", "cvl_id": "Colors", "key": "Red" }
//! ]
//! ```

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Args;
use pimx_export::DirectoryStore;
use pimx_sync::{Dispatch, ExportEngine, Notification};

use crate::{load_catalog, resolve_settings, EXIT_FAILURE, EXIT_PARTIAL, EXIT_SUCCESS};

/// Notify subcommand arguments.
#[derive(Args, Debug)]
pub struct NotifyArgs {
    /// Catalog snapshot (JSON).
    #[arg(long)]
    pub catalog: PathBuf,

    /// Directory documents are written under.
    #[arg(long)]
    pub out: PathBuf,

    /// JSON array of notifications.
    pub events: PathBuf,
}

/// Per-dispatch tallies of one replay.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct ReplayTally {
    pub handled: usize,
    pub failed: usize,
    pub ignored: usize,
    pub disabled: usize,
}

impl ReplayTally {
    fn record(&mut self, dispatch: Dispatch) {
        match dispatch {
            Dispatch::Handled => self.handled += 1,
            Dispatch::Failed => self.failed += 1,
            Dispatch::Ignored => self.ignored += 1,
            Dispatch::Disabled => self.disabled += 1,
        }
    }
}

/// Parse a notification file.
pub fn read_notifications(path: &Path) -> Result<Vec<Notification>> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read notifications: {}", path.display()))?;
    serde_json::from_str(&content)
        .with_context(|| format!("failed to parse notifications: {}", path.display()))
}

/// Execute the notify subcommand.
pub fn run_notify(args: &NotifyArgs, settings_path: Option<&Path>) -> Result<u8> {
    let notifications = read_notifications(&args.events)?;
    let catalog = Arc::new(load_catalog(&args.catalog)?);
    let settings = resolve_settings(settings_path, catalog.as_ref())?;
    let store = Arc::new(DirectoryStore::new(&args.out));
    let engine = ExportEngine::initialize(&settings, catalog, store);

    let mut tally = ReplayTally::default();
    for notification in &notifications {
        tally.record(engine.handle(notification));
    }

    println!("  notifications:  {}", notifications.len());
    println!("  handled:        {}", tally.handled);
    println!("  ignored:        {}", tally.ignored);
    println!("  failed:         {}", tally.failed);

    if tally.disabled > 0 {
        eprintln!(
            "exporter not initialized: {}",
            engine.disabled_reason().unwrap_or("unknown reason")
        );
        return Ok(EXIT_FAILURE);
    }
    Ok(if tally.failed == 0 { EXIT_SUCCESS } else { EXIT_PARTIAL })
}
