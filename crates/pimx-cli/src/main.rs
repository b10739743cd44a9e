//! # pimx CLI entry point
//!
//! Parses command-line arguments and dispatches to subcommand handlers.

use std::path::PathBuf;
use std::process::ExitCode;

use clap::{Parser, Subcommand, ValueEnum};
use tracing_subscriber::EnvFilter;

use pimx_cli::mapping::{run_mapping, MappingArgs};
use pimx_cli::notify::{run_notify, NotifyArgs};
use pimx_cli::publish::{run_publish, PublishArgs};
use pimx_cli::schema::{run_schema, SchemaArgs};

/// PIMX exporter
///
/// Serializes catalog channel contents into JSON documents, either as a
/// full publish or by replaying change notifications.
#[derive(Parser, Debug)]
#[command(name = "pimx", version, about, long_about = None)]
struct Cli {
    /// Enable verbose output. Repeat for more verbosity (-v, -vv, -vvv).
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    /// Settings file (YAML). Values are overridden by `PIMX_*` variables.
    #[arg(long, global = true)]
    settings: Option<PathBuf>,

    /// Log line format.
    #[arg(long, value_enum, default_value_t = LogFormat::Text, global = true)]
    log_format: LogFormat,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Copy, Clone, Debug, PartialEq, Eq, ValueEnum)]
enum LogFormat {
    Text,
    Json,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Export every entity of a channel.
    Publish(PublishArgs),

    /// Replay a JSON array of change notifications.
    Notify(NotifyArgs),

    /// Print the generated JSON Schema of entity types.
    Schema(SchemaArgs),

    /// Print the default export mapping of a catalog.
    Mapping(MappingArgs),
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    let filter = match cli.verbose {
        0 => EnvFilter::new("warn"),
        1 => EnvFilter::new("info"),
        2 => EnvFilter::new("debug"),
        _ => EnvFilter::new("trace"),
    };

    let subscriber = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr);
    match cli.log_format {
        LogFormat::Text => subscriber.init(),
        LogFormat::Json => subscriber.json().init(),
    }

    tracing::debug!("pimx CLI starting");

    let settings = cli.settings.as_deref();
    let result = match cli.command {
        Commands::Publish(args) => run_publish(&args, settings),
        Commands::Notify(args) => run_notify(&args, settings),
        Commands::Schema(args) => run_schema(&args, settings),
        Commands::Mapping(args) => run_mapping(&args, settings),
    };

    match result {
        Ok(code) => ExitCode::from(code),
        Err(e) => {
            tracing::error!("{e:#}");
            ExitCode::from(1)
        }
    }
}
