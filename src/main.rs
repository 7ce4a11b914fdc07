use anyhow::{Context, Result};
use clap::Parser;
use tracing_subscriber::{EnvFilter, fmt};

use drive2schema::cli::{Cli, Commands};
use drive2schema::config::{TransformOptions, resolve_schema_dir};
use drive2schema::schema::{self, SchemaRegistry};
use drive2schema::transform::batch::run_batch;
use drive2schema::video::Ffmpeg;
use drive2schema::{pairing, validate};

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    fmt().with_env_filter(filter).init();
}

fn main() -> Result<()> {
    init_tracing();
    let cli = Cli::parse();
    match cli.command {
        Commands::Transform {
            hardware,
            vehicle,
            source,
            dest,
            schema_dir,
            chunk_size,
            location,
            push_to,
            no_progress,
            json,
        } => {
            let options = TransformOptions {
                hardware,
                vehicle_id: vehicle,
                source_dir: source,
                dest_dir: dest,
                schema_dir: resolve_schema_dir(schema_dir),
                chunk_size_sec: chunk_size,
                location,
                show_progress: !no_progress,
                json_dump: json,
                push_to,
            };
            let report = run_batch(&options, &Ffmpeg::from_env()).context("transform aborted")?;
            if !report.summary.is_empty() {
                report.summary.print();
            }
            if !report.failed.is_empty() {
                tracing::warn!(failed = report.failed.len(), "some drives were abandoned");
            }
            Ok(())
        }
        Commands::Inspect { source, hardware } => pairing::inspect_sources(&source, hardware),
        Commands::Schema { schema_dir } => {
            let dir = resolve_schema_dir(schema_dir);
            let registry =
                SchemaRegistry::load(&dir).with_context(|| format!("loading schemas from {}", dir.display()))?;
            schema::print_schema(&registry)
        }
        Commands::Validate { root, schema_dir } => {
            validate::validate_output(&root, &resolve_schema_dir(schema_dir))
        }
    }
}
