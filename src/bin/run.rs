//! Minimal CLI harness around `gn_indexer`. Config loading, source
//! discovery, and process wiring are explicitly out of this crate's scope
//! (spec §1 Non-goals) -- this binary exists only to demonstrate the two
//! entry points (`populate`, `optimize`) against a database reachable from
//! environment variables.

use std::path::PathBuf;
use std::sync::mpsc;

use clap::{Parser, Subcommand};
use gn_indexer::config::{Config, DatabaseConfig, PopulateConfig, RuntimeConfig, SourceDescriptor, SourceLocation};
use gn_indexer::{CancellationToken, Operator, PopulateOrchestrator, ProgressReporter, RegexNameParser};
use tracing::info;

#[derive(Parser, Debug)]
#[command(name = "gn-indexer", about = "Populate and optimize a scientific-name verification database")]
struct Cli {
    #[command(subcommand)]
    command: Command,

    /// Directory holding SFGA archives named `{id}_{slug}_{date}_v{n}.sqlite[.zip]`.
    #[arg(long, global = true, default_value = "./sfga")]
    sfga_dir: PathBuf,

    /// Only populate these source ids; empty means every archive found in `sfga-dir`.
    #[arg(long, global = true)]
    source_id: Vec<i32>,

    /// Worker threads for the parallel phases (hierarchy build, reparse, word index).
    #[arg(long, global = true, default_value_t = num_cpus::get())]
    jobs: usize,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Fetch and ingest every configured source.
    Populate,
    /// Reparse names, rebuild the word index and verification view.
    Optimize,
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let _ = dotenvy::dotenv();
    tracing_subscriber::fmt::init();

    let cli = Cli::parse();

    let database = DatabaseConfig {
        host: std::env::var("PGHOST").unwrap_or_else(|_| "localhost".to_string()),
        port: std::env::var("PGPORT").ok().and_then(|v| v.parse().ok()).unwrap_or(5432),
        user: std::env::var("PGUSER").unwrap_or_else(|_| "postgres".to_string()),
        password: std::env::var("PGPASSWORD").unwrap_or_default(),
        database: std::env::var("PGDATABASE").unwrap_or_else(|_| "gnames".to_string()),
        ..DatabaseConfig::default()
    };

    let sources = discover_sources(&cli.sfga_dir);

    let populate = PopulateConfig {
        source_ids: cli.source_id,
        release_version: None,
        release_date: None,
        with_flat_classification: true,
    };

    let runtime = RuntimeConfig {
        jobs_number: cli.jobs.max(1),
        home_dir: std::env::temp_dir(),
    };

    let config = Config::validated(database, populate, runtime, sources)?;

    let operator = Operator::connect(&config.database)?;
    let parser = RegexNameParser::new();
    let cancel = CancellationToken::new();

    let (tx, rx) = mpsc::channel();
    let progress = ProgressReporter::new(tx);
    std::thread::spawn(move || {
        for event in rx {
            info!(phase = event.phase, source_id = event.source_id, count = event.count, "progress");
        }
    });

    match cli.command {
        Command::Populate => {
            let orchestrator = PopulateOrchestrator::new(&operator, &parser);
            let summary = orchestrator.run(&config, &cancel, &progress)?;
            info!(succeeded = summary.succeeded.len(), failed = summary.failed.len(), "populate finished");
        }
        Command::Optimize => {
            let optimizer = gn_indexer::Optimizer::new(&operator, &parser, config.database.batch_size, config.runtime.jobs_number);
            optimizer.run(&cancel, &progress)?;
            info!("optimize finished");
        }
    }

    Ok(())
}

/// Scans `dir` for conventionally named SFGA archives and builds one bare
/// [`SourceDescriptor`] per id found. Real deployments would instead load
/// per-source metadata (title, DOI, curation flags) from the YAML files
/// spec §6 describes; that loading is outside this crate's scope, so this
/// harness only has enough to drive a populate run end to end.
fn discover_sources(dir: &std::path::Path) -> Vec<SourceDescriptor> {
    let entries = match std::fs::read_dir(dir) {
        Ok(entries) => entries,
        Err(_) => return Vec::new(),
    };

    entries
        .filter_map(|entry| entry.ok())
        .filter_map(|entry| {
            let name = entry.file_name().to_string_lossy().to_string();
            let parsed = gn_indexer::fetch::parse_filename(&name)?;
            Some(SourceDescriptor {
                id: parsed.id,
                parent: SourceLocation::LocalDir(dir.to_path_buf()),
                title: None,
                title_short: None,
                description: None,
                home_url: None,
                doi: None,
                is_curated: false,
                is_auto_curated: false,
                has_taxon_data: true,
                has_classification: true,
            })
        })
        .collect()
}
