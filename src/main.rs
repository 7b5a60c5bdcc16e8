//! company-kb - knowledge base for company-analysis runs
//!
//! A CLI tool that condenses finished company-analysis directories into
//! structured summaries, archives their raw inputs, and keeps a global
//! index that can be listed, searched, and compared.
//!
//! Exit codes:
//!   0 - Success (including a summarize whose archive step failed)
//!   1 - Runtime error (malformed run, index failure, unknown company, etc.)
//!   2 - Command-line usage error

mod archive;
mod cli;
mod company;
mod config;
mod error;
mod fsutil;
mod index;
mod models;
mod query;
mod report;
mod run_dir;
mod scanner;
mod summarizer;

use anyhow::{bail, Context, Result};
use cli::{Args, Command};
use config::{Config, CONFIG_FILE_NAME};
use index::IndexStore;
use models::format_mb;
use query::QueryEngine;
use std::path::{Path, PathBuf};
use std::time::Instant;
use tracing::{debug, error, info};
use tracing_subscriber::FmtSubscriber;

fn main() -> Result<()> {
    // Parse command-line arguments
    let args = Args::parse_args();

    // Validate arguments
    if let Err(e) = args.validate() {
        eprintln!("Error: {}", e);
        std::process::exit(1);
    }

    // Handle --init-config early (no logging needed)
    if args.init_config {
        return handle_init_config();
    }

    // Load configuration first so `general.verbose` can raise the log level
    let (mut config, config_source) = match load_config(&args) {
        Ok(loaded) => loaded,
        Err(e) => {
            eprintln!("\n❌ Error: {:#}", e);
            std::process::exit(1);
        }
    };
    config.merge_with_args(&args);

    // Initialize logging
    init_logging(&args, &config);

    info!("company-kb v{}", env!("CARGO_PKG_VERSION"));
    match config_source {
        Some(path) => info!("Loaded config from {}", path.display()),
        None => debug!("No config file found, using defaults"),
    }
    debug!("Arguments: {:?}", args);

    match run(args, config) {
        Ok(exit_code) => {
            std::process::exit(exit_code);
        }
        Err(e) => {
            error!("Command failed: {:#}", e);
            eprintln!("\n❌ Error: {:#}", e);
            std::process::exit(1);
        }
    }
}

/// Handle --init-config: generate a default .company-kb.toml.
fn handle_init_config() -> Result<()> {
    let path = Path::new(CONFIG_FILE_NAME);

    if path.exists() {
        eprintln!(
            "⚠️  {} already exists. Remove it first or edit it manually.",
            CONFIG_FILE_NAME
        );
        std::process::exit(1);
    }

    let content = Config::default_toml();
    std::fs::write(path, &content)
        .with_context(|| format!("Failed to write {}", CONFIG_FILE_NAME))?;

    println!("✅ Created {} with default settings.", CONFIG_FILE_NAME);
    println!("   Edit it to customize the index path, report files, metrics, and archiving.");
    Ok(())
}

/// Initialize logging based on verbosity settings.
fn init_logging(args: &Args, config: &Config) {
    let level = args.log_level(config.general.verbose);

    let subscriber = FmtSubscriber::builder()
        .with_max_level(level)
        .with_target(false)
        .with_thread_ids(false)
        .with_file(false)
        .with_line_number(false)
        .compact()
        .finish();

    if let Err(e) = tracing::subscriber::set_global_default(subscriber) {
        eprintln!("Failed to set tracing subscriber: {}", e);
    }
}

/// Dispatch the parsed command. Returns the exit code.
fn run(args: Args, config: Config) -> Result<i32> {
    let command = args.command.clone().context("No command given")?;
    let engine = || {
        QueryEngine::new(
            IndexStore::open(&config.general.index_path),
            config.query.clone(),
        )
    };

    match command {
        Command::Summarize { analysis_dir, .. } => {
            run_summarize(&analysis_dir, &config, args.quiet)
        }
        Command::List => {
            let entries = engine().list()?;
            if entries.is_empty() {
                println!("📭 No companies indexed yet.");
            } else {
                println!("📚 {} companies in index:\n", entries.len());
                for entry in &entries {
                    println!("   {}", report::format_entry(entry));
                }
            }
            Ok(0)
        }
        Command::Load { company_code } => {
            let loaded = engine()
                .load(&company_code)
                .with_context(|| format!("Failed to load {}", company_code))?;
            print!(
                "{}",
                report::render_company(&loaded, config.query.display_theses)
            );
            Ok(0)
        }
        Command::Compare { company_codes } => {
            let comparison = engine().compare(&company_codes)?;
            if comparison.companies.is_empty() {
                bail!(
                    "None of the requested companies could be loaded: {}",
                    company_codes.join(", ")
                );
            }
            print!(
                "{}",
                report::render_comparison(&comparison, config.query.display_theses)
            );
            Ok(0)
        }
        Command::Summary { company_code } => {
            let path = engine()
                .summary(&company_code)
                .with_context(|| format!("Failed to write learning summary for {}", company_code))?;
            println!("✅ Learning summary saved to: {}", path.display());
            Ok(0)
        }
        Command::Search { keyword } => {
            let matches = engine().search(&keyword)?;
            if matches.is_empty() {
                println!("🔍 No companies match '{}'.", keyword);
            } else {
                println!("🔍 {} match(es) for '{}':\n", matches.len(), keyword);
                for entry in &matches {
                    println!("   {}", report::format_entry(entry));
                }
            }
            Ok(0)
        }
        Command::Restore { company_code } => {
            let loaded = engine()
                .load(&company_code)
                .with_context(|| format!("Failed to load {}", company_code))?;
            let archive_path = loaded
                .archive
                .as_ref()
                .with_context(|| format!("No raw data archive found for {}", company_code))?;

            println!("📦 Restoring: {}", archive_path.display());
            let files = archive::extract(archive_path, &loaded.entry.analysis_dir)?;
            println!(
                "✅ Restored {} files into {}",
                files,
                loaded.entry.analysis_dir.display()
            );
            Ok(0)
        }
    }
}

/// Summarize a run, archive its raw data, and record it in the index.
fn run_summarize(analysis_dir: &Path, config: &Config, quiet: bool) -> Result<i32> {
    let start_time = Instant::now();

    println!("📂 Summarizing: {}", analysis_dir.display());
    let store = IndexStore::open(&config.general.index_path);
    let ingested = summarizer::summarize_and_index(config, analysis_dir, &store, !quiet)
        .with_context(|| format!("Failed to summarize {}", analysis_dir.display()))?;

    let output = &ingested.output;
    let record = &output.record;
    println!(
        "   Company: {} ({})",
        record.identity.company_name, record.identity.company_code
    );
    if let Some(span) = record.financial_summary.year_span() {
        println!("   Years covered: {}", span);
    }
    println!(
        "   Investment points: {}",
        record.narrative_summary.key_investment_points.len()
    );
    println!(
        "   Files: {} ({})",
        record.total_files(),
        format_mb(record.total_size())
    );
    println!("   📝 {}", output.json_path.display());
    println!("   📝 {}", output.markdown_path.display());

    if config.archive.enabled {
        println!("\n📦 Raw data archive:");
        match (&ingested.artifact, &ingested.archive_error) {
            (Some(artifact), _) => {
                println!("   Archive: {}", artifact.path.display());
                println!(
                    "   {} files: {} -> {} ({:.1}% smaller)",
                    artifact.file_count,
                    format_mb(artifact.original_size),
                    format_mb(artifact.compressed_size),
                    artifact.reduction_percent()
                );
                if artifact.source_removed {
                    println!("   🗑️  Removed original {}", config.archive.raw_dir);
                }
            }
            (None, Some(e)) => {
                eprintln!("   ⚠️  Archiving failed: {}", e);
                eprintln!("   Raw data was left in place.");
            }
            (None, None) => {
                println!("   No {} directory, nothing to archive.", config.archive.raw_dir);
            }
        }
    }

    println!("\n🗂️  Index updated: {}", store.location().display());

    let duration = start_time.elapsed().as_secs_f64();
    if ingested.archive_error.is_some() {
        println!(
            "\n⚠️  {} partially summarized (archive not created) in {:.1}s",
            record.identity.company_code, duration
        );
    } else {
        println!(
            "\n✅ {} summarized in {:.1}s",
            record.identity.company_code, duration
        );
    }

    Ok(0)
}

/// Load configuration from file or use defaults.
///
/// Runs before logging is set up, so problems are printed directly. Returns
/// the file the configuration came from, if any.
fn load_config(args: &Args) -> Result<(Config, Option<PathBuf>)> {
    // Try explicit config path
    if let Some(ref config_path) = args.config {
        let config = Config::load(config_path)?;
        return Ok((config, Some(config_path.clone())));
    }

    // Try default location
    match Config::load_default() {
        Ok(Some(config)) => Ok((config, Some(PathBuf::from(CONFIG_FILE_NAME)))),
        Ok(None) => Ok((Config::default(), None)),
        Err(e) => {
            eprintln!("⚠️  Failed to load config: {:#}. Using defaults.", e);
            Ok((Config::default(), None))
        }
    }
}
