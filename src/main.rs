mod cli;
mod logging;
mod reporter;

use std::io::{self, Write};
use std::process;
use std::sync::Arc;

use anyhow::{Context, Result};
use catalog_updater::config::{self, AppConfig};
use catalog_updater::scheduler::{Job, LocalClock};
use catalog_updater::storage::{ClassificationStore, Database};
use catalog_updater::{CancellationToken, JobReport, ScanEngine, Worker};
use clap::{CommandFactory, Parser};
use cli::{Cli, Commands};
use colored::*;
use dotenv::dotenv;
use reporter::CliReporter;
use tracing::{error, info, warn};

fn main() -> Result<()> {
    dotenv().ok();

    let _guard = logging::init_logger();

    let args = Cli::parse();

    let loaded = match &args.config {
        Some(path) => config::load_configuration_from(path),
        None => config::load_configuration(),
    };
    let config = match loaded {
        Ok(config) => config,
        Err(err) => {
            error!("Error loading configuration: {}", err);
            process::exit(1);
        }
    };

    let token = CancellationToken::new();
    let handler_token = token.clone();
    ctrlc::set_handler(move || {
        warn!("Interrupt received, stopping after the current file");
        handler_token.cancel();
    })
    .context("installing Ctrl-C handler")?;

    match args.command {
        Some(Commands::Run) => run_worker(config, &token)?,
        Some(Commands::Scan) => run_job(config, Job::NewFiles, &token)?,
        Some(Commands::SoftDelete) => run_job(config, Job::SoftDelete, &token)?,
        Some(Commands::HardDelete) => run_job(config, Job::HardDelete, &token)?,
        Some(Commands::SyncClassifications) => {
            let mut engine = ScanEngine::open(config)?;
            let summary = engine.sync_classifications(&token)?;
            info!(
                "{} target classifications, {} created, {} fragments added",
                format!("{}", summary.target_names).cyan(),
                format!("{}", summary.classifications_created).green(),
                format!("{}", summary.parts_added).green(),
            );
        }
        Some(Commands::ListClassifications) => list_classifications(&config)?,
        Some(Commands::PrintConfig) => {
            let rendered = toml::to_string_pretty(&config).context("rendering configuration")?;
            println!("{}", rendered);
        }
        Some(Commands::TruncateDb) => {
            match prompt_confirm(
                "Are you SURE you want to COMPLETELY DELETE the Database?",
                Some(false),
            ) {
                Ok(true) => {
                    let db = Database::open(&config.database_path)
                        .with_context(|| format!("opening {}", config.database_path))?;
                    db.truncate_all().context("truncating database")?;
                    println!("All tables truncated");
                }
                _ => {
                    process::exit(0);
                }
            }
        }
        None => {
            let _ = Cli::command().print_long_help();
        }
    }

    Ok(())
}

fn run_worker(config: AppConfig, token: &CancellationToken) -> Result<()> {
    let engine = ScanEngine::open(config)?;
    let mut worker = Worker::new(engine, Arc::new(LocalClock))?;
    let reporter = CliReporter::new();
    worker.run(&reporter, token)?;
    Ok(())
}

fn run_job(config: AppConfig, job: Job, token: &CancellationToken) -> Result<()> {
    let mut engine = ScanEngine::open(config)?;
    let reporter = CliReporter::new();
    let report = engine.run_job(job, &reporter, token)?;

    println!();
    match report {
        JobReport::Scan(report) => {
            info!(
                "{} files processed in {}, {} classified, {} images ({} unreadable)",
                format!("{}", report.counters.files_processed).green(),
                format!("{:.2}s", report.duration.as_secs_f64()).green(),
                format!("{}", report.counters.files_classified).cyan(),
                format!("{}", report.counters.images).cyan(),
                format!("{}", report.counters.image_failures).yellow(),
            );
            if report.counters.files_skipped > 0 {
                warn!(
                    "{} files skipped with non-UTF-8 paths",
                    format!("{}", report.counters.files_skipped).yellow()
                );
            }
            if !report.handle_conflicts.is_empty() {
                warn!(
                    "{} files skipped on handle conflicts",
                    format!("{}", report.handle_conflicts.len()).red()
                );
                for (path, handle) in &report.handle_conflicts {
                    warn!("  {} -> {}", path, handle);
                }
            }
            if let Some(mapping_error) = &report.mapping_error {
                warn!("Classification sync skipped: {}", mapping_error.yellow());
            }
        }
        JobReport::Maintenance(report) => {
            info!(
                "{}: {} of {} rows affected",
                job,
                format!("{}", report.affected).red(),
                format!("{}", report.examined).cyan(),
            );
        }
    }
    Ok(())
}

fn list_classifications(config: &AppConfig) -> Result<()> {
    let db = Database::open(&config.database_path)
        .with_context(|| format!("opening {}", config.database_path))?;
    let classifications = db.all_classifications()?;
    if classifications.is_empty() {
        println!("No classifications");
        return Ok(());
    }
    for classification in classifications {
        let parts: Vec<&str> = classification
            .file_name_parts
            .iter()
            .map(|part| part.text.as_str())
            .collect();
        println!(
            "{}{}{} [{}]",
            classification.name.bold(),
            if classification.celebrity { " (celebrity)".magenta() } else { "".normal() },
            if classification.include_in_search { "".normal() } else { " (hidden)".dimmed() },
            parts.join(", ")
        );
    }
    Ok(())
}

fn prompt_confirm(prompt: &str, default: Option<bool>) -> io::Result<bool> {
    let mut input = String::new();

    loop {
        input.clear();

        match default {
            Some(true) => print!("{} (Y/n): ", prompt),
            Some(false) | None => print!("{} (y/N): ", prompt),
        }
        io::stdout().flush()?;

        io::stdin().read_line(&mut input)?;

        match input.trim().to_uppercase().as_str() {
            "Y" => return Ok(true),
            "N" => return Ok(false),
            "" => match default {
                Some(default) => return Ok(default),
                None => continue,
            },
            _ => continue,
        }
    }
}
