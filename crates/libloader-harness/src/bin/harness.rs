//! CLI entrypoint for the libloader probe harness.

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use libloader_harness::probe::{self, new_run_id};
use libloader_harness::structured_log::{ArtifactIndex, LogEmitter, validate_log_file};

/// Operator checks for libloader.
#[derive(Debug, Parser)]
#[command(name = "libloader-harness")]
#[command(about = "Probe shared libraries through libloader")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Load a library, resolve symbols, and log each step as JSONL.
    Probe {
        /// Library path or bare name.
        #[arg(long)]
        library: PathBuf,
        /// Symbol to resolve (repeatable).
        #[arg(long = "symbol")]
        symbols: Vec<String>,
        /// JSONL log path (if omitted, logs go to stderr).
        #[arg(long)]
        log: Option<PathBuf>,
        /// Artifact index JSON path (requires `--log`).
        #[arg(long, requires = "log")]
        artifact_index: Option<PathBuf>,
    },
    /// Check that a failing allocator blocks a load and the default recovers.
    Nomem {
        /// Library path or bare name.
        #[arg(long)]
        library: PathBuf,
        /// JSONL log path (if omitted, logs go to stderr).
        #[arg(long)]
        log: Option<PathBuf>,
    },
    /// Validate a structured JSONL log file.
    ValidateLog {
        #[arg(long)]
        log: PathBuf,
    },
}

fn emitter_for(
    log: Option<&PathBuf>,
    component: &str,
) -> Result<LogEmitter, Box<dyn std::error::Error>> {
    let run_id = new_run_id();
    Ok(match log {
        Some(path) => LogEmitter::to_file(path, component, &run_id)?,
        None => LogEmitter::to_stderr(component, &run_id),
    })
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();
    match cli.command {
        Command::Probe {
            library,
            symbols,
            log,
            artifact_index,
        } => {
            let mut emitter = emitter_for(log.as_ref(), "probe")?;
            let report = probe::run_probe(&library, &symbols, &mut emitter)?;
            drop(emitter);

            if let (Some(log), Some(index_path)) = (&log, &artifact_index) {
                let mut index = ArtifactIndex::new(&report.run_id, "probe");
                index.add_file(log, "log")?;
                if let Some(digest) = &report.sha256 {
                    index.add(&report.library, "library", digest);
                }
                std::fs::write(index_path, index.to_json()?)?;
                eprintln!("Wrote artifact index to {}", index_path.display());
            }

            println!("{}", serde_json::to_string_pretty(&report)?);
            if !report.passed() {
                return Err(format!("probe of {} failed", report.library).into());
            }
        }
        Command::Nomem { library, log } => {
            let mut emitter = emitter_for(log.as_ref(), "nomem")?;
            let report = probe::run_nomem(&library, &mut emitter)?;
            println!("{}", serde_json::to_string_pretty(&report)?);
            if !report.passed() {
                return Err(format!("nomem check of {} failed", report.library).into());
            }
        }
        Command::ValidateLog { log } => {
            let (lines, errors) = validate_log_file(&log)?;
            for err in &errors {
                eprintln!("{err}");
            }
            eprintln!(
                "{}: {lines} lines, {} errors",
                log.display(),
                errors.len()
            );
            if !errors.is_empty() {
                return Err("structured log validation failed".into());
            }
        }
    }
    Ok(())
}
