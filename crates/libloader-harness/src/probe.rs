//! Probe and nomem scenarios run by the `harness` binary.

use std::ffi::CString;
use std::path::Path;
use std::time::Instant;

use libloader::{LibraryLoader, LoaderError, MemVTable, mem};
use serde::Serialize;
use thiserror::Error;

use crate::structured_log::{LogEmitter, LogLevel, Outcome, sha256_hex};

#[derive(Debug, Error)]
pub enum HarnessError {
    #[error("io: {0}")]
    Io(#[from] std::io::Error),
    #[error("json: {0}")]
    Json(#[from] serde_json::Error),
    #[error("symbol name {0:?} contains a NUL byte")]
    InvalidSymbolName(String),
    #[error("allocator override: {0}")]
    Allocator(#[source] LoaderError),
}

/// Resolution result for one requested symbol.
#[derive(Debug, Clone, Serialize)]
pub struct SymbolOutcome {
    pub name: String,
    pub resolved: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub diagnostic: Option<String>,
}

/// Summary of one `probe` run.
#[derive(Debug, Clone, Serialize)]
pub struct ProbeReport {
    pub run_id: String,
    pub platform: &'static str,
    pub ref_counted: bool,
    /// False where the ref-count answer is not authoritative (HP-UX).
    pub ref_count_authoritative: bool,
    pub library: String,
    /// Digest of the library file, when the path names a file on disk.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sha256: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub load_error: Option<&'static str>,
    pub symbols: Vec<SymbolOutcome>,
}

impl ProbeReport {
    /// The library loaded and every requested symbol resolved.
    #[must_use]
    pub fn passed(&self) -> bool {
        self.load_error.is_none() && self.symbols.iter().all(|s| s.resolved)
    }
}

/// Summary of one `nomem` run.
#[derive(Debug, Clone, Serialize)]
pub struct NomemReport {
    pub run_id: String,
    pub library: String,
    /// Error code of the load attempted under the failing allocator.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub failing_allocator_error: Option<&'static str>,
    /// Error code of the load attempted after restoring the default.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub restored_error: Option<&'static str>,
}

impl NomemReport {
    /// The failing allocator blocked the load and the restored one did not.
    #[must_use]
    pub fn passed(&self) -> bool {
        self.failing_allocator_error == Some(LoaderError::AllocationFailure.code())
            && self.restored_error.is_none()
    }
}

/// A run id unique enough for one host: `<pid>-<unix millis>`.
#[must_use]
pub fn new_run_id() -> String {
    let millis = std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis();
    format!("{}-{millis}", std::process::id())
}

/// Digest of `library` if it names a regular file.
pub fn library_digest(library: &Path) -> Result<Option<String>, HarnessError> {
    if !library.is_file() {
        return Ok(None);
    }
    Ok(Some(sha256_hex(&std::fs::read(library)?)))
}

/// Load `library`, resolve each of `symbols`, and log every step.
///
/// Load and lookup failures are reported in the returned [`ProbeReport`];
/// only harness-side failures (bad input, I/O) are errors.
pub fn run_probe(
    library: &Path,
    symbols: &[String],
    emitter: &mut LogEmitter,
) -> Result<ProbeReport, HarnessError> {
    let names = symbols
        .iter()
        .map(|s| CString::new(s.as_str()).map_err(|_| HarnessError::InvalidSymbolName(s.clone())))
        .collect::<Result<Vec<_>, _>>()?;

    let platform = libloader::PLATFORM;
    let display = library.display().to_string();
    let mut report = ProbeReport {
        run_id: emitter.run_id().to_string(),
        platform: platform.as_str(),
        ref_counted: libloader::is_ref_counted(),
        ref_count_authoritative: libloader::ref_count_query().is_ok(),
        library: display.clone(),
        sha256: library_digest(library)?,
        load_error: None,
        symbols: Vec::with_capacity(names.len()),
    };

    let mut start = emitter
        .entry(LogLevel::Info, "probe_start")
        .with_platform(platform)
        .with_library(&display);
    if let Some(digest) = &report.sha256 {
        start = start.with_details(serde_json::json!({ "sha256": digest }));
    }
    emitter.emit_entry(start)?;

    let t0 = Instant::now();
    let loaded = LibraryLoader::new(library);
    let load_ns = elapsed_ns(t0);

    let mut loader = match loaded {
        Ok(loader) => {
            let entry = emitter
                .entry(LogLevel::Info, "load")
                .with_library(&display)
                .with_outcome(Outcome::Pass)
                .with_latency_ns(load_ns);
            emitter.emit_entry(entry)?;
            loader
        }
        Err(err) => {
            report.load_error = Some(err.code());
            let entry = emitter
                .entry(LogLevel::Error, "load")
                .with_library(&display)
                .with_error(err)
                .with_latency_ns(load_ns);
            emitter.emit_entry(entry)?;
            for name in symbols {
                let entry = emitter
                    .entry(LogLevel::Warn, "symbol")
                    .with_symbol(name)
                    .with_outcome(Outcome::Skip);
                emitter.emit_entry(entry)?;
                report.symbols.push(SymbolOutcome {
                    name: name.clone(),
                    resolved: false,
                    diagnostic: None,
                });
            }
            finish_probe(emitter, &report)?;
            return Ok(report);
        }
    };

    for (name, c_name) in symbols.iter().zip(&names) {
        let t0 = Instant::now();
        let found = loader.get_symbol(c_name);
        let ns = elapsed_ns(t0);
        let (entry, symbol) = match found {
            Ok(_) => {
                let entry = emitter
                    .entry(LogLevel::Info, "symbol")
                    .with_outcome(Outcome::Pass);
                (entry, SymbolOutcome {
                    name: name.clone(),
                    resolved: true,
                    diagnostic: None,
                })
            }
            Err(err) => {
                let diagnostic = loader
                    .last_error()
                    .map(|s| s.to_string_lossy().into_owned());
                let mut entry = emitter.entry(LogLevel::Warn, "symbol").with_error(err);
                if let Some(text) = &diagnostic {
                    entry = entry.with_diagnostic(text);
                }
                (entry, SymbolOutcome {
                    name: name.clone(),
                    resolved: false,
                    diagnostic,
                })
            }
        };
        emitter.emit_entry(
            entry
                .with_library(&display)
                .with_symbol(name)
                .with_latency_ns(ns),
        )?;
        report.symbols.push(symbol);
    }

    loader.close();
    finish_probe(emitter, &report)?;
    Ok(report)
}

/// Load `library` under an always-failing allocator, restore the default,
/// and load again.
///
/// # Errors
///
/// [`HarnessError::Allocator`] if an allocator override is already
/// installed in this process.
pub fn run_nomem(library: &Path, emitter: &mut LogEmitter) -> Result<NomemReport, HarnessError> {
    let display = library.display().to_string();
    let mut report = NomemReport {
        run_id: emitter.run_id().to_string(),
        library: display.clone(),
        failing_allocator_error: None,
        restored_error: None,
    };

    let guard = mem::install(MemVTable::failing()).map_err(HarnessError::Allocator)?;
    let blocked = LibraryLoader::new(library);
    drop(guard);

    let entry = match blocked {
        Err(LoaderError::AllocationFailure) => {
            report.failing_allocator_error = Some(LoaderError::AllocationFailure.code());
            emitter
                .entry(LogLevel::Info, "load_failing_allocator")
                .with_outcome(Outcome::Pass)
        }
        other => {
            let got = match other {
                Ok(loader) => {
                    loader.close();
                    None
                }
                Err(err) => Some(err.code()),
            };
            report.failing_allocator_error = got;
            emitter
                .entry(LogLevel::Error, "load_failing_allocator")
                .with_outcome(Outcome::Fail)
                .with_details(serde_json::json!({
                    "expected": LoaderError::AllocationFailure.code(),
                    "got": got,
                }))
        }
    };
    emitter.emit_entry(entry.with_library(&display))?;

    let entry = match LibraryLoader::new(library) {
        Ok(loader) => {
            loader.close();
            emitter
                .entry(LogLevel::Info, "load_restored_allocator")
                .with_outcome(Outcome::Pass)
        }
        Err(err) => {
            report.restored_error = Some(err.code());
            emitter
                .entry(LogLevel::Error, "load_restored_allocator")
                .with_error(err)
        }
    };
    emitter.emit_entry(entry.with_library(&display))?;

    emitter.flush()?;
    Ok(report)
}

fn finish_probe(emitter: &mut LogEmitter, report: &ProbeReport) -> Result<(), HarnessError> {
    let outcome = if report.passed() {
        Outcome::Pass
    } else {
        Outcome::Fail
    };
    let entry = emitter
        .entry(LogLevel::Info, "probe_end")
        .with_platform(libloader::PLATFORM)
        .with_library(&report.library)
        .with_outcome(outcome)
        .with_details(serde_json::to_value(report)?);
    emitter.emit_entry(entry)?;
    emitter.flush()?;
    Ok(())
}

fn elapsed_ns(t0: Instant) -> u64 {
    u64::try_from(t0.elapsed().as_nanos()).unwrap_or(u64::MAX)
}
