//! Operator tooling for libloader.
//!
//! This crate provides:
//! - Probe: load a library, resolve symbols, record the outcome
//! - Nomem: check that a failing allocator blocks loads without leaking
//! - Structured logging: JSONL events plus an artifact index with digests

#![forbid(unsafe_code)]

pub mod probe;
pub mod structured_log;

pub use probe::{HarnessError, NomemReport, ProbeReport, SymbolOutcome};
pub use structured_log::{ArtifactIndex, LogEmitter, LogEntry, LogLevel, Outcome};
