//! Integration test: structured log files written by `LogEmitter`.
//!
//! Run: cargo test -p libloader-harness --test structured_log_test

use std::path::PathBuf;

use libloader_core::{LoaderError, Platform};
use libloader_harness::structured_log::{
    ArtifactIndex, LogEmitter, LogEntry, LogLevel, Outcome, validate_log_file, validate_log_line,
};

fn temp_path(tag: &str, ext: &str) -> PathBuf {
    std::env::temp_dir().join(format!(
        "libloader-harness-{tag}-{}.{ext}",
        std::process::id()
    ))
}

#[test]
fn emitted_file_validates() {
    let path = temp_path("emit", "jsonl");
    {
        let mut emitter = LogEmitter::to_file(&path, "probe", "run-7").unwrap();
        emitter.emit(LogLevel::Info, "probe_start").unwrap();
        let entry = emitter
            .entry(LogLevel::Warn, "symbol")
            .with_platform(Platform::Posix)
            .with_library("libc.so.6")
            .with_symbol("there_is_no_such_a_symbol")
            .with_error(LoaderError::SymbolNotFound)
            .with_diagnostic("undefined symbol: there_is_no_such_a_symbol")
            .with_latency_ns(1200);
        emitter.emit_entry(entry).unwrap();
        emitter.flush().unwrap();
    }

    let (lines, errors) = validate_log_file(&path).unwrap();
    assert_eq!(lines, 2);
    assert!(errors.is_empty(), "unexpected errors: {errors:?}");

    let content = std::fs::read_to_string(&path).unwrap();
    let second = content.lines().nth(1).unwrap();
    let entry = validate_log_line(second, 2).unwrap();
    assert_eq!(entry.trace_id, "probe::run-7::002");
    assert_eq!(entry.platform.as_deref(), Some("posix"));
    assert_eq!(entry.ref_counted, Some(true));
    assert_eq!(entry.outcome, Some(Outcome::Fail));

    std::fs::remove_file(&path).unwrap();
}

#[test]
fn emit_entry_fills_missing_trace_and_component() {
    let path = temp_path("fill", "jsonl");
    {
        let mut emitter = LogEmitter::to_file(&path, "nomem", "run-1").unwrap();
        let mut entry = LogEntry::new("", LogLevel::Info, "load_restored_allocator");
        entry.outcome = Some(Outcome::Pass);
        emitter.emit_entry(entry).unwrap();
        emitter.flush().unwrap();
    }
    let content = std::fs::read_to_string(&path).unwrap();
    let entry = validate_log_line(content.trim(), 1).unwrap();
    assert_eq!(entry.trace_id, "nomem::run-1::001");
    assert_eq!(entry.component.as_deref(), Some("nomem"));
    std::fs::remove_file(&path).unwrap();
}

#[test]
fn invalid_lines_are_reported_with_line_numbers() {
    let path = temp_path("invalid", "jsonl");
    let good = LogEntry::new("probe::r::001", LogLevel::Info, "ok")
        .to_jsonl()
        .unwrap();
    let body = format!(
        "{good}\n\nnot json\n{}\n",
        r#"{"timestamp":"t","trace_id":"a::b::c","level":"critical","event":"x","platform":"beos"}"#
    );
    std::fs::write(&path, body).unwrap();

    let (lines, errors) = validate_log_file(&path).unwrap();
    assert_eq!(lines, 3);
    assert!(errors.iter().any(|e| e.line_number == 3 && e.field == "<json>"));
    assert!(errors.iter().any(|e| e.line_number == 4 && e.field == "level"));
    assert!(errors.iter().any(|e| e.line_number == 4 && e.field == "platform"));
    assert!(errors.iter().all(|e| e.line_number != 1));

    std::fs::remove_file(&path).unwrap();
}

#[test]
fn artifact_index_digests_files() {
    let path = temp_path("artifact", "bin");
    std::fs::write(&path, b"abc").unwrap();

    let mut index = ArtifactIndex::new("run-9", "probe");
    index.add_file(&path, "library").unwrap();
    index.add("probe.jsonl", "log", "00");
    let parsed: serde_json::Value = serde_json::from_str(&index.to_json().unwrap()).unwrap();

    assert_eq!(parsed["index_version"], 1);
    assert_eq!(parsed["component"], "probe");
    let artifacts = parsed["artifacts"].as_array().unwrap();
    assert_eq!(artifacts.len(), 2);
    assert_eq!(
        artifacts[0]["sha256"],
        "ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad"
    );
    assert_eq!(artifacts[0]["size_bytes"], 3);
    assert!(artifacts[1].get("size_bytes").is_none());

    std::fs::remove_file(&path).unwrap();
}
