//! Audit files for each loop iteration under the configured `audit_dir`.

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::Serialize;

use crate::core::types::{
    DiagnosticRecord, DiagnosticSnapshot, FixResult, IterationRecord, LoopResult,
};

#[derive(Debug, Clone)]
pub struct IterationPaths {
    pub dir: PathBuf,
    pub meta_path: PathBuf,
    pub diagnostics_path: PathBuf,
    pub prompt_path: PathBuf,
    pub oracle_path: PathBuf,
}

impl IterationPaths {
    pub fn new(audit_dir: &Path, iter: u32) -> Self {
        let dir = audit_dir.join(iter.to_string());
        Self {
            dir: dir.clone(),
            meta_path: dir.join("meta.json"),
            diagnostics_path: dir.join("diagnostics.json"),
            prompt_path: dir.join("prompt.md"),
            oracle_path: dir.join("oracle.json"),
        }
    }
}

/// What happened when the oracle was consulted during one iteration.
#[derive(Debug, Clone, Copy)]
pub struct RepairAudit<'a> {
    pub prompt: &'a str,
    pub fix: &'a FixResult,
    /// The candidate was written to the target.
    pub written: bool,
}

#[derive(Debug, Serialize)]
struct OracleEntry<'a> {
    kind: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    detail: Option<&'a str>,
    written: bool,
}

#[derive(Debug, Serialize)]
struct DiagnosticsEntry<'a> {
    static_errors: &'a [DiagnosticRecord],
    test_failures: &'a [DiagnosticRecord],
}

pub struct IterationWriteRequest<'a> {
    pub audit_dir: &'a Path,
    pub record: &'a IterationRecord,
    pub snapshot: &'a DiagnosticSnapshot,
    pub repair: Option<RepairAudit<'a>>,
}

pub fn write_iteration(request: &IterationWriteRequest<'_>) -> Result<IterationPaths> {
    let paths = IterationPaths::new(request.audit_dir, request.record.iteration);
    fs::create_dir_all(&paths.dir)
        .with_context(|| format!("create iteration dir {}", paths.dir.display()))?;

    // Deterministic order keeps audit trees diffable.
    write_json(&paths.meta_path, request.record)?;
    write_json(
        &paths.diagnostics_path,
        &DiagnosticsEntry {
            static_errors: &request.snapshot.static_errors,
            test_failures: &request.snapshot.test_failures,
        },
    )?;
    if let Some(repair) = request.repair {
        write_text(&paths.prompt_path, repair.prompt)?;
        let detail = match repair.fix {
            FixResult::Applied(content) => Some(content.as_str()),
            FixResult::NoFix => None,
            FixResult::TransportError(err) => Some(err.as_str()),
        };
        write_json(
            &paths.oracle_path,
            &OracleEntry {
                kind: repair.fix.kind(),
                detail,
                written: repair.written,
            },
        )?;
    }

    Ok(paths)
}

/// Write `result.json` next to the iteration directories.
pub fn write_result(audit_dir: &Path, result: &LoopResult) -> Result<PathBuf> {
    fs::create_dir_all(audit_dir)
        .with_context(|| format!("create audit dir {}", audit_dir.display()))?;
    let path = audit_dir.join("result.json");
    write_json(&path, result)?;
    Ok(path)
}

fn write_text(path: &Path, contents: &str) -> Result<()> {
    fs::write(path, contents).with_context(|| format!("write {}", path.display()))
}

fn write_json<T: Serialize + ?Sized>(path: &Path, value: &T) -> Result<()> {
    let mut buf = serde_json::to_string_pretty(value).context("serialize audit json")?;
    buf.push('\n');
    write_text(path, &buf)
}
