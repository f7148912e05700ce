//! Parsers that normalize raw tool output into [`DiagnosticRecord`]s.
//!
//! Both parsers are total: arbitrary bytes go in, a (possibly empty) list
//! comes out. A tool that produced no machine-readable output contributes
//! zero findings instead of halting the loop.

use std::sync::LazyLock;

use regex::Regex;
use serde_json::Value;
use tracing::debug;

use crate::core::types::DiagnosticRecord;

const UNKNOWN_ERROR: &str = "Unknown error";
const TEST_FAILED: &str = "Test failed";

static FAILED_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"FAILED\s+([^\n]+)").expect("failed marker regex"));
static LOCATION_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\bat\s+([^:\n]+):(\d+)").expect("location regex"));

/// Parse a static-analyzer JSON report.
///
/// Expected shape: `{"files": {"<path>": {"messages": [{"message", "line", "ignorable"}]}}}`.
/// Empty or malformed input yields no findings.
pub fn parse_analyzer_report(raw: &[u8]) -> Vec<DiagnosticRecord> {
    let text = String::from_utf8_lossy(raw);
    if text.trim().is_empty() {
        return Vec::new();
    }
    let report: Value = match serde_json::from_str(text.trim()) {
        Ok(value) => value,
        Err(err) => {
            debug!(err = %err, "analyzer output is not json, treating as zero findings");
            return Vec::new();
        }
    };

    let Some(files) = report.get("files").and_then(Value::as_object) else {
        return Vec::new();
    };

    let mut records = Vec::new();
    for (file, data) in files {
        let Some(messages) = data.get("messages").and_then(Value::as_array) else {
            continue;
        };
        for message in messages {
            let line = message
                .get("line")
                .and_then(Value::as_u64)
                .and_then(|line| u32::try_from(line).ok())
                .unwrap_or(0);
            let text = message
                .get("message")
                .and_then(Value::as_str)
                .unwrap_or(UNKNOWN_ERROR);
            let ignorable = message
                .get("ignorable")
                .and_then(Value::as_bool)
                .unwrap_or(false);
            records.push(DiagnosticRecord::static_error(
                file.as_str(),
                line,
                text,
                ignorable,
            ));
        }
    }
    records
}

/// Parse free-text test-runner output.
///
/// A successful exit short-circuits to no failures. Otherwise each
/// `FAILED <name>` marker becomes one record, located by the first
/// `at <file>:<line>` that follows it before the next marker. A failed run
/// with no recognizable markers still yields one generic record.
pub fn parse_test_output(success: bool, output: &[u8]) -> Vec<DiagnosticRecord> {
    if success {
        return Vec::new();
    }
    let text = String::from_utf8_lossy(output);

    let markers: Vec<_> = FAILED_RE.captures_iter(&text).collect();
    if markers.is_empty() {
        return vec![DiagnosticRecord::test_failure("", "", 0, TEST_FAILED)];
    }

    let mut records = Vec::with_capacity(markers.len());
    for (idx, caps) in markers.iter().enumerate() {
        let name = caps.get(1).map_or("", |m| m.as_str()).trim();
        let start = caps.get(0).map_or(0, |m| m.end());
        let end = markers
            .get(idx + 1)
            .and_then(|next| next.get(0))
            .map_or(text.len(), |m| m.start());
        let segment = &text[start..end];

        match LOCATION_RE.captures(segment) {
            Some(loc) => {
                let file = loc.get(1).map_or("", |m| m.as_str()).trim();
                let line = loc
                    .get(2)
                    .and_then(|m| m.as_str().parse::<u32>().ok())
                    .unwrap_or(0);
                records.push(DiagnosticRecord::test_failure(name, file, line, TEST_FAILED));
            }
            None => records.push(DiagnosticRecord::test_failure(name, "", 0, TEST_FAILED)),
        }
    }
    records
}
