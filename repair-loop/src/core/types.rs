//! Shared deterministic types for the repair loop.
//!
//! These types define stable contracts between the parsers, the controller
//! and the caller. They carry no I/O and serialize to the JSON shape the CLI
//! prints and the audit log stores.

use serde::{Deserialize, Serialize};

/// Which tool produced a diagnostic.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DiagnosticKind {
    StaticError,
    TestFailure,
}

/// A normalized finding from the static analyzer or the test runner.
///
/// `file` is empty and `line` is 0 when the tool did not say where the
/// problem is. `ignorable` only carries meaning for static errors and
/// `test_name` only for test failures.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DiagnosticRecord {
    pub kind: DiagnosticKind,
    pub file: String,
    pub line: u32,
    pub message: String,
    pub ignorable: bool,
    pub test_name: String,
}

impl DiagnosticRecord {
    pub fn static_error(
        file: impl Into<String>,
        line: u32,
        message: impl Into<String>,
        ignorable: bool,
    ) -> Self {
        Self {
            kind: DiagnosticKind::StaticError,
            file: file.into(),
            line,
            message: message.into(),
            ignorable,
            test_name: String::new(),
        }
    }

    pub fn test_failure(
        test_name: impl Into<String>,
        file: impl Into<String>,
        line: u32,
        message: impl Into<String>,
    ) -> Self {
        Self {
            kind: DiagnosticKind::TestFailure,
            file: file.into(),
            line,
            message: message.into(),
            ignorable: false,
            test_name: test_name.into(),
        }
    }
}

/// Diagnostics observed in one analyze pass.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct DiagnosticSnapshot {
    pub static_errors: Vec<DiagnosticRecord>,
    pub test_failures: Vec<DiagnosticRecord>,
}

impl DiagnosticSnapshot {
    /// Zero static errors and zero test failures.
    pub fn is_gold(&self) -> bool {
        self.static_errors.is_empty() && self.test_failures.is_empty()
    }
}

/// One pass through the loop. Immutable once appended to the history.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct IterationRecord {
    /// 1-based iteration index.
    pub iteration: u32,
    /// The deterministic rewriter changed the target. Only ever true on iteration 1.
    pub rewriter_applied: bool,
    pub static_errors: usize,
    pub test_failures: usize,
    /// A distinct fix was returned by the oracle and written to the target.
    pub ai_fix_applied: bool,
}

/// Terminal output of a loop invocation.
///
/// `success` holds iff the last history entry shows zero static errors and
/// zero test failures; an unsuccessful result always ran `max_iterations`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LoopResult {
    pub success: bool,
    pub iterations: u32,
    pub final_errors: usize,
    pub final_test_failures: usize,
    pub history: Vec<IterationRecord>,
}

/// Outcome of asking the patch oracle for a replacement artifact.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FixResult {
    /// Candidate replacement content, distinct from the current content.
    Applied(String),
    /// The oracle answered but offered nothing usable.
    NoFix,
    /// The oracle could not be reached or answered with something malformed.
    TransportError(String),
}

impl FixResult {
    pub fn kind(&self) -> &'static str {
        match self {
            FixResult::Applied(_) => "applied",
            FixResult::NoFix => "no_fix",
            FixResult::TransportError(_) => "transport_error",
        }
    }
}
