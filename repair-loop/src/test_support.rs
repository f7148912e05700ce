//! Scripted collaborators for exercising the loop without processes or network.

use std::cell::{Cell, RefCell};
use std::collections::VecDeque;
use std::path::{Path, PathBuf};

use anyhow::{Result, anyhow};

use crate::core::types::{DiagnosticRecord, DiagnosticSnapshot, FixResult};
use crate::error::RepairError;
use crate::io::oracle::PatchOracle;
use crate::io::tools::Toolchain;

/// Snapshot with `errors` static errors and `failures` test failures.
pub fn snapshot(errors: usize, failures: usize) -> DiagnosticSnapshot {
    DiagnosticSnapshot {
        static_errors: (0..errors)
            .map(|i| {
                let line = u32::try_from(i + 1).unwrap_or(u32::MAX);
                DiagnosticRecord::static_error(
                    "src/Order.php",
                    line,
                    format!("error {line}"),
                    false,
                )
            })
            .collect(),
        test_failures: (0..failures)
            .map(|i| {
                let line = u32::try_from(i + 1).unwrap_or(u32::MAX);
                DiagnosticRecord::test_failure(
                    format!("test {line}"),
                    "tests/OrderTest.php",
                    line,
                    format!("test {line}"),
                )
            })
            .collect(),
    }
}

/// Toolchain that replays one snapshot per analyze pass.
///
/// Once the queue is drained the last snapshot repeats, so an unconverging
/// loop keeps reporting the same findings.
#[derive(Debug, Default)]
pub struct ScriptedToolchain {
    snapshots: RefCell<VecDeque<DiagnosticSnapshot>>,
    current: RefCell<DiagnosticSnapshot>,
    rewrite_changes: bool,
    missing_binary: Option<String>,
    analyze_error: Option<String>,
    rewrite_calls: Cell<usize>,
    analyze_calls: Cell<usize>,
    test_calls: Cell<usize>,
    dry_run_rewrites: Cell<usize>,
}

impl ScriptedToolchain {
    pub fn new(snapshots: Vec<DiagnosticSnapshot>) -> Self {
        Self {
            snapshots: RefCell::new(snapshots.into()),
            ..Self::default()
        }
    }

    /// The rewriter reports that it changed the target.
    pub fn with_rewrite_changes(mut self) -> Self {
        self.rewrite_changes = true;
        self
    }

    /// `validate` fails as if `name` were not installed.
    pub fn with_missing_binary(mut self, name: &str) -> Self {
        self.missing_binary = Some(name.to_string());
        self
    }

    /// Every analyze pass fails with `message`.
    pub fn with_analyze_error(mut self, message: &str) -> Self {
        self.analyze_error = Some(message.to_string());
        self
    }

    pub fn rewrite_calls(&self) -> usize {
        self.rewrite_calls.get()
    }

    pub fn analyze_calls(&self) -> usize {
        self.analyze_calls.get()
    }

    pub fn test_calls(&self) -> usize {
        self.test_calls.get()
    }

    pub fn dry_run_rewrites(&self) -> usize {
        self.dry_run_rewrites.get()
    }

    /// Total tool invocations of any kind.
    pub fn tool_calls(&self) -> usize {
        self.rewrite_calls() + self.analyze_calls() + self.test_calls()
    }
}

impl Toolchain for ScriptedToolchain {
    fn validate(&self) -> Result<()> {
        match &self.missing_binary {
            Some(name) => Err(RepairError::MissingBinary {
                name: name.clone(),
                path: PathBuf::from("vendor/bin").join(name),
            }
            .into()),
            None => Ok(()),
        }
    }

    fn rewrite(&self, _target: &Path, dry_run: bool) -> Result<bool> {
        self.rewrite_calls.set(self.rewrite_calls.get() + 1);
        if dry_run {
            self.dry_run_rewrites.set(self.dry_run_rewrites.get() + 1);
        }
        Ok(self.rewrite_changes)
    }

    fn analyze(&self, _target: &Path) -> Result<Vec<DiagnosticRecord>> {
        self.analyze_calls.set(self.analyze_calls.get() + 1);
        if let Some(message) = &self.analyze_error {
            return Err(anyhow!("{message}"));
        }
        if let Some(next) = self.snapshots.borrow_mut().pop_front() {
            *self.current.borrow_mut() = next;
        }
        Ok(self.current.borrow().static_errors.clone())
    }

    fn test(&self, _target: &Path) -> Result<Vec<DiagnosticRecord>> {
        self.test_calls.set(self.test_calls.get() + 1);
        Ok(self.current.borrow().test_failures.clone())
    }
}

/// Oracle that replays queued answers and falls back to `NoFix`.
#[derive(Debug, Default)]
pub struct ScriptedOracle {
    answers: RefCell<VecDeque<FixResult>>,
    prompts: RefCell<Vec<String>>,
}

impl ScriptedOracle {
    pub fn new(answers: Vec<FixResult>) -> Self {
        Self {
            answers: RefCell::new(answers.into()),
            prompts: RefCell::new(Vec::new()),
        }
    }

    pub fn calls(&self) -> usize {
        self.prompts.borrow().len()
    }

    /// Prompts received so far, in call order.
    pub fn prompts(&self) -> Vec<String> {
        self.prompts.borrow().clone()
    }
}

impl PatchOracle for ScriptedOracle {
    fn request_fix(&self, prompt: &str, _current: &str) -> FixResult {
        self.prompts.borrow_mut().push(prompt.to_string());
        self.answers
            .borrow_mut()
            .pop_front()
            .unwrap_or(FixResult::NoFix)
    }
}

/// Scratch directory holding a single source file.
pub struct TestTarget {
    dir: tempfile::TempDir,
    path: PathBuf,
}

impl TestTarget {
    pub fn new(name: &str, contents: &str) -> Result<Self> {
        let dir = tempfile::tempdir()?;
        let path = dir.path().join(name);
        std::fs::write(&path, contents)?;
        Ok(Self { dir, path })
    }

    pub fn dir(&self) -> &Path {
        self.dir.path()
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn read(&self) -> Result<String> {
        Ok(std::fs::read_to_string(&self.path)?)
    }
}
