//! The repair loop controller.
//!
//! One invocation runs the deterministic rewriter once, then alternates
//! analyze passes with oracle-driven repairs until the target reaches zero
//! static errors and zero test failures, or `max_iterations` passes ran.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use tracing::{info, instrument, warn};

use crate::core::decide::{Decision, History, decide, iteration_record};
use crate::core::language::LanguageProfile;
use crate::core::prompt::PromptBuilder;
use crate::core::types::{DiagnosticSnapshot, FixResult, IterationRecord, LoopResult};
use crate::io::config::RepairConfig;
use crate::io::iteration_log::{
    IterationWriteRequest, RepairAudit, write_iteration, write_result,
};
use crate::io::oracle::{PatchOracle, same_content};
use crate::io::target::Target;
use crate::io::tools::Toolchain;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoopSettings {
    pub max_iterations: u32,
    pub language: LanguageProfile,
    pub audit_dir: Option<PathBuf>,
}

impl Default for LoopSettings {
    fn default() -> Self {
        Self {
            max_iterations: 10,
            language: LanguageProfile::default(),
            audit_dir: None,
        }
    }
}

impl LoopSettings {
    pub fn from_config(config: &RepairConfig) -> Self {
        Self {
            max_iterations: config.max_iterations,
            language: config.language.clone(),
            audit_dir: config.audit_dir.clone(),
        }
    }
}

/// Oracle answer for one iteration, kept for the audit log.
struct Attempt {
    prompt: String,
    fix: FixResult,
    written: bool,
}

pub struct RepairLoop<T: Toolchain, O: PatchOracle> {
    toolchain: T,
    oracle: O,
    prompts: PromptBuilder,
    settings: LoopSettings,
}

impl<T: Toolchain, O: PatchOracle> RepairLoop<T, O> {
    /// Fails with `RepairError::MissingBinary` if any tool is not installed.
    pub fn new(toolchain: T, oracle: O, settings: LoopSettings) -> Result<Self> {
        toolchain.validate()?;
        Ok(Self {
            toolchain,
            oracle,
            prompts: PromptBuilder::new(settings.language.clone()),
            settings,
        })
    }

    pub fn toolchain(&self) -> &T {
        &self.toolchain
    }

    pub fn oracle(&self) -> &O {
        &self.oracle
    }

    pub fn settings(&self) -> &LoopSettings {
        &self.settings
    }

    /// Drive `target` towards zero findings.
    ///
    /// An exhausted loop is still `Ok` with `success == false`. Errors mean
    /// the invocation itself failed: missing target, tool timeout or spawn
    /// failure, or a fix that could not be written.
    #[instrument(skip_all, fields(target = %target.display(), dry_run = dry_run))]
    pub fn execute(&self, target: &Path, dry_run: bool) -> Result<LoopResult> {
        let target = Target::resolve(target)?;
        info!(
            max_iterations = self.settings.max_iterations,
            "starting repair loop"
        );

        let rewriter_applied = self
            .toolchain
            .rewrite(target.path(), dry_run)
            .context("deterministic pass")?;

        let mut history = History::new();
        for iteration in 1..=self.settings.max_iterations {
            let snapshot = self.analyze(&target)?;
            let mut record = iteration_record(iteration, rewriter_applied, &snapshot);
            info!(
                iteration,
                static_errors = record.static_errors,
                test_failures = record.test_failures,
                "analyze pass finished"
            );

            let decision = decide(&snapshot);
            let attempt = match decision {
                Decision::Success => None,
                Decision::Repair if dry_run => {
                    info!(iteration, "dry run, skipping repair");
                    None
                }
                Decision::Repair => Some(self.repair(&target, &snapshot)?),
            };
            record.ai_fix_applied = attempt.as_ref().is_some_and(|a| a.written);
            self.audit(&record, &snapshot, attempt.as_ref())?;
            history = history.push(record);

            if decision == Decision::Success {
                info!(iteration, "gold standard reached");
                return self.finish(history);
            }
        }

        warn!(
            iterations = history.len(),
            "iteration budget exhausted without reaching gold standard"
        );
        self.finish(history)
    }

    fn analyze(&self, target: &Target) -> Result<DiagnosticSnapshot> {
        let static_errors = self
            .toolchain
            .analyze(target.path())
            .context("static analysis")?;
        let test_failures = self.toolchain.test(target.path()).context("test run")?;
        Ok(DiagnosticSnapshot {
            static_errors,
            test_failures,
        })
    }

    fn repair(&self, target: &Target, snapshot: &DiagnosticSnapshot) -> Result<Attempt> {
        let current = target.read(&self.settings.language);
        let prompt = self
            .prompts
            .build(&current, &snapshot.static_errors, &snapshot.test_failures)
            .context("render repair prompt")?;

        let fix = self.oracle.request_fix(&prompt, &current);
        let written = match &fix {
            FixResult::Applied(fixed) if !same_content(fixed, &current) => {
                target.write(fixed)?;
                info!(bytes = fixed.len(), "fix applied");
                true
            }
            FixResult::Applied(_) | FixResult::NoFix => {
                info!("oracle offered no usable fix");
                false
            }
            FixResult::TransportError(detail) => {
                warn!(err = %detail, "oracle unavailable, continuing without a fix");
                false
            }
        };

        Ok(Attempt {
            prompt,
            fix,
            written,
        })
    }

    fn audit(
        &self,
        record: &IterationRecord,
        snapshot: &DiagnosticSnapshot,
        attempt: Option<&Attempt>,
    ) -> Result<()> {
        let Some(audit_dir) = &self.settings.audit_dir else {
            return Ok(());
        };
        write_iteration(&IterationWriteRequest {
            audit_dir,
            record,
            snapshot,
            repair: attempt.map(|a| RepairAudit {
                prompt: &a.prompt,
                fix: &a.fix,
                written: a.written,
            }),
        })?;
        Ok(())
    }

    fn finish(&self, history: History) -> Result<LoopResult> {
        let result = history.into_result();
        if let Some(audit_dir) = &self.settings.audit_dir {
            write_result(audit_dir, &result)?;
        }
        info!(
            success = result.success,
            iterations = result.iterations,
            final_errors = result.final_errors,
            final_test_failures = result.final_test_failures,
            "repair loop finished"
        );
        Ok(result)
    }
}
