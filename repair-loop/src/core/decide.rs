//! Loop decisions and the history accumulator.
//!
//! The controller threads a [`History`] value through every transition and
//! turns it into the final [`LoopResult`], so the result is always derived
//! from the records that were actually appended.

use crate::core::types::{DiagnosticSnapshot, IterationRecord, LoopResult};

/// What to do after an analyze pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Decision {
    /// Gold standard reached.
    Success,
    /// Findings remain: ask the oracle (unless dry-run) and go around again.
    Repair,
}

pub fn decide(snapshot: &DiagnosticSnapshot) -> Decision {
    if snapshot.is_gold() {
        Decision::Success
    } else {
        Decision::Repair
    }
}

/// Build the record for one analyze pass; the fix flag starts cleared.
pub fn iteration_record(
    iteration: u32,
    rewriter_applied: bool,
    snapshot: &DiagnosticSnapshot,
) -> IterationRecord {
    IterationRecord {
        iteration,
        rewriter_applied: iteration == 1 && rewriter_applied,
        static_errors: snapshot.static_errors.len(),
        test_failures: snapshot.test_failures.len(),
        ai_fix_applied: false,
    }
}

/// Ordered, append-only iteration history.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct History {
    records: Vec<IterationRecord>,
}

impl History {
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn push(mut self, record: IterationRecord) -> Self {
        self.records.push(record);
        self
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn last(&self) -> Option<&IterationRecord> {
        self.records.last()
    }

    /// Close the history into a result whose counts come from the last record.
    pub fn into_result(self) -> LoopResult {
        let (final_errors, final_test_failures) = self
            .records
            .last()
            .map_or((0, 0), |r| (r.static_errors, r.test_failures));
        let success = !self.records.is_empty() && final_errors == 0 && final_test_failures == 0;
        LoopResult {
            success,
            iterations: u32::try_from(self.records.len()).unwrap_or(u32::MAX),
            final_errors,
            final_test_failures,
            history: self.records,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::types::DiagnosticRecord;

    fn snapshot(errors: usize, failures: usize) -> DiagnosticSnapshot {
        DiagnosticSnapshot {
            static_errors: (0..errors)
                .map(|i| DiagnosticRecord::static_error("a.php", i as u32, "err", false))
                .collect(),
            test_failures: (0..failures)
                .map(|_| DiagnosticRecord::test_failure("t", "", 0, "Test failed"))
                .collect(),
        }
    }

    #[test]
    fn decide_success_only_on_zero_zero() {
        assert_eq!(decide(&snapshot(0, 0)), Decision::Success);
        assert_eq!(decide(&snapshot(1, 0)), Decision::Repair);
        assert_eq!(decide(&snapshot(0, 1)), Decision::Repair);
    }

    #[test]
    fn rewriter_flag_only_on_first_iteration() {
        assert!(iteration_record(1, true, &snapshot(0, 0)).rewriter_applied);
        assert!(!iteration_record(2, true, &snapshot(0, 0)).rewriter_applied);
        assert!(!iteration_record(1, false, &snapshot(0, 0)).rewriter_applied);
    }

    #[test]
    fn result_counts_follow_last_record() {
        let history = History::new()
            .push(iteration_record(1, false, &snapshot(3, 2)))
            .push(iteration_record(2, false, &snapshot(1, 1)));
        let result = history.into_result();
        assert!(!result.success);
        assert_eq!(result.iterations, 2);
        assert_eq!(result.final_errors, 1);
        assert_eq!(result.final_test_failures, 1);
        assert_eq!(result.history.len(), 2);
    }

    #[test]
    fn empty_history_is_not_success() {
        let result = History::new().into_result();
        assert!(!result.success);
        assert_eq!(result.iterations, 0);
    }
}
