//! Sequential batch runs over a prioritized worklist.

use std::fs;
use std::path::{Path, PathBuf};
use std::thread;
use std::time::{Duration, Instant};

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::io::oracle::PatchOracle;
use crate::io::tools::Toolchain;
use crate::repair::RepairLoop;

/// Worklist file (TOML), one `[[item]]` table per target.
#[derive(Debug, Clone, Default, Deserialize, PartialEq, Eq)]
pub struct Worklist {
    #[serde(default, rename = "item")]
    pub items: Vec<WorkItem>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct WorkItem {
    pub id: String,
    pub path: PathBuf,
    /// Lower runs first.
    #[serde(default)]
    pub priority: i64,
}

/// Load a worklist; relative item paths resolve against the worklist's directory.
pub fn load_worklist(path: &Path) -> Result<Worklist> {
    let contents = fs::read_to_string(path).with_context(|| format!("read {}", path.display()))?;
    let mut worklist: Worklist =
        toml::from_str(&contents).with_context(|| format!("parse {}", path.display()))?;
    let base = path.parent().unwrap_or_else(|| Path::new(""));
    for item in &mut worklist.items {
        if item.path.is_relative() {
            item.path = base.join(&item.path);
        }
    }
    Ok(worklist)
}

/// Order by ascending priority (ties keep file order) and cap at `max_items`.
pub fn plan(mut items: Vec<WorkItem>, max_items: Option<usize>) -> Vec<WorkItem> {
    items.sort_by_key(|item| item.priority);
    if let Some(max) = max_items {
        items.truncate(max);
    }
    items
}

#[derive(Debug, Clone, Copy, Default)]
pub struct BatchOptions {
    pub dry_run: bool,
    /// Pause between consecutive items; not applied after the last one.
    pub cooldown: Duration,
}

/// Outcome of one worklist item. Counts are -1 when the loop itself failed.
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct ItemResult {
    pub id: String,
    pub path: PathBuf,
    pub success: bool,
    pub iterations: u32,
    pub final_errors: i64,
    pub final_test_failures: i64,
    pub duration_ms: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct BatchSummary {
    pub all_successful: bool,
    pub total_processed: usize,
    pub success_count: usize,
    pub failure_count: usize,
    pub results: Vec<ItemResult>,
    pub total_duration_ms: u64,
}

/// Run the loop over `items` one at a time.
///
/// An error on one item is recorded as that item's failure and the batch
/// moves on.
pub fn run_batch<T: Toolchain, O: PatchOracle>(
    repair: &RepairLoop<T, O>,
    items: &[WorkItem],
    options: BatchOptions,
) -> BatchSummary {
    let started = Instant::now();
    let mut results = Vec::with_capacity(items.len());

    for (idx, item) in items.iter().enumerate() {
        if idx > 0 && !options.cooldown.is_zero() {
            info!(
                cooldown_ms = millis(options.cooldown),
                "cooling down before next item"
            );
            thread::sleep(options.cooldown);
        }
        info!(
            id = %item.id,
            path = %item.path.display(),
            priority = item.priority,
            "processing item"
        );
        results.push(run_item(repair, item, options.dry_run));
    }

    let success_count = results.iter().filter(|r| r.success).count();
    let summary = BatchSummary {
        all_successful: success_count == results.len(),
        total_processed: results.len(),
        success_count,
        failure_count: results.len() - success_count,
        results,
        total_duration_ms: millis(started.elapsed()),
    };
    info!(
        processed = summary.total_processed,
        succeeded = summary.success_count,
        failed = summary.failure_count,
        "batch finished"
    );
    summary
}

fn run_item<T: Toolchain, O: PatchOracle>(
    repair: &RepairLoop<T, O>,
    item: &WorkItem,
    dry_run: bool,
) -> ItemResult {
    let started = Instant::now();
    match repair.execute(&item.path, dry_run) {
        Ok(result) => ItemResult {
            id: item.id.clone(),
            path: item.path.clone(),
            success: result.success,
            iterations: result.iterations,
            final_errors: count(result.final_errors),
            final_test_failures: count(result.final_test_failures),
            duration_ms: millis(started.elapsed()),
            error: None,
        },
        Err(err) => {
            let detail = format!("{err:#}");
            warn!(id = %item.id, err = %detail, "item failed");
            ItemResult {
                id: item.id.clone(),
                path: item.path.clone(),
                success: false,
                iterations: 0,
                final_errors: -1,
                final_test_failures: -1,
                duration_ms: millis(started.elapsed()),
                error: Some(detail),
            }
        }
    }
}

fn count(n: usize) -> i64 {
    i64::try_from(n).unwrap_or(i64::MAX)
}

fn millis(duration: Duration) -> u64 {
    u64::try_from(duration.as_millis()).unwrap_or(u64::MAX)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::types::FixResult;
    use crate::repair::LoopSettings;
    use crate::test_support::{ScriptedOracle, ScriptedToolchain, snapshot};

    fn item(id: &str, path: PathBuf, priority: i64) -> WorkItem {
        WorkItem {
            id: id.to_string(),
            path,
            priority,
        }
    }

    #[test]
    fn plan_sorts_stably_and_truncates() {
        let items = vec![
            item("c", PathBuf::from("c.php"), 2),
            item("a", PathBuf::from("a.php"), 1),
            item("b", PathBuf::from("b.php"), 1),
            item("d", PathBuf::from("d.php"), 0),
        ];
        let ids: Vec<String> = plan(items.clone(), None).into_iter().map(|i| i.id).collect();
        assert_eq!(ids, vec!["d", "a", "b", "c"]);

        let ids: Vec<String> = plan(items, Some(2)).into_iter().map(|i| i.id).collect();
        assert_eq!(ids, vec!["d", "a"]);
    }

    #[test]
    fn worklist_paths_resolve_against_its_directory() {
        let temp = tempfile::tempdir().expect("tempdir");
        let path = temp.path().join("worklist.toml");
        fs::write(
            &path,
            "[[item]]\nid = \"order\"\npath = \"src/Order.php\"\npriority = 3\n\n[[item]]\nid = \"abs\"\npath = \"/srv/Cart.php\"\n",
        )
        .expect("write");

        let worklist = load_worklist(&path).expect("load");
        assert_eq!(
            worklist.items,
            vec![
                item("order", temp.path().join("src/Order.php"), 3),
                item("abs", PathBuf::from("/srv/Cart.php"), 0),
            ]
        );
    }

    #[test]
    fn item_errors_are_recorded_and_batch_continues() {
        let temp = tempfile::tempdir().expect("tempdir");
        let good = temp.path().join("Good.php");
        fs::write(&good, "<?php\n").expect("write");
        let repair = RepairLoop::new(
            ScriptedToolchain::new(vec![snapshot(1, 0), snapshot(0, 0)]),
            ScriptedOracle::new(vec![FixResult::Applied("<?php\n// fixed\n".to_string())]),
            LoopSettings::default(),
        )
        .expect("loop");

        let items = vec![
            item("missing", temp.path().join("Missing.php"), 0),
            item("good", good.clone(), 1),
        ];
        let summary = run_batch(&repair, &items, BatchOptions::default());

        assert!(!summary.all_successful);
        assert_eq!(summary.total_processed, 2);
        assert_eq!(summary.success_count, 1);
        assert_eq!(summary.failure_count, 1);

        let missing = &summary.results[0];
        assert!(!missing.success);
        assert_eq!(missing.iterations, 0);
        assert_eq!(missing.final_errors, -1);
        assert_eq!(missing.final_test_failures, -1);
        assert!(
            missing
                .error
                .as_deref()
                .is_some_and(|e| e.contains("does not exist"))
        );

        let good_result = &summary.results[1];
        assert!(good_result.success);
        assert_eq!(good_result.iterations, 2);
        assert_eq!(good_result.final_errors, 0);
        assert_eq!(good_result.error, None);
    }

    #[test]
    fn empty_batch_is_trivially_successful() {
        let repair = RepairLoop::new(
            ScriptedToolchain::default(),
            ScriptedOracle::default(),
            LoopSettings::default(),
        )
        .expect("loop");
        let summary = run_batch(&repair, &[], BatchOptions::default());
        assert!(summary.all_successful);
        assert_eq!(summary.total_processed, 0);
        assert!(summary.results.is_empty());
    }

    #[test]
    fn summary_serializes_with_stable_field_names() {
        let summary = BatchSummary {
            all_successful: true,
            total_processed: 0,
            success_count: 0,
            failure_count: 0,
            results: Vec::new(),
            total_duration_ms: 5,
        };
        let json = serde_json::to_value(&summary).expect("json");
        assert_eq!(json["all_successful"], true);
        assert_eq!(json["total_duration_ms"], 5);
        assert!(json["results"].as_array().is_some_and(Vec::is_empty));
    }
}
