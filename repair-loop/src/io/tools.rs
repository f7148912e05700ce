//! Adapters for the deterministic rewriter, static analyzer and test runner.
//!
//! The [`Toolchain`] trait decouples the loop controller from the actual
//! binaries. Tests use scripted toolchains that return predetermined
//! diagnostics without spawning processes.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use tracing::{debug, info, instrument};

use crate::core::diagnostics::{parse_analyzer_report, parse_test_output};
use crate::core::types::DiagnosticRecord;
use crate::error::RepairError;
use crate::io::config::{AnalyzerConfig, RepairConfig, ToolSpec, ToolsConfig};
use crate::io::process::{CommandOutput, ToolCommand, run_tool};

/// Rewriter exit code meaning "changes were made or would be made".
const REWRITER_CHANGED: i32 = 1;

/// The three external tools the loop drives.
pub trait Toolchain {
    /// Check that every tool binary is present. Called before any iteration runs.
    fn validate(&self) -> Result<()>;

    /// Run the deterministic rewriter. Returns true when it changed (or would change) the target.
    fn rewrite(&self, target: &Path, dry_run: bool) -> Result<bool>;

    /// Run the static analyzer and return its findings.
    fn analyze(&self, target: &Path) -> Result<Vec<DiagnosticRecord>>;

    /// Run the test suite and return its failures.
    fn test(&self, target: &Path) -> Result<Vec<DiagnosticRecord>>;
}

/// Toolchain backed by real binaries under a project root.
#[derive(Debug, Clone)]
pub struct ExternalToolchain {
    project_root: PathBuf,
    tools: ToolsConfig,
    analyzer: AnalyzerConfig,
    timeout: Duration,
    output_limit_bytes: usize,
}

impl ExternalToolchain {
    pub fn new(project_root: impl Into<PathBuf>, config: &RepairConfig) -> Self {
        Self {
            project_root: project_root.into(),
            tools: config.tools.clone(),
            analyzer: config.analyzer.clone(),
            timeout: Duration::from_secs(config.process_timeout_secs),
            output_limit_bytes: config.output_limit_bytes,
        }
    }

    fn vars(&self, target: &Path) -> BTreeMap<&'static str, String> {
        let profile = if self.analyzer.profile.is_absolute() {
            self.analyzer.profile.clone()
        } else {
            self.project_root.join(&self.analyzer.profile)
        };
        BTreeMap::from([
            ("target", target.display().to_string()),
            ("level", self.analyzer.level.to_string()),
            ("profile", profile.display().to_string()),
            ("memory_limit", self.analyzer.memory_limit.clone()),
            ("project_root", self.project_root.display().to_string()),
        ])
    }

    fn run(&self, name: &str, spec: &ToolSpec, args: Vec<String>) -> Result<CommandOutput> {
        let request = ToolCommand {
            program: spec.resolve_binary(&self.project_root),
            args,
            workdir: self.project_root.clone(),
            timeout: self.timeout,
            output_limit_bytes: self.output_limit_bytes,
        };
        run_tool(&request).with_context(|| format!("run {name}"))
    }
}

impl Toolchain for ExternalToolchain {
    fn validate(&self) -> Result<()> {
        for (name, spec) in [
            ("rewriter", &self.tools.rewriter),
            ("analyzer", &self.tools.analyzer),
            ("tests", &self.tools.tests),
        ] {
            let path = spec.resolve_binary(&self.project_root);
            if !path.exists() {
                return Err(RepairError::MissingBinary {
                    name: name.to_string(),
                    path,
                }
                .into());
            }
            debug!(tool = name, path = %path.display(), "found tool binary");
        }
        Ok(())
    }

    #[instrument(skip_all, fields(target = %target.display(), dry_run = dry_run))]
    fn rewrite(&self, target: &Path, dry_run: bool) -> Result<bool> {
        let spec = &self.tools.rewriter;
        let mut args = spec.render_args(&self.vars(target));
        if dry_run && !self.tools.dry_run_flag.is_empty() {
            args.push(self.tools.dry_run_flag.clone());
        }
        let output = self.run("rewriter", spec, args)?;
        let changed = output.exit_code() == Some(REWRITER_CHANGED);
        info!(exit_code = ?output.exit_code(), changed, "rewriter finished");
        Ok(changed)
    }

    #[instrument(skip_all, fields(target = %target.display()))]
    fn analyze(&self, target: &Path) -> Result<Vec<DiagnosticRecord>> {
        let spec = &self.tools.analyzer;
        let output = self.run("analyzer", spec, spec.render_args(&self.vars(target)))?;
        let records = parse_analyzer_report(&output.stdout);
        debug!(exit_code = ?output.exit_code(), findings = records.len(), "analyzer finished");
        Ok(records)
    }

    #[instrument(skip_all, fields(target = %target.display()))]
    fn test(&self, target: &Path) -> Result<Vec<DiagnosticRecord>> {
        let spec = &self.tools.tests;
        let output = self.run("tests", spec, spec.render_args(&self.vars(target)))?;
        let records = parse_test_output(output.success(), &output.combined());
        debug!(exit_code = ?output.exit_code(), failures = records.len(), "tests finished");
        Ok(records)
    }
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use std::fs;

    /// A tool spec that runs `body` through `/bin/sh` with `extra` as `$@`.
    fn sh_tool(body: &str, extra: &[&str]) -> ToolSpec {
        let mut args = vec!["-c".to_string(), body.to_string(), "tool".to_string()];
        args.extend(extra.iter().map(|s| s.to_string()));
        ToolSpec {
            binary: PathBuf::from("/bin/sh"),
            args,
        }
    }

    fn toolchain(root: &Path, tools: ToolsConfig) -> ExternalToolchain {
        let config = RepairConfig {
            tools,
            process_timeout_secs: 10,
            ..RepairConfig::default()
        };
        ExternalToolchain::new(root, &config)
    }

    fn with_rewriter(spec: ToolSpec) -> ToolsConfig {
        ToolsConfig {
            rewriter: spec,
            ..ToolsConfig::default()
        }
    }

    #[test]
    fn validate_reports_first_missing_binary() {
        let temp = tempfile::tempdir().expect("tempdir");
        let bin = temp.path().join("vendor/bin");
        fs::create_dir_all(&bin).expect("mkdir");
        fs::write(bin.join("rector"), "").expect("rector");

        let err = toolchain(temp.path(), ToolsConfig::default())
            .validate()
            .unwrap_err();
        match err.downcast_ref::<RepairError>() {
            Some(RepairError::MissingBinary { name, path }) => {
                assert_eq!(name, "analyzer");
                assert!(path.ends_with("vendor/bin/phpstan"));
            }
            other => panic!("unexpected error: {other:?}"),
        }

        fs::write(bin.join("phpstan"), "").expect("phpstan");
        fs::write(bin.join("pest"), "").expect("pest");
        toolchain(temp.path(), ToolsConfig::default())
            .validate()
            .expect("all binaries present");
    }

    #[test]
    fn rewriter_exit_one_means_changed() {
        let temp = tempfile::tempdir().expect("tempdir");
        let changed = toolchain(temp.path(), with_rewriter(sh_tool("exit 1", &[])))
            .rewrite(Path::new("/src/a.php"), false)
            .expect("rewrite");
        assert!(changed);

        for code in ["exit 0", "exit 2"] {
            let changed = toolchain(temp.path(), with_rewriter(sh_tool(code, &[])))
                .rewrite(Path::new("/src/a.php"), false)
                .expect("rewrite");
            assert!(!changed);
        }
    }

    #[test]
    fn rewriter_receives_dry_run_flag() {
        let temp = tempfile::tempdir().expect("tempdir");
        let spec = sh_tool("echo \"$@\" > args.txt", &["process", "{target}"]);
        toolchain(temp.path(), with_rewriter(spec))
            .rewrite(Path::new("/src/a.php"), true)
            .expect("rewrite");
        let args = fs::read_to_string(temp.path().join("args.txt")).expect("args");
        assert_eq!(args.trim(), "process /src/a.php --dry-run");
    }

    #[test]
    fn analyzer_json_is_parsed_and_garbage_is_zero() {
        let temp = tempfile::tempdir().expect("tempdir");
        let report = r#"echo '{"files":{"a.php":{"messages":[{"message":"m","line":2,"ignorable":false}]}}}'; exit 1"#;
        let tools = ToolsConfig {
            analyzer: sh_tool(report, &[]),
            ..ToolsConfig::default()
        };
        let records = toolchain(temp.path(), tools)
            .analyze(Path::new("a.php"))
            .expect("analyze");
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].line, 2);

        let tools = ToolsConfig {
            analyzer: sh_tool("echo 'PHP Fatal error' >&2; exit 255", &[]),
            ..ToolsConfig::default()
        };
        let records = toolchain(temp.path(), tools)
            .analyze(Path::new("a.php"))
            .expect("analyze");
        assert!(records.is_empty());
    }

    #[test]
    fn test_runner_reads_stdout_and_stderr() {
        let temp = tempfile::tempdir().expect("tempdir");
        let tools = ToolsConfig {
            tests: sh_tool(
                "echo 'FAILED  it works'; echo '  at tests/WorkTest.php:7' >&2; exit 1",
                &[],
            ),
            ..ToolsConfig::default()
        };
        let records = toolchain(temp.path(), tools)
            .test(Path::new("a.php"))
            .expect("test");
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].test_name, "it works");
        assert_eq!(records[0].line, 7);

        let tools = ToolsConfig {
            tests: sh_tool("echo 'FAILED  noise'; exit 0", &[]),
            ..ToolsConfig::default()
        };
        let records = toolchain(temp.path(), tools)
            .test(Path::new("a.php"))
            .expect("test");
        assert!(records.is_empty());
    }
}
