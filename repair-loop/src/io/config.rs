//! Repair loop configuration stored in `repair-loop.toml`.

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use crate::core::language::LanguageProfile;
use crate::error::RepairError;

pub const DEFAULT_CONFIG_FILE: &str = "repair-loop.toml";

/// Repair loop configuration (TOML).
///
/// Missing fields default to the PHP toolchain layout (`vendor/bin/rector`,
/// `vendor/bin/phpstan`, `vendor/bin/pest`).
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct RepairConfig {
    /// Upper bound on analyze/repair passes.
    pub max_iterations: u32,

    /// Wall-clock limit for every external tool invocation.
    pub process_timeout_secs: u64,

    /// Keep at most this many bytes of each tool's stdout/stderr.
    pub output_limit_bytes: usize,

    /// Write per-iteration audit files under this directory.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub audit_dir: Option<PathBuf>,

    pub tools: ToolsConfig,
    pub analyzer: AnalyzerConfig,
    pub oracle: OracleConfig,
    pub language: LanguageProfile,
}

/// Binary and argument template for one external tool.
///
/// `args` may contain `{target}`, `{level}`, `{profile}`, `{memory_limit}`
/// and `{project_root}` placeholders.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ToolSpec {
    /// Relative paths resolve against the project root.
    pub binary: PathBuf,
    /// Omitted means no arguments.
    #[serde(default)]
    pub args: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct ToolsConfig {
    pub rewriter: ToolSpec,
    pub analyzer: ToolSpec,
    pub tests: ToolSpec,
    /// Appended to the rewriter arguments in dry-run mode.
    pub dry_run_flag: String,
}

impl Default for ToolsConfig {
    fn default() -> Self {
        Self {
            rewriter: ToolSpec {
                binary: PathBuf::from("vendor/bin/rector"),
                args: vec!["process".to_string(), "{target}".to_string()],
            },
            analyzer: ToolSpec {
                binary: PathBuf::from("vendor/bin/phpstan"),
                args: [
                    "analyse",
                    "{target}",
                    "--level={level}",
                    "-c",
                    "{profile}",
                    "--error-format=json",
                    "--no-progress",
                    "--memory-limit={memory_limit}",
                ]
                .iter()
                .map(|s| s.to_string())
                .collect(),
            },
            tests: ToolSpec {
                binary: PathBuf::from("vendor/bin/pest"),
                args: vec!["--colors=never".to_string()],
            },
            dry_run_flag: "--dry-run".to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct AnalyzerConfig {
    /// Strictness level handed to the analyzer.
    pub level: u32,
    /// Minimal configuration profile for files outside the project.
    pub profile: PathBuf,
    pub memory_limit: String,
}

impl Default for AnalyzerConfig {
    fn default() -> Self {
        Self {
            level: 9,
            profile: PathBuf::from("phpstan-external.neon"),
            memory_limit: "2G".to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct OracleConfig {
    pub model: String,
    pub max_tokens: u32,
    /// Overrides `ANTHROPIC_BASE_URL` when set.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub base_url: Option<String>,
    pub timeout_secs: u64,
}

impl Default for OracleConfig {
    fn default() -> Self {
        Self {
            model: "claude-sonnet-4-20250514".to_string(),
            max_tokens: 8192,
            base_url: None,
            timeout_secs: 300,
        }
    }
}

impl Default for RepairConfig {
    fn default() -> Self {
        Self {
            max_iterations: 10,
            process_timeout_secs: 300,
            output_limit_bytes: 10_000_000,
            audit_dir: None,
            tools: ToolsConfig::default(),
            analyzer: AnalyzerConfig::default(),
            oracle: OracleConfig::default(),
            language: LanguageProfile::default(),
        }
    }
}

impl RepairConfig {
    pub fn validate(&self) -> Result<()> {
        if self.max_iterations == 0 {
            return invalid("max_iterations must be > 0");
        }
        if self.process_timeout_secs == 0 {
            return invalid("process_timeout_secs must be > 0");
        }
        if self.output_limit_bytes == 0 {
            return invalid("output_limit_bytes must be > 0");
        }
        for (name, spec) in [
            ("rewriter", &self.tools.rewriter),
            ("analyzer", &self.tools.analyzer),
            ("tests", &self.tools.tests),
        ] {
            if spec.binary.as_os_str().is_empty() {
                return invalid(format!("tools.{name}.binary must be set"));
            }
        }
        if self.oracle.max_tokens == 0 {
            return invalid("oracle.max_tokens must be > 0");
        }
        if self.oracle.timeout_secs == 0 {
            return invalid("oracle.timeout_secs must be > 0");
        }
        if self.language.fence_tag.trim().is_empty() {
            return invalid("language.fence_tag must be set");
        }
        if self.language.extension.trim().is_empty() {
            return invalid("language.extension must be set");
        }
        Ok(())
    }
}

fn invalid(msg: impl Into<String>) -> Result<()> {
    Err(RepairError::InvalidConfig(msg.into()).into())
}

impl ToolSpec {
    /// Binary path, resolved against `project_root` when relative.
    pub fn resolve_binary(&self, project_root: &Path) -> PathBuf {
        if self.binary.is_absolute() {
            self.binary.clone()
        } else {
            project_root.join(&self.binary)
        }
    }

    /// Arguments with every `{key}` placeholder replaced from `vars`.
    pub fn render_args(&self, vars: &BTreeMap<&str, String>) -> Vec<String> {
        self.args
            .iter()
            .map(|arg| {
                vars.iter().fold(arg.clone(), |acc, (key, value)| {
                    acc.replace(&format!("{{{key}}}"), value)
                })
            })
            .collect()
    }
}

/// Load config from a TOML file.
///
/// If the file is missing, returns `RepairConfig::default()`.
pub fn load_config(path: &Path) -> Result<RepairConfig> {
    if !path.exists() {
        let cfg = RepairConfig::default();
        cfg.validate()?;
        return Ok(cfg);
    }
    let contents = fs::read_to_string(path).with_context(|| format!("read {}", path.display()))?;
    let cfg: RepairConfig =
        toml::from_str(&contents).with_context(|| format!("parse {}", path.display()))?;
    cfg.validate()?;
    Ok(cfg)
}

/// Atomically write config to disk (temp file + rename).
pub fn write_config(path: &Path, cfg: &RepairConfig) -> Result<()> {
    cfg.validate()?;
    let mut buf = toml::to_string_pretty(cfg).context("serialize config toml")?;
    buf.push('\n');
    write_atomic(path, &buf)
}

fn write_atomic(path: &Path, contents: &str) -> Result<()> {
    let parent = path
        .parent()
        .with_context(|| format!("config path missing parent {}", path.display()))?;
    fs::create_dir_all(parent).with_context(|| format!("create directory {}", parent.display()))?;
    let tmp_path = path.with_extension("toml.tmp");
    fs::write(&tmp_path, contents)
        .with_context(|| format!("write temp config {}", tmp_path.display()))?;
    fs::rename(&tmp_path, path).with_context(|| format!("replace config {}", path.display()))?;
    Ok(())
}
