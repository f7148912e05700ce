//! `repair-loop` command line.
//!
//! `run` repairs a single file (or analyzes a directory); `batch` walks a
//! prioritized worklist. Tool layout and oracle settings come from
//! `repair-loop.toml` in the project root.

use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand, ValueEnum};
use serde::Serialize;
use serde_json::json;

use repair_loop::batch::{BatchOptions, BatchSummary, load_worklist, plan, run_batch};
use repair_loop::core::types::LoopResult;
use repair_loop::exit_codes;
use repair_loop::io::config::{DEFAULT_CONFIG_FILE, RepairConfig, load_config};
use repair_loop::io::oracle::{AnthropicOracle, DisabledOracle};
use repair_loop::io::tools::ExternalToolchain;
use repair_loop::logging;
use repair_loop::repair::{LoopSettings, RepairLoop};

#[derive(Parser)]
#[command(
    name = "repair-loop",
    version,
    about = "Drive source files to zero static-analysis errors and zero test failures"
)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Repair one file, or analyze a directory.
    Run(RunArgs),
    /// Run the loop over every item of a worklist, one at a time.
    Batch(BatchArgs),
}

#[derive(Args)]
struct ProjectArgs {
    /// Directory holding the tool binaries (defaults to the current directory).
    #[arg(long)]
    project_root: Option<PathBuf>,

    /// Config file (defaults to `<project-root>/repair-loop.toml`).
    #[arg(long)]
    config: Option<PathBuf>,

    /// Analyze only: the rewriter runs in dry-run mode and no fixes are requested.
    #[arg(long)]
    dry_run: bool,
}

#[derive(Args)]
struct RunArgs {
    /// File or directory to repair.
    target: PathBuf,

    #[command(flatten)]
    project: ProjectArgs,

    #[arg(long, value_enum, default_value_t = OutputFormat::Text)]
    output: OutputFormat,

    /// Override `max_iterations` from the config.
    #[arg(long)]
    max_iterations: Option<u32>,

    /// Write per-iteration audit files here.
    #[arg(long)]
    audit_dir: Option<PathBuf>,
}

#[derive(Args)]
struct BatchArgs {
    /// TOML worklist with `[[item]]` tables (`id`, `path`, `priority`).
    worklist: PathBuf,

    #[command(flatten)]
    project: ProjectArgs,

    /// Process at most this many items after sorting by priority.
    #[arg(long)]
    max_items: Option<usize>,

    /// Pause between items.
    #[arg(long, default_value_t = 5)]
    cooldown_secs: u64,
}

#[derive(Clone, Copy, PartialEq, Eq, ValueEnum)]
enum OutputFormat {
    Text,
    Json,
}

fn main() {
    logging::init("info");
    let cli = Cli::parse();
    let code = match cli.command {
        Command::Run(args) => cmd_run(&args),
        Command::Batch(args) => cmd_batch(&args),
    };
    std::process::exit(code);
}

fn cmd_run(args: &RunArgs) -> i32 {
    match run_target(args) {
        Ok(result) => {
            match args.output {
                OutputFormat::Json => print_json(&result),
                OutputFormat::Text => print_result(&result),
            }
            if result.success {
                exit_codes::OK
            } else {
                exit_codes::EXHAUSTED
            }
        }
        Err(err) => {
            eprintln!("{:#}", err);
            if args.output == OutputFormat::Json {
                print_json(&json!({
                    "success": false,
                    "error": format!("{err:#}"),
                }));
            }
            exit_codes::INVALID
        }
    }
}

fn cmd_batch(args: &BatchArgs) -> i32 {
    match run_worklist(args) {
        Ok(summary) => {
            print_json(&summary);
            if summary.all_successful {
                exit_codes::OK
            } else {
                exit_codes::EXHAUSTED
            }
        }
        Err(err) => {
            eprintln!("{:#}", err);
            exit_codes::INVALID
        }
    }
}

fn run_target(args: &RunArgs) -> Result<LoopResult> {
    let (project_root, mut config) = load_project(&args.project)?;
    if let Some(max) = args.max_iterations {
        config.max_iterations = max;
    }
    if let Some(dir) = &args.audit_dir {
        config.audit_dir = Some(dir.clone());
    }
    config.validate()?;

    let toolchain = ExternalToolchain::new(&project_root, &config);
    let settings = LoopSettings::from_config(&config);
    if args.project.dry_run {
        RepairLoop::new(toolchain, DisabledOracle, settings)?.execute(&args.target, true)
    } else {
        let oracle = AnthropicOracle::from_env(&config.oracle, config.language.clone())?;
        RepairLoop::new(toolchain, oracle, settings)?.execute(&args.target, false)
    }
}

fn run_worklist(args: &BatchArgs) -> Result<BatchSummary> {
    let (project_root, config) = load_project(&args.project)?;
    let worklist = load_worklist(&args.worklist)?;
    let items = plan(worklist.items, args.max_items);
    let options = BatchOptions {
        dry_run: args.project.dry_run,
        cooldown: Duration::from_secs(args.cooldown_secs),
    };

    let toolchain = ExternalToolchain::new(&project_root, &config);
    let settings = LoopSettings::from_config(&config);
    if args.project.dry_run {
        let repair = RepairLoop::new(toolchain, DisabledOracle, settings)?;
        Ok(run_batch(&repair, &items, options))
    } else {
        let oracle = AnthropicOracle::from_env(&config.oracle, config.language.clone())?;
        let repair = RepairLoop::new(toolchain, oracle, settings)?;
        Ok(run_batch(&repair, &items, options))
    }
}

fn load_project(args: &ProjectArgs) -> Result<(PathBuf, RepairConfig)> {
    let project_root = match &args.project_root {
        Some(root) => root.clone(),
        None => std::env::current_dir().context("resolve current directory")?,
    };
    let config_path = args
        .config
        .clone()
        .unwrap_or_else(|| project_root.join(DEFAULT_CONFIG_FILE));
    let config = load_config(&config_path)?;
    Ok((absolute(&project_root)?, config))
}

fn absolute(path: &Path) -> Result<PathBuf> {
    if path.is_absolute() {
        return Ok(path.to_path_buf());
    }
    Ok(std::env::current_dir()
        .context("resolve current directory")?
        .join(path))
}

fn print_json<T: Serialize>(value: &T) {
    match serde_json::to_string_pretty(value) {
        Ok(payload) => println!("{payload}"),
        Err(err) => eprintln!("serialize json output: {err}"),
    }
}

fn print_result(result: &LoopResult) {
    if result.success {
        println!("Gold standard reached after {} iteration(s).", result.iterations);
    } else {
        println!("Repair incomplete after {} iteration(s).", result.iterations);
        println!("  static errors remaining: {}", result.final_errors);
        println!("  test failures remaining: {}", result.final_test_failures);
    }
    println!();
    println!("Iteration history:");
    for record in &result.history {
        println!(
            "  [{}] errors: {} | failures: {} | rewriter: {} | fix: {}",
            record.iteration,
            record.static_errors,
            record.test_failures,
            yes_no(record.rewriter_applied),
            yes_no(record.ai_fix_applied),
        );
    }
}

fn yes_no(flag: bool) -> &'static str {
    if flag { "yes" } else { "no" }
}
