//! Top-level CLI definition and dispatch.

use std::io::{self, IsTerminal, Write};
use std::path::{Path, PathBuf};
use std::time::Duration;

use clap::{Args, CommandFactory, Parser, Subcommand};
use clap_complete::{Shell as CompletionShell, generate};
use colored::{Colorize, control};
use serde_json::{Value, json};
use thiserror::Error;

use fix_owner::core::config::{Config, MAX_VERBOSITY};
use fix_owner::core::errors::FixOwnerError;
use fix_owner::core::paths::{file_timestamp, resolve_absolute_path};
use fix_owner::logger::jsonl::{EventType, JsonlConfig, JsonlWriter, LogEntry, Severity};
use fix_owner::platform::detect_owner_directory;
use fix_owner::report::export::{ReportSettings, ReportWriter, WrittenReports};
use fix_owner::report::remediation::{PriorityThresholds, load_remediation_target};
use fix_owner::scanner::decision::{EntryOutcome, ExecutionMode};
use fix_owner::scanner::failures::FailureRecord;
use fix_owner::scanner::sid_registry::{SidRegistry, SidValidity};
use fix_owner::scanner::walker::{
    EntryReport, OutputLevel, OwnershipWalker, Termination, WalkConfig, WalkObserver, WalkReport,
};

/// Find and repair files and directories owned by deleted accounts.
#[derive(Debug, Parser)]
#[command(
    name = "fixown",
    author,
    version,
    about = "Fix Owner - orphaned ownership remediation",
    long_about = None,
    arg_required_else_help = true
)]
pub struct Cli {
    /// Override config file path.
    #[arg(long, global = true, value_name = "PATH")]
    config: Option<PathBuf>,
    /// Force JSON output mode.
    #[arg(long, global = true)]
    json: bool,
    /// Disable colored output.
    #[arg(long, global = true)]
    no_color: bool,
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Clone, Subcommand)]
enum Command {
    /// Walk a tree and replace orphaned owners (dry run unless --execute).
    Run(RunArgs),
    /// Show the effective (or default) configuration.
    Config(ConfigArgs),
    /// Generate shell completions.
    Completions(CompletionsArgs),
    /// Show version information.
    Version(VersionArgs),
}

#[derive(Debug, Clone, Args)]
struct RunArgs {
    /// Directory to walk. The root itself is never modified.
    #[arg(value_name = "ROOT")]
    root: PathBuf,
    /// Account receiving orphaned entries. Defaults to the current account.
    #[arg(value_name = "OWNER", conflicts_with = "remediation_plan")]
    owner: Option<String>,
    /// Apply ownership changes. Without it nothing is written.
    #[arg(short = 'x', long)]
    execute: bool,
    /// Recurse into subdirectories.
    #[arg(short, long)]
    recurse: bool,
    /// Process files as well as directories.
    #[arg(short, long)]
    files: bool,
    /// Console verbosity, 0 through 3.
    #[arg(
        short,
        long,
        value_name = "LEVEL",
        value_parser = clap::value_parser!(u8).range(0..=3),
        conflicts_with = "quiet"
    )]
    verbose: Option<u8>,
    /// Print nothing but fatal errors.
    #[arg(short, long)]
    quiet: bool,
    /// Stop after this many seconds; 0 means no limit.
    #[arg(short, long, value_name = "SECONDS")]
    timeout: Option<u64>,
    /// Tally owners per SID and export analysis reports.
    #[arg(short = 's', long)]
    track_sids: bool,
    /// Take the target account from an exported remediation plan.
    #[arg(long, value_name = "FILE")]
    remediation_plan: Option<PathBuf>,
    /// Directory for exports and failure logs.
    #[arg(long, value_name = "DIR")]
    output_dir: Option<PathBuf>,
    /// Append JSONL activity events to this file.
    #[arg(long, value_name = "PATH")]
    log: Option<PathBuf>,
}

#[derive(Debug, Clone, Args, Default)]
struct ConfigArgs {
    /// Print built-in defaults instead of the effective configuration.
    #[arg(long = "default")]
    defaults: bool,
}

#[derive(Debug, Clone, Args)]
struct CompletionsArgs {
    /// Shell to generate completion script for.
    #[arg(value_enum)]
    shell: CompletionShell,
}

#[derive(Debug, Clone, Args, Default)]
struct VersionArgs {
    /// Include build metadata.
    #[arg(long)]
    verbose: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum OutputMode {
    Human,
    Json,
}

/// CLI error type with explicit exit-code mapping.
#[derive(Debug, Error)]
pub enum CliError {
    /// Bad input: flags, config values, remediation plan.
    #[error("{0}")]
    User(String),
    /// Pre-condition or environment failure.
    #[error("{0}")]
    Runtime(String),
    /// Internal bug or invariant violation.
    #[error("{0}")]
    Internal(String),
    #[error("failed to serialize output: {0}")]
    Json(#[from] serde_json::Error),
    #[error("failed to write output: {0}")]
    Io(#[from] io::Error),
}

impl CliError {
    /// Process exit code contract for the CLI.
    pub const fn exit_code(&self) -> i32 {
        match self {
            Self::User(_) => 1,
            Self::Runtime(_) | Self::Io(_) => 2,
            Self::Internal(_) | Self::Json(_) => 3,
        }
    }
}

impl From<FixOwnerError> for CliError {
    fn from(err: FixOwnerError) -> Self {
        match err {
            FixOwnerError::InvalidConfig { .. }
            | FixOwnerError::MissingConfig { .. }
            | FixOwnerError::ConfigParse { .. }
            | FixOwnerError::RemediationPlan { .. }
            | FixOwnerError::InvalidSid { .. } => Self::User(err.to_string()),
            FixOwnerError::Serialization { .. } => Self::Internal(err.to_string()),
            _ => Self::Runtime(err.to_string()),
        }
    }
}

pub fn run(cli: &Cli) -> Result<(), CliError> {
    if cli.no_color {
        control::set_override(false);
    }

    match &cli.command {
        Command::Run(args) => run_walk(cli, args),
        Command::Config(args) => run_config(cli, args),
        Command::Version(args) => emit_version(cli, args),
        Command::Completions(args) => {
            let mut command = Cli::command();
            let binary_name = command.get_name().to_string();
            generate(args.shell, &mut command, binary_name, &mut io::stdout());
            Ok(())
        }
    }
}

// ---------------------------------------------------------------------------
// run
// ---------------------------------------------------------------------------

/// Flags merged over config defaults.
#[derive(Debug, Clone)]
struct RunSettings {
    walk: WalkConfig,
    output_dir: PathBuf,
    activity_log: Option<PathBuf>,
    report: ReportSettings,
}

fn merge_settings(args: &RunArgs, config: &Config, target_account: String) -> RunSettings {
    let verbosity = args.verbose.unwrap_or(config.walk.verbosity).min(MAX_VERBOSITY);
    let timeout_secs = args.timeout.unwrap_or(config.walk.timeout_secs);

    RunSettings {
        walk: WalkConfig {
            root: resolve_absolute_path(&args.root),
            mode: ExecutionMode::from_execute_flag(args.execute),
            recurse: args.recurse || config.walk.recurse,
            include_files: args.files || config.walk.include_files,
            target_account,
            time_budget: (timeout_secs > 0).then(|| Duration::from_secs(timeout_secs)),
            output: OutputLevel::new(args.quiet, verbosity),
            track_sids: args.track_sids || config.walk.track_sids,
        },
        output_dir: args
            .output_dir
            .clone()
            .unwrap_or_else(|| config.report.output_dir.clone()),
        activity_log: args
            .log
            .clone()
            .or_else(|| config.report.activity_log.clone()),
        report: ReportSettings {
            failure_log: config.report.failure_log,
            thresholds: PriorityThresholds {
                high_pct: config.report.high_priority_pct,
                medium_pct: config.report.medium_priority_pct,
            },
            config_hash: config.stable_hash().ok(),
        },
    }
}

fn run_walk(cli: &Cli, args: &RunArgs) -> Result<(), CliError> {
    let config = Config::load(cli.config.as_deref())?;
    let directory = detect_owner_directory()?;

    let target_account = match (&args.remediation_plan, &args.owner) {
        (Some(plan), _) => load_remediation_target(plan)?,
        (None, Some(owner)) => owner.clone(),
        (None, None) => directory.current_account()?,
    };

    let settings = merge_settings(args, &config, target_account);
    let mode = output_mode(cli);
    let run_id = format!(
        "{}-{}",
        file_timestamp(chrono::Utc::now()),
        std::process::id()
    );

    let mut activity = settings
        .activity_log
        .as_ref()
        .map(|path| JsonlWriter::open(JsonlConfig::at(path)));

    if let Some(log) = activity.as_mut() {
        log.write_entry(
            &LogEntry::new(EventType::RunStart, Severity::Info)
                .with_run_id(&run_id)
                .with_details(format!(
                    "root={} target={} mode={} recurse={} files={}",
                    settings.walk.root.display(),
                    settings.walk.target_account,
                    settings.walk.mode,
                    settings.walk.recurse,
                    settings.walk.include_files,
                )),
        );
    }

    let human = mode == OutputMode::Human;
    if human && settings.walk.output.verbosity() >= 1 {
        print_startup(&settings.walk);
    }

    let walker = OwnershipWalker::new(&settings.walk, directory.as_ref());
    let outcome = {
        let mut observer = CliObserver {
            level: settings.walk.output,
            human,
            run_id: &run_id,
            activity: activity.as_mut(),
        };
        walker.walk_with(&mut observer)
    };

    let report = match outcome {
        Ok(report) => report,
        Err(err) => {
            if let Some(log) = activity.as_mut() {
                log.write_entry(&LogEntry::fatal(&err).with_run_id(&run_id));
            }
            return Err(err.into());
        }
    };

    let writer = ReportWriter::new(&settings.output_dir, report.stats.started_at());
    let (written, report_error) = match writer.write_all(&report, &settings.report) {
        Ok(written) => (written, None),
        Err(err) => {
            eprintln!("[FXO-REPORT] {err}");
            (WrittenReports::default(), Some(err))
        }
    };

    if let Some(log) = activity.as_mut() {
        log.write_entry(
            &LogEntry::new(EventType::RunComplete, Severity::Info)
                .with_run_id(&run_id)
                .with_stats(report.stats.snapshot())
                .with_details(report.termination.label()),
        );
        log.flush();
    }

    match mode {
        OutputMode::Human => {
            if !settings.walk.output.is_silent() {
                print_run_summary(&report, &written);
            }
        }
        OutputMode::Json => write_json_line(&run_payload(&report, &written)?)?,
    }

    match report_error {
        Some(err) => Err(CliError::Runtime(format!("walk finished but reports failed: {err}"))),
        None => Ok(()),
    }
}

/// Console and activity-log sink for walk progress.
///
/// Verbosity 1 shows changes and failures, 2 adds every examined entry,
/// 3 adds directory entry. JSON mode keeps stdout for the final payload.
struct CliObserver<'a> {
    level: OutputLevel,
    human: bool,
    run_id: &'a str,
    activity: Option<&'a mut JsonlWriter>,
}

impl CliObserver<'_> {
    fn console(&self, min_level: u8) -> bool {
        self.human && self.level.verbosity() >= min_level
    }

    fn log(&mut self, entry: LogEntry) {
        if let Some(log) = self.activity.as_deref_mut() {
            log.write_entry(&entry.with_run_id(self.run_id));
        }
    }

    fn report_failure(&mut self, failure: &FailureRecord) {
        self.log(LogEntry::failure(failure));
        if self.console(1) {
            eprintln!(
                "{} {} {}: {}",
                "ERROR".red().bold(),
                failure.kind.label(),
                failure.path.display(),
                failure.message
            );
        }
    }
}

impl WalkObserver for CliObserver<'_> {
    fn on_directory_entered(&mut self, path: &Path, depth: usize) {
        if self.console(3) {
            println!("{} {} (depth {depth})", "Entering".dimmed(), path.display());
        }
    }

    fn on_entry(&mut self, entry: &EntryReport) {
        if self.console(2) {
            let owner = entry
                .classification
                .as_ref()
                .map_or_else(|| "?".to_string(), |c| {
                    c.display_name()
                        .map_or_else(|| format!("{} ({})", c.sid(), c.label()), str::to_string)
                });
            println!("Examining {}: {} [{owner}]", entry.kind.label(), entry.path.display());
        }

        let old_owner = entry.owner.as_ref().map(ToString::to_string).unwrap_or_default();
        let new_owner = entry.new_owner.as_ref().map(ToString::to_string).unwrap_or_default();
        match entry.outcome {
            EntryOutcome::Changed => {
                self.log(
                    LogEntry::new(EventType::OwnerChanged, Severity::Info)
                        .with_path(&entry.path, entry.kind)
                        .with_owners(&old_owner, &new_owner),
                );
                if self.console(1) {
                    println!(
                        "{} {} {} (was {old_owner})",
                        "Changed".green(),
                        entry.kind.label(),
                        entry.path.display()
                    );
                }
            }
            EntryOutcome::SkippedByPolicy => {
                self.log(
                    LogEntry::new(EventType::WouldChange, Severity::Info)
                        .with_path(&entry.path, entry.kind)
                        .with_owners(&old_owner, &new_owner),
                );
                if self.console(1) {
                    println!(
                        "{} {} {} (owner {old_owner})",
                        "Would change".yellow(),
                        entry.kind.label(),
                        entry.path.display()
                    );
                }
            }
            EntryOutcome::Failed => {
                if let Some(failure) = &entry.failure {
                    self.report_failure(failure);
                }
            }
            EntryOutcome::SkippedValid => {}
        }
    }

    fn on_failure(&mut self, failure: &FailureRecord) {
        self.report_failure(failure);
    }

    fn on_timeout(&mut self, elapsed: Duration, budget: Duration) {
        self.log(
            LogEntry::new(EventType::Timeout, Severity::Warning).with_details(format!(
                "elapsed={:.3}s budget={}s",
                elapsed.as_secs_f64(),
                budget.as_secs()
            )),
        );
        if !self.level.is_silent() {
            eprintln!(
                "[FXO-TIMEOUT] time budget of {} exhausted after {}; stopping early",
                format_duration(budget),
                format_duration(elapsed)
            );
        }
    }
}

fn print_startup(walk: &WalkConfig) {
    println!("Root:   {}", walk.root.display());
    println!("Owner:  {}", walk.target_account);
    println!(
        "Scope:  directories{}{}",
        if walk.include_files { " + files" } else { "" },
        if walk.recurse { ", recursive" } else { ", first level only" }
    );
    if let Some(budget) = walk.time_budget {
        println!("Budget: {}", format_duration(budget));
    }
    match walk.mode {
        ExecutionMode::Simulate => println!(
            "{}",
            "DRY RUN: no ownership will be changed (use --execute to apply)".yellow().bold()
        ),
        ExecutionMode::Execute => println!("{}", "EXECUTE: ownership changes will be applied".red().bold()),
    }
    println!();
}

fn print_run_summary(report: &WalkReport, written: &WrittenReports) {
    let stats = &report.stats;
    println!();
    match report.termination {
        Termination::Completed => println!("{}", "=== Walk completed ===".bold()),
        Termination::TimedOut { .. } => {
            println!("{}", "=== Walk TIMED OUT (partial results) ===".yellow().bold());
        }
    }
    println!("  Directories traversed: {}", stats.dirs_seen());
    println!("  Files traversed:       {}", stats.files_seen());
    match report.mode {
        ExecutionMode::Execute => {
            println!("  Directories changed:   {}", stats.dirs_changed());
            println!("  Files changed:         {}", stats.files_changed());
        }
        ExecutionMode::Simulate => {
            println!("  Directories to change: {}", stats.dirs_would_change());
            println!("  Files to change:       {}", stats.files_would_change());
        }
    }
    let exceptions = format!("{}", stats.exceptions());
    println!(
        "  Exceptions:            {}",
        if stats.has_errors() { exceptions.red().to_string() } else { exceptions }
    );
    println!("  Duration:              {}", format_duration(stats.elapsed()));

    if let Some(registry) = &report.sid_registry {
        print_sid_table(registry);
    }

    if !written.is_empty() {
        println!();
        println!("Reports:");
        for path in [&written.analysis, &written.remediation_plan, &written.failure_log]
            .into_iter()
            .flatten()
        {
            println!("  {}", path.display());
        }
    }
}

fn print_sid_table(registry: &SidRegistry) {
    let summary = registry.summary();
    println!();
    println!("{}", "=== SID ownership ===".bold());
    println!(
        "  {} unique SIDs: {} valid, {} orphaned, {} unknown",
        summary.unique_sids, summary.valid_sids, summary.orphaned_sids, summary.unknown_sids
    );
    if registry.is_empty() {
        return;
    }
    println!();
    println!(
        "  {:<44}  {:<20}  {:<9}  {:>7}  {:>7}  {:>7}",
        "SID", "Account", "Status", "Files", "Dirs", "Total"
    );
    println!("  {}", "-".repeat(102));
    for record in registry.snapshot() {
        let status = match record.validity {
            SidValidity::Valid => "valid".green(),
            SidValidity::Orphaned => "orphaned".red(),
            SidValidity::Unknown => "unknown".yellow(),
        };
        println!(
            "  {:<44}  {:<20}  {:<9}  {:>7}  {:>7}  {:>7}",
            record.sid.as_str(),
            record.display_name,
            status,
            record.file_count,
            record.dir_count,
            record.total()
        );
    }
}

fn run_payload(report: &WalkReport, written: &WrittenReports) -> Result<Value, CliError> {
    let sids = report
        .sid_registry
        .as_ref()
        .map(|registry| -> Result<Value, CliError> {
            Ok(json!({
                "summary": serde_json::to_value(registry.summary())?,
                "records": serde_json::to_value(registry.snapshot())?,
            }))
        })
        .transpose()?;

    Ok(json!({
        "command": "run",
        "root": report.root.to_string_lossy(),
        "mode": report.mode,
        "target": serde_json::to_value(&report.target)?,
        "termination": serde_json::to_value(report.termination)?,
        "stats": serde_json::to_value(report.stats.snapshot())?,
        "failures": serde_json::to_value(&report.failures)?,
        "sids": sids,
        "reports": serde_json::to_value(written)?,
    }))
}

// ---------------------------------------------------------------------------
// config / version
// ---------------------------------------------------------------------------

fn run_config(cli: &Cli, args: &ConfigArgs) -> Result<(), CliError> {
    let config = if args.defaults {
        Config::default()
    } else {
        Config::load(cli.config.as_deref())?
    };
    let source = if args.defaults {
        "defaults".to_string()
    } else {
        config.paths.config_file.display().to_string()
    };
    let hash = config.stable_hash()?;

    match output_mode(cli) {
        OutputMode::Human => {
            let toml_str = toml::to_string_pretty(&config)
                .map_err(|e| CliError::Internal(format!("serialize config: {e}")))?;
            println!("# source: {source}");
            println!("# hash: {hash}");
            println!("{toml_str}");
        }
        OutputMode::Json => {
            let payload = json!({
                "command": "config",
                "source": source,
                "hash": hash,
                "config": serde_json::to_value(&config)?,
            });
            write_json_line(&payload)?;
        }
    }
    Ok(())
}

fn emit_version(cli: &Cli, args: &VersionArgs) -> Result<(), CliError> {
    let version = env!("CARGO_PKG_VERSION");
    let package = env!("CARGO_PKG_NAME");
    let target = option_env!("TARGET").unwrap_or("unknown");
    let profile = option_env!("PROFILE").unwrap_or("unknown");

    match output_mode(cli) {
        OutputMode::Human => {
            println!("fixown {version}");
            if args.verbose {
                println!("package: {package}");
                println!("target: {target}");
                println!("profile: {profile}");
            }
        }
        OutputMode::Json => {
            let payload = json!({
                "binary": "fixown",
                "version": version,
                "package": package,
                "build": {
                    "target": target,
                    "profile": profile,
                }
            });
            write_json_line(&payload)?;
        }
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// output helpers
// ---------------------------------------------------------------------------

fn format_duration(duration: Duration) -> String {
    let secs = duration.as_secs();
    if secs < 60 {
        format!("{:.2}s", duration.as_secs_f64())
    } else if secs < 3600 {
        format!("{}m {}s", secs / 60, secs % 60)
    } else {
        format!("{}h {}m", secs / 3600, (secs % 3600) / 60)
    }
}

fn write_json_line(payload: &Value) -> Result<(), CliError> {
    let mut stdout = io::stdout().lock();
    serde_json::to_writer(&mut stdout, payload)?;
    writeln!(stdout)?;
    Ok(())
}

fn output_mode(cli: &Cli) -> OutputMode {
    let env_mode = std::env::var("FIXOWN_OUTPUT_FORMAT").ok();
    resolve_output_mode(cli.json, env_mode.as_deref(), io::stdout().is_terminal())
}

fn resolve_output_mode(json_flag: bool, env_mode: Option<&str>, stdout_is_tty: bool) -> OutputMode {
    if json_flag {
        return OutputMode::Json;
    }

    let fallback = if stdout_is_tty {
        OutputMode::Human
    } else {
        OutputMode::Json
    };

    match env_mode
        .map(str::trim)
        .map(str::to_ascii_lowercase)
        .as_deref()
    {
        Some("json") => OutputMode::Json,
        Some("human") => OutputMode::Human,
        _ => fallback,
    }
}
