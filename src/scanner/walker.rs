//! Ownership remediation walk.
//!
//! Single-threaded, top-down traversal of one tree. Every examined entry goes
//! through the same sequence: read owner, classify, record, decide, act,
//! count. Failures of a single entry are captured as [`FailureRecord`]s and
//! the walk moves on; only pre-condition failures (bad root, bad target,
//! missing privilege) unwind out of [`OwnershipWalker::walk`].
//!
//! Traversal order within a directory is deterministic: children are sorted
//! by file name, subdirectories are processed before files, and recursion
//! happens only after the whole level has been handled.

#![allow(missing_docs)]

use std::ffi::OsString;
use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Serialize;

use crate::core::errors::{FixOwnerError, Result};
use crate::platform::owner::{OwnerClassification, OwnerDirectory, Sid};
use crate::scanner::decision::{Decision, EntryOutcome, ExecutionMode, decide};
use crate::scanner::failures::{EntryFailure, FailureRecord, FailureStage};
use crate::scanner::sid_registry::SidRegistry;
use crate::scanner::stats::{EntryKind, WalkStatistics};
use crate::scanner::timeout::TimeoutGuard;

/// Console output level. `Silent` wins over any verbosity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum OutputLevel {
    Silent,
    Verbose(u8),
}

impl OutputLevel {
    #[must_use]
    pub const fn new(quiet: bool, verbosity: u8) -> Self {
        if quiet {
            Self::Silent
        } else {
            Self::Verbose(verbosity)
        }
    }

    /// Effective verbosity; 0 when silent.
    #[must_use]
    pub const fn verbosity(self) -> u8 {
        match self {
            Self::Silent => 0,
            Self::Verbose(level) => level,
        }
    }

    #[must_use]
    pub const fn is_silent(self) -> bool {
        matches!(self, Self::Silent)
    }
}

/// Immutable per-run configuration.
#[derive(Debug, Clone)]
pub struct WalkConfig {
    pub root: PathBuf,
    pub mode: ExecutionMode,
    pub recurse: bool,
    pub include_files: bool,
    /// Account that receives orphaned entries.
    pub target_account: String,
    pub time_budget: Option<Duration>,
    pub output: OutputLevel,
    pub track_sids: bool,
}

impl WalkConfig {
    /// Simulated, first-level-only walk with no budget.
    #[must_use]
    pub fn new(root: impl Into<PathBuf>, target_account: impl Into<String>) -> Self {
        Self {
            root: root.into(),
            mode: ExecutionMode::Simulate,
            recurse: false,
            include_files: false,
            target_account: target_account.into(),
            time_budget: None,
            output: OutputLevel::Verbose(1),
            track_sids: false,
        }
    }
}

/// Target owner after validation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ResolvedTarget {
    pub account: String,
    pub sid: Sid,
    pub display_name: String,
}

/// How the walk ended.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum Termination {
    Completed,
    TimedOut { elapsed_secs: f64, budget_secs: f64 },
}

impl Termination {
    #[must_use]
    pub const fn is_timed_out(&self) -> bool {
        matches!(self, Self::TimedOut { .. })
    }

    #[must_use]
    pub const fn label(&self) -> &'static str {
        match self {
            Self::Completed => "completed",
            Self::TimedOut { .. } => "timed_out",
        }
    }
}

/// Everything the walk produced.
#[derive(Debug, Clone)]
pub struct WalkReport {
    pub root: PathBuf,
    pub mode: ExecutionMode,
    pub target: ResolvedTarget,
    pub stats: WalkStatistics,
    pub sid_registry: Option<SidRegistry>,
    pub failures: Vec<FailureRecord>,
    pub termination: Termination,
}

/// One processed entry, handed to the observer and then dropped.
#[derive(Debug, Clone, Serialize)]
pub struct EntryReport {
    pub path: PathBuf,
    pub kind: EntryKind,
    pub depth: usize,
    pub owner: Option<Sid>,
    pub classification: Option<OwnerClassification>,
    /// Owner written, or that would be written in a simulated run.
    pub new_owner: Option<Sid>,
    pub outcome: EntryOutcome,
    pub failure: Option<FailureRecord>,
}

/// Progress hooks. Observers see what happened; they cannot steer the walk.
pub trait WalkObserver {
    fn on_directory_entered(&mut self, _path: &Path, _depth: usize) {}
    fn on_entry(&mut self, _entry: &EntryReport) {}
    /// A failure not tied to a processed entry (directory listing).
    fn on_failure(&mut self, _failure: &FailureRecord) {}
    fn on_timeout(&mut self, _elapsed: Duration, _budget: Duration) {}
}

/// Observer that ignores everything.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopObserver;

impl WalkObserver for NoopObserver {}

/// Mutable state owned by one walk invocation.
struct WalkState<'o> {
    stats: WalkStatistics,
    registry: Option<SidRegistry>,
    failures: Vec<FailureRecord>,
    guard: TimeoutGuard,
    observer: &'o mut dyn WalkObserver,
}

impl WalkState<'_> {
    /// Poll the budget; notify the observer on the first expiry seen.
    fn check_timeout(&mut self) -> Option<Termination> {
        if !self.guard.expired() {
            return None;
        }
        let elapsed = self.guard.elapsed();
        let budget = self.guard.budget().unwrap_or_default();
        self.observer.on_timeout(elapsed, budget);
        Some(Termination::TimedOut {
            elapsed_secs: elapsed.as_secs_f64(),
            budget_secs: budget.as_secs_f64(),
        })
    }

    fn absorb(&mut self, record: FailureRecord) {
        self.stats.inc_exceptions();
        self.failures.push(record);
    }
}

/// A child discovered while listing a directory.
struct Child {
    name: OsString,
    path: PathBuf,
    kind: EntryKind,
    /// Real directory (not a link) eligible for recursion.
    descend: bool,
}

/// Drives one remediation walk over `config.root`.
pub struct OwnershipWalker<'a> {
    config: &'a WalkConfig,
    directory: &'a dyn OwnerDirectory,
}

impl<'a> OwnershipWalker<'a> {
    pub fn new(config: &'a WalkConfig, directory: &'a dyn OwnerDirectory) -> Self {
        Self { config, directory }
    }

    /// Run the walk without progress hooks.
    pub fn walk(&self) -> Result<WalkReport> {
        self.walk_with(&mut NoopObserver)
    }

    /// Run the walk, reporting progress to `observer`.
    ///
    /// Returns `Err` only for pre-condition failures, in which case no entry
    /// has been examined. A timed-out walk is `Ok` with
    /// [`Termination::TimedOut`] and the statistics gathered so far.
    pub fn walk_with(&self, observer: &mut dyn WalkObserver) -> Result<WalkReport> {
        let target = self.resolve_target()?;
        if self.config.mode.is_execute() {
            self.directory.check_privileges()?;
        }
        validate_root(&self.config.root)?;

        let mut state = WalkState {
            stats: WalkStatistics::new(),
            registry: self.config.track_sids.then(SidRegistry::new),
            failures: Vec::new(),
            guard: TimeoutGuard::new(self.config.time_budget),
            observer,
        };

        let termination = self.traverse(&target, &mut state)?;

        Ok(WalkReport {
            root: self.config.root.clone(),
            mode: self.config.mode,
            target,
            stats: state.stats,
            sid_registry: state.registry,
            failures: state.failures,
            termination,
        })
    }

    /// Resolve the target account and insist it classifies as valid.
    pub fn resolve_target(&self) -> Result<ResolvedTarget> {
        let account = self.config.target_account.trim();
        if account.is_empty() {
            return Err(FixOwnerError::TargetOwnerInvalid {
                account: String::new(),
                details: "no target account given".to_string(),
            });
        }

        let sid = self.directory.resolve(account).map_err(|err| match err {
            FixOwnerError::AccountNotFound { .. } | FixOwnerError::TargetOwnerInvalid { .. } => {
                err
            }
            other => FixOwnerError::TargetOwnerInvalid {
                account: account.to_string(),
                details: other.to_string(),
            },
        })?;

        match self.directory.classify(&sid) {
            OwnerClassification::Valid { sid, name } => Ok(ResolvedTarget {
                account: account.to_string(),
                sid,
                display_name: name,
            }),
            OwnerClassification::Orphaned { sid } => Err(FixOwnerError::TargetOwnerInvalid {
                account: account.to_string(),
                details: format!("{sid} is orphaned"),
            }),
            OwnerClassification::Unresolvable { sid, reason } => {
                Err(FixOwnerError::TargetOwnerInvalid {
                    account: account.to_string(),
                    details: format!("{sid} could not be resolved: {reason}"),
                })
            }
        }
    }

    fn traverse(&self, target: &ResolvedTarget, state: &mut WalkState<'_>) -> Result<Termination> {
        let mut stack: Vec<(PathBuf, usize)> = vec![(self.config.root.clone(), 0)];

        while let Some((dir, depth)) = stack.pop() {
            if let Some(timed_out) = state.check_timeout() {
                return Ok(timed_out);
            }
            state.observer.on_directory_entered(&dir, depth);

            let children = match list_children(&dir) {
                Ok((children, entry_errors)) => {
                    for (path, source) in entry_errors {
                        self.absorb_listing_failure(state, path, source);
                    }
                    children
                }
                Err(source) if depth == 0 => {
                    return Err(FixOwnerError::InvalidRoot {
                        path: dir,
                        details: source.to_string(),
                    });
                }
                Err(source) => {
                    self.absorb_listing_failure(state, dir, source);
                    continue;
                }
            };

            let (dirs, files): (Vec<Child>, Vec<Child>) = children
                .into_iter()
                .partition(|child| child.kind == EntryKind::Directory);

            let mut descend_into = Vec::new();
            for child in dirs {
                if let Some(timed_out) = state.check_timeout() {
                    return Ok(timed_out);
                }
                self.visit(&child, depth + 1, target, state);
                if self.config.recurse && child.descend {
                    descend_into.push(child.path);
                }
            }

            if self.config.include_files {
                for child in files {
                    if let Some(timed_out) = state.check_timeout() {
                        return Ok(timed_out);
                    }
                    self.visit(&child, depth + 1, target, state);
                }
            }

            // Reverse so the first child is popped first.
            for path in descend_into.into_iter().rev() {
                stack.push((path, depth + 1));
            }
        }

        Ok(Termination::Completed)
    }

    fn visit(&self, child: &Child, depth: usize, target: &ResolvedTarget, state: &mut WalkState<'_>) {
        state.stats.record_seen(child.kind);

        let mut report = EntryReport {
            path: child.path.clone(),
            kind: child.kind,
            depth,
            owner: None,
            classification: None,
            new_owner: None,
            outcome: EntryOutcome::Failed,
            failure: None,
        };

        match self.process_entry(&mut report, target, state.registry.as_mut()) {
            Ok(outcome) => {
                match outcome {
                    EntryOutcome::Changed => state.stats.record_changed(child.kind),
                    EntryOutcome::SkippedByPolicy => state.stats.record_would_change(child.kind),
                    EntryOutcome::SkippedValid | EntryOutcome::Failed => {}
                }
                report.outcome = outcome;
            }
            Err(failure) => {
                let record = failure.into_record(child.path.clone(), child.kind);
                state.absorb(record.clone());
                report.failure = Some(record);
            }
        }

        state.observer.on_entry(&report);
    }

    /// Read, classify, record, decide, act. Fills in `report` as facts become known.
    fn process_entry(
        &self,
        report: &mut EntryReport,
        target: &ResolvedTarget,
        registry: Option<&mut SidRegistry>,
    ) -> std::result::Result<EntryOutcome, EntryFailure> {
        let owner = self
            .directory
            .owner_of(&report.path)
            .map_err(|err| EntryFailure::new(FailureStage::Examine, err))?;
        let classification = self.directory.classify(&owner);
        report.owner = Some(owner.clone());
        report.classification = Some(classification.clone());

        if let Some(registry) = registry {
            registry.record(&owner, report.kind, &classification);
        }

        let decision = decide(&classification, self.config.mode)
            .map_err(|err| EntryFailure::new(FailureStage::Classify, err))?;

        if decision == Decision::Change {
            self.directory
                .set_owner(&report.path, &target.sid)
                .map_err(|err| EntryFailure::new(FailureStage::Change, err))?;
        }
        if decision != Decision::Skip {
            report.new_owner = Some(target.sid.clone());
        }

        Ok(EntryOutcome::from(decision))
    }

    fn absorb_listing_failure(
        &self,
        state: &mut WalkState<'_>,
        path: PathBuf,
        source: std::io::Error,
    ) {
        let failure = EntryFailure::new(FailureStage::Enumerate, FixOwnerError::io(&path, source));
        let record = failure.into_record(path, EntryKind::Directory);
        state.observer.on_failure(&record);
        state.absorb(record);
    }
}

fn validate_root(root: &Path) -> Result<()> {
    match fs::metadata(root) {
        Ok(meta) if meta.is_dir() => Ok(()),
        Ok(_) => Err(FixOwnerError::InvalidRoot {
            path: root.to_path_buf(),
            details: "not a directory".to_string(),
        }),
        Err(err) if err.kind() == ErrorKind::NotFound => Err(FixOwnerError::InvalidRoot {
            path: root.to_path_buf(),
            details: "does not exist".to_string(),
        }),
        Err(err) => Err(FixOwnerError::InvalidRoot {
            path: root.to_path_buf(),
            details: err.to_string(),
        }),
    }
}

/// List `dir` without following links, sorted by name.
///
/// Errors for individual entries are returned alongside the children so the
/// caller can count them; an error opening the directory fails the whole call.
fn list_children(dir: &Path) -> std::io::Result<(Vec<Child>, Vec<(PathBuf, std::io::Error)>)> {
    let mut children = Vec::new();
    let mut errors = Vec::new();

    for entry_result in fs::read_dir(dir)? {
        let entry = match entry_result {
            Ok(entry) => entry,
            Err(err) => {
                errors.push((dir.to_path_buf(), err));
                continue;
            }
        };
        let path = entry.path();
        let file_type = match entry.file_type() {
            Ok(ft) => ft,
            Err(_) => match fs::symlink_metadata(&path) {
                Ok(meta) => meta.file_type(),
                Err(err) => {
                    errors.push((path, err));
                    continue;
                }
            },
        };

        let (kind, descend) = if file_type.is_symlink() {
            // Classified by target kind; never descended.
            let points_at_dir = fs::metadata(&path).is_ok_and(|meta| meta.is_dir());
            let kind = if points_at_dir {
                EntryKind::Directory
            } else {
                EntryKind::File
            };
            (kind, false)
        } else if file_type.is_dir() {
            (EntryKind::Directory, true)
        } else {
            (EntryKind::File, false)
        };

        children.push(Child {
            name: entry.file_name(),
            path,
            kind,
            descend,
        });
    }

    children.sort_by(|a, b| a.name.cmp(&b.name));
    Ok((children, errors))
}
