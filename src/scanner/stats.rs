//! Running counters for one walk.

#![allow(missing_docs)]

use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Entry kind as seen by the walk. Links take the kind of their target.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntryKind {
    Directory,
    File,
}

impl EntryKind {
    #[must_use]
    pub const fn label(self) -> &'static str {
        match self {
            Self::Directory => "Directory",
            Self::File => "File",
        }
    }
}

/// Monotonic walk counters plus the start instant.
///
/// Only the walker mutates these; reporters read them at the end of the run
/// or at timeout.
#[derive(Debug, Clone)]
pub struct WalkStatistics {
    started: Instant,
    started_at: DateTime<Utc>,
    dirs_seen: u64,
    files_seen: u64,
    dirs_changed: u64,
    files_changed: u64,
    dirs_would_change: u64,
    files_would_change: u64,
    exceptions: u64,
}

impl Default for WalkStatistics {
    fn default() -> Self {
        Self::new()
    }
}

impl WalkStatistics {
    #[must_use]
    pub fn new() -> Self {
        Self {
            started: Instant::now(),
            started_at: Utc::now(),
            dirs_seen: 0,
            files_seen: 0,
            dirs_changed: 0,
            files_changed: 0,
            dirs_would_change: 0,
            files_would_change: 0,
            exceptions: 0,
        }
    }

    pub fn inc_dirs_seen(&mut self) {
        self.dirs_seen += 1;
    }

    pub fn inc_files_seen(&mut self) {
        self.files_seen += 1;
    }

    pub fn inc_dirs_changed(&mut self) {
        self.dirs_changed += 1;
    }

    pub fn inc_files_changed(&mut self) {
        self.files_changed += 1;
    }

    pub fn inc_exceptions(&mut self) {
        self.exceptions += 1;
    }

    pub fn record_seen(&mut self, kind: EntryKind) {
        match kind {
            EntryKind::Directory => self.inc_dirs_seen(),
            EntryKind::File => self.inc_files_seen(),
        }
    }

    pub fn record_changed(&mut self, kind: EntryKind) {
        match kind {
            EntryKind::Directory => self.inc_dirs_changed(),
            EntryKind::File => self.inc_files_changed(),
        }
    }

    /// Dry-run counterpart of `record_changed`; never touches the changed counters.
    pub fn record_would_change(&mut self, kind: EntryKind) {
        match kind {
            EntryKind::Directory => self.dirs_would_change += 1,
            EntryKind::File => self.files_would_change += 1,
        }
    }

    pub const fn dirs_seen(&self) -> u64 {
        self.dirs_seen
    }

    pub const fn files_seen(&self) -> u64 {
        self.files_seen
    }

    pub const fn dirs_changed(&self) -> u64 {
        self.dirs_changed
    }

    pub const fn files_changed(&self) -> u64 {
        self.files_changed
    }

    pub const fn dirs_would_change(&self) -> u64 {
        self.dirs_would_change
    }

    pub const fn files_would_change(&self) -> u64 {
        self.files_would_change
    }

    pub const fn exceptions(&self) -> u64 {
        self.exceptions
    }

    pub const fn total_seen(&self) -> u64 {
        self.dirs_seen + self.files_seen
    }

    pub const fn total_changed(&self) -> u64 {
        self.dirs_changed + self.files_changed
    }

    pub const fn has_errors(&self) -> bool {
        self.exceptions > 0
    }

    pub const fn started_at(&self) -> DateTime<Utc> {
        self.started_at
    }

    /// Time since construction; valid mid-walk.
    pub fn elapsed(&self) -> Duration {
        self.started.elapsed()
    }

    pub fn snapshot(&self) -> StatsSnapshot {
        StatsSnapshot {
            started_at: self.started_at.to_rfc3339_opts(chrono::SecondsFormat::Millis, true),
            elapsed_secs: self.elapsed().as_secs_f64(),
            dirs_seen: self.dirs_seen,
            files_seen: self.files_seen,
            dirs_changed: self.dirs_changed,
            files_changed: self.files_changed,
            dirs_would_change: self.dirs_would_change,
            files_would_change: self.files_would_change,
            exceptions: self.exceptions,
        }
    }
}

/// Serializable point-in-time copy of [`WalkStatistics`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StatsSnapshot {
    pub started_at: String,
    pub elapsed_secs: f64,
    pub dirs_seen: u64,
    pub files_seen: u64,
    pub dirs_changed: u64,
    pub files_changed: u64,
    pub dirs_would_change: u64,
    pub files_would_change: u64,
    pub exceptions: u64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn counters_start_at_zero() {
        let stats = WalkStatistics::new();
        assert_eq!(stats.total_seen(), 0);
        assert_eq!(stats.total_changed(), 0);
        assert_eq!(stats.exceptions(), 0);
        assert!(!stats.has_errors());
    }

    #[test]
    fn kind_dispatch_hits_the_right_counter() {
        let mut stats = WalkStatistics::new();
        stats.record_seen(EntryKind::Directory);
        stats.record_seen(EntryKind::Directory);
        stats.record_seen(EntryKind::File);
        stats.record_changed(EntryKind::File);
        stats.record_would_change(EntryKind::Directory);
        stats.inc_exceptions();

        assert_eq!(stats.dirs_seen(), 2);
        assert_eq!(stats.files_seen(), 1);
        assert_eq!(stats.files_changed(), 1);
        assert_eq!(stats.dirs_changed(), 0);
        assert_eq!(stats.dirs_would_change(), 1);
        assert_eq!(stats.total_seen(), 3);
        assert!(stats.has_errors());
    }

    #[test]
    fn would_change_never_counts_as_changed() {
        let mut stats = WalkStatistics::new();
        for _ in 0..5 {
            stats.record_would_change(EntryKind::File);
            stats.record_would_change(EntryKind::Directory);
        }
        assert_eq!(stats.total_changed(), 0);
        assert_eq!(stats.files_would_change(), 5);
    }

    #[test]
    fn elapsed_is_monotonic() {
        let stats = WalkStatistics::new();
        let first = stats.elapsed();
        std::thread::sleep(Duration::from_millis(2));
        assert!(stats.elapsed() >= first);
    }

    #[test]
    fn snapshot_serializes_all_counters() {
        let mut stats = WalkStatistics::new();
        stats.inc_dirs_seen();
        stats.inc_dirs_changed();
        let json = serde_json::to_value(stats.snapshot()).unwrap();
        assert_eq!(json["dirs_seen"], 1);
        assert_eq!(json["dirs_changed"], 1);
        assert_eq!(json["files_seen"], 0);
        assert!(json["started_at"].as_str().unwrap().ends_with('Z'));
    }
}
