//! Activity log: append-only line-delimited JSON describing one or more runs.
//!
//! Each line is a complete JSON object, assembled in memory and handed to
//! `write_all` in one call so a concurrent `tail -f` never sees half a record.
//!
//! Degradation chain, one step per failure:
//! 1. Primary path
//! 2. Fallback path (defaults to the system temp directory)
//! 3. stderr, each line prefixed with `[FXO-JSONL]`
//! 4. Discard; a walk never aborts because logging failed

#![allow(missing_docs)]

use std::fs::{self, File, OpenOptions, rename};
use std::io::{self, BufWriter, Write};
use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime};

use serde::{Deserialize, Serialize};

use crate::core::errors::{FixOwnerError, Result};
use crate::scanner::failures::FailureRecord;
use crate::scanner::stats::{EntryKind, StatsSnapshot};

/// File name used when no explicit activity log path is configured.
pub const DEFAULT_ACTIVITY_FILE: &str = "fixown-activity.jsonl";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Info,
    Warning,
    Error,
}

/// Events emitted during a remediation run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventType {
    RunStart,
    OwnerChanged,
    WouldChange,
    EntryFailed,
    Timeout,
    RunComplete,
    Fatal,
}

/// One activity line. Only `ts`, `event`, `severity` are always present.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LogEntry {
    /// RFC 3339 UTC timestamp, millisecond precision.
    pub ts: String,
    pub event: EventType,
    pub severity: Severity,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub run_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub path: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub kind: Option<EntryKind>,
    /// Owner identifier found on the entry.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub old_owner: Option<String>,
    /// Owner identifier written (or that would be written).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub new_owner: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub mode: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stage: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_code: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stats: Option<StatsSnapshot>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub duration_ms: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<String>,
}

impl LogEntry {
    /// Entry stamped with the current UTC time.
    pub fn new(event: EventType, severity: Severity) -> Self {
        Self {
            ts: format_utc_now(),
            event,
            severity,
            run_id: None,
            path: None,
            kind: None,
            old_owner: None,
            new_owner: None,
            mode: None,
            stage: None,
            error_code: None,
            error_message: None,
            stats: None,
            duration_ms: None,
            details: None,
        }
    }

    #[must_use]
    pub fn with_run_id(mut self, run_id: &str) -> Self {
        self.run_id = Some(run_id.to_string());
        self
    }

    #[must_use]
    pub fn with_path(mut self, path: &Path, kind: EntryKind) -> Self {
        self.path = Some(path.display().to_string());
        self.kind = Some(kind);
        self
    }

    #[must_use]
    pub fn with_owners(mut self, old: &str, new: &str) -> Self {
        self.old_owner = Some(old.to_string());
        self.new_owner = Some(new.to_string());
        self
    }

    #[must_use]
    pub fn with_details(mut self, details: impl Into<String>) -> Self {
        self.details = Some(details.into());
        self
    }

    #[must_use]
    pub fn with_stats(mut self, stats: StatsSnapshot) -> Self {
        self.duration_ms = Some(duration_ms(stats.elapsed_secs));
        self.stats = Some(stats);
        self
    }

    /// Entry for an absorbed per-entry failure.
    pub fn failure(record: &FailureRecord) -> Self {
        let mut entry = Self::new(EventType::EntryFailed, Severity::Warning)
            .with_path(&record.path, record.kind);
        entry.stage = Some(record.stage.label().to_string());
        entry.error_code = Some(record.code.clone());
        entry.error_message = Some(record.message.clone());
        entry
    }

    /// Entry for an error that ended the run before or during preflight.
    pub fn fatal(error: &FixOwnerError) -> Self {
        let mut entry = Self::new(EventType::Fatal, Severity::Error);
        entry.error_code = Some(error.code().to_string());
        entry.error_message = Some(error.to_string());
        entry
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum WriterState {
    Normal,
    Fallback,
    Stderr,
    Discard,
}

#[derive(Debug, Clone)]
pub struct JsonlConfig {
    pub path: PathBuf,
    pub fallback_path: Option<PathBuf>,
    /// Rotate once the current file would exceed this size. Default 10 MiB.
    pub max_size_bytes: u64,
    /// Rotated generations to keep. Default 3.
    pub max_rotated_files: u32,
    /// Seconds between forced `sync_data` calls. Default 5.
    pub fsync_interval_secs: u64,
}

impl JsonlConfig {
    /// Config writing to `path` with the temp-dir fallback.
    pub fn at(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            ..Self::default()
        }
    }
}

impl Default for JsonlConfig {
    fn default() -> Self {
        Self {
            path: PathBuf::from("output").join(DEFAULT_ACTIVITY_FILE),
            fallback_path: Some(std::env::temp_dir().join(DEFAULT_ACTIVITY_FILE)),
            max_size_bytes: 10 * 1024 * 1024,
            max_rotated_files: 3,
            fsync_interval_secs: 5,
        }
    }
}

/// Append-only JSONL writer with size rotation and the degradation chain.
pub struct JsonlWriter {
    config: JsonlConfig,
    writer: Option<BufWriter<File>>,
    state: WriterState,
    bytes_written: u64,
    last_fsync: SystemTime,
}

impl JsonlWriter {
    /// Open the primary path, degrading as needed. Never fails.
    pub fn open(config: JsonlConfig) -> Self {
        let mut writer = Self {
            config,
            writer: None,
            state: WriterState::Discard,
            bytes_written: 0,
            last_fsync: SystemTime::now(),
        };
        writer.open_primary();
        writer
    }

    pub fn write_entry(&mut self, entry: &LogEntry) {
        match serde_json::to_string(entry) {
            Ok(json) => self.write_line(&format!("{json}\n")),
            Err(e) => {
                let _ = writeln!(io::stderr(), "[FXO-JSONL] serialize error: {e}");
            }
        }
    }

    pub fn flush(&mut self) {
        if let Some(w) = self.writer.as_mut() {
            let _ = w.flush();
        }
    }

    /// Flush and `sync_data` the current file.
    pub fn fsync(&mut self) {
        if let Some(w) = self.writer.as_mut() {
            let _ = w.flush();
            let _ = w.get_ref().sync_data();
            self.last_fsync = SystemTime::now();
        }
    }

    pub fn state(&self) -> &'static str {
        match self.state {
            WriterState::Normal => "normal",
            WriterState::Fallback => "fallback",
            WriterState::Stderr => "stderr",
            WriterState::Discard => "discard",
        }
    }

    /// Path currently receiving lines, if any.
    pub fn active_path(&self) -> Option<&Path> {
        match self.state {
            WriterState::Normal => Some(&self.config.path),
            WriterState::Fallback => self.config.fallback_path.as_deref(),
            WriterState::Stderr | WriterState::Discard => None,
        }
    }

    pub fn bytes_written(&self) -> u64 {
        self.bytes_written
    }

    fn write_line(&mut self, line: &str) {
        let len = line.len() as u64;
        if self.bytes_written + len > self.config.max_size_bytes
            && matches!(self.state, WriterState::Normal | WriterState::Fallback)
        {
            self.rotate();
        }

        match self.state {
            WriterState::Normal | WriterState::Fallback => {
                let written = self
                    .writer
                    .as_mut()
                    .is_some_and(|w| w.write_all(line.as_bytes()).is_ok());
                if written {
                    self.bytes_written += len;
                    self.maybe_fsync();
                } else {
                    self.degrade();
                    self.write_line(line);
                }
            }
            WriterState::Stderr => {
                let _ = write!(io::stderr(), "[FXO-JSONL] {line}");
            }
            WriterState::Discard => {}
        }
    }

    fn maybe_fsync(&mut self) {
        let since = SystemTime::now()
            .duration_since(self.last_fsync)
            .unwrap_or(Duration::ZERO);
        if since.as_secs() >= self.config.fsync_interval_secs {
            self.fsync();
        }
    }

    fn install(&mut self, file: File, size: u64, state: WriterState) {
        self.writer = Some(BufWriter::with_capacity(16 * 1024, file));
        self.bytes_written = size;
        self.state = state;
    }

    fn open_primary(&mut self) {
        match open_append(&self.config.path) {
            Ok((file, size)) => self.install(file, size, WriterState::Normal),
            Err(_) => self.open_fallback(),
        }
    }

    fn open_fallback(&mut self) {
        let Some(fallback) = self.config.fallback_path.clone() else {
            self.state = WriterState::Stderr;
            let _ = writeln!(
                io::stderr(),
                "[FXO-JSONL] cannot open {}, no fallback; logging to stderr",
                self.config.path.display()
            );
            return;
        };
        match open_append(&fallback) {
            Ok((file, size)) => {
                let _ = writeln!(
                    io::stderr(),
                    "[FXO-JSONL] cannot open {}, logging to {}",
                    self.config.path.display(),
                    fallback.display()
                );
                self.install(file, size, WriterState::Fallback);
            }
            Err(_) => {
                self.state = WriterState::Stderr;
                let _ = writeln!(
                    io::stderr(),
                    "[FXO-JSONL] primary and fallback unavailable; logging to stderr"
                );
            }
        }
    }

    fn degrade(&mut self) {
        self.writer = None;
        match self.state {
            WriterState::Normal => self.open_fallback(),
            WriterState::Fallback => {
                self.state = WriterState::Stderr;
                let _ = writeln!(io::stderr(), "[FXO-JSONL] fallback write failed; logging to stderr");
            }
            WriterState::Stderr => self.state = WriterState::Discard,
            WriterState::Discard => {}
        }
    }

    fn rotate(&mut self) {
        self.flush();
        self.writer = None;

        let base = match self.active_path() {
            Some(path) => path.to_path_buf(),
            None => return,
        };

        // Oldest generation falls off, the rest shift up by one.
        let _ = fs::remove_file(rotated_name(&base, self.config.max_rotated_files));
        for generation in (1..self.config.max_rotated_files).rev() {
            let _ = rename(
                rotated_name(&base, generation),
                rotated_name(&base, generation + 1),
            );
        }
        let _ = rename(&base, rotated_name(&base, 1));

        match open_append(&base) {
            Ok((file, _)) => {
                self.writer = Some(BufWriter::with_capacity(16 * 1024, file));
                self.bytes_written = 0;
            }
            Err(_) => self.degrade(),
        }
    }
}

impl Drop for JsonlWriter {
    fn drop(&mut self) {
        self.flush();
    }
}

/// Open or create `path` for appending, creating parent directories.
/// Returns the handle and the current file size.
pub(crate) fn open_append(path: &Path) -> Result<(File, u64)> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent).map_err(|source| FixOwnerError::io(parent, source))?;
    }
    let file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .map_err(|source| FixOwnerError::io(path, source))?;
    let size = file.metadata().map(|m| m.len()).unwrap_or(0);
    Ok((file, size))
}

/// `activity.jsonl` → `activity.jsonl.2`
fn rotated_name(base: &Path, generation: u32) -> PathBuf {
    let mut name = base.as_os_str().to_owned();
    name.push(format!(".{generation}"));
    PathBuf::from(name)
}

/// Current UTC time, RFC 3339 with milliseconds.
pub fn format_utc_now() -> String {
    chrono::Utc::now().to_rfc3339_opts(chrono::SecondsFormat::Millis, true)
}

#[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
fn duration_ms(secs: f64) -> u64 {
    (secs.max(0.0) * 1000.0).round() as u64
}
