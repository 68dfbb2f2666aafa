//! Post-walk artifacts written to the output directory.
//!
//! File names share the run-start stamp so the artifacts of one run sort
//! together:
//!
//! - `sid_ownership_analysis_<ts>.json`
//! - `sid_orphaned_remediation_<ts>.yaml`
//! - `fix_owner_<operation>_<ts>.log`

#![allow(missing_docs)]

use std::fmt::Write as _;
use std::fs;
use std::io::Write as _;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::core::errors::{FixOwnerError, Result};
use crate::core::paths::{sanitize_file_component, timestamped_file};
use crate::report::remediation::{PriorityThresholds, RemediationPlan};
use crate::scanner::failures::FailureRecord;
use crate::scanner::sid_registry::{RegistrySummary, SidRecord};
use crate::scanner::stats::{EntryKind, StatsSnapshot};
use crate::scanner::walker::{Termination, WalkReport};

/// Operation label used for the failed-entries log of a walk.
pub const WALK_OPERATION: &str = "filesystem_processing";

const ANALYSIS_STEM: &str = "sid_ownership_analysis";
const REMEDIATION_STEM: &str = "sid_orphaned_remediation";

#[derive(Debug, Clone, Serialize)]
pub struct SidAnalysis {
    pub metadata: AnalysisMetadata,
    pub summary: AnalysisSummary,
    pub sids: Vec<SidRecord>,
}

#[derive(Debug, Clone, Serialize)]
pub struct AnalysisMetadata {
    pub generated_at: String,
    pub tool_version: String,
    pub root: String,
    pub mode: String,
    pub target_account: String,
    pub target_sid: String,
    pub termination: Termination,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub config_hash: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct AnalysisSummary {
    pub registry: RegistrySummary,
    pub statistics: StatsSnapshot,
}

impl SidAnalysis {
    /// `None` when the walk did not track identifiers.
    pub fn from_walk(report: &WalkReport, generated_at: &str, config_hash: Option<String>) -> Option<Self> {
        let registry = report.sid_registry.as_ref()?;
        Some(Self {
            metadata: AnalysisMetadata {
                generated_at: generated_at.to_string(),
                tool_version: env!("CARGO_PKG_VERSION").to_string(),
                root: report.root.display().to_string(),
                mode: report.mode.to_string(),
                target_account: report.target.account.clone(),
                target_sid: report.target.sid.to_string(),
                termination: report.termination,
                config_hash,
            },
            summary: AnalysisSummary {
                registry: registry.summary(),
                statistics: report.stats.snapshot(),
            },
            sids: registry.snapshot(),
        })
    }
}

/// Render the failed-entries log. Entries are sorted by path.
pub fn render_failure_log(operation: &str, root: &Path, generated_at: &str, failures: &[FailureRecord]) -> String {
    let failed_files = failures.iter().filter(|f| f.kind == EntryKind::File).count();
    let failed_dirs = failures.len() - failed_files;

    let mut sorted: Vec<&FailureRecord> = failures.iter().collect();
    sorted.sort_by(|a, b| a.path.cmp(&b.path));

    let mut out = String::new();
    let _ = writeln!(out, "Operation: {operation}");
    let _ = writeln!(out, "Root: {}", root.display());
    let _ = writeln!(out, "Generated: {generated_at}");
    let _ = writeln!(out, "Total Failed Files: {failed_files}");
    let _ = writeln!(out, "Total Failed Directories: {failed_dirs}");
    let _ = writeln!(out, "Total Failures: {}", failures.len());
    out.push('\n');
    for failure in sorted {
        let _ = writeln!(
            out,
            "{}: {} | Error: {} | Code: {}",
            failure.kind.label(),
            failure.path.display(),
            failure.message,
            failure.code
        );
    }
    out
}

/// Reporting switches taken from the resolved config.
#[derive(Debug, Clone)]
pub struct ReportSettings {
    pub failure_log: bool,
    pub thresholds: PriorityThresholds,
    pub config_hash: Option<String>,
}

/// Paths of the artifacts actually written.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct WrittenReports {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub analysis: Option<PathBuf>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub remediation_plan: Option<PathBuf>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub failure_log: Option<PathBuf>,
}

impl WrittenReports {
    pub fn is_empty(&self) -> bool {
        self.analysis.is_none() && self.remediation_plan.is_none() && self.failure_log.is_none()
    }
}

/// Writes the artifacts of one run into `output_dir`.
#[derive(Debug, Clone)]
pub struct ReportWriter {
    output_dir: PathBuf,
    stamp_at: DateTime<Utc>,
}

impl ReportWriter {
    /// `stamp_at` names the files; normally the walk's start time.
    pub fn new(output_dir: impl Into<PathBuf>, stamp_at: DateTime<Utc>) -> Self {
        Self {
            output_dir: output_dir.into(),
            stamp_at,
        }
    }

    pub fn output_dir(&self) -> &Path {
        &self.output_dir
    }

    /// Write every artifact the walk calls for. Nothing is created (not even
    /// the directory) when no artifact applies.
    pub fn write_all(&self, report: &WalkReport, settings: &ReportSettings) -> Result<WrittenReports> {
        let generated_at = Utc::now().to_rfc3339_opts(chrono::SecondsFormat::Millis, true);
        let mut written = WrittenReports::default();

        if let Some(analysis) = SidAnalysis::from_walk(report, &generated_at, settings.config_hash.clone()) {
            written.analysis = Some(self.write_analysis(&analysis)?);
        }

        if let Some(plan) = RemediationPlan::from_walk(report, settings.thresholds, &generated_at)
            && !plan.is_empty()
        {
            written.remediation_plan = Some(self.write_remediation_plan(&plan)?);
        }

        if settings.failure_log && !report.failures.is_empty() {
            written.failure_log =
                Some(self.write_failure_log(WALK_OPERATION, &report.root, &generated_at, &report.failures)?);
        }

        Ok(written)
    }

    pub fn write_analysis(&self, analysis: &SidAnalysis) -> Result<PathBuf> {
        let path = timestamped_file(&self.output_dir, ANALYSIS_STEM, self.stamp_at, "json");
        let json = serde_json::to_string_pretty(analysis)?;
        self.write_atomic(&path, json.as_bytes())?;
        Ok(path)
    }

    pub fn write_remediation_plan(&self, plan: &RemediationPlan) -> Result<PathBuf> {
        let path = timestamped_file(&self.output_dir, REMEDIATION_STEM, self.stamp_at, "yaml");
        let yaml = plan.to_yaml()?;
        self.write_atomic(&path, yaml.as_bytes())?;
        Ok(path)
    }

    pub fn write_failure_log(
        &self,
        operation: &str,
        root: &Path,
        generated_at: &str,
        failures: &[FailureRecord],
    ) -> Result<PathBuf> {
        let stem = format!("fix_owner_{}", sanitize_file_component(operation));
        let path = timestamped_file(&self.output_dir, &stem, self.stamp_at, "log");
        let body = render_failure_log(operation, root, generated_at, failures);
        self.write_atomic(&path, body.as_bytes())?;
        Ok(path)
    }

    /// temp file → fsync → rename, creating the output directory first.
    fn write_atomic(&self, path: &Path, bytes: &[u8]) -> Result<()> {
        fs::create_dir_all(&self.output_dir)
            .map_err(|source| FixOwnerError::io(&self.output_dir, source))?;

        let mut tmp_name = path.as_os_str().to_owned();
        tmp_name.push(".tmp");
        let tmp_path = PathBuf::from(tmp_name);
        {
            let mut file = fs::File::create(&tmp_path).map_err(|source| FixOwnerError::io(&tmp_path, source))?;
            file.write_all(bytes)
                .and_then(|()| file.sync_all())
                .map_err(|source| FixOwnerError::io(&tmp_path, source))?;
        }
        fs::rename(&tmp_path, path).map_err(|source| FixOwnerError::io(path, source))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::platform::owner::{OwnerClassification, Sid};
    use crate::scanner::decision::ExecutionMode;
    use crate::scanner::failures::FailureStage;
    use crate::scanner::sid_registry::SidRegistry;
    use crate::scanner::stats::WalkStatistics;
    use crate::scanner::walker::ResolvedTarget;
    use chrono::TimeZone;

    fn sid(raw: &str) -> Sid {
        Sid::parse(raw).unwrap()
    }

    fn failure(path: &str, kind: EntryKind) -> FailureRecord {
        FailureRecord {
            path: PathBuf::from(path),
            kind,
            stage: FailureStage::Change,
            code: "FXO-3004".to_string(),
            message: format!("[FXO-3004] permission denied for {path}"),
        }
    }

    fn report(track: bool, failures: Vec<FailureRecord>) -> WalkReport {
        let mut stats = WalkStatistics::new();
        let registry = track.then(|| {
            let mut reg = SidRegistry::new();
            let orphan = sid("S-1-5-21-4-4-4-2001");
            stats.record_seen(EntryKind::Directory);
            reg.record(&orphan, EntryKind::Directory, &OwnerClassification::Orphaned { sid: orphan.clone() });
            reg
        });
        WalkReport {
            root: PathBuf::from("/srv/data"),
            mode: ExecutionMode::Simulate,
            target: ResolvedTarget {
                account: "root".to_string(),
                sid: sid("S-1-22-1-0"),
                display_name: "root".to_string(),
            },
            stats,
            sid_registry: registry,
            failures,
            termination: Termination::Completed,
        }
    }

    fn settings() -> ReportSettings {
        ReportSettings {
            failure_log: true,
            thresholds: PriorityThresholds::default(),
            config_hash: Some("abc123".to_string()),
        }
    }

    fn stamp() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 3, 9, 14, 5, 7).unwrap()
    }

    #[test]
    fn failure_log_header_and_sorted_lines() {
        let failures = vec![
            failure("/test/z_file.txt", EntryKind::File),
            failure("/test/m_dir", EntryKind::Directory),
            failure("/test/a_file.txt", EntryKind::File),
        ];
        let text = render_failure_log(WALK_OPERATION, Path::new("/test"), "now", &failures);

        assert!(text.contains("Total Failed Files: 2"));
        assert!(text.contains("Total Failed Directories: 1"));
        assert!(text.contains("Total Failures: 3"));

        let body: Vec<&str> = text.lines().filter(|l| l.contains(" | Error: ")).collect();
        assert_eq!(body.len(), 3);
        assert!(body[0].starts_with("File: /test/a_file.txt"));
        assert!(body[1].starts_with("Directory: /test/m_dir"));
        assert!(body[2].starts_with("File: /test/z_file.txt"));
        assert!(body[2].ends_with("| Code: FXO-3004"));
    }

    #[test]
    fn write_all_produces_every_applicable_artifact() {
        let dir = tempfile::tempdir().unwrap();
        let out = dir.path().join("output");
        let writer = ReportWriter::new(&out, stamp());
        let written = writer
            .write_all(&report(true, vec![failure("/srv/data/x", EntryKind::File)]), &settings())
            .unwrap();

        let analysis = written.analysis.unwrap();
        assert_eq!(analysis, out.join("sid_ownership_analysis_20250309_140507.json"));
        let json: serde_json::Value = serde_json::from_str(&fs::read_to_string(&analysis).unwrap()).unwrap();
        assert_eq!(json["metadata"]["config_hash"], "abc123");
        assert_eq!(json["metadata"]["termination"]["status"], "completed");
        assert_eq!(json["summary"]["registry"]["orphaned_sids"], 1);
        assert_eq!(json["sids"][0]["validity"], "orphaned");

        let plan = written.remediation_plan.unwrap();
        assert_eq!(plan, out.join("sid_orphaned_remediation_20250309_140507.yaml"));
        assert_eq!(crate::report::remediation::load_remediation_target(&plan).unwrap(), "root");

        let log = written.failure_log.unwrap();
        assert_eq!(log, out.join("fix_owner_filesystem_processing_20250309_140507.log"));
        assert!(fs::read_to_string(log).unwrap().contains("Total Failures: 1"));

        // No temp files left behind.
        let leftovers = fs::read_dir(&out)
            .unwrap()
            .filter(|e| e.as_ref().unwrap().path().extension().is_some_and(|x| x == "tmp"))
            .count();
        assert_eq!(leftovers, 0);
    }

    #[test]
    fn nothing_written_for_clean_untracked_walk() {
        let dir = tempfile::tempdir().unwrap();
        let out = dir.path().join("output");
        let written = ReportWriter::new(&out, stamp())
            .write_all(&report(false, Vec::new()), &settings())
            .unwrap();
        assert!(written.is_empty());
        assert!(!out.exists());
    }

    #[test]
    fn failure_log_respects_switch() {
        let dir = tempfile::tempdir().unwrap();
        let mut s = settings();
        s.failure_log = false;
        let written = ReportWriter::new(dir.path(), stamp())
            .write_all(&report(false, vec![failure("/a", EntryKind::File)]), &s)
            .unwrap();
        assert!(written.failure_log.is_none());
    }

    #[test]
    fn operation_name_is_sanitized() {
        let dir = tempfile::tempdir().unwrap();
        let path = ReportWriter::new(dir.path(), stamp())
            .write_failure_log("scan /etc & more", Path::new("/etc"), "now", &[])
            .unwrap();
        assert_eq!(
            path.file_name().unwrap().to_string_lossy(),
            "fix_owner_scan__etc___more_20250309_140507.log"
        );
    }
}
