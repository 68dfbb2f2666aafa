//! Orphaned-owner remediation plan: build from a walk, export as YAML, and
//! read back the target account from a previously exported plan.

#![allow(missing_docs)]

use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::core::errors::{FixOwnerError, Result};
use crate::scanner::sid_registry::{SidRecord, SidRegistry};
use crate::scanner::walker::WalkReport;

/// How urgently an orphaned identifier should be cleaned up.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Priority {
    High,
    Medium,
    Low,
}

impl Priority {
    #[must_use]
    pub const fn label(self) -> &'static str {
        match self {
            Self::High => "HIGH",
            Self::Medium => "MEDIUM",
            Self::Low => "LOW",
        }
    }

    const fn risk_assessment(self) -> &'static str {
        match self {
            Self::High => "High: a large share of the scanned tree has no accountable owner",
            Self::Medium => "Medium: a noticeable number of entries have no accountable owner",
            Self::Low => "Low: isolated entries with no accountable owner",
        }
    }
}

/// Share thresholds, in percent of all entries seen.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PriorityThresholds {
    pub high_pct: f64,
    pub medium_pct: f64,
}

impl Default for PriorityThresholds {
    fn default() -> Self {
        Self {
            high_pct: 10.0,
            medium_pct: 1.0,
        }
    }
}

impl PriorityThresholds {
    /// Classify `affected` out of `total_seen`. An empty walk is always low.
    #[must_use]
    pub fn classify(&self, affected: u64, total_seen: u64) -> Priority {
        if total_seen == 0 {
            return Priority::Low;
        }
        let share = percent(affected, total_seen);
        if share >= self.high_pct {
            Priority::High
        } else if share >= self.medium_pct {
            Priority::Medium
        } else {
            Priority::Low
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RemediationPlan {
    pub metadata: PlanMetadata,
    pub remediation_info: RemediationInfo,
    pub orphaned_sids: Vec<OrphanedSidEntry>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlanMetadata {
    pub generated_at: String,
    pub tool_version: String,
    pub scan_root: String,
    pub mode: String,
    pub total_items_scanned: u64,
    pub orphaned_sid_count: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RemediationInfo {
    pub target_account: String,
    pub target_sid: String,
    pub high_priority_threshold_pct: f64,
    pub medium_priority_threshold_pct: f64,
    pub instructions: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrphanedSidEntry {
    pub sid_info: SidInfo,
    pub impact_analysis: ImpactAnalysis,
    pub recommended_remediation: RecommendedRemediation,
    pub additional_info: AdditionalInfo,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SidInfo {
    pub sid: String,
    pub account_name: String,
    pub status: String,
    pub description: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ImpactAnalysis {
    pub files_affected: u64,
    pub directories_affected: u64,
    pub total_items_affected: u64,
    /// Files as a share of this identifier's own items.
    pub file_percentage: f64,
    pub directory_percentage: f64,
    pub remediation_priority: Priority,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecommendedRemediation {
    pub new_owner_account: String,
    pub action_required: String,
    pub command_example: String,
    pub verification_steps: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AdditionalInfo {
    pub sid_type: String,
    pub likely_cause: String,
    pub risk_assessment: String,
}

impl RemediationPlan {
    /// Build a plan from a tracked walk. `None` without a registry.
    pub fn from_walk(
        report: &WalkReport,
        thresholds: PriorityThresholds,
        generated_at: &str,
    ) -> Option<Self> {
        let registry = report.sid_registry.as_ref()?;
        Some(Self::build(report, registry, thresholds, generated_at))
    }

    fn build(
        report: &WalkReport,
        registry: &SidRegistry,
        thresholds: PriorityThresholds,
        generated_at: &str,
    ) -> Self {
        let total_seen = report.stats.total_seen();
        let root = report.root.display().to_string();
        let account = report.target.account.clone();

        let orphaned_sids: Vec<OrphanedSidEntry> = registry
            .orphaned()
            .iter()
            .map(|record| orphaned_entry(record, total_seen, &account, &root, thresholds))
            .collect();

        Self {
            metadata: PlanMetadata {
                generated_at: generated_at.to_string(),
                tool_version: env!("CARGO_PKG_VERSION").to_string(),
                scan_root: root.clone(),
                mode: report.mode.to_string(),
                total_items_scanned: total_seen,
                orphaned_sid_count: orphaned_sids.len(),
            },
            remediation_info: RemediationInfo {
                target_account: account.clone(),
                target_sid: report.target.sid.to_string(),
                high_priority_threshold_pct: thresholds.high_pct,
                medium_priority_threshold_pct: thresholds.medium_pct,
                instructions: vec![
                    "Review each orphaned SID and confirm the account is gone for good".to_string(),
                    "Adjust new_owner_account where a different owner is appropriate".to_string(),
                    format!("Apply with: fixown run \"{root}\" --remediation-plan <this file> --execute --recurse --files"),
                ],
            },
            orphaned_sids,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.orphaned_sids.is_empty()
    }

    pub fn to_yaml(&self) -> Result<String> {
        Ok(serde_yaml::to_string(self)?)
    }
}

fn orphaned_entry(
    record: &SidRecord,
    total_seen: u64,
    account: &str,
    root: &str,
    thresholds: PriorityThresholds,
) -> OrphanedSidEntry {
    let total = record.total();
    let priority = thresholds.classify(total, total_seen);
    OrphanedSidEntry {
        sid_info: SidInfo {
            sid: record.sid.to_string(),
            account_name: record.display_name.clone(),
            status: "ORPHANED".to_string(),
            description: "Security identifier no longer maps to an existing account".to_string(),
        },
        impact_analysis: ImpactAnalysis {
            files_affected: record.file_count,
            directories_affected: record.dir_count,
            total_items_affected: total,
            file_percentage: rounded_percent(record.file_count, total),
            directory_percentage: rounded_percent(record.dir_count, total),
            remediation_priority: priority,
        },
        recommended_remediation: RecommendedRemediation {
            new_owner_account: account.to_string(),
            action_required: "Change ownership to specified account".to_string(),
            command_example: format!("fixown run \"{root}\" \"{account}\" --execute --recurse --files"),
            verification_steps: vec![
                format!("Re-run: fixown run \"{root}\" --recurse --files --track-sids"),
                format!("Confirm {} no longer appears as an orphaned SID", record.sid),
                "Check the failure log for entries that could not be changed".to_string(),
            ],
        },
        additional_info: AdditionalInfo {
            sid_type: sid_type(record.sid.as_str()).to_string(),
            likely_cause: "Account was deleted or its domain is unreachable".to_string(),
            risk_assessment: priority.risk_assessment().to_string(),
        },
    }
}

fn sid_type(sid: &str) -> &'static str {
    if sid.starts_with("S-1-5-21-") {
        "Domain or Local Account"
    } else if sid.starts_with("S-1-22-1-") {
        "Unix User"
    } else {
        "Other"
    }
}

#[allow(clippy::cast_precision_loss)]
fn percent(part: u64, whole: u64) -> f64 {
    if whole == 0 {
        0.0
    } else {
        part as f64 * 100.0 / whole as f64
    }
}

fn rounded_percent(part: u64, whole: u64) -> f64 {
    (percent(part, whole) * 100.0).round() / 100.0
}

// Import view: every section optional, unknown keys ignored.

#[derive(Debug, Default, Deserialize)]
struct ImportedPlan {
    #[serde(default)]
    orphaned_sids: Vec<ImportedEntry>,
}

#[derive(Debug, Default, Deserialize)]
struct ImportedEntry {
    #[serde(default)]
    recommended_remediation: Option<ImportedRemediation>,
}

#[derive(Debug, Default, Deserialize)]
struct ImportedRemediation {
    #[serde(default)]
    new_owner_account: Option<String>,
}

/// Target account named by the first orphaned entry of an exported plan.
pub fn load_remediation_target(path: &Path) -> Result<String> {
    let plan_error = |details: String| FixOwnerError::RemediationPlan {
        path: path.to_path_buf(),
        details,
    };

    let raw = fs::read_to_string(path).map_err(|e| plan_error(e.to_string()))?;
    let plan: ImportedPlan = serde_yaml::from_str(&raw).map_err(|e| plan_error(e.to_string()))?;

    plan.orphaned_sids
        .into_iter()
        .next()
        .and_then(|entry| entry.recommended_remediation)
        .and_then(|rem| rem.new_owner_account)
        .map(|account| account.trim().to_string())
        .filter(|account| !account.is_empty())
        .ok_or_else(|| plan_error("no orphaned_sids[0].recommended_remediation.new_owner_account".to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::platform::owner::{OwnerClassification, Sid};
    use crate::scanner::decision::ExecutionMode;
    use crate::scanner::stats::{EntryKind, WalkStatistics};
    use crate::scanner::walker::{ResolvedTarget, Termination};
    use std::path::PathBuf;

    fn sid(raw: &str) -> Sid {
        Sid::parse(raw).unwrap()
    }

    fn report_with(orphan_files: u64, orphan_dirs: u64, valid_items: u64) -> WalkReport {
        let mut stats = WalkStatistics::new();
        let mut registry = SidRegistry::new();
        let orphan = sid("S-1-5-21-9-9-9-1105");
        let system = sid("S-1-5-18");
        for _ in 0..orphan_files {
            stats.record_seen(EntryKind::File);
            registry.record(&orphan, EntryKind::File, &OwnerClassification::Orphaned { sid: orphan.clone() });
        }
        for _ in 0..orphan_dirs {
            stats.record_seen(EntryKind::Directory);
            registry.record(&orphan, EntryKind::Directory, &OwnerClassification::Orphaned { sid: orphan.clone() });
        }
        for _ in 0..valid_items {
            stats.record_seen(EntryKind::File);
            registry.record(
                &system,
                EntryKind::File,
                &OwnerClassification::Valid { sid: system.clone(), name: "SYSTEM".to_string() },
            );
        }
        WalkReport {
            root: PathBuf::from("/srv/share"),
            mode: ExecutionMode::Simulate,
            target: ResolvedTarget {
                account: "Administrator".to_string(),
                sid: sid("S-1-5-21-9-9-9-500"),
                display_name: "Administrator".to_string(),
            },
            stats,
            sid_registry: Some(registry),
            failures: Vec::new(),
            termination: Termination::Completed,
        }
    }

    #[test]
    fn thresholds_classify_by_share_of_all_seen() {
        let t = PriorityThresholds::default();
        assert_eq!(t.classify(10, 100), Priority::High);
        assert_eq!(t.classify(9, 100), Priority::Medium);
        assert_eq!(t.classify(1, 100), Priority::Medium);
        assert_eq!(t.classify(1, 1000), Priority::Low);
        assert_eq!(t.classify(5, 0), Priority::Low);
    }

    #[test]
    fn impact_percentages_are_within_the_identifier() {
        let report = report_with(15, 3, 0);
        let plan = RemediationPlan::from_walk(&report, PriorityThresholds::default(), "now").unwrap();
        let impact = &plan.orphaned_sids[0].impact_analysis;
        assert_eq!(impact.total_items_affected, 18);
        assert!((impact.file_percentage - 83.33).abs() < f64::EPSILON);
        assert!((impact.directory_percentage - 16.67).abs() < f64::EPSILON);
        assert_eq!(impact.remediation_priority, Priority::High);
    }

    #[test]
    fn plan_lists_only_orphaned_identifiers() {
        let report = report_with(1, 0, 199);
        let plan = RemediationPlan::from_walk(&report, PriorityThresholds::default(), "now").unwrap();
        assert_eq!(plan.orphaned_sids.len(), 1);
        assert_eq!(plan.metadata.orphaned_sid_count, 1);
        assert_eq!(plan.metadata.total_items_scanned, 200);
        let entry = &plan.orphaned_sids[0];
        assert_eq!(entry.sid_info.status, "ORPHANED");
        assert_eq!(entry.sid_info.account_name, "unknown");
        assert_eq!(entry.additional_info.sid_type, "Domain or Local Account");
        assert_eq!(entry.impact_analysis.remediation_priority, Priority::Low);
        assert_eq!(entry.recommended_remediation.new_owner_account, "Administrator");
    }

    #[test]
    fn untracked_walk_has_no_plan() {
        let mut report = report_with(1, 1, 1);
        report.sid_registry = None;
        assert!(RemediationPlan::from_walk(&report, PriorityThresholds::default(), "now").is_none());
    }

    #[test]
    fn yaml_layout_and_import() {
        let report = report_with(2, 1, 5);
        let plan = RemediationPlan::from_walk(&report, PriorityThresholds::default(), "now").unwrap();
        let yaml = plan.to_yaml().unwrap();
        assert!(yaml.contains("remediation_priority: HIGH"));
        assert!(yaml.contains("orphaned_sids:"));

        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("plan.yaml");
        fs::write(&path, &yaml).unwrap();
        assert_eq!(load_remediation_target(&path).unwrap(), "Administrator");
    }

    #[test]
    fn import_accepts_hand_written_minimal_plan() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("plan.yaml");
        fs::write(
            &path,
            "orphaned_sids:\n  - recommended_remediation:\n      new_owner_account: \"CORP\\\\svc-files\"\n",
        )
        .unwrap();
        assert_eq!(load_remediation_target(&path).unwrap(), "CORP\\svc-files");
    }

    #[test]
    fn import_failures_are_plan_errors() {
        let dir = tempfile::tempdir().unwrap();

        let missing = load_remediation_target(&dir.path().join("absent.yaml")).unwrap_err();
        assert_eq!(missing.code(), "FXO-2101");

        let bad = dir.path().join("bad.yaml");
        fs::write(&bad, "orphaned_sids: [unclosed").unwrap();
        assert_eq!(load_remediation_target(&bad).unwrap_err().code(), "FXO-2101");

        let empty = dir.path().join("empty.yaml");
        fs::write(&empty, "orphaned_sids: []\n").unwrap();
        assert_eq!(load_remediation_target(&empty).unwrap_err().code(), "FXO-2101");
    }
}
