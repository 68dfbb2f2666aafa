//! Per-entry failures, kept as data instead of aborting the walk.

#![allow(missing_docs)]

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::core::errors::FixOwnerError;
use crate::scanner::stats::EntryKind;

/// Step of entry processing at which a failure happened.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureStage {
    /// Reading the entry's owner.
    Examine,
    /// Owner lookup was inconclusive.
    Classify,
    /// Writing the new owner.
    Change,
    /// Listing a directory's children.
    Enumerate,
}

impl FailureStage {
    #[must_use]
    pub const fn label(self) -> &'static str {
        match self {
            Self::Examine => "examine",
            Self::Classify => "classify",
            Self::Change => "change",
            Self::Enumerate => "enumerate",
        }
    }
}

/// Error returned from processing a single entry.
#[derive(Debug)]
pub struct EntryFailure {
    pub stage: FailureStage,
    pub error: FixOwnerError,
}

impl EntryFailure {
    #[must_use]
    pub const fn new(stage: FailureStage, error: FixOwnerError) -> Self {
        Self { stage, error }
    }

    /// Flatten into the serializable record kept on the walk report.
    #[must_use]
    pub fn into_record(self, path: PathBuf, kind: EntryKind) -> FailureRecord {
        FailureRecord {
            path,
            kind,
            stage: self.stage,
            code: self.error.code().to_string(),
            message: self.error.to_string(),
        }
    }
}

/// One absorbed failure, as reported after the walk.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FailureRecord {
    pub path: PathBuf,
    pub kind: EntryKind,
    pub stage: FailureStage,
    pub code: String,
    pub message: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn record_carries_code_and_message() {
        let failure = EntryFailure::new(
            FailureStage::Change,
            FixOwnerError::PermissionDenied {
                path: PathBuf::from("/data/locked"),
            },
        );
        let record = failure.into_record(PathBuf::from("/data/locked"), EntryKind::File);
        assert_eq!(record.code, "FXO-3004");
        assert_eq!(record.stage, FailureStage::Change);
        assert!(record.message.contains("/data/locked"));

        let json = serde_json::to_value(&record).unwrap();
        assert_eq!(json["stage"], "change");
        assert_eq!(json["kind"], "file");
    }
}
