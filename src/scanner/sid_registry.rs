//! Per-identifier ownership tally.
//!
//! Every examined entry whose owner could be read is recorded here, changed or
//! not and in every execution mode, so the counts describe the tree as it was
//! found.

#![allow(missing_docs)]

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::platform::owner::{OwnerClassification, Sid};
use crate::scanner::stats::EntryKind;

/// Display name used when an identifier does not resolve.
pub const UNKNOWN_NAME: &str = "unknown";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SidValidity {
    Valid,
    Orphaned,
    /// Lookup failed; validity not established.
    Unknown,
}

impl SidValidity {
    const fn from_classification(classification: &OwnerClassification) -> Self {
        match classification {
            OwnerClassification::Valid { .. } => Self::Valid,
            OwnerClassification::Orphaned { .. } => Self::Orphaned,
            OwnerClassification::Unresolvable { .. } => Self::Unknown,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SidRecord {
    pub sid: Sid,
    pub display_name: String,
    pub validity: SidValidity,
    pub file_count: u64,
    pub dir_count: u64,
}

impl SidRecord {
    pub const fn total(&self) -> u64 {
        self.file_count + self.dir_count
    }
}

/// Aggregate counts over the registry.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RegistrySummary {
    pub files_tracked: u64,
    pub dirs_tracked: u64,
    pub unique_sids: usize,
    pub valid_sids: usize,
    pub orphaned_sids: usize,
    pub unknown_sids: usize,
}

#[derive(Debug, Clone, Default)]
pub struct SidRegistry {
    entries: HashMap<Sid, SidRecord>,
}

impl SidRegistry {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Count one entry owned by `sid`.
    ///
    /// A definitive classification (valid or orphaned) refreshes the stored
    /// one; a failed lookup only fills in an identifier seen for the first time.
    pub fn record(&mut self, sid: &Sid, kind: EntryKind, classification: &OwnerClassification) {
        let validity = SidValidity::from_classification(classification);
        let display_name = classification
            .display_name()
            .unwrap_or(UNKNOWN_NAME)
            .to_string();

        let record = self
            .entries
            .entry(sid.clone())
            .or_insert_with(|| SidRecord {
                sid: sid.clone(),
                display_name: display_name.clone(),
                validity,
                file_count: 0,
                dir_count: 0,
            });

        match kind {
            EntryKind::Directory => record.dir_count += 1,
            EntryKind::File => record.file_count += 1,
        }

        if validity != SidValidity::Unknown {
            record.validity = validity;
            record.display_name = display_name;
        }
    }

    pub fn get(&self, sid: &Sid) -> Option<&SidRecord> {
        self.entries.get(sid)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Records ordered by total occurrences descending, then identifier ascending.
    pub fn snapshot(&self) -> Vec<SidRecord> {
        let mut records: Vec<SidRecord> = self.entries.values().cloned().collect();
        records.sort_by(|a, b| {
            b.total()
                .cmp(&a.total())
                .then_with(|| a.sid.as_str().cmp(b.sid.as_str()))
        });
        records
    }

    /// Orphaned records in snapshot order.
    pub fn orphaned(&self) -> Vec<SidRecord> {
        self.snapshot()
            .into_iter()
            .filter(|r| r.validity == SidValidity::Orphaned)
            .collect()
    }

    pub fn summary(&self) -> RegistrySummary {
        self.entries
            .values()
            .fold(RegistrySummary::default(), |mut acc, record| {
                acc.files_tracked += record.file_count;
                acc.dirs_tracked += record.dir_count;
                acc.unique_sids += 1;
                match record.validity {
                    SidValidity::Valid => acc.valid_sids += 1,
                    SidValidity::Orphaned => acc.orphaned_sids += 1,
                    SidValidity::Unknown => acc.unknown_sids += 1,
                }
                acc
            })
    }
}
