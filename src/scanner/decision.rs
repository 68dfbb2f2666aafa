//! Per-entry decision engine: owner classification + execution mode → action.
//!
//! Pure and side-effect free. The walker feeds it the classification it got
//! from the owner directory and acts on the answer.

#![allow(missing_docs)]

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::core::errors::{FixOwnerError, Result};
use crate::platform::owner::OwnerClassification;

/// Whether ownership writes are performed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExecutionMode {
    /// Write new owners.
    Execute,
    /// Classify and decide, never write.
    Simulate,
}

impl ExecutionMode {
    #[must_use]
    pub const fn from_execute_flag(execute: bool) -> Self {
        if execute { Self::Execute } else { Self::Simulate }
    }

    #[must_use]
    pub const fn is_execute(self) -> bool {
        matches!(self, Self::Execute)
    }
}

impl fmt::Display for ExecutionMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Execute => write!(f, "execute"),
            Self::Simulate => write!(f, "simulate"),
        }
    }
}

/// What to do with one entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Decision {
    /// Owner is already a live account.
    Skip,
    /// Owner is orphaned but the run is simulated.
    WouldChange,
    /// Owner is orphaned; replace it.
    Change,
}

/// Final disposition of a processed entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum EntryOutcome {
    SkippedValid,
    Changed,
    /// Orphaned, left untouched because the run was simulated.
    SkippedByPolicy,
    Failed,
}

impl From<Decision> for EntryOutcome {
    fn from(decision: Decision) -> Self {
        match decision {
            Decision::Skip => Self::SkippedValid,
            Decision::WouldChange => Self::SkippedByPolicy,
            Decision::Change => Self::Changed,
        }
    }
}

/// Decide the action for an entry.
///
/// An unresolvable owner is not ownership evidence and comes back as an
/// error for the caller to record as a per-entry failure.
pub fn decide(classification: &OwnerClassification, mode: ExecutionMode) -> Result<Decision> {
    match classification {
        OwnerClassification::Valid { .. } => Ok(Decision::Skip),
        OwnerClassification::Orphaned { .. } => Ok(match mode {
            ExecutionMode::Execute => Decision::Change,
            ExecutionMode::Simulate => Decision::WouldChange,
        }),
        OwnerClassification::Unresolvable { sid, reason } => Err(FixOwnerError::Unresolvable {
            sid: sid.to_string(),
            reason: reason.clone(),
        }),
    }
}
