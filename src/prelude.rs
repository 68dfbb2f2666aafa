//! Convenience re-exports for library consumers.
//!
//! ```rust,no_run
//! use fix_owner::prelude::*;
//! ```

// Core
pub use crate::core::config::Config;
pub use crate::core::errors::{FixOwnerError, Result};

// Platform
pub use crate::platform::detect_owner_directory;
pub use crate::platform::owner::{MemoryDirectory, OwnerClassification, OwnerDirectory, Sid};

// Scanner
pub use crate::scanner::decision::{Decision, EntryOutcome, ExecutionMode};
pub use crate::scanner::failures::FailureRecord;
pub use crate::scanner::sid_registry::{SidRecord, SidRegistry, SidValidity};
pub use crate::scanner::stats::{EntryKind, WalkStatistics};
pub use crate::scanner::timeout::TimeoutGuard;
pub use crate::scanner::walker::{
    OutputLevel, OwnershipWalker, Termination, WalkConfig, WalkObserver, WalkReport,
};

// Report
pub use crate::report::export::{ReportSettings, ReportWriter};
pub use crate::report::remediation::{Priority, PriorityThresholds, RemediationPlan};
