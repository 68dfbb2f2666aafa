#![forbid(unsafe_code)]

//! Fix Owner: find filesystem entries whose owner identifier no longer maps to
//! a live account, and hand them to a valid one.
//!
//! The walk is single-threaded and cooperative:
//! 1. **Preflight**: resolve and validate the target owner, check privilege and root
//! 2. **Traversal**: per entry read owner, classify, decide, act, count
//! 3. **Reporting**: statistics, per-SID tally, remediation plan, failure log
//!
//! # Library usage
//!
//! ```rust,no_run
//! use fix_owner::prelude::*;
//!
//! let directory = detect_owner_directory()?;
//! let mut config = WalkConfig::new("/srv/share", "root");
//! config.recurse = true;
//! let report = OwnershipWalker::new(&config, directory.as_ref()).walk()?;
//! println!("{} entries examined", report.stats.total_seen());
//! # Ok::<(), FixOwnerError>(())
//! ```

pub mod prelude;

pub mod core;
pub mod logger;
pub mod platform;
pub mod report;
pub mod scanner;
