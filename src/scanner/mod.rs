//! Ownership walk: traversal, per-entry decisions, counters, and identifier tally.

pub mod decision;
pub mod failures;
pub mod sid_registry;
pub mod stats;
pub mod timeout;
pub mod walker;
