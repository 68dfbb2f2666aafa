//! Structured activity logging (JSONL, append-only, graceful degradation).

pub mod jsonl;
