//! Post-walk reporting: SID analysis export, remediation plan, failure log.

pub mod export;
pub mod remediation;
