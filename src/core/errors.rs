//! FXO-prefixed error types with structured error codes.

#![allow(missing_docs)]

use std::path::{Path, PathBuf};

use thiserror::Error;

/// Shared `Result` alias for the project.
pub type Result<T> = std::result::Result<T, FixOwnerError>;

/// Top-level error type for the ownership remediation walker.
#[derive(Debug, Error)]
pub enum FixOwnerError {
    #[error("[FXO-1001] invalid configuration: {details}")]
    InvalidConfig { details: String },

    #[error("[FXO-1002] missing configuration file: {path}")]
    MissingConfig { path: PathBuf },

    #[error("[FXO-1003] configuration parse failure in {context}: {details}")]
    ConfigParse {
        context: &'static str,
        details: String,
    },

    #[error("[FXO-1101] unsupported platform: {details}")]
    UnsupportedPlatform { details: String },

    #[error("[FXO-2001] invalid walk root {path}: {details}")]
    InvalidRoot { path: PathBuf, details: String },

    #[error("[FXO-2002] target owner {account} is not a valid account: {details}")]
    TargetOwnerInvalid { account: String, details: String },

    #[error("[FXO-2003] insufficient privilege: {details}")]
    InsufficientPrivilege { details: String },

    #[error("[FXO-2004] account not found: {account}")]
    AccountNotFound { account: String },

    #[error("[FXO-2005] malformed security identifier: {raw:?}")]
    InvalidSid { raw: String },

    #[error("[FXO-2101] remediation plan {path} unusable: {details}")]
    RemediationPlan { path: PathBuf, details: String },

    #[error("[FXO-3001] cannot read owner of {path}: {details}")]
    OwnerLookup { path: PathBuf, details: String },

    #[error("[FXO-3002] cannot set owner of {path}: {details}")]
    OwnerUpdate { path: PathBuf, details: String },

    #[error("[FXO-3003] identifier {sid} could not be resolved: {reason}")]
    Unresolvable { sid: String, reason: String },

    #[error("[FXO-3004] permission denied for {path}")]
    PermissionDenied { path: PathBuf },

    #[error("[FXO-3005] IO failure at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("[FXO-3900] runtime failure: {details}")]
    Runtime { details: String },

    #[error("[FXO-4001] serialization failure in {context}: {details}")]
    Serialization {
        context: &'static str,
        details: String,
    },
}

impl FixOwnerError {
    /// Stable machine-parseable error code.
    #[must_use]
    pub const fn code(&self) -> &'static str {
        match self {
            Self::InvalidConfig { .. } => "FXO-1001",
            Self::MissingConfig { .. } => "FXO-1002",
            Self::ConfigParse { .. } => "FXO-1003",
            Self::UnsupportedPlatform { .. } => "FXO-1101",
            Self::InvalidRoot { .. } => "FXO-2001",
            Self::TargetOwnerInvalid { .. } => "FXO-2002",
            Self::InsufficientPrivilege { .. } => "FXO-2003",
            Self::AccountNotFound { .. } => "FXO-2004",
            Self::InvalidSid { .. } => "FXO-2005",
            Self::RemediationPlan { .. } => "FXO-2101",
            Self::OwnerLookup { .. } => "FXO-3001",
            Self::OwnerUpdate { .. } => "FXO-3002",
            Self::Unresolvable { .. } => "FXO-3003",
            Self::PermissionDenied { .. } => "FXO-3004",
            Self::Io { .. } => "FXO-3005",
            Self::Runtime { .. } => "FXO-3900",
            Self::Serialization { .. } => "FXO-4001",
        }
    }

    /// Whether the error belongs to the pre-condition class that aborts a walk
    /// before any entry is examined.
    #[must_use]
    pub const fn is_fatal(&self) -> bool {
        matches!(
            self,
            Self::InvalidConfig { .. }
                | Self::MissingConfig { .. }
                | Self::ConfigParse { .. }
                | Self::UnsupportedPlatform { .. }
                | Self::InvalidRoot { .. }
                | Self::TargetOwnerInvalid { .. }
                | Self::InsufficientPrivilege { .. }
                | Self::AccountNotFound { .. }
                | Self::RemediationPlan { .. }
        )
    }

    /// Convenience constructor for IO errors with a known path.
    #[must_use]
    pub fn io(path: impl AsRef<Path>, source: std::io::Error) -> Self {
        let path = path.as_ref().to_path_buf();
        if source.kind() == std::io::ErrorKind::PermissionDenied {
            return Self::PermissionDenied { path };
        }
        Self::Io { path, source }
    }
}

impl From<serde_json::Error> for FixOwnerError {
    fn from(value: serde_json::Error) -> Self {
        Self::Serialization {
            context: "serde_json",
            details: value.to_string(),
        }
    }
}

impl From<serde_yaml::Error> for FixOwnerError {
    fn from(value: serde_yaml::Error) -> Self {
        Self::Serialization {
            context: "serde_yaml",
            details: value.to_string(),
        }
    }
}

impl From<toml::de::Error> for FixOwnerError {
    fn from(value: toml::de::Error) -> Self {
        Self::ConfigParse {
            context: "toml",
            details: value.to_string(),
        }
    }
}
