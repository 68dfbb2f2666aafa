//! Owner directory abstraction: identifier syntax, classification, and the
//! trait every ownership backend implements.
//!
//! The walk never touches security descriptors directly. It asks an
//! [`OwnerDirectory`] to read an owner, classify it, and write a replacement,
//! which keeps the traversal logic identical across the real backend and the
//! deterministic [`MemoryDirectory`] used in tests.

#![allow(missing_docs)]

use std::collections::{HashMap, HashSet};
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::sync::LazyLock;

use parking_lot::RwLock;
use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::core::errors::{FixOwnerError, Result};

static SID_SYNTAX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^S-1-\d+(-\d+)*$").expect("SID pattern compiles"));

/// Sub-authority prefix Samba uses to express POSIX uids as SIDs.
const UNIX_USER_PREFIX: &str = "S-1-22-1-";

/// Security identifier in its canonical string form (`S-1-5-21-…`).
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Sid(String);

impl Sid {
    /// Parse and validate the textual form. A lowercase `s-` prefix is accepted.
    pub fn parse(raw: &str) -> Result<Self> {
        let trimmed = raw.trim();
        let normalized = trimmed
            .strip_prefix("s-")
            .map_or_else(|| trimmed.to_string(), |rest| format!("S-{rest}"));
        if SID_SYNTAX.is_match(&normalized) {
            Ok(Self(normalized))
        } else {
            Err(FixOwnerError::InvalidSid {
                raw: raw.to_string(),
            })
        }
    }

    /// SID in the Unix-user namespace for a POSIX uid.
    #[must_use]
    pub fn from_unix_uid(uid: u32) -> Self {
        Self(format!("{UNIX_USER_PREFIX}{uid}"))
    }

    /// The POSIX uid when this SID lives in the Unix-user namespace.
    #[must_use]
    pub fn unix_uid(&self) -> Option<u32> {
        self.0
            .strip_prefix(UNIX_USER_PREFIX)
            .and_then(|rest| rest.parse().ok())
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Sid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl FromStr for Sid {
    type Err = FixOwnerError;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse(s)
    }
}

impl TryFrom<String> for Sid {
    type Error = FixOwnerError;

    fn try_from(value: String) -> Result<Self> {
        Self::parse(&value)
    }
}

impl From<Sid> for String {
    fn from(value: Sid) -> Self {
        value.0
    }
}

/// What the directory service knows about an owner identifier.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum OwnerClassification {
    /// Maps to an existing account or group.
    Valid { sid: Sid, name: String },
    /// Well-formed, but no account or group answers to it any more.
    Orphaned { sid: Sid },
    /// Lookup itself failed; says nothing about the owner.
    Unresolvable { sid: Sid, reason: String },
}

impl OwnerClassification {
    #[must_use]
    pub fn sid(&self) -> &Sid {
        match self {
            Self::Valid { sid, .. } | Self::Orphaned { sid } | Self::Unresolvable { sid, .. } => {
                sid
            }
        }
    }

    #[must_use]
    pub fn display_name(&self) -> Option<&str> {
        match self {
            Self::Valid { name, .. } => Some(name),
            Self::Orphaned { .. } | Self::Unresolvable { .. } => None,
        }
    }

    #[must_use]
    pub const fn label(&self) -> &'static str {
        match self {
            Self::Valid { .. } => "valid",
            Self::Orphaned { .. } => "orphaned",
            Self::Unresolvable { .. } => "unresolvable",
        }
    }
}

/// Read/write access to filesystem ownership plus identifier resolution.
///
/// Implementations must not follow symbolic links in `owner_of` or
/// `set_owner`: a link is an entry of its own.
pub trait OwnerDirectory: Send + Sync {
    /// Resolve an account name to its identifier.
    fn resolve(&self, account: &str) -> Result<Sid>;
    /// Current owner identifier of `path`.
    fn owner_of(&self, path: &Path) -> Result<Sid>;
    /// Decide whether `sid` maps to a live account.
    fn classify(&self, sid: &Sid) -> OwnerClassification;
    /// Replace the owner of `path`.
    fn set_owner(&self, path: &Path, sid: &Sid) -> Result<()>;
    /// Account the process runs as; the default remediation target.
    fn current_account(&self) -> Result<String>;
    /// Confirm the process may rewrite ownership. Checked once before an
    /// executing walk starts.
    fn check_privileges(&self) -> Result<()> {
        Ok(())
    }
}

/// In-memory owner directory for deterministic tests and embedding.
///
/// Paths without an explicit owner fall back to the default owner. Any
/// well-formed SID not registered as an account or marked unresolvable
/// classifies as orphaned.
#[derive(Debug, Default)]
pub struct MemoryDirectory {
    accounts: HashMap<String, Sid>,
    names: HashMap<Sid, String>,
    unresolvable: HashMap<Sid, String>,
    owners: RwLock<HashMap<PathBuf, Sid>>,
    default_owner: Option<Sid>,
    read_failures: HashSet<PathBuf>,
    write_failures: HashSet<PathBuf>,
    writes: RwLock<Vec<(PathBuf, Sid)>>,
    current: Option<String>,
    unprivileged: bool,
}

impl MemoryDirectory {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a live account.
    #[must_use]
    pub fn with_account(mut self, name: &str, sid: Sid) -> Self {
        self.accounts.insert(name.to_ascii_lowercase(), sid.clone());
        self.names.insert(sid, name.to_string());
        self
    }

    /// Make lookups of `sid` fail transiently.
    #[must_use]
    pub fn with_unresolvable(mut self, sid: Sid, reason: &str) -> Self {
        self.unresolvable.insert(sid, reason.to_string());
        self
    }

    #[must_use]
    pub fn with_owner(self, path: impl Into<PathBuf>, sid: Sid) -> Self {
        self.owners.write().insert(path.into(), sid);
        self
    }

    #[must_use]
    pub fn with_default_owner(mut self, sid: Sid) -> Self {
        self.default_owner = Some(sid);
        self
    }

    /// Reading the owner of `path` fails with access denied.
    #[must_use]
    pub fn fail_read(mut self, path: impl Into<PathBuf>) -> Self {
        self.read_failures.insert(path.into());
        self
    }

    /// Writing the owner of `path` fails with access denied.
    #[must_use]
    pub fn fail_write(mut self, path: impl Into<PathBuf>) -> Self {
        self.write_failures.insert(path.into());
        self
    }

    #[must_use]
    pub fn with_current_account(mut self, name: &str) -> Self {
        self.current = Some(name.to_string());
        self
    }

    /// Refuse the privilege preflight.
    #[must_use]
    pub fn without_privilege(mut self) -> Self {
        self.unprivileged = true;
        self
    }

    /// Owner currently recorded for `path`, including the default.
    pub fn owner(&self, path: &Path) -> Option<Sid> {
        self.owners
            .read()
            .get(path)
            .cloned()
            .or_else(|| self.default_owner.clone())
    }

    /// Every successful `set_owner` call in order.
    pub fn writes(&self) -> Vec<(PathBuf, Sid)> {
        self.writes.read().clone()
    }
}

impl OwnerDirectory for MemoryDirectory {
    fn resolve(&self, account: &str) -> Result<Sid> {
        if let Some(sid) = self.accounts.get(&account.trim().to_ascii_lowercase()) {
            return Ok(sid.clone());
        }
        // A literal SID names an account only if something answers to it.
        if let Ok(sid) = Sid::parse(account)
            && self.names.contains_key(&sid)
        {
            return Ok(sid);
        }
        Err(FixOwnerError::AccountNotFound {
            account: account.to_string(),
        })
    }

    fn owner_of(&self, path: &Path) -> Result<Sid> {
        if self.read_failures.contains(path) {
            return Err(FixOwnerError::PermissionDenied {
                path: path.to_path_buf(),
            });
        }
        self.owner(path).ok_or_else(|| FixOwnerError::OwnerLookup {
            path: path.to_path_buf(),
            details: "no owner recorded".to_string(),
        })
    }

    fn classify(&self, sid: &Sid) -> OwnerClassification {
        if let Some(reason) = self.unresolvable.get(sid) {
            return OwnerClassification::Unresolvable {
                sid: sid.clone(),
                reason: reason.clone(),
            };
        }
        match self.names.get(sid) {
            Some(name) => OwnerClassification::Valid {
                sid: sid.clone(),
                name: name.clone(),
            },
            None => OwnerClassification::Orphaned { sid: sid.clone() },
        }
    }

    fn set_owner(&self, path: &Path, sid: &Sid) -> Result<()> {
        if self.write_failures.contains(path) {
            return Err(FixOwnerError::PermissionDenied {
                path: path.to_path_buf(),
            });
        }
        self.owners.write().insert(path.to_path_buf(), sid.clone());
        self.writes.write().push((path.to_path_buf(), sid.clone()));
        Ok(())
    }

    fn current_account(&self) -> Result<String> {
        self.current
            .clone()
            .ok_or_else(|| FixOwnerError::Runtime {
                details: "no current account configured".to_string(),
            })
    }

    fn check_privileges(&self) -> Result<()> {
        if self.unprivileged {
            return Err(FixOwnerError::InsufficientPrivilege {
                details: "ownership changes are not permitted for this process".to_string(),
            });
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sid(raw: &str) -> Sid {
        Sid::parse(raw).expect("valid sid")
    }

    #[test]
    fn sid_parse_accepts_canonical_forms() {
        assert_eq!(sid("S-1-5-18").as_str(), "S-1-5-18");
        assert_eq!(sid(" s-1-5-21-100-200-300-1001 ").as_str(), "S-1-5-21-100-200-300-1001");
        assert_eq!(sid("S-1-1").as_str(), "S-1-1");
    }

    #[test]
    fn sid_parse_rejects_garbage() {
        for raw in ["", "S-2-5-18", "S-1-", "S-1-5-", "Administrator", "S-1-5-x"] {
            let err = Sid::parse(raw).expect_err(raw);
            assert_eq!(err.code(), "FXO-2005", "{raw}");
        }
    }

    #[test]
    fn unix_uid_round_trip() {
        let s = Sid::from_unix_uid(1000);
        assert_eq!(s.as_str(), "S-1-22-1-1000");
        assert_eq!(s.unix_uid(), Some(1000));
        assert_eq!(sid("S-1-5-18").unix_uid(), None);
    }

    #[test]
    fn sid_serializes_as_plain_string() {
        let json = serde_json::to_string(&sid("S-1-5-32-544")).unwrap();
        assert_eq!(json, "\"S-1-5-32-544\"");
        let back: Sid = serde_json::from_str(&json).unwrap();
        assert_eq!(back, sid("S-1-5-32-544"));
        assert!(serde_json::from_str::<Sid>("\"nope\"").is_err());
    }

    #[test]
    fn memory_directory_classifies_by_registration() {
        let dir = MemoryDirectory::new()
            .with_account("Alice", sid("S-1-5-21-1-1001"))
            .with_unresolvable(sid("S-1-5-21-1-1003"), "domain controller unreachable");

        assert_eq!(
            dir.classify(&sid("S-1-5-21-1-1001")),
            OwnerClassification::Valid {
                sid: sid("S-1-5-21-1-1001"),
                name: "Alice".to_string()
            }
        );
        assert_eq!(
            dir.classify(&sid("S-1-5-21-1-1002")).label(),
            "orphaned"
        );
        assert_eq!(
            dir.classify(&sid("S-1-5-21-1-1003")).label(),
            "unresolvable"
        );
    }

    #[test]
    fn memory_directory_resolves_names_case_insensitively() {
        let dir = MemoryDirectory::new().with_account("Alice", sid("S-1-5-21-1-1001"));
        assert_eq!(dir.resolve("alice").unwrap(), sid("S-1-5-21-1-1001"));
        assert_eq!(dir.resolve("S-1-5-21-1-1001").unwrap(), sid("S-1-5-21-1-1001"));
        assert!(matches!(
            dir.resolve("bob"),
            Err(FixOwnerError::AccountNotFound { .. })
        ));
        // Well-formed but unowned SIDs are not valid targets.
        assert!(dir.resolve("S-1-5-21-1-9999").is_err());
    }

    #[test]
    fn memory_directory_owner_defaults_and_writes() {
        let dir = MemoryDirectory::new()
            .with_default_owner(sid("S-1-5-18"))
            .with_owner("/t/a", sid("S-1-5-21-1-1002"));

        assert_eq!(dir.owner_of(Path::new("/t/a")).unwrap(), sid("S-1-5-21-1-1002"));
        assert_eq!(dir.owner_of(Path::new("/t/b")).unwrap(), sid("S-1-5-18"));

        dir.set_owner(Path::new("/t/a"), &sid("S-1-5-18")).unwrap();
        assert_eq!(dir.owner(Path::new("/t/a")), Some(sid("S-1-5-18")));
        assert_eq!(dir.writes().len(), 1);
    }

    #[test]
    fn memory_directory_induced_failures() {
        let dir = MemoryDirectory::new()
            .with_default_owner(sid("S-1-5-18"))
            .fail_read("/t/locked")
            .fail_write("/t/readonly")
            .without_privilege();

        assert_eq!(
            dir.owner_of(Path::new("/t/locked")).unwrap_err().code(),
            "FXO-3004"
        );
        assert!(dir.set_owner(Path::new("/t/readonly"), &sid("S-1-5-18")).is_err());
        assert!(dir.writes().is_empty());
        assert_eq!(dir.check_privileges().unwrap_err().code(), "FXO-2003");
        assert!(dir.current_account().is_err());
    }
}
