//! POSIX ownership backend.
//!
//! uids are expressed in the Samba Unix-user namespace (`S-1-22-1-<uid>`). A
//! uid with no passwd entry is the POSIX analogue of an orphaned SID: the
//! account was deleted but its files were not.

#![allow(missing_docs)]

use std::collections::HashMap;
use std::fs;
use std::io::ErrorKind;
use std::os::unix::fs::MetadataExt;
use std::path::Path;

use nix::unistd::{Uid, User, geteuid};
use parking_lot::RwLock;

use crate::core::errors::{FixOwnerError, Result};
use crate::platform::owner::{OwnerClassification, OwnerDirectory, Sid};

/// Owner directory backed by the passwd database and `lchown`.
#[derive(Debug, Default)]
pub struct PosixOwnerDirectory {
    /// uid -> account name, `None` for uids without a passwd entry.
    names: RwLock<HashMap<u32, Option<String>>>,
}

impl PosixOwnerDirectory {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn lookup_uid(&self, uid: u32) -> std::result::Result<Option<String>, String> {
        if let Some(cached) = self.names.read().get(&uid) {
            return Ok(cached.clone());
        }
        match User::from_uid(Uid::from_raw(uid)) {
            Ok(user) => {
                let name = user.map(|u| u.name);
                self.names.write().insert(uid, name.clone());
                Ok(name)
            }
            // Lookup errors are transient; never cache them.
            Err(errno) => Err(errno.to_string()),
        }
    }
}

impl OwnerDirectory for PosixOwnerDirectory {
    fn resolve(&self, account: &str) -> Result<Sid> {
        let account = account.trim();
        if let Ok(sid) = Sid::parse(account) {
            let resolves = sid
                .unix_uid()
                .is_some_and(|uid| matches!(self.lookup_uid(uid), Ok(Some(_))));
            return if resolves {
                Ok(sid)
            } else {
                Err(FixOwnerError::AccountNotFound {
                    account: account.to_string(),
                })
            };
        }

        match User::from_name(account) {
            Ok(Some(user)) => {
                let uid = user.uid.as_raw();
                self.names.write().insert(uid, Some(user.name));
                Ok(Sid::from_unix_uid(uid))
            }
            Ok(None) => Err(FixOwnerError::AccountNotFound {
                account: account.to_string(),
            }),
            Err(errno) => Err(FixOwnerError::TargetOwnerInvalid {
                account: account.to_string(),
                details: errno.to_string(),
            }),
        }
    }

    fn owner_of(&self, path: &Path) -> Result<Sid> {
        let meta = fs::symlink_metadata(path).map_err(|source| FixOwnerError::io(path, source))?;
        Ok(Sid::from_unix_uid(meta.uid()))
    }

    fn classify(&self, sid: &Sid) -> OwnerClassification {
        let Some(uid) = sid.unix_uid() else {
            return OwnerClassification::Unresolvable {
                sid: sid.clone(),
                reason: "identifier is outside the Unix user namespace".to_string(),
            };
        };
        match self.lookup_uid(uid) {
            Ok(Some(name)) => OwnerClassification::Valid {
                sid: sid.clone(),
                name,
            },
            Ok(None) => OwnerClassification::Orphaned { sid: sid.clone() },
            Err(reason) => OwnerClassification::Unresolvable {
                sid: sid.clone(),
                reason,
            },
        }
    }

    fn set_owner(&self, path: &Path, sid: &Sid) -> Result<()> {
        let uid = sid.unix_uid().ok_or_else(|| FixOwnerError::OwnerUpdate {
            path: path.to_path_buf(),
            details: format!("{sid} has no POSIX uid"),
        })?;
        std::os::unix::fs::lchown(path, Some(uid), None).map_err(|source| {
            if source.kind() == ErrorKind::PermissionDenied {
                FixOwnerError::PermissionDenied {
                    path: path.to_path_buf(),
                }
            } else {
                FixOwnerError::OwnerUpdate {
                    path: path.to_path_buf(),
                    details: source.to_string(),
                }
            }
        })
    }

    fn current_account(&self) -> Result<String> {
        let uid = geteuid().as_raw();
        match self.lookup_uid(uid) {
            Ok(Some(name)) => Ok(name),
            Ok(None) | Err(_) => std::env::var("USER")
                .ok()
                .filter(|name| !name.trim().is_empty())
                .ok_or_else(|| FixOwnerError::Runtime {
                    details: format!("effective uid {uid} has no account name"),
                }),
        }
    }

    fn check_privileges(&self) -> Result<()> {
        let euid = geteuid();
        if euid.is_root() {
            Ok(())
        } else {
            Err(FixOwnerError::InsufficientPrivilege {
                details: format!(
                    "changing ownership requires root (effective uid {})",
                    euid.as_raw()
                ),
            })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn owner_of_reports_current_uid_for_new_files() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("mine.txt");
        fs::write(&path, b"").unwrap();

        let backend = PosixOwnerDirectory::new();
        let owner = backend.owner_of(&path).unwrap();
        assert_eq!(owner.unix_uid(), Some(geteuid().as_raw()));
    }

    #[test]
    fn owner_of_missing_path_is_io_error() {
        let backend = PosixOwnerDirectory::new();
        let err = backend
            .owner_of(Path::new("/nonexistent_fixown_dir/file"))
            .unwrap_err();
        assert_eq!(err.code(), "FXO-3005");
    }

    #[test]
    fn root_uid_classifies_valid() {
        let backend = PosixOwnerDirectory::new();
        let class = backend.classify(&Sid::from_unix_uid(0));
        assert_eq!(class.label(), "valid");
        assert_eq!(class.display_name(), Some("root"));
    }

    #[test]
    fn unused_uid_classifies_orphaned() {
        let backend = PosixOwnerDirectory::new();
        // Far outside any allocated range on test hosts.
        let class = backend.classify(&Sid::from_unix_uid(3_999_999_001));
        assert_eq!(class.label(), "orphaned");
    }

    #[test]
    fn foreign_namespace_is_unresolvable() {
        let backend = PosixOwnerDirectory::new();
        let sid = Sid::parse("S-1-5-21-1-1001").unwrap();
        assert_eq!(backend.classify(&sid).label(), "unresolvable");
        assert!(backend.set_owner(Path::new("/tmp"), &sid).is_err());
    }

    #[test]
    fn resolve_root_and_unknown() {
        let backend = PosixOwnerDirectory::new();
        assert_eq!(backend.resolve("root").unwrap(), Sid::from_unix_uid(0));
        assert!(matches!(
            backend.resolve("no_such_account_fixown_test"),
            Err(FixOwnerError::AccountNotFound { .. })
        ));
        assert!(backend.resolve("S-1-22-1-3999999001").is_err());
    }
}
