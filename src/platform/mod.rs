//! Ownership backends behind the [`owner::OwnerDirectory`] trait.

use std::sync::Arc;

use crate::core::errors::Result;

pub mod owner;
#[cfg(unix)]
pub mod posix;

/// Detect the ownership backend for the running platform.
pub fn detect_owner_directory() -> Result<Arc<dyn owner::OwnerDirectory>> {
    #[cfg(unix)]
    {
        Ok(Arc::new(posix::PosixOwnerDirectory::new()))
    }
    #[cfg(not(unix))]
    {
        Err(crate::core::errors::FixOwnerError::UnsupportedPlatform {
            details: "no ownership backend is available for this target".to_string(),
        })
    }
}
