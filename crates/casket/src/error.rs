//! Error taxonomy for store operations.
//!
//! The store performs no retries and no silent recovery of its own; every
//! failure propagates to the caller for a policy decision. The only two
//! silent successes are deliberate: saving content that already exists, and
//! an unconfirmed delete.

use std::io;
use std::path::PathBuf;

use thiserror::Error;

/// Errors that can occur during store operations.
#[derive(Debug, Error)]
pub enum StoreError {
    /// A shard path resolved outside the configured root. Always fatal to
    /// the call; never retried.
    #[error("attempted access to '{}' outside the storage root", path.display())]
    SecurityViolation { path: PathBuf },

    /// Delete target does not exist.
    #[error("no stored object at '{}'", path.display())]
    NotFound { path: PathBuf },

    /// Underlying filesystem failure (permission denied, disk full, device
    /// error). Propagated unchanged; retry policy belongs to the caller.
    #[error("storage i/o failure")]
    Io(#[from] io::Error),
}

pub type Result<T> = std::result::Result<T, StoreError>;
