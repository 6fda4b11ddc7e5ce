//! Content-addressable file storage with digest sharding.
//!
//! Files are stored under a name derived from the SHA-1 digest of their
//! content, so identical content is stored exactly once and a stored name is
//! always enough to find its bytes again. Digests are sharded into nested
//! directories to keep per-directory file counts bounded.
//!
//! # Quick Start
//!
//! ```rust,no_run
//! use std::io::Cursor;
//! use casket::{CasStore, DeleteTarget, StoreConfig};
//!
//! // From the environment (reads CASKET_ROOT et al.)
//! let config = StoreConfig::from_env().unwrap();
//! let store = CasStore::new(config).unwrap();
//!
//! // Or at a specific root
//! let store = CasStore::at_root("/srv/media").unwrap();
//!
//! // Save content; the stored name is the content digest
//! let name = store.save("photo.png", &mut Cursor::new(b"...".to_vec())).unwrap();
//! println!("stored as {name}");
//! println!("served at {}", store.public_url(&name));
//!
//! // Deletes must be confirmed; unconfirmed deletes are ignored, since any
//! // number of records may reference the same content
//! store.delete(DeleteTarget::LogicalName(name), true).unwrap();
//! ```
//!
//! # Configuration
//!
//! Environment variables:
//! - `CASKET_ROOT`: Root directory for stored objects (default:
//!   `~/.casket/media`)
//! - `CASKET_BASE_URL`: Public URL prefix (default: `/media/`)
//! - `CASKET_KEEP_EXTENSION`: Set to "false" to drop filename extensions
//!
//! # Concurrency
//!
//! The store is a stateless façade over filesystem operations and carries no
//! locks: content for a digest is immutable, saves go through a temp file
//! and an atomic rename, and racing writers of the same content simply
//! overwrite each other with identical bytes. Callers serialize legitimate
//! deletes themselves; the store has no reference count.

pub mod config;
pub mod error;
pub mod hash;
pub mod shard;
pub mod store;

// Re-exports for convenience
pub use config::StoreConfig;
pub use error::{Result, StoreError};
pub use hash::{ContentDigest, DigestError};
pub use shard::shard;
pub use store::{CasStore, DeleteTarget};
