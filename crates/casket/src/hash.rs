//! ContentDigest: a SHA-1 content hash (160 bits, 40 hex chars).
//!
//! The digest is the sole identity of stored content: identical bytes always
//! hash to the identical digest, so it doubles as the stored filename. The
//! hashing helpers are generic over `digest::Digest`, but the public type
//! pins SHA-1 — the algorithm must stay fixed for the lifetime of a store,
//! since mixing algorithms breaks the identity invariant.

use std::fmt;
use std::fs::File;
use std::io::{self, Read, Seek};
use std::path::Path;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use sha1::{Digest, Sha1};
use thiserror::Error;

/// Chunk size for streaming reads while hashing.
pub const CHUNK_SIZE: usize = 64 * 1024;

/// Hex length of a digest (SHA-1: 20 bytes, 40 hex chars).
pub const DIGEST_HEX_LEN: usize = 40;

/// A content digest - 160 bits (40 hex chars) of SHA-1.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ContentDigest(String);

/// Errors that can occur when working with content digests.
#[derive(Debug, Error)]
pub enum DigestError {
    #[error("invalid digest length: expected {DIGEST_HEX_LEN} hex chars, got {0}")]
    InvalidLength(usize),

    #[error("invalid hex character in digest")]
    InvalidHex,
}

/// Feed a reader through an incremental hasher in fixed-size chunks.
fn hash_reader<D: Digest, R: Read + ?Sized>(reader: &mut R) -> io::Result<String> {
    let mut hasher = D::new();
    let mut buf = vec![0u8; CHUNK_SIZE];
    loop {
        let n = reader.read(&mut buf)?;
        if n == 0 {
            break;
        }
        hasher.update(&buf[..n]);
    }
    Ok(hex::encode(hasher.finalize()))
}

impl ContentDigest {
    /// Hash an in-memory buffer.
    pub fn from_data(data: &[u8]) -> Self {
        Self(hex::encode(Sha1::digest(data)))
    }

    /// Hash a reader to exhaustion, streaming in [`CHUNK_SIZE`] chunks.
    ///
    /// The reader is left at end-of-stream; use [`from_stream`] when later
    /// consumers still need to read the content.
    ///
    /// [`from_stream`]: ContentDigest::from_stream
    pub fn from_reader<R: Read + ?Sized>(reader: &mut R) -> io::Result<Self> {
        Ok(Self(hash_reader::<Sha1, R>(reader)?))
    }

    /// Hash a seekable stream, then rewind it to the start so the content
    /// can be read again from the beginning.
    pub fn from_stream<R: Read + Seek + ?Sized>(stream: &mut R) -> io::Result<Self> {
        let digest = Self::from_reader(stream)?;
        stream.rewind()?;
        Ok(digest)
    }

    /// Hash the contents of a file on disk, streaming in chunks.
    pub fn from_file(path: &Path) -> io::Result<Self> {
        let mut file = File::open(path)?;
        Self::from_reader(&mut file)
    }

    /// Create from an existing digest string (validates format).
    pub fn from_str_checked(s: &str) -> Result<Self, DigestError> {
        if s.len() != DIGEST_HEX_LEN {
            return Err(DigestError::InvalidLength(s.len()));
        }
        if !s.chars().all(|c| c.is_ascii_hexdigit()) {
            return Err(DigestError::InvalidHex);
        }
        Ok(Self(s.to_lowercase()))
    }

    /// Get the full digest as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Consume and return the inner string.
    pub fn into_inner(self) -> String {
        self.0
    }
}

impl fmt::Display for ContentDigest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for ContentDigest {
    type Err = DigestError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::from_str_checked(s)
    }
}

impl AsRef<str> for ContentDigest {
    fn as_ref(&self) -> &str {
        &self.0
    }
}
