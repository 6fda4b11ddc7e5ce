//! CasStore: content-addressable file storage over an ordinary filesystem.
//!
//! Objects are stored once per digest, under a path derived from the digest
//! itself:
//!
//! ```text
//! {root}/
//! ├── 1f/
//! │   └── 09/
//! │       └── 1f09d30c707d53f3d16c530dd73d70a6ce7596a9.png
//! └── da/
//!     └── 39/
//!         └── da39a3ee5e6b4b0d3255bfef95601890afd80709
//! ```
//!
//! The full digest reappears as the leaf filename, so an object can be
//! located from its name alone. Content for a given digest is immutable,
//! which makes saves idempotent and concurrent writers benign: racing
//! writers produce identical bytes, and rename-into-place keeps readers
//! from ever observing a partial file.

use std::fs::{self, File};
use std::io::{self, Read, Seek};
use std::os::unix::fs::MetadataExt;
use std::path::{Component, Path, PathBuf};

use uuid::Uuid;

use crate::config::StoreConfig;
use crate::error::{Result, StoreError};
use crate::hash::ContentDigest;
use crate::shard::shard;

/// Target of a delete operation.
///
/// Callers state explicitly whether they hold a logical stored name or an
/// already-resolved filesystem path, rather than the store sniffing for
/// path separators.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DeleteTarget {
    /// A stored name; resolved through the shard mapper.
    LogicalName(String),
    /// A filesystem path, used as-is.
    ResolvedPath(PathBuf),
}

/// A content-addressable store rooted at a configured directory.
///
/// Stateless per call apart from the immutable configuration, so it is cheap
/// to clone and safe to share across threads or async tasks.
#[derive(Debug, Clone)]
pub struct CasStore {
    config: StoreConfig,
}

impl CasStore {
    /// Create a store with the given configuration, creating the root
    /// directory if it does not exist.
    pub fn new(config: StoreConfig) -> Result<Self> {
        let config = config.normalized();
        fs::create_dir_all(&config.root)?;
        Ok(Self { config })
    }

    /// Create a store rooted at a specific directory with default settings.
    pub fn at_root(root: impl Into<PathBuf>) -> Result<Self> {
        Self::new(StoreConfig::with_root(root))
    }

    /// Get the configuration.
    pub fn config(&self) -> &StoreConfig {
        &self.config
    }

    /// Return the caller's proposed name unchanged.
    ///
    /// Proposed names carry no identity here; the stored name is decided by
    /// the content digest at save time.
    pub fn resolve_name<'a>(&self, name: &'a str) -> &'a str {
        name
    }

    /// Shard a stored name into its path segments.
    fn segments(&self, name: &str) -> Vec<String> {
        shard(name, self.config.shard_width, self.config.shard_depth, false)
    }

    /// Resolve a stored name to its physical path under the root.
    ///
    /// Fails with [`StoreError::SecurityViolation`] if the joined path would
    /// escape the configured root; a traversal attempt never resolves.
    pub fn physical_path(&self, name: &str) -> Result<PathBuf> {
        let mut joined = self.config.root.clone();
        for segment in self.segments(name) {
            joined.push(segment);
        }

        let resolved = lexical_normalize(&joined);
        if !resolved.starts_with(lexical_normalize(&self.config.root)) {
            return Err(StoreError::SecurityViolation { path: resolved });
        }
        Ok(resolved)
    }

    /// Public URL for a stored name: the shard segments joined onto the
    /// base URL.
    pub fn public_url(&self, name: &str) -> String {
        format!("{}{}", self.config.base_url, self.segments(name).join("/"))
    }

    /// Check whether an object with this stored name is present.
    pub fn exists(&self, name: &str) -> Result<bool> {
        Ok(self.physical_path(name)?.exists())
    }

    /// Compute the content digest of a stream without storing it.
    ///
    /// The stream is rewound afterward so it can still be consumed from the
    /// beginning.
    pub fn get_digest<R: Read + Seek + ?Sized>(&self, content: &mut R) -> Result<String> {
        Ok(ContentDigest::from_stream(content)?.into_inner())
    }

    /// Save content, returning the stored name it ended up under.
    ///
    /// The name is derived from the content digest; `name` contributes only
    /// its extension, and only when `keep_extension` is set. If an object
    /// with the same digest is already present this is a no-op returning the
    /// same stored name. Otherwise the content is streamed to a uniquely
    /// named temp file in the destination directory and renamed into place,
    /// so concurrent readers never see a partial object.
    pub fn save<R: Read + Seek + ?Sized>(&self, name: &str, content: &mut R) -> Result<String> {
        let digest = ContentDigest::from_stream(content)?;
        let stored = self.stored_name(name, digest);
        let dest = self.physical_path(&stored)?;

        if dest.exists() {
            return Ok(stored);
        }

        let parent = dest.parent().unwrap_or(&self.config.root);
        fs::create_dir_all(parent)?;

        let tmp = parent.join(format!(".tmp-{}", Uuid::new_v4().simple()));
        let mut file = File::create(&tmp)?;
        if let Err(e) = io::copy(content, &mut file) {
            let _ = fs::remove_file(&tmp);
            return Err(e.into());
        }
        drop(file);
        fs::rename(&tmp, &dest)?;

        Ok(stored)
    }

    /// Save content that is already materialized as a file on local disk.
    ///
    /// The source file is hashed by streaming and then moved into the store:
    /// rename when possible, copy + delete across filesystems. On a dedup
    /// hit the existing object is kept and the source file is removed.
    pub fn save_file(&self, name: &str, source: &Path) -> Result<String> {
        let digest = ContentDigest::from_file(source)?;
        let stored = self.stored_name(name, digest);
        let dest = self.physical_path(&stored)?;

        if dest.exists() {
            fs::remove_file(source)?;
            return Ok(stored);
        }

        let parent = dest.parent().unwrap_or(&self.config.root);
        fs::create_dir_all(parent)?;

        match fs::rename(source, &dest) {
            Ok(()) => {}
            Err(e) if e.raw_os_error() == Some(libc::EXDEV) => {
                // Cross-filesystem: fall back to copy + delete
                fs::copy(source, &dest)?;
                fs::remove_file(source)?;
            }
            Err(e) => return Err(e.into()),
        }

        Ok(stored)
    }

    /// Delete a stored object.
    ///
    /// When `confirmed` is false this is a silent no-op: an unknown number
    /// of logical records may reference the same digest and the store keeps
    /// no reference count, so automatic deletes must never remove content.
    /// Callers opt into destruction explicitly.
    ///
    /// When confirmed, the file is unlinked and every ancestor directory
    /// that becomes empty is removed, walking upward until a non-empty
    /// directory or the root itself (compared by device and inode, so
    /// symlinked roots behave). The upward walk is not atomic with respect
    /// to concurrent saves into the same directories; a directory that
    /// fills up or vanishes mid-walk just stops the walk.
    pub fn delete(&self, target: DeleteTarget, confirmed: bool) -> Result<()> {
        if !confirmed {
            // Ignore automatic deletions; we don't know how many different
            // records point to one file.
            return Ok(());
        }

        let path = match target {
            DeleteTarget::LogicalName(name) => self.physical_path(&name)?,
            DeleteTarget::ResolvedPath(path) => path,
        };

        match fs::remove_file(&path) {
            Ok(()) => {}
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                return Err(StoreError::NotFound { path });
            }
            Err(e) => return Err(e.into()),
        }

        self.prune_empty_parents(&path)
    }

    /// Append the original name's extension to the digest when configured.
    fn stored_name(&self, name: &str, digest: ContentDigest) -> String {
        if self.config.keep_extension {
            if let Some(ext) = name_extension(name) {
                return format!("{digest}{ext}");
            }
        }
        digest.into_inner()
    }

    /// Remove now-empty ancestor directories of `path`, stopping at the
    /// first non-empty directory or at the store root.
    fn prune_empty_parents(&self, path: &Path) -> Result<()> {
        let root_meta = fs::metadata(&self.config.root)?;
        let mut dir = path.parent().map(Path::to_path_buf);

        while let Some(current) = dir {
            let meta = match fs::metadata(&current) {
                Ok(meta) => meta,
                Err(e) if e.kind() == io::ErrorKind::NotFound => break,
                Err(e) => return Err(e.into()),
            };
            if same_inode(&root_meta, &meta) {
                break;
            }

            if fs::read_dir(&current)?.next().is_some() {
                break;
            }

            match fs::remove_dir(&current) {
                Ok(()) => {}
                // A concurrent save or delete got there first; stop walking.
                Err(e) if e.kind() == io::ErrorKind::NotFound => break,
                Err(e) if e.raw_os_error() == Some(libc::ENOTEMPTY) => break,
                Err(e) => return Err(e.into()),
            }

            dir = current.parent().map(Path::to_path_buf);
        }

        Ok(())
    }
}

/// Compare two directories by filesystem identity rather than path text.
fn same_inode(a: &fs::Metadata, b: &fs::Metadata) -> bool {
    a.dev() == b.dev() && a.ino() == b.ino()
}

/// Resolve `.` and `..` components lexically, without touching the
/// filesystem.
fn lexical_normalize(path: &Path) -> PathBuf {
    let mut out = PathBuf::new();
    for component in path.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => match out.components().next_back() {
                Some(Component::Normal(_)) => {
                    out.pop();
                }
                // ".." above the root stays at the root
                Some(Component::RootDir | Component::Prefix(_)) => {}
                _ => out.push(".."),
            },
            other => out.push(other.as_os_str()),
        }
    }
    out
}

/// Extension of the last path component of `name`, including the dot.
///
/// A lone leading dot is a hidden file, not an extension.
fn name_extension(name: &str) -> Option<&str> {
    let base = name.rsplit(['/', '\\']).next().unwrap_or(name);
    let stem = base.trim_start_matches('.');
    let dot = stem.rfind('.')?;
    Some(&base[base.len() - stem.len() + dot..])
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::Result;
    use std::io::Cursor;
    use std::sync::Arc;
    use std::thread;
    use tempfile::TempDir;

    fn store_at(dir: &TempDir) -> Result<CasStore> {
        Ok(CasStore::at_root(dir.path())?)
    }

    #[test]
    fn test_save_and_exists() -> Result<()> {
        let dir = TempDir::new()?;
        let store = store_at(&dir)?;

        let stored = store.save("notes.txt", &mut Cursor::new(b"hello world".to_vec()))?;
        assert!(store.exists(&stored)?);

        let path = store.physical_path(&stored)?;
        assert!(path.starts_with(dir.path()));
        assert_eq!(fs::read(&path)?, b"hello world");
        Ok(())
    }

    #[test]
    fn test_stored_name_is_digest_plus_extension() -> Result<()> {
        let dir = TempDir::new()?;
        let store = store_at(&dir)?;

        let digest = ContentDigest::from_data(b"image bytes");
        let stored = store.save("photo.png", &mut Cursor::new(b"image bytes".to_vec()))?;
        assert_eq!(stored, format!("{digest}.png"));
        Ok(())
    }

    #[test]
    fn test_keep_extension_false_yields_bare_digest() -> Result<()> {
        let dir = TempDir::new()?;
        let config = StoreConfig {
            keep_extension: false,
            ..StoreConfig::with_root(dir.path())
        };
        let store = CasStore::new(config)?;

        let stored = store.save("photo.png", &mut Cursor::new(b"image bytes".to_vec()))?;
        assert_eq!(stored, ContentDigest::from_data(b"image bytes").into_inner());
        Ok(())
    }

    #[test]
    fn test_name_without_extension() -> Result<()> {
        let dir = TempDir::new()?;
        let store = store_at(&dir)?;

        let stored = store.save("README", &mut Cursor::new(b"docs".to_vec()))?;
        assert_eq!(stored, ContentDigest::from_data(b"docs").into_inner());
        Ok(())
    }

    #[test]
    fn test_save_is_idempotent_and_skips_write() -> Result<()> {
        let dir = TempDir::new()?;
        let store = store_at(&dir)?;

        let data = b"only stored once".to_vec();
        let first = store.save("a.bin", &mut Cursor::new(data.clone()))?;

        // Plant sentinel bytes at the resolved path; a second save of the
        // same content must not write at all, so the sentinel survives.
        let path = store.physical_path(&first)?;
        fs::write(&path, b"sentinel")?;

        let second = store.save("b.bin", &mut Cursor::new(data))?;
        assert_eq!(first, second);
        assert_eq!(fs::read(&path)?, b"sentinel");
        Ok(())
    }

    #[test]
    fn test_identical_content_stored_once() -> Result<()> {
        let dir = TempDir::new()?;
        let store = store_at(&dir)?;

        let n1 = store.save("one.txt", &mut Cursor::new(b"same bytes".to_vec()))?;
        let n2 = store.save("two.txt", &mut Cursor::new(b"same bytes".to_vec()))?;
        assert_eq!(n1, n2);
        Ok(())
    }

    #[test]
    fn test_physical_path_layout() -> Result<()> {
        let dir = TempDir::new()?;
        let store = store_at(&dir)?;

        let name = "1f09d30c707d53f3d16c530dd73d70a6ce7596a9";
        let path = store.physical_path(name)?;
        assert_eq!(path, dir.path().join("1f").join("09").join(name));
        Ok(())
    }

    #[test]
    fn test_traversal_is_rejected() -> Result<()> {
        let dir = TempDir::new()?;
        let store = store_at(&dir)?;

        let result = store.physical_path("../../etc/passwd");
        assert!(matches!(result, Err(StoreError::SecurityViolation { .. })));

        let result = store.physical_path("/etc/passwd");
        assert!(matches!(result, Err(StoreError::SecurityViolation { .. })));
        Ok(())
    }

    #[test]
    fn test_public_url() -> Result<()> {
        let dir = TempDir::new()?;
        let config = StoreConfig {
            base_url: "/media".to_string(), // missing slash, normalized by the store
            ..StoreConfig::with_root(dir.path())
        };
        let store = CasStore::new(config)?;

        let name = "1f09d30c707d53f3d16c530dd73d70a6ce7596a9";
        assert_eq!(store.public_url(name), format!("/media/1f/09/{name}"));
        Ok(())
    }

    #[test]
    fn test_resolve_name_is_identity() -> Result<()> {
        let dir = TempDir::new()?;
        let store = store_at(&dir)?;
        assert_eq!(store.resolve_name("whatever.png"), "whatever.png");
        Ok(())
    }

    #[test]
    fn test_get_digest_rewinds() -> Result<()> {
        let dir = TempDir::new()?;
        let store = store_at(&dir)?;

        let mut cursor = Cursor::new(b"digest me".to_vec());
        let digest = store.get_digest(&mut cursor)?;
        assert_eq!(digest, ContentDigest::from_data(b"digest me").into_inner());
        assert_eq!(cursor.position(), 0);
        Ok(())
    }

    #[test]
    fn test_unconfirmed_delete_is_noop() -> Result<()> {
        let dir = TempDir::new()?;
        let store = store_at(&dir)?;

        let stored = store.save("keep.txt", &mut Cursor::new(b"referenced twice".to_vec()))?;
        store.delete(DeleteTarget::LogicalName(stored.clone()), false)?;
        assert!(store.exists(&stored)?);
        Ok(())
    }

    #[test]
    fn test_confirmed_delete_prunes_but_keeps_root() -> Result<()> {
        let dir = TempDir::new()?;
        let store = store_at(&dir)?;

        let stored = store.save("gone.txt", &mut Cursor::new(b"to delete".to_vec()))?;
        let path = store.physical_path(&stored)?;
        let leaf_dir = path.parent().unwrap().to_path_buf();
        let shard_dir = leaf_dir.parent().unwrap().to_path_buf();

        store.delete(DeleteTarget::LogicalName(stored.clone()), true)?;

        assert!(!path.exists());
        assert!(!leaf_dir.exists());
        assert!(!shard_dir.exists());
        assert!(dir.path().exists());
        assert!(!store.exists(&stored)?);
        Ok(())
    }

    #[test]
    fn test_prune_stops_at_non_empty_directory() -> Result<()> {
        let dir = TempDir::new()?;
        let store = store_at(&dir)?;

        let stored = store.save("gone.txt", &mut Cursor::new(b"to delete".to_vec()))?;
        let path = store.physical_path(&stored)?;
        let leaf_dir = path.parent().unwrap().to_path_buf();
        let shard_dir = leaf_dir.parent().unwrap().to_path_buf();

        // A sibling entry in the first-level shard directory blocks the walk.
        fs::write(shard_dir.join("squatter"), b"still here")?;

        store.delete(DeleteTarget::LogicalName(stored), true)?;

        assert!(!leaf_dir.exists());
        assert!(shard_dir.exists());
        assert!(shard_dir.join("squatter").exists());
        Ok(())
    }

    #[test]
    fn test_delete_by_resolved_path() -> Result<()> {
        let dir = TempDir::new()?;
        let store = store_at(&dir)?;

        let stored = store.save("direct.txt", &mut Cursor::new(b"by path".to_vec()))?;
        let path = store.physical_path(&stored)?;

        store.delete(DeleteTarget::ResolvedPath(path.clone()), true)?;
        assert!(!path.exists());
        Ok(())
    }

    #[test]
    fn test_delete_missing_is_not_found() -> Result<()> {
        let dir = TempDir::new()?;
        let store = store_at(&dir)?;

        let result = store.delete(
            DeleteTarget::LogicalName("da39a3ee5e6b4b0d3255bfef95601890afd80709".to_string()),
            true,
        );
        assert!(matches!(result, Err(StoreError::NotFound { .. })));
        Ok(())
    }

    #[test]
    fn test_save_file_moves_source() -> Result<()> {
        let dir = TempDir::new()?;
        let store = store_at(&dir)?;

        let upload = dir.path().join("upload.tmp");
        fs::write(&upload, b"materialized upload")?;

        let stored = store.save_file("song.mp3", &upload)?;
        assert!(stored.ends_with(".mp3"));
        assert!(!upload.exists());

        let path = store.physical_path(&stored)?;
        assert_eq!(fs::read(&path)?, b"materialized upload");
        Ok(())
    }

    #[test]
    fn test_save_file_dedup_removes_source() -> Result<()> {
        let dir = TempDir::new()?;
        let store = store_at(&dir)?;

        let first = store.save("a.dat", &mut Cursor::new(b"dup content".to_vec()))?;

        let upload = dir.path().join("upload.tmp");
        fs::write(&upload, b"dup content")?;

        let second = store.save_file("b.dat", &upload)?;
        assert_eq!(first, second);
        assert!(!upload.exists());
        assert!(store.exists(&first)?);
        Ok(())
    }

    #[test]
    fn test_concurrent_saves_of_same_content() -> Result<()> {
        let dir = TempDir::new()?;
        let store = Arc::new(store_at(&dir)?);

        let data = b"Concurrent Data".to_vec();
        let expected = ContentDigest::from_data(&data).into_inner();

        let mut handles = vec![];
        for _ in 0..10 {
            let store = store.clone();
            let data = data.clone();
            handles.push(thread::spawn(move || {
                store
                    .save("same", &mut Cursor::new(data))
                    .expect("save failed")
            }));
        }

        for handle in handles {
            assert_eq!(handle.join().unwrap(), expected);
        }

        let path = store.physical_path(&expected)?;
        assert_eq!(fs::read(&path)?, data);
        Ok(())
    }

    #[test]
    fn test_name_extension() {
        assert_eq!(name_extension("photo.png"), Some(".png"));
        assert_eq!(name_extension("archive.tar.gz"), Some(".gz"));
        assert_eq!(name_extension("uploads/photo.png"), Some(".png"));
        assert_eq!(name_extension("README"), None);
        assert_eq!(name_extension(".bashrc"), None);
        assert_eq!(name_extension("..a.b"), Some(".b"));
    }

    #[test]
    fn test_lexical_normalize() {
        assert_eq!(
            lexical_normalize(Path::new("/a/b/../c/./d")),
            PathBuf::from("/a/c/d")
        );
        assert_eq!(
            lexical_normalize(Path::new("/a/../../b")),
            PathBuf::from("/b")
        );
    }
}
