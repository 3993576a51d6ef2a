//! File-system sessions and file handles.
//!
//! An [`S3FileSystem`] binds a root URI to exactly one bucket for its whole
//! lifetime. It checks the bucket on construction (creating it when absent),
//! hands out [`FileHandle`]s without any I/O, and mediates every file-level
//! operation: each handle operation first checks that the session is open and
//! that the provider advertises the capability, then runs one self-contained
//! sequence of backend calls. Nothing is cached between calls.
//!
//! # Examples
//!
//! ```
//! use std::sync::Arc;
//!
//! use bytes::Bytes;
//! use s3vfs_core::{FileSystemOptions, FileType, InMemoryBackend, S3FileSystem};
//!
//! # tokio_test::block_on(async {
//! let backend = Arc::new(InMemoryBackend::new());
//! let fs = S3FileSystem::connect("s3://demo", backend, FileSystemOptions::default())
//!     .await
//!     .unwrap();
//!
//! let file = fs.handle("notes/today.txt").unwrap();
//! file.write(Bytes::from_static(b"hello")).await.unwrap();
//! assert_eq!(file.file_type().await.unwrap(), FileType::File);
//! assert_eq!(file.read().await.unwrap().as_ref(), b"hello");
//! # });
//! ```

use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use bytes::{Bytes, BytesMut};
use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::{debug, info, warn};

use crate::acl::{Acl, AclTranslator};
use crate::backend::ObjectBackend;
use crate::capability::{Capability, CapabilitySet};
use crate::config::FileSystemOptions;
use crate::directory::DirectorySynthesizer;
use crate::error::{VfsError, VfsResult};
use crate::object::ObjectAdapter;
use crate::path::{FileType, VirtualPath};

// ---------------------------------------------------------------------------
// S3FileSystem
// ---------------------------------------------------------------------------

/// A virtual file system bound to one bucket.
#[derive(Debug)]
pub struct S3FileSystem {
    root: VirtualPath,
    region: Option<String>,
    backend: Arc<dyn ObjectBackend>,
    adapter: ObjectAdapter,
    directories: DirectorySynthesizer,
    acls: AclTranslator,
    options: FileSystemOptions,
    closed: AtomicBool,
}

impl S3FileSystem {
    /// Open a session rooted at `root_uri` (`s3://bucket[/path]`).
    ///
    /// The bucket is reused when it exists and created (in
    /// `options.region`) when it does not. Creation is not undone if the
    /// session is later abandoned.
    ///
    /// # Errors
    ///
    /// Returns [`VfsError::PathSyntax`] for a malformed root URI and
    /// [`VfsError::BucketAccess`] when the existence check or the creation
    /// fails.
    pub async fn connect(
        root_uri: &str,
        backend: Arc<dyn ObjectBackend>,
        options: FileSystemOptions,
    ) -> VfsResult<Arc<Self>> {
        let root = VirtualPath::parse(root_uri)?;
        let bucket = root.bucket().to_owned();

        let exists = backend
            .bucket_exists(&bucket)
            .await
            .map_err(|e| VfsError::bucket_access(&bucket, e))?;
        if exists {
            debug!(%bucket, "reusing existing bucket");
        } else {
            backend
                .create_bucket(&bucket, options.region.as_deref())
                .await
                .map_err(|e| VfsError::bucket_access(&bucket, e))?;
            info!(%bucket, region = ?options.region, "created bucket");
        }

        let adapter = ObjectAdapter::new(Arc::clone(&backend), &bucket, &options);
        info!(%root, owns_backend = options.shutdown_backend_on_close, "file system opened");
        Ok(Arc::new(Self {
            root,
            region: options.region.clone(),
            backend,
            directories: DirectorySynthesizer::new(adapter.clone()),
            acls: AclTranslator::new(adapter.clone()),
            adapter,
            options,
            closed: AtomicBool::new(false),
        }))
    }

    /// The root path handles are resolved against.
    #[must_use]
    pub fn root(&self) -> &VirtualPath {
        &self.root
    }

    /// The bound bucket.
    #[must_use]
    pub fn bucket(&self) -> &str {
        self.root.bucket()
    }

    /// The region of the bucket binding, if configured.
    #[must_use]
    pub fn region(&self) -> Option<&str> {
        self.region.as_deref()
    }

    /// The options the session was opened with.
    #[must_use]
    pub fn options(&self) -> &FileSystemOptions {
        &self.options
    }

    /// The provider capability set. Identical for every session.
    #[must_use]
    pub fn capabilities(&self) -> &'static CapabilitySet {
        CapabilitySet::provider()
    }

    /// Resolve `path` to a virtual path in the bound bucket.
    ///
    /// Absolute URIs must name the bound bucket; anything else is resolved
    /// relative to the session root.
    ///
    /// # Errors
    ///
    /// Returns [`VfsError::PathSyntax`] for malformed paths or URIs naming
    /// another bucket.
    pub fn resolve(&self, path: &str) -> VfsResult<VirtualPath> {
        if !path.contains("://") {
            return self.root.resolve(path);
        }
        let resolved = VirtualPath::parse(path)?;
        if resolved.bucket() != self.bucket() {
            return Err(VfsError::PathSyntax {
                path: path.to_owned(),
                reason: format!("not in bucket {}", self.bucket()),
            });
        }
        Ok(resolved)
    }

    /// Bind `path` to this session. Performs no I/O and never fails.
    #[must_use]
    pub fn file_handle(self: &Arc<Self>, path: VirtualPath) -> FileHandle {
        FileHandle {
            fs: Arc::clone(self),
            path,
        }
    }

    /// [`S3FileSystem::resolve`] followed by [`S3FileSystem::file_handle`].
    ///
    /// # Errors
    ///
    /// Returns [`VfsError::PathSyntax`] when `path` does not resolve.
    pub fn handle(self: &Arc<Self>, path: &str) -> VfsResult<FileHandle> {
        Ok(self.file_handle(self.resolve(path)?))
    }

    /// Whether [`S3FileSystem::close`] has been called.
    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    /// Release the bucket binding.
    ///
    /// When the session owns the backend client
    /// (`shutdown_backend_on_close`), the client is shut down as well.
    /// Closing twice is a no-op.
    pub async fn close(&self) {
        if self.closed.swap(true, Ordering::SeqCst) {
            return;
        }
        if self.options.shutdown_backend_on_close {
            self.backend.shutdown().await;
            info!(bucket = %self.bucket(), "file system closed, backend shut down");
        } else {
            info!(bucket = %self.bucket(), "file system closed");
        }
    }

    fn ensure_supported(&self, capability: Capability) -> VfsResult<()> {
        if self.is_closed() {
            return Err(VfsError::SessionClosed {
                bucket: self.bucket().to_owned(),
            });
        }
        if !self.capabilities().supports(capability) {
            return Err(VfsError::Unsupported { capability });
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// FileStat
// ---------------------------------------------------------------------------

/// What [`FileHandle::stat`] reports.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FileStat {
    /// The path as a URI.
    pub uri: String,
    /// File or directory.
    pub file_type: FileType,
    /// Content length; `0` for directories.
    pub size: u64,
    /// Last modification of the object (or directory marker), when known.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_modified: Option<DateTime<Utc>>,
    /// MIME type of the object.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub content_type: Option<String>,
    /// Entity tag of the object.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub etag: Option<String>,
}

// ---------------------------------------------------------------------------
// FileHandle
// ---------------------------------------------------------------------------

/// A path bound to a session.
///
/// The handle holds no backend state; every method fetches what it needs.
#[derive(Debug, Clone)]
pub struct FileHandle {
    fs: Arc<S3FileSystem>,
    path: VirtualPath,
}

impl fmt::Display for FileHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(&self.path, f)
    }
}

impl FileHandle {
    /// The bound path.
    #[must_use]
    pub fn path(&self) -> &VirtualPath {
        &self.path
    }

    /// The path as an `s3://` URI.
    #[must_use]
    pub fn uri(&self) -> String {
        self.path.to_string()
    }

    /// The session this handle belongs to.
    #[must_use]
    pub fn file_system(&self) -> &Arc<S3FileSystem> {
        &self.fs
    }

    /// The parent directory, `None` at the bucket root.
    #[must_use]
    pub fn parent(&self) -> Option<Self> {
        self.path.parent().map(|p| self.fs.file_handle(p))
    }

    /// A handle for `raw` resolved relative to this path.
    ///
    /// # Errors
    ///
    /// Returns [`VfsError::PathSyntax`] when `raw` does not resolve.
    pub fn resolve(&self, raw: &str) -> VfsResult<Self> {
        Ok(self.fs.file_handle(self.path.resolve(raw)?))
    }

    fn guard(&self, capability: Capability) -> VfsResult<()> {
        self.fs.ensure_supported(capability)?;
        if self.path.bucket() != self.fs.bucket() {
            return Err(VfsError::PathSyntax {
                path: self.uri(),
                reason: format!("not in bucket {}", self.fs.bucket()),
            });
        }
        Ok(())
    }

    fn key(&self) -> String {
        self.path.to_key(false)
    }

    /// File, directory or imaginary.
    ///
    /// # Errors
    ///
    /// Returns a [`VfsError`] if the session is closed or a backend call
    /// fails.
    pub async fn file_type(&self) -> VfsResult<FileType> {
        self.guard(Capability::GetType)?;
        self.fs.directories.classify(&self.path).await
    }

    /// Whether a file or directory exists at this path.
    ///
    /// # Errors
    ///
    /// Same as [`FileHandle::file_type`].
    pub async fn exists(&self) -> VfsResult<bool> {
        Ok(self.file_type().await?.exists())
    }

    /// Type, size, modification time and content type.
    ///
    /// # Errors
    ///
    /// Returns [`VfsError::NotFound`] when nothing exists at the path.
    pub async fn stat(&self) -> VfsResult<FileStat> {
        self.guard(Capability::GetType)?;
        let file_type = self.fs.directories.classify(&self.path).await?;
        let info = match file_type {
            FileType::Imaginary => {
                return Err(VfsError::NotFound { path: self.uri() });
            }
            FileType::File => Some(self.fs.adapter.head(&self.key()).await?.ok_or_else(
                || VfsError::NotFound { path: self.uri() },
            )?),
            FileType::Directory if self.path.is_root() => None,
            FileType::Directory => self.fs.adapter.head(&self.path.to_key(true)).await?,
        };

        let (size, last_modified, content_type, etag) = match (file_type, info) {
            (FileType::File, Some(info)) => (
                info.size,
                info.last_modified,
                info.metadata.content_type,
                info.etag,
            ),
            (_, Some(marker)) => (0, marker.last_modified, None, None),
            (_, None) => (0, None, None, None),
        };
        Ok(FileStat {
            uri: self.uri(),
            file_type,
            size,
            last_modified,
            content_type,
            etag,
        })
    }

    /// Last modification time of the file or directory marker.
    ///
    /// # Errors
    ///
    /// Returns [`VfsError::NotFound`] when nothing exists at the path.
    pub async fn last_modified(&self) -> VfsResult<Option<DateTime<Utc>>> {
        self.guard(Capability::GetLastModified)?;
        Ok(self.stat().await?.last_modified)
    }

    /// Always fails: object storage cannot set modification times.
    ///
    /// # Errors
    ///
    /// Returns [`VfsError::Unsupported`].
    pub async fn set_last_modified(&self, _time: DateTime<Utc>) -> VfsResult<()> {
        self.guard(Capability::SetLastModified)?;
        Err(VfsError::Unsupported {
            capability: Capability::SetLastModified,
        })
    }

    async fn require_file(&self) -> VfsResult<()> {
        match self.fs.directories.classify(&self.path).await? {
            FileType::File => Ok(()),
            FileType::Directory => Err(VfsError::NotAFile { path: self.uri() }),
            FileType::Imaginary => Err(VfsError::NotFound { path: self.uri() }),
        }
    }

    /// The whole content of the file.
    ///
    /// # Errors
    ///
    /// Returns [`VfsError::NotAFile`] for a directory and
    /// [`VfsError::NotFound`] when nothing exists.
    pub async fn read(&self) -> VfsResult<Bytes> {
        self.guard(Capability::ReadContent)?;
        self.require_file().await?;
        Ok(self.fs.adapter.fetch(&self.key()).await?.content)
    }

    /// Up to `len` bytes starting at `offset`; empty past the end.
    ///
    /// # Errors
    ///
    /// Same as [`FileHandle::read`].
    pub async fn read_range(&self, offset: u64, len: u64) -> VfsResult<Bytes> {
        self.guard(Capability::RandomAccessRead)?;
        self.require_file().await?;
        let key = self.key();
        let size = self
            .fs
            .adapter
            .head(&key)
            .await?
            .ok_or_else(|| VfsError::NotFound { path: self.uri() })?
            .size;
        if offset >= size {
            return Ok(Bytes::new());
        }
        self.fs
            .adapter
            .fetch_range(&key, offset, len.min(size - offset))
            .await
    }

    /// Always fails: objects cannot be rewritten in place.
    ///
    /// # Errors
    ///
    /// Returns [`VfsError::Unsupported`].
    pub async fn write_at(&self, _offset: u64, _content: Bytes) -> VfsResult<()> {
        self.guard(Capability::RandomAccessWrite)?;
        Err(VfsError::Unsupported {
            capability: Capability::RandomAccessWrite,
        })
    }

    /// Replace the content of the file, creating it if needed.
    ///
    /// # Errors
    ///
    /// Same as [`FileHandle::write_with_content_type`].
    pub async fn write(&self, content: Bytes) -> VfsResult<()> {
        self.write_with_content_type(content, None).await
    }

    async fn check_writable(&self) -> VfsResult<FileType> {
        let file_type = self.fs.directories.classify(&self.path).await?;
        if file_type == FileType::Directory {
            return Err(VfsError::NotAFile { path: self.uri() });
        }
        self.fs.directories.check_ancestors(&self.path).await?;
        Ok(file_type)
    }

    /// Replace the content of the file and set its MIME type.
    ///
    /// Concurrent writers race; the last write the backend orders wins.
    ///
    /// # Errors
    ///
    /// Returns [`VfsError::NotAFile`] when the path is a directory and
    /// [`VfsError::NotADirectory`] when the parent is a file.
    pub async fn write_with_content_type(
        &self,
        content: Bytes,
        content_type: Option<&str>,
    ) -> VfsResult<()> {
        self.guard(Capability::WriteContent)?;
        if self.path.is_root() {
            return Err(VfsError::NotAFile { path: self.uri() });
        }
        self.check_writable().await?;
        self.fs
            .adapter
            .store(&self.key(), content, content_type)
            .await
    }

    /// Add `content` to the end of the file, creating it if needed.
    ///
    /// Object storage has no append, so the whole object is read, extended
    /// and stored again. A concurrent writer between the read and the store
    /// is overwritten.
    ///
    /// # Errors
    ///
    /// Same as [`FileHandle::write_with_content_type`].
    pub async fn append(&self, content: Bytes) -> VfsResult<()> {
        self.guard(Capability::AppendContent)?;
        if self.path.is_root() {
            return Err(VfsError::NotAFile { path: self.uri() });
        }
        let key = self.key();
        let (merged, content_type) = match self.check_writable().await? {
            FileType::File => {
                let existing = self.fs.adapter.fetch(&key).await?;
                let mut buf = BytesMut::with_capacity(existing.content.len() + content.len());
                buf.extend_from_slice(&existing.content);
                buf.extend_from_slice(&content);
                (buf.freeze(), existing.info.metadata.content_type)
            }
            _ => (content, None),
        };
        self.fs
            .adapter
            .store(&key, merged, content_type.as_deref())
            .await
    }

    /// Create a directory at this path. Existing directories are left alone.
    ///
    /// # Errors
    ///
    /// Returns [`VfsError::NotADirectory`] when a file is in the way.
    pub async fn create_folder(&self) -> VfsResult<()> {
        self.guard(Capability::Create)?;
        self.fs.directories.ensure_directory(&self.path).await
    }

    /// The direct children of this directory, in key order.
    ///
    /// # Errors
    ///
    /// Returns [`VfsError::NotADirectory`] for a file and
    /// [`VfsError::NotFound`] when nothing exists.
    pub async fn children(&self) -> VfsResult<Vec<Self>> {
        self.guard(Capability::ListChildren)?;
        let children = self.fs.directories.list_children(&self.path).await?;
        Ok(children
            .into_iter()
            .map(|p| self.fs.file_handle(p))
            .collect())
    }

    /// Delete a file or an empty directory. Deleting nothing succeeds.
    ///
    /// # Errors
    ///
    /// Returns [`VfsError::DirectoryNotEmpty`] for a directory with children.
    pub async fn delete(&self) -> VfsResult<()> {
        self.guard(Capability::Delete)?;
        match self.fs.directories.classify(&self.path).await? {
            FileType::File => self.fs.adapter.delete(&self.key()).await,
            FileType::Directory => self.fs.directories.remove(&self.path, false).await.map(drop),
            FileType::Imaginary => Ok(()),
        }
    }

    /// Delete this file, or this directory and everything below it.
    ///
    /// Returns the number of objects deleted. Deletion continues past
    /// failures and the first one is returned; objects already deleted stay
    /// deleted.
    ///
    /// # Errors
    ///
    /// Returns the first delete failure.
    pub async fn delete_recursive(&self) -> VfsResult<usize> {
        self.guard(Capability::Delete)?;
        match self.fs.directories.classify(&self.path).await? {
            FileType::File => {
                self.fs.adapter.delete(&self.key()).await?;
                Ok(1)
            }
            FileType::Directory => self.fs.directories.remove(&self.path, true).await,
            FileType::Imaginary => Ok(0),
        }
    }

    fn check_same_bucket(&self, dest: &Self) -> VfsResult<()> {
        if dest.path.bucket() == self.path.bucket() {
            return Ok(());
        }
        Err(VfsError::PathSyntax {
            path: dest.uri(),
            reason: format!("cannot transfer across buckets from {}", self.path.bucket()),
        })
    }

    /// Move this file or directory to `dest`.
    ///
    /// A file is copied and then deleted. A directory moves every object
    /// below it the same way, one key at a time; failures do not stop the
    /// move and the first one is returned. Neither is atomic: an interrupted
    /// move can leave objects at both paths. ACLs are not carried over.
    ///
    /// # Errors
    ///
    /// Returns [`VfsError::NotFound`] when nothing exists here,
    /// [`VfsError::AlreadyExists`] when a directory is in the way (or when
    /// moving a directory onto any existing path) and
    /// [`VfsError::PathSyntax`] for a move into itself or another bucket.
    pub async fn move_to(&self, dest: &Self) -> VfsResult<()> {
        self.guard(Capability::Rename)?;
        dest.guard(Capability::Create)?;
        self.check_same_bucket(dest)?;
        if dest.path == self.path {
            return Ok(());
        }
        if self.path.is_ancestor_of(&dest.path) || self.path.is_root() {
            return Err(VfsError::PathSyntax {
                path: dest.uri(),
                reason: format!("cannot move {} into itself", self.path),
            });
        }

        let source_type = self.fs.directories.classify(&self.path).await?;
        let dest_type = self.fs.directories.classify(&dest.path).await?;
        match (source_type, dest_type) {
            (FileType::Imaginary, _) => Err(VfsError::NotFound { path: self.uri() }),
            (FileType::File, FileType::Directory)
            | (FileType::Directory, FileType::File | FileType::Directory) => {
                Err(VfsError::AlreadyExists { path: dest.uri() })
            }
            (FileType::File, _) => {
                self.fs.directories.check_ancestors(&dest.path).await?;
                let (src, dst) = (self.key(), dest.key());
                self.fs.adapter.copy(&src, &dst).await?;
                self.fs.adapter.delete(&src).await?;
                info!(from = %self.path, to = %dest.path, "moved file");
                Ok(())
            }
            (FileType::Directory, FileType::Imaginary) => {
                self.fs.directories.check_ancestors(&dest.path).await?;
                self.move_directory(dest).await
            }
        }
    }

    async fn move_directory(&self, dest: &Self) -> VfsResult<()> {
        let src_prefix = self.path.child_prefix();
        let dst_prefix = dest.path.child_prefix();
        let keys = self.fs.adapter.keys_under(&src_prefix).await?;

        let mut moved = 0usize;
        let mut first_error = None;
        for key in &keys {
            let target = format!("{dst_prefix}{}", &key[src_prefix.len()..]);
            let result = async {
                self.fs.adapter.copy(key, &target).await?;
                self.fs.adapter.delete(key).await
            }
            .await;
            match result {
                Ok(()) => moved += 1,
                Err(err) => {
                    warn!(key, %target, %err, "directory move left an object behind");
                    if first_error.is_none() {
                        first_error = Some(err);
                    }
                }
            }
        }
        info!(from = %self.path, to = %dest.path, moved, total = keys.len(), "moved directory");
        first_error.map_or(Ok(()), Err)
    }

    /// Copy this file to `dest`, replacing any file there.
    ///
    /// # Errors
    ///
    /// Returns [`VfsError::NotAFile`] when either side is a directory and
    /// [`VfsError::NotFound`] when this file does not exist.
    pub async fn copy_to(&self, dest: &Self) -> VfsResult<()> {
        self.guard(Capability::ReadContent)?;
        dest.guard(Capability::WriteContent)?;
        self.check_same_bucket(dest)?;
        self.require_file().await?;
        if dest.path.is_root() {
            return Err(VfsError::NotAFile { path: dest.uri() });
        }
        dest.check_writable().await?;
        self.fs.adapter.copy(&self.key(), &dest.key()).await
    }

    async fn acl_key(&self) -> VfsResult<String> {
        match self.fs.directories.classify(&self.path).await? {
            FileType::File => Ok(self.key()),
            FileType::Directory if !self.path.is_root() => Ok(self.path.to_key(true)),
            _ => Err(VfsError::NotFound { path: self.uri() }),
        }
    }

    /// The current ACL of this file (or directory marker).
    ///
    /// # Errors
    ///
    /// Returns [`VfsError::NotFound`] when there is no object to read grants
    /// from.
    pub async fn get_acl(&self) -> VfsResult<Acl> {
        self.guard(Capability::AclGet)?;
        let key = self.acl_key().await?;
        self.fs.acls.get(&key).await
    }

    /// Commit `acl` as the grant list of this file (or directory marker).
    ///
    /// # Errors
    ///
    /// Returns [`VfsError::NotFound`] when there is no object to write grants
    /// to.
    pub async fn set_acl(&self, acl: &Acl) -> VfsResult<()> {
        self.guard(Capability::AclSet)?;
        let key = self.acl_key().await?;
        self.fs.acls.set(&key, acl).await?;
        info!(path = %self.path, %acl, "acl updated");
        Ok(())
    }
}
