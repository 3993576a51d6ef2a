//! Directories derived from key prefixes.
//!
//! The backend has no directory entity. A path is a directory when a marker
//! object `path/` exists or when any key starts with `path/`; both are
//! discovered by listing, never stored in an index. Results therefore lag the
//! backend's listing consistency.

use std::collections::HashSet;

use bytes::Bytes;
use futures::TryStreamExt;
use tracing::{debug, info, warn};

use crate::error::{VfsError, VfsResult};
use crate::object::ObjectAdapter;
use crate::path::{FileType, SEPARATOR, VirtualPath};

/// Content type stored on zero-length directory markers.
pub const DIRECTORY_CONTENT_TYPE: &str = "application/x-directory";

/// Presents prefix grouping as directory semantics.
#[derive(Debug, Clone)]
pub struct DirectorySynthesizer {
    adapter: ObjectAdapter,
}

impl DirectorySynthesizer {
    /// Build on top of `adapter`.
    #[must_use]
    pub fn new(adapter: ObjectAdapter) -> Self {
        Self { adapter }
    }

    /// Classify `path` as file, directory or imaginary.
    ///
    /// The bucket root is always a directory. Directory evidence wins over
    /// an object stored at the exact key.
    ///
    /// # Errors
    ///
    /// Returns a [`VfsError`] if a backend call fails.
    pub async fn classify(&self, path: &VirtualPath) -> VfsResult<FileType> {
        if path.is_root() {
            return Ok(FileType::Directory);
        }
        let directory_evidence = self
            .adapter
            .first_under(&path.child_prefix())
            .await?
            .is_some();
        let exact_object =
            !directory_evidence && self.adapter.head(&path.to_key(false)).await?.is_some();
        let file_type = FileType::classify(exact_object, directory_evidence);
        debug!(%path, %file_type, "classified path");
        Ok(file_type)
    }

    /// Fail when any ancestor of `path` is a file.
    ///
    /// Ancestors are checked nearest first and the walk stops at the first
    /// directory: every ancestor of a directory has keys below it and so is a
    /// directory as well.
    ///
    /// # Errors
    ///
    /// Returns [`VfsError::NotADirectory`] naming the first file ancestor.
    pub async fn check_ancestors(&self, path: &VirtualPath) -> VfsResult<()> {
        let mut current = path.parent();
        while let Some(ancestor) = current {
            match self.classify(&ancestor).await? {
                FileType::Directory => return Ok(()),
                FileType::File => {
                    return Err(VfsError::NotADirectory {
                        path: ancestor.to_string(),
                    });
                }
                FileType::Imaginary => current = ancestor.parent(),
            }
        }
        Ok(())
    }

    /// Create a directory marker at `path` unless something is already there.
    ///
    /// # Errors
    ///
    /// Returns [`VfsError::NotADirectory`] if `path` or one of its ancestors
    /// is a file.
    pub async fn ensure_directory(&self, path: &VirtualPath) -> VfsResult<()> {
        match self.classify(path).await? {
            FileType::Directory => Ok(()),
            FileType::File => Err(VfsError::NotADirectory {
                path: path.to_string(),
            }),
            FileType::Imaginary => {
                self.check_ancestors(path).await?;
                self.adapter
                    .store(
                        &path.to_key(true),
                        Bytes::new(),
                        Some(DIRECTORY_CONTENT_TYPE),
                    )
                    .await?;
                info!(%path, "created directory marker");
                Ok(())
            }
        }
    }

    /// The direct children of `path`, in key order.
    ///
    /// Common prefixes become child directories and keys one level down
    /// become child files. A name that is both appears once.
    ///
    /// # Errors
    ///
    /// Returns [`VfsError::NotADirectory`] if `path` is a file and
    /// [`VfsError::NotFound`] if nothing exists there.
    pub async fn list_children(&self, path: &VirtualPath) -> VfsResult<Vec<VirtualPath>> {
        let prefix = path.child_prefix();
        let delimiter = SEPARATOR.to_string();
        let mut entries = self.adapter.list_by_prefix(&prefix, Some(&delimiter));

        let mut children = Vec::new();
        let mut seen = HashSet::new();
        let mut listed_any = false;
        while let Some(entry) = entries.try_next().await? {
            listed_any = true;
            let name = entry.key[prefix.len()..].trim_end_matches(SEPARATOR);
            if name.is_empty() || !seen.insert(name.to_owned()) {
                continue;
            }
            match path.child(name) {
                Ok(child) => children.push(child),
                Err(err) => debug!(key = %entry.key, %err, "skipping unaddressable key"),
            }
        }

        if !listed_any && !path.is_root() {
            return Err(match self.adapter.head(&path.to_key(false)).await? {
                Some(_) => VfsError::NotADirectory {
                    path: path.to_string(),
                },
                None => VfsError::NotFound {
                    path: path.to_string(),
                },
            });
        }
        Ok(children)
    }

    /// Remove the directory at `path`; returns how many objects were deleted.
    ///
    /// Without `recursive` only an empty directory (at most its own marker)
    /// is removed. With `recursive` every key under the prefix is deleted;
    /// failures do not stop the sweep and the first one is returned.
    ///
    /// # Errors
    ///
    /// Returns [`VfsError::DirectoryNotEmpty`] for a non-recursive remove of
    /// a directory with children, or the first delete failure.
    pub async fn remove(&self, path: &VirtualPath, recursive: bool) -> VfsResult<usize> {
        let prefix = path.child_prefix();
        let keys = self.adapter.keys_under(&prefix).await?;

        if !recursive {
            if keys.iter().any(|k| *k != prefix) {
                return Err(VfsError::DirectoryNotEmpty {
                    path: path.to_string(),
                });
            }
            if keys.is_empty() {
                return Ok(0);
            }
            self.adapter.delete(&prefix).await?;
            return Ok(1);
        }

        let mut deleted = 0;
        let mut first_error = None;
        for key in &keys {
            match self.adapter.delete(key).await {
                Ok(()) => deleted += 1,
                Err(err) => {
                    warn!(%path, key, %err, "recursive delete left an object behind");
                    if first_error.is_none() {
                        first_error = Some(err);
                    }
                }
            }
        }
        info!(%path, deleted, total = keys.len(), "removed directory");
        match first_error {
            Some(err) => Err(err),
            None => Ok(deleted),
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::backend::{InMemoryBackend, ObjectBackend};
    use crate::config::FileSystemOptions;

    async fn synthesizer(keys: &[&str]) -> (Arc<InMemoryBackend>, DirectorySynthesizer) {
        let backend = Arc::new(InMemoryBackend::new().with_page_size(2));
        backend.create_bucket("b", None).await.unwrap();
        let adapter = ObjectAdapter::new(backend.clone(), "b", &FileSystemOptions::default());
        for key in keys {
            adapter.store(key, Bytes::from_static(b"x"), None).await.unwrap();
        }
        (backend, DirectorySynthesizer::new(adapter))
    }

    fn path(raw: &str) -> VirtualPath {
        VirtualPath::normalize("b", raw).unwrap()
    }

    #[tokio::test]
    async fn test_should_classify_file_directory_and_imaginary() {
        let (_, dirs) = synthesizer(&["docs/readme.md", "empty/", "top.txt"]).await;
        assert_eq!(dirs.classify(&path("top.txt")).await.unwrap(), FileType::File);
        assert_eq!(dirs.classify(&path("docs")).await.unwrap(), FileType::Directory);
        assert_eq!(dirs.classify(&path("empty")).await.unwrap(), FileType::Directory);
        assert_eq!(
            dirs.classify(&path("docs/readme.md")).await.unwrap(),
            FileType::File
        );
        assert_eq!(dirs.classify(&path("nope")).await.unwrap(), FileType::Imaginary);
        assert_eq!(dirs.classify(&path("")).await.unwrap(), FileType::Directory);
    }

    #[tokio::test]
    async fn test_should_treat_file_and_prefix_collision_as_directory() {
        let (_, dirs) = synthesizer(&["a", "a/b"]).await;
        assert_eq!(dirs.classify(&path("a")).await.unwrap(), FileType::Directory);
    }

    #[tokio::test]
    async fn test_should_create_marker_idempotently() {
        let (backend, dirs) = synthesizer(&[]).await;
        dirs.ensure_directory(&path("new/dir")).await.unwrap();
        dirs.ensure_directory(&path("new/dir")).await.unwrap();
        assert_eq!(backend.object_keys("b"), vec!["new/dir/"]);
        let marker = backend.head_object("b", "new/dir/").await.unwrap().unwrap();
        assert_eq!(marker.size, 0);
        assert_eq!(
            marker.metadata.content_type.as_deref(),
            Some(DIRECTORY_CONTENT_TYPE)
        );
    }

    #[tokio::test]
    async fn test_should_refuse_marker_over_file() {
        let (_, dirs) = synthesizer(&["f"]).await;
        let err = dirs.ensure_directory(&path("f")).await.unwrap_err();
        assert!(matches!(err, VfsError::NotADirectory { .. }));
    }

    #[tokio::test]
    async fn test_should_refuse_marker_below_file_ancestor() {
        let (backend, dirs) = synthesizer(&["plain"]).await;
        let err = dirs.ensure_directory(&path("plain/sub/deeper")).await.unwrap_err();
        assert!(matches!(err, VfsError::NotADirectory { ref path } if path == "s3://b/plain"));
        assert_eq!(backend.object_keys("b"), vec!["plain"]);
        assert_eq!(dirs.classify(&path("plain")).await.unwrap(), FileType::File);
    }

    #[tokio::test]
    async fn test_should_accept_ancestors_that_are_directories_or_missing() {
        let (_, dirs) = synthesizer(&["docs/readme.md"]).await;
        dirs.check_ancestors(&path("docs/a/b/c")).await.unwrap();
        dirs.check_ancestors(&path("fresh/a/b")).await.unwrap();
        dirs.check_ancestors(&path("top")).await.unwrap();
        let err = dirs
            .check_ancestors(&path("docs/readme.md/x/y"))
            .await
            .unwrap_err();
        assert!(matches!(err, VfsError::NotADirectory { .. }));
    }

    #[tokio::test]
    async fn test_should_list_direct_children_only() {
        let (_, dirs) = synthesizer(&[
            "d/",
            "d/a.txt",
            "d/b.txt",
            "d/sub/deep/x",
            "d/sub/y",
            "d/z/",
            "other",
        ])
        .await;
        let children = dirs.list_children(&path("d")).await.unwrap();
        let names: Vec<_> = children.iter().filter_map(VirtualPath::name).collect();
        assert_eq!(names, vec!["a.txt", "b.txt", "sub", "z"]);
        assert!(children.iter().all(|c| c.depth() == 2));
    }

    #[tokio::test]
    async fn test_should_list_root_children() {
        let (_, dirs) = synthesizer(&["a/1", "b"]).await;
        let names: Vec<_> = dirs
            .list_children(&VirtualPath::root("b"))
            .await
            .unwrap()
            .iter()
            .filter_map(|c| c.name().map(str::to_owned))
            .collect();
        assert_eq!(names, vec!["a", "b"]);

        let (_, empty) = synthesizer(&[]).await;
        assert!(
            empty
                .list_children(&VirtualPath::root("b"))
                .await
                .unwrap()
                .is_empty()
        );
    }

    #[tokio::test]
    async fn test_should_list_name_once_when_file_and_prefix_collide() {
        let (_, dirs) = synthesizer(&["p/a", "p/a/b"]).await;
        let children = dirs.list_children(&path("p")).await.unwrap();
        assert_eq!(children, vec![path("p/a")]);
    }

    #[tokio::test]
    async fn test_should_fail_listing_file_or_missing_path() {
        let (_, dirs) = synthesizer(&["f"]).await;
        assert!(matches!(
            dirs.list_children(&path("f")).await.unwrap_err(),
            VfsError::NotADirectory { .. }
        ));
        assert!(dirs.list_children(&path("nope")).await.unwrap_err().is_not_found());
    }

    #[tokio::test]
    async fn test_should_remove_recursively() {
        let (backend, dirs) = synthesizer(&["dir/one", "dir/two", "keep"]).await;
        assert_eq!(dirs.remove(&path("dir"), true).await.unwrap(), 2);
        assert_eq!(backend.object_keys("b"), vec!["keep"]);
    }

    #[tokio::test]
    async fn test_should_refuse_non_recursive_remove_of_non_empty_directory() {
        let (backend, dirs) = synthesizer(&["dir/one", "dir/two"]).await;
        let err = dirs.remove(&path("dir"), false).await.unwrap_err();
        assert!(matches!(err, VfsError::DirectoryNotEmpty { .. }));
        assert_eq!(backend.object_keys("b"), vec!["dir/one", "dir/two"]);
    }

    #[tokio::test]
    async fn test_should_remove_empty_directory_marker() {
        let (backend, dirs) = synthesizer(&["dir/"]).await;
        assert_eq!(dirs.remove(&path("dir"), false).await.unwrap(), 1);
        assert!(backend.object_keys("b").is_empty());
    }

    #[tokio::test]
    async fn test_should_continue_recursive_remove_after_failure() {
        let (backend, dirs) = synthesizer(&["dir/a", "dir/b", "dir/c"]).await;
        backend.reject_deletes_of("dir/b");
        let err = dirs.remove(&path("dir"), true).await.unwrap_err();
        assert_eq!(err.to_string(), "Access Denied");
        assert_eq!(backend.object_keys("b"), vec!["dir/b"]);
    }
}
