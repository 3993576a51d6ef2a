//! File-system error types.
//!
//! [`VfsError`] is what every file-level operation returns. Backend failures
//! arrive as [`BackendError`] and are folded into it: a missing key becomes
//! [`VfsError::NotFound`], anything else becomes
//! [`VfsError::BackendTransport`] with the backend's message kept verbatim.
//!
//! # Usage
//!
//! ```
//! use s3vfs_core::error::VfsError;
//! use s3vfs_core::backend::BackendError;
//!
//! let err = VfsError::from_backend(BackendError::NoSuchKey { key: "a/b".to_owned() });
//! assert!(err.is_not_found());
//! ```

use crate::backend::BackendError;
use crate::capability::Capability;

/// Error type for all file-system operations.
#[derive(Debug, thiserror::Error)]
pub enum VfsError {
    // -----------------------------------------------------------------------
    // Session errors
    // -----------------------------------------------------------------------
    /// The bucket existence check or bucket creation failed.
    #[error("{message}")]
    BucketAccess {
        /// The bucket the session tried to bind.
        bucket: String,
        /// The backend's message, or a generic description.
        message: String,
        /// The underlying backend failure.
        #[source]
        source: BackendError,
    },

    /// The session was closed before the operation ran.
    #[error("file system for bucket {bucket} is closed")]
    SessionClosed {
        /// The bucket the closed session was bound to.
        bucket: String,
    },

    /// The operation is not in the provider's capability set.
    #[error("operation not supported: {capability}")]
    Unsupported {
        /// The missing capability.
        capability: Capability,
    },

    // -----------------------------------------------------------------------
    // Path errors
    // -----------------------------------------------------------------------
    /// The virtual path is malformed or escapes the bucket root.
    #[error("invalid path {path}: {reason}")]
    PathSyntax {
        /// The raw path as supplied by the caller.
        path: String,
        /// Why the path was rejected.
        reason: String,
    },

    /// Nothing exists at the path.
    #[error("no such file or directory: {path}")]
    NotFound {
        /// The missing path (or backend key).
        path: String,
    },

    /// A content operation targeted a directory.
    #[error("not a file: {path}")]
    NotAFile {
        /// The directory path.
        path: String,
    },

    /// A directory operation targeted a file.
    #[error("not a directory: {path}")]
    NotADirectory {
        /// The file path.
        path: String,
    },

    /// The destination of a move already exists.
    #[error("destination already exists: {path}")]
    AlreadyExists {
        /// The occupied destination path.
        path: String,
    },

    /// A non-recursive delete found children under the directory.
    #[error("directory not empty: {path}")]
    DirectoryNotEmpty {
        /// The non-empty directory.
        path: String,
    },

    // -----------------------------------------------------------------------
    // Backend errors
    // -----------------------------------------------------------------------
    /// Any other failure reported by the backend client.
    #[error("{message}")]
    BackendTransport {
        /// The backend's message, verbatim when one was supplied.
        message: String,
        /// The underlying backend failure.
        #[source]
        source: BackendError,
    },
}

impl VfsError {
    /// Fold a backend error into a file-system error.
    ///
    /// `NoSuchKey` becomes [`VfsError::NotFound`]; everything else is a
    /// [`VfsError::BackendTransport`].
    #[must_use]
    pub fn from_backend(err: BackendError) -> Self {
        match err {
            BackendError::NoSuchKey { key } => Self::NotFound { path: key },
            other => Self::BackendTransport {
                message: other.to_string(),
                source: other,
            },
        }
    }

    /// Wrap a backend error raised while binding `bucket`.
    ///
    /// The backend's own message is used when it has one; otherwise a generic
    /// message naming the bucket.
    #[must_use]
    pub fn bucket_access(bucket: &str, err: BackendError) -> Self {
        let message = err.message().map_or_else(
            || format!("could not access bucket {bucket}: {err}"),
            ToOwned::to_owned,
        );
        Self::BucketAccess {
            bucket: bucket.to_owned(),
            message,
            source: err,
        }
    }

    /// Whether this error means "nothing exists at that path".
    #[must_use]
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound { .. })
    }
}

impl From<BackendError> for VfsError {
    fn from(err: BackendError) -> Self {
        Self::from_backend(err)
    }
}

/// Convenience result type for file-system operations.
pub type VfsResult<T> = Result<T, VfsError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_should_map_no_such_key_to_not_found() {
        let err: VfsError = BackendError::NoSuchKey {
            key: "docs/a.txt".to_owned(),
        }
        .into();
        assert!(err.is_not_found());
        assert_eq!(err.to_string(), "no such file or directory: docs/a.txt");
    }

    #[test]
    fn test_should_keep_service_message_verbatim() {
        let err: VfsError = BackendError::Service {
            code: Some("SlowDown".to_owned()),
            message: Some("Please reduce your request rate.".to_owned()),
        }
        .into();
        assert!(matches!(err, VfsError::BackendTransport { .. }));
        assert_eq!(err.to_string(), "Please reduce your request rate.");
    }

    #[test]
    fn test_should_use_backend_message_for_bucket_access() {
        let err = VfsError::bucket_access(
            "vfs-s3-tests",
            BackendError::Service {
                code: Some("AccessDenied".to_owned()),
                message: Some("Access Denied".to_owned()),
            },
        );
        assert_eq!(err.to_string(), "Access Denied");
    }

    #[test]
    fn test_should_use_generic_message_when_backend_has_none() {
        let err = VfsError::bucket_access(
            "vfs-s3-tests",
            BackendError::Transport(anyhow::anyhow!("connection refused")),
        );
        assert_eq!(
            err.to_string(),
            "could not access bucket vfs-s3-tests: connection refused"
        );
        assert!(std::error::Error::source(&err).is_some());
    }

    #[test]
    fn test_should_format_path_errors() {
        let cases: Vec<(VfsError, &str)> = vec![
            (
                VfsError::DirectoryNotEmpty {
                    path: "s3://b/dir".to_owned(),
                },
                "directory not empty: s3://b/dir",
            ),
            (
                VfsError::NotAFile {
                    path: "s3://b/dir".to_owned(),
                },
                "not a file: s3://b/dir",
            ),
            (
                VfsError::Unsupported {
                    capability: Capability::SetLastModified,
                },
                "operation not supported: set-last-modified",
            ),
        ];
        for (err, expected) in cases {
            assert_eq!(err.to_string(), expected);
        }
    }
}
