//! The object-storage collaborator.
//!
//! [`ObjectBackend`] is the contract the file system consumes: bucket
//! existence and creation, object get/put/delete/copy, prefix listing with a
//! delimiter, and grant-list get/put. It is object safe so a single client can
//! be shared as `Arc<dyn ObjectBackend>` by several sessions.
//!
//! - [`InMemoryBackend`] -- ordered in-memory buckets, used by tests and demos
//! - `s3vfs_aws::AwsS3Backend` -- the `aws-sdk-s3` client
//!
//! Backends never retry; a failed call surfaces immediately.

mod memory;
pub mod types;

use std::fmt;

use async_trait::async_trait;
use bytes::Bytes;

pub use memory::InMemoryBackend;
pub use types::{
    ALL_USERS_URI, AUTHENTICATED_USERS_URI, AccessControlPolicy, Grant, Grantee,
    LOG_DELIVERY_URI, ListEntry, ListPage, ListRequest, ObjectInfo, ObjectMetadata, Owner,
    Permission, StoredObject,
};

/// Errors reported by a backend.
#[derive(Debug, thiserror::Error)]
pub enum BackendError {
    /// The key does not exist.
    #[error("The specified key does not exist: {key}")]
    NoSuchKey {
        /// The missing key.
        key: String,
    },

    /// The bucket does not exist.
    #[error("The specified bucket does not exist: {bucket}")]
    NoSuchBucket {
        /// The missing bucket.
        bucket: String,
    },

    /// The service rejected the request.
    #[error("{}", service_display(code.as_deref(), message.as_deref()))]
    Service {
        /// The service error code (e.g. `AccessDenied`).
        code: Option<String>,
        /// The service's message.
        message: Option<String>,
    },

    /// The client was shut down.
    #[error("backend client has been shut down")]
    Shutdown,

    /// Connection, signing, timeout or any other lower-level failure.
    #[error(transparent)]
    Transport(#[from] anyhow::Error),
}

impl BackendError {
    /// The message supplied by the service, if any.
    #[must_use]
    pub fn message(&self) -> Option<&str> {
        match self {
            Self::Service { message, .. } => message.as_deref(),
            Self::NoSuchKey { .. } | Self::NoSuchBucket { .. } | Self::Shutdown => None,
            Self::Transport(_) => None,
        }
    }

    /// The service error code, if any.
    #[must_use]
    pub fn code(&self) -> Option<&str> {
        match self {
            Self::Service { code, .. } => code.as_deref(),
            Self::NoSuchKey { .. } => Some("NoSuchKey"),
            Self::NoSuchBucket { .. } => Some("NoSuchBucket"),
            Self::Shutdown | Self::Transport(_) => None,
        }
    }

    /// Build a service error from a code and message.
    #[must_use]
    pub fn service(code: &str, message: &str) -> Self {
        Self::Service {
            code: Some(code.to_owned()),
            message: Some(message.to_owned()),
        }
    }
}

fn service_display(code: Option<&str>, message: Option<&str>) -> String {
    match (code, message) {
        (_, Some(message)) => message.to_owned(),
        (Some(code), None) => format!("service error: {code}"),
        (None, None) => "unknown service error".to_owned(),
    }
}

/// Convenience result type for backend calls.
pub type BackendResult<T> = Result<T, BackendError>;

/// An object-storage client bound to no particular bucket.
#[async_trait]
pub trait ObjectBackend: Send + Sync + fmt::Debug {
    /// Whether `bucket` exists and is reachable.
    async fn bucket_exists(&self, bucket: &str) -> BackendResult<bool>;

    /// Create `bucket`, optionally in `region`.
    async fn create_bucket(&self, bucket: &str, region: Option<&str>) -> BackendResult<()>;

    /// Object info without content; `None` when the key is absent.
    async fn head_object(&self, bucket: &str, key: &str) -> BackendResult<Option<ObjectInfo>>;

    /// Object content and info. Fails with [`BackendError::NoSuchKey`].
    async fn get_object(&self, bucket: &str, key: &str) -> BackendResult<StoredObject>;

    /// `len` bytes starting at `offset` (fewer at the end of the object).
    async fn get_object_range(
        &self,
        bucket: &str,
        key: &str,
        offset: u64,
        len: u64,
    ) -> BackendResult<Bytes>;

    /// Create or overwrite an object. The last writer wins.
    async fn put_object(
        &self,
        bucket: &str,
        key: &str,
        content: Bytes,
        metadata: &ObjectMetadata,
    ) -> BackendResult<()>;

    /// Remove an object. Removing an absent key succeeds.
    async fn delete_object(&self, bucket: &str, key: &str) -> BackendResult<()>;

    /// Server-side copy inside `bucket`.
    async fn copy_object(&self, bucket: &str, src_key: &str, dst_key: &str) -> BackendResult<()>;

    /// One page of a prefix listing, entries in key order.
    async fn list_objects(&self, bucket: &str, request: &ListRequest) -> BackendResult<ListPage>;

    /// The owner and grant list of an object.
    async fn get_grants(&self, bucket: &str, key: &str) -> BackendResult<AccessControlPolicy>;

    /// Replace the whole grant list of an object.
    async fn put_grants(
        &self,
        bucket: &str,
        key: &str,
        policy: &AccessControlPolicy,
    ) -> BackendResult<()>;

    /// Release the client. Later calls fail with [`BackendError::Shutdown`].
    async fn shutdown(&self);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_should_display_service_message_verbatim() {
        let err = BackendError::service("AccessDenied", "Access Denied");
        assert_eq!(err.to_string(), "Access Denied");
        assert_eq!(err.message(), Some("Access Denied"));
        assert_eq!(err.code(), Some("AccessDenied"));
    }

    #[test]
    fn test_should_fall_back_to_code_without_message() {
        let err = BackendError::Service {
            code: Some("SlowDown".to_owned()),
            message: None,
        };
        assert_eq!(err.to_string(), "service error: SlowDown");
        assert!(err.message().is_none());
    }

    #[test]
    fn test_should_expose_codes_for_missing_resources() {
        let key = BackendError::NoSuchKey {
            key: "k".to_owned(),
        };
        let bucket = BackendError::NoSuchBucket {
            bucket: "b".to_owned(),
        };
        assert_eq!(key.code(), Some("NoSuchKey"));
        assert_eq!(bucket.code(), Some("NoSuchBucket"));
        assert!(BackendError::Shutdown.code().is_none());
    }
}
