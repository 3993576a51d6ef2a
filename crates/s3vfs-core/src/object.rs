//! Content-level I/O against backend objects.
//!
//! [`ObjectAdapter`] binds an [`ObjectBackend`] to one bucket and turns its
//! calls into [`VfsResult`]s. Listings are exposed as lazy streams that fetch
//! one backend page at a time.

use std::sync::Arc;

use bytes::Bytes;
use futures::stream::{self, BoxStream, StreamExt, TryStreamExt};
use tracing::debug;

use crate::backend::{
    AccessControlPolicy, ListEntry, ListRequest, ObjectBackend, ObjectInfo, ObjectMetadata,
    StoredObject,
};
use crate::config::FileSystemOptions;
use crate::error::{VfsError, VfsResult};

/// Server-side encryption algorithm requested when encryption is enabled.
const SSE_ALGORITHM: &str = "AES256";

/// Performs get/put/delete/copy/list for keys of a single bucket.
#[derive(Debug, Clone)]
pub struct ObjectAdapter {
    backend: Arc<dyn ObjectBackend>,
    bucket: String,
    page_size: Option<usize>,
    server_side_encryption: bool,
}

impl ObjectAdapter {
    /// Bind `backend` to `bucket`.
    #[must_use]
    pub fn new(
        backend: Arc<dyn ObjectBackend>,
        bucket: impl Into<String>,
        options: &FileSystemOptions,
    ) -> Self {
        Self {
            backend,
            bucket: bucket.into(),
            page_size: options.list_page_size,
            server_side_encryption: options.server_side_encryption,
        }
    }

    /// The bound bucket.
    #[must_use]
    pub fn bucket(&self) -> &str {
        &self.bucket
    }

    /// Object info, `None` when the key is absent.
    ///
    /// # Errors
    ///
    /// Returns a [`VfsError`] if the backend call fails.
    pub async fn head(&self, key: &str) -> VfsResult<Option<ObjectInfo>> {
        debug!(bucket = %self.bucket, key, "head object");
        self.backend
            .head_object(&self.bucket, key)
            .await
            .map_err(VfsError::from_backend)
    }

    /// Content and metadata of `key`.
    ///
    /// # Errors
    ///
    /// Returns [`VfsError::NotFound`] when the key is absent.
    pub async fn fetch(&self, key: &str) -> VfsResult<StoredObject> {
        debug!(bucket = %self.bucket, key, "get object");
        self.backend
            .get_object(&self.bucket, key)
            .await
            .map_err(VfsError::from_backend)
    }

    /// Up to `len` bytes of `key` starting at `offset`.
    ///
    /// # Errors
    ///
    /// Returns [`VfsError::NotFound`] when the key is absent, or a transport
    /// error when `offset` lies beyond the end of the object.
    pub async fn fetch_range(&self, key: &str, offset: u64, len: u64) -> VfsResult<Bytes> {
        if len == 0 {
            return Ok(Bytes::new());
        }
        debug!(bucket = %self.bucket, key, offset, len, "get object range");
        self.backend
            .get_object_range(&self.bucket, key, offset, len)
            .await
            .map_err(VfsError::from_backend)
    }

    /// Create or overwrite `key`. The last writer wins.
    ///
    /// # Errors
    ///
    /// Returns a [`VfsError`] if the backend call fails.
    pub async fn store(
        &self,
        key: &str,
        content: Bytes,
        content_type: Option<&str>,
    ) -> VfsResult<()> {
        let metadata = ObjectMetadata {
            content_type: content_type.map(str::to_owned),
            sse_algorithm: self
                .server_side_encryption
                .then(|| SSE_ALGORITHM.to_owned()),
            ..ObjectMetadata::default()
        };
        debug!(bucket = %self.bucket, key, size = content.len(), "put object");
        self.backend
            .put_object(&self.bucket, key, content, &metadata)
            .await
            .map_err(VfsError::from_backend)
    }

    /// Remove `key`. Removing an absent key succeeds.
    ///
    /// # Errors
    ///
    /// Returns a [`VfsError`] if the backend call fails.
    pub async fn delete(&self, key: &str) -> VfsResult<()> {
        debug!(bucket = %self.bucket, key, "delete object");
        self.backend
            .delete_object(&self.bucket, key)
            .await
            .map_err(VfsError::from_backend)
    }

    /// Server-side copy of `src_key` to `dst_key`.
    ///
    /// # Errors
    ///
    /// Returns [`VfsError::NotFound`] when `src_key` is absent.
    pub async fn copy(&self, src_key: &str, dst_key: &str) -> VfsResult<()> {
        debug!(bucket = %self.bucket, src_key, dst_key, "copy object");
        self.backend
            .copy_object(&self.bucket, src_key, dst_key)
            .await
            .map_err(VfsError::from_backend)
    }

    /// Lazily list every key and common prefix under `prefix`.
    ///
    /// Pages are requested as the stream is polled and the stream ends when
    /// the backend stops returning a continuation token. Each call starts a
    /// fresh listing from the first page.
    #[must_use]
    pub fn list_by_prefix(
        &self,
        prefix: &str,
        delimiter: Option<&str>,
    ) -> BoxStream<'static, VfsResult<ListEntry>> {
        let backend = Arc::clone(&self.backend);
        let bucket = self.bucket.clone();
        let mut request = ListRequest::new(prefix).with_max_keys(self.page_size);
        if let Some(delimiter) = delimiter {
            request = request.with_delimiter(delimiter);
        }

        // `None` once the last page has been read.
        let start: Option<Option<String>> = Some(None);
        stream::try_unfold(start, move |state| {
            let backend = Arc::clone(&backend);
            let bucket = bucket.clone();
            let request = request.clone();
            async move {
                let Some(token) = state else {
                    return Ok::<_, VfsError>(None);
                };
                debug!(%bucket, prefix = %request.prefix, "list objects page");
                let page = backend
                    .list_objects(&bucket, &request.with_continuation_token(token))
                    .await
                    .map_err(VfsError::from_backend)?;
                let next = page.next_continuation_token.map(Some);
                Ok(Some((page.entries, next)))
            }
        })
        .map_ok(|entries| stream::iter(entries.into_iter().map(Ok)))
        .try_flatten()
        .boxed()
    }

    /// The first key under `prefix`, if any, from a one-entry listing.
    ///
    /// # Errors
    ///
    /// Returns a [`VfsError`] if the backend call fails.
    pub async fn first_under(&self, prefix: &str) -> VfsResult<Option<ListEntry>> {
        let request = ListRequest::new(prefix).with_max_keys(Some(1));
        let page = self
            .backend
            .list_objects(&self.bucket, &request)
            .await
            .map_err(VfsError::from_backend)?;
        Ok(page.entries.into_iter().next())
    }

    /// Every key under `prefix`, in key order.
    ///
    /// # Errors
    ///
    /// Returns the first listing error.
    pub async fn keys_under(&self, prefix: &str) -> VfsResult<Vec<String>> {
        self.list_by_prefix(prefix, None)
            .map_ok(|entry| entry.key)
            .try_collect()
            .await
    }

    /// The owner and grant list of `key`.
    ///
    /// # Errors
    ///
    /// Returns [`VfsError::NotFound`] when the key is absent.
    pub async fn grants(&self, key: &str) -> VfsResult<AccessControlPolicy> {
        debug!(bucket = %self.bucket, key, "get object acl");
        self.backend
            .get_grants(&self.bucket, key)
            .await
            .map_err(VfsError::from_backend)
    }

    /// Replace the grant list of `key`.
    ///
    /// # Errors
    ///
    /// Returns [`VfsError::NotFound`] when the key is absent.
    pub async fn put_grants(&self, key: &str, policy: &AccessControlPolicy) -> VfsResult<()> {
        debug!(bucket = %self.bucket, key, grants = policy.grants.len(), "put object acl");
        self.backend
            .put_grants(&self.bucket, key, policy)
            .await
            .map_err(VfsError::from_backend)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::InMemoryBackend;

    async fn adapter(page_size: usize) -> (Arc<InMemoryBackend>, ObjectAdapter) {
        let backend = Arc::new(InMemoryBackend::new().with_page_size(page_size));
        backend.create_bucket("b", None).await.unwrap();
        let adapter = ObjectAdapter::new(backend.clone(), "b", &FileSystemOptions::default());
        (backend, adapter)
    }

    #[tokio::test]
    async fn test_should_store_and_fetch() {
        let (_, adapter) = adapter(10).await;
        adapter
            .store("a.txt", Bytes::from_static(b"abc"), Some("text/plain"))
            .await
            .unwrap();
        let obj = adapter.fetch("a.txt").await.unwrap();
        assert_eq!(obj.content.as_ref(), b"abc");
        assert_eq!(obj.info.metadata.content_type.as_deref(), Some("text/plain"));
        assert!(obj.info.metadata.sse_algorithm.is_none());
    }

    #[tokio::test]
    async fn test_should_request_encryption_when_enabled() {
        let backend = Arc::new(InMemoryBackend::new());
        backend.create_bucket("b", None).await.unwrap();
        let options = FileSystemOptions::builder()
            .server_side_encryption(true)
            .build();
        let adapter = ObjectAdapter::new(backend, "b", &options);
        adapter.store("k", Bytes::new(), None).await.unwrap();
        let info = adapter.head("k").await.unwrap().unwrap();
        assert_eq!(info.metadata.sse_algorithm.as_deref(), Some("AES256"));
    }

    #[tokio::test]
    async fn test_should_map_missing_key_to_not_found() {
        let (_, adapter) = adapter(10).await;
        assert!(adapter.fetch("missing").await.unwrap_err().is_not_found());
        assert!(adapter.head("missing").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_should_delete_absent_key() {
        let (_, adapter) = adapter(10).await;
        adapter.delete("never-existed").await.unwrap();
    }

    #[tokio::test]
    async fn test_should_stream_across_pages() {
        let (_, adapter) = adapter(2).await;
        for key in ["p/1", "p/2", "p/3", "p/4", "p/5", "z"] {
            adapter.store(key, Bytes::new(), None).await.unwrap();
        }
        let keys = adapter.keys_under("p/").await.unwrap();
        assert_eq!(keys, vec!["p/1", "p/2", "p/3", "p/4", "p/5"]);
    }

    #[tokio::test]
    async fn test_should_restart_listing_on_each_call() {
        let (_, adapter) = adapter(1).await;
        for key in ["d/a", "d/b"] {
            adapter.store(key, Bytes::new(), None).await.unwrap();
        }
        let first: Vec<_> = adapter
            .list_by_prefix("d/", Some("/"))
            .try_collect()
            .await
            .unwrap();
        let second: Vec<_> = adapter
            .list_by_prefix("d/", Some("/"))
            .try_collect()
            .await
            .unwrap();
        assert_eq!(first, second);
        assert_eq!(first.len(), 2);
    }

    #[tokio::test]
    async fn test_should_surface_listing_errors() {
        let (backend, adapter) = adapter(10).await;
        backend.fail_requests(Some("boom"));
        let err = adapter.keys_under("").await.unwrap_err();
        assert_eq!(err.to_string(), "boom");
    }

    #[tokio::test]
    async fn test_should_fetch_range() {
        let (_, adapter) = adapter(10).await;
        adapter
            .store("r", Bytes::from_static(b"hello world"), None)
            .await
            .unwrap();
        assert_eq!(adapter.fetch_range("r", 6, 5).await.unwrap().as_ref(), b"world");
        assert!(adapter.fetch_range("r", 0, 0).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_should_find_first_key_under_prefix() {
        let (_, adapter) = adapter(10).await;
        assert!(adapter.first_under("dir/").await.unwrap().is_none());
        adapter.store("dir/x", Bytes::new(), None).await.unwrap();
        let first = adapter.first_under("dir/").await.unwrap().unwrap();
        assert_eq!(first.key, "dir/x");
    }
}
