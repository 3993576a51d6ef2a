//! In-memory object backend.
//!
//! Buckets live in a [`DashMap`]; each bucket keeps its objects in a
//! `BTreeMap` behind a `parking_lot::RwLock` so prefix listings come out in
//! key order. Continuation tokens are base64-encoded keys, so they stay valid
//! across concurrent writes.
//!
//! Besides plain storage the backend records how often `create_bucket` was
//! called and can be told to fail requests, which lets tests observe bucket
//! binding and error propagation.

use std::collections::BTreeMap;
use std::ops::Bound;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

use async_trait::async_trait;
use base64::Engine;
use base64::engine::general_purpose::STANDARD as BASE64_STANDARD;
use bytes::Bytes;
use chrono::Utc;
use dashmap::{DashMap, DashSet};
use md5::{Digest, Md5};
use parking_lot::RwLock;
use tracing::{debug, info};

use super::{
    AccessControlPolicy, BackendError, BackendResult, Grant, ListEntry, ListPage, ListRequest,
    ObjectBackend, ObjectInfo, ObjectMetadata, Owner, StoredObject,
};

/// Page size used when a request does not set `max_keys`.
const DEFAULT_PAGE_SIZE: usize = 1000;

#[derive(Debug)]
struct MemoryObject {
    info: ObjectInfo,
    content: Bytes,
    grants: Vec<Grant>,
}

#[derive(Debug, Default)]
struct MemoryBucket {
    region: Option<String>,
    objects: RwLock<BTreeMap<String, MemoryObject>>,
}

/// An object backend that keeps everything in process memory.
///
/// # Examples
///
/// ```
/// use s3vfs_core::backend::{InMemoryBackend, ObjectBackend};
///
/// # tokio_test::block_on(async {
/// let backend = InMemoryBackend::new();
/// backend.create_bucket("demo", None).await.unwrap();
/// assert!(backend.bucket_exists("demo").await.unwrap());
/// # });
/// ```
pub struct InMemoryBackend {
    buckets: DashMap<String, MemoryBucket>,
    owner: Owner,
    page_size: usize,
    create_bucket_calls: AtomicUsize,
    shut_down: AtomicBool,
    failure: RwLock<Option<String>>,
    rejected_deletes: DashSet<String>,
}

impl std::fmt::Debug for InMemoryBackend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InMemoryBackend")
            .field("bucket_count", &self.buckets.len())
            .field("page_size", &self.page_size)
            .field("shut_down", &self.shut_down.load(Ordering::Relaxed))
            .finish_non_exhaustive()
    }
}

impl Default for InMemoryBackend {
    fn default() -> Self {
        Self::new()
    }
}

impl InMemoryBackend {
    /// Create an empty backend.
    #[must_use]
    pub fn new() -> Self {
        Self {
            buckets: DashMap::new(),
            owner: Owner::default(),
            page_size: DEFAULT_PAGE_SIZE,
            create_bucket_calls: AtomicUsize::new(0),
            shut_down: AtomicBool::new(false),
            failure: RwLock::new(None),
            rejected_deletes: DashSet::new(),
        }
    }

    /// Cap every list page at `page_size` entries, whatever the request asks.
    #[must_use]
    pub fn with_page_size(mut self, page_size: usize) -> Self {
        self.page_size = page_size.max(1);
        self
    }

    /// Use `owner` for every new object.
    #[must_use]
    pub fn with_owner(mut self, owner: Owner) -> Self {
        self.owner = owner;
        self
    }

    /// The owner assigned to new objects.
    #[must_use]
    pub fn owner(&self) -> &Owner {
        &self.owner
    }

    /// How many times `create_bucket` has been called.
    #[must_use]
    pub fn create_bucket_calls(&self) -> usize {
        self.create_bucket_calls.load(Ordering::SeqCst)
    }

    /// Whether [`ObjectBackend::shutdown`] has been called.
    #[must_use]
    pub fn is_shut_down(&self) -> bool {
        self.shut_down.load(Ordering::SeqCst)
    }

    /// Make every following request fail with a service error carrying
    /// `message`. `None` restores normal operation.
    pub fn fail_requests(&self, message: Option<&str>) {
        *self.failure.write() = message.map(str::to_owned);
    }

    /// Make deletes of `key` fail with `AccessDenied`.
    pub fn reject_deletes_of(&self, key: &str) {
        self.rejected_deletes.insert(key.to_owned());
    }

    /// The region `bucket` was created in.
    #[must_use]
    pub fn bucket_region(&self, bucket: &str) -> Option<String> {
        self.buckets.get(bucket).and_then(|b| b.region.clone())
    }

    /// All keys in `bucket`, in order. Empty when the bucket is missing.
    #[must_use]
    pub fn object_keys(&self, bucket: &str) -> Vec<String> {
        self.buckets
            .get(bucket)
            .map(|b| b.objects.read().keys().cloned().collect())
            .unwrap_or_default()
    }

    fn check(&self) -> BackendResult<()> {
        if self.is_shut_down() {
            return Err(BackendError::Shutdown);
        }
        if let Some(message) = self.failure.read().as_deref() {
            return Err(BackendError::service("InternalError", message));
        }
        Ok(())
    }

    fn bucket(
        &self,
        bucket: &str,
    ) -> BackendResult<dashmap::mapref::one::Ref<'_, String, MemoryBucket>> {
        self.check()?;
        self.buckets
            .get(bucket)
            .ok_or_else(|| BackendError::NoSuchBucket {
                bucket: bucket.to_owned(),
            })
    }

    fn new_object(&self, key: &str, content: Bytes, metadata: ObjectMetadata) -> MemoryObject {
        let info = ObjectInfo {
            key: key.to_owned(),
            size: content.len() as u64,
            last_modified: Some(Utc::now()),
            etag: Some(compute_etag(&content)),
            metadata,
        };
        MemoryObject {
            info,
            content,
            grants: AccessControlPolicy::private(self.owner.clone()).grants,
        }
    }
}

#[async_trait]
impl ObjectBackend for InMemoryBackend {
    async fn bucket_exists(&self, bucket: &str) -> BackendResult<bool> {
        self.check()?;
        Ok(self.buckets.contains_key(bucket))
    }

    async fn create_bucket(&self, bucket: &str, region: Option<&str>) -> BackendResult<()> {
        self.check()?;
        self.create_bucket_calls.fetch_add(1, Ordering::SeqCst);
        if self.buckets.contains_key(bucket) {
            return Err(BackendError::service(
                "BucketAlreadyOwnedByYou",
                "Your previous request to create the named bucket succeeded and you already own it.",
            ));
        }
        self.buckets.insert(
            bucket.to_owned(),
            MemoryBucket {
                region: region.map(str::to_owned),
                objects: RwLock::new(BTreeMap::new()),
            },
        );
        info!(bucket, ?region, "created in-memory bucket");
        Ok(())
    }

    async fn head_object(&self, bucket: &str, key: &str) -> BackendResult<Option<ObjectInfo>> {
        let b = self.bucket(bucket)?;
        let objects = b.objects.read();
        Ok(objects.get(key).map(|o| o.info.clone()))
    }

    async fn get_object(&self, bucket: &str, key: &str) -> BackendResult<StoredObject> {
        let b = self.bucket(bucket)?;
        let objects = b.objects.read();
        let obj = objects.get(key).ok_or_else(|| BackendError::NoSuchKey {
            key: key.to_owned(),
        })?;
        Ok(StoredObject {
            info: obj.info.clone(),
            content: obj.content.clone(),
        })
    }

    async fn get_object_range(
        &self,
        bucket: &str,
        key: &str,
        offset: u64,
        len: u64,
    ) -> BackendResult<Bytes> {
        let b = self.bucket(bucket)?;
        let objects = b.objects.read();
        let obj = objects.get(key).ok_or_else(|| BackendError::NoSuchKey {
            key: key.to_owned(),
        })?;
        let size = obj.content.len() as u64;
        if offset >= size {
            return Err(BackendError::service(
                "InvalidRange",
                "The requested range is not satisfiable",
            ));
        }
        let end = offset.saturating_add(len).min(size);
        // Both bounds are within `content`, which is addressable memory.
        #[allow(clippy::cast_possible_truncation)]
        let slice = obj.content.slice(offset as usize..end as usize);
        Ok(slice)
    }

    async fn put_object(
        &self,
        bucket: &str,
        key: &str,
        content: Bytes,
        metadata: &ObjectMetadata,
    ) -> BackendResult<()> {
        let b = self.bucket(bucket)?;
        let obj = self.new_object(key, content, metadata.clone());
        debug!(bucket, key, size = obj.info.size, "stored object");
        b.objects.write().insert(key.to_owned(), obj);
        Ok(())
    }

    async fn delete_object(&self, bucket: &str, key: &str) -> BackendResult<()> {
        let b = self.bucket(bucket)?;
        if self.rejected_deletes.contains(key) {
            return Err(BackendError::service("AccessDenied", "Access Denied"));
        }
        b.objects.write().remove(key);
        Ok(())
    }

    async fn copy_object(&self, bucket: &str, src_key: &str, dst_key: &str) -> BackendResult<()> {
        let b = self.bucket(bucket)?;
        let mut objects = b.objects.write();
        let (content, metadata) = {
            let src = objects.get(src_key).ok_or_else(|| BackendError::NoSuchKey {
                key: src_key.to_owned(),
            })?;
            (src.content.clone(), src.info.metadata.clone())
        };
        let obj = self.new_object(dst_key, content, metadata);
        objects.insert(dst_key.to_owned(), obj);
        Ok(())
    }

    async fn list_objects(&self, bucket: &str, request: &ListRequest) -> BackendResult<ListPage> {
        let b = self.bucket(bucket)?;
        let start_after = request
            .continuation_token
            .as_deref()
            .map(decode_continuation_token)
            .transpose()?
            .unwrap_or_default();
        let max_keys = request
            .max_keys
            .unwrap_or(self.page_size)
            .min(self.page_size);

        let objects = b.objects.read();
        let lower = if start_after.as_str() > request.prefix.as_str() {
            Bound::Excluded(start_after.clone())
        } else {
            Bound::Included(request.prefix.clone())
        };
        let keys = objects
            .range((lower, Bound::Unbounded))
            .map(|(k, _)| k.as_str())
            .take_while(|k| k.starts_with(request.prefix.as_str()));

        Ok(list_from_btree(
            keys,
            &request.prefix,
            request.delimiter.as_deref().unwrap_or_default(),
            &start_after,
            max_keys,
        ))
    }

    async fn get_grants(&self, bucket: &str, key: &str) -> BackendResult<AccessControlPolicy> {
        let b = self.bucket(bucket)?;
        let objects = b.objects.read();
        let obj = objects.get(key).ok_or_else(|| BackendError::NoSuchKey {
            key: key.to_owned(),
        })?;
        Ok(AccessControlPolicy {
            owner: self.owner.clone(),
            grants: obj.grants.clone(),
        })
    }

    async fn put_grants(
        &self,
        bucket: &str,
        key: &str,
        policy: &AccessControlPolicy,
    ) -> BackendResult<()> {
        let b = self.bucket(bucket)?;
        let mut objects = b.objects.write();
        let obj = objects.get_mut(key).ok_or_else(|| BackendError::NoSuchKey {
            key: key.to_owned(),
        })?;
        obj.grants.clone_from(&policy.grants);
        debug!(bucket, key, grants = policy.grants.len(), "replaced grants");
        Ok(())
    }

    async fn shutdown(&self) {
        if !self.shut_down.swap(true, Ordering::SeqCst) {
            info!("in-memory backend shut down");
        }
    }
}

/// Build one page from keys already filtered to `prefix` and ordered.
///
/// Keys and common prefixes both count toward `max_keys`. A common prefix at
/// or before `start_after` was returned on an earlier page and is skipped.
fn list_from_btree<'a>(
    keys: impl Iterator<Item = &'a str>,
    prefix: &str,
    delimiter: &str,
    start_after: &str,
    max_keys: usize,
) -> ListPage {
    let mut entries: Vec<ListEntry> = Vec::new();
    let mut is_truncated = false;

    for key in keys {
        let entry = match delimiter_prefix(key, prefix, delimiter) {
            Some(cp) => {
                if cp <= start_after || entries.last().is_some_and(|e| e.key == cp) {
                    continue;
                }
                ListEntry::common_prefix(cp)
            }
            None => ListEntry::object(key),
        };

        if entries.len() >= max_keys {
            is_truncated = true;
            break;
        }
        entries.push(entry);
    }

    let next_continuation_token = if is_truncated {
        entries.last().map(|e| encode_continuation_token(&e.key))
    } else {
        None
    };

    ListPage {
        entries,
        next_continuation_token,
    }
}

/// The common prefix `key` rolls up into, if the delimiter follows `prefix`.
fn delimiter_prefix<'a>(key: &'a str, prefix: &str, delimiter: &str) -> Option<&'a str> {
    if delimiter.is_empty() {
        return None;
    }
    let after_prefix = &key[prefix.len()..];
    after_prefix
        .find(delimiter)
        .map(|pos| &key[..prefix.len() + pos + delimiter.len()])
}

/// Quoted hex MD5 of `data`, as S3 reports it for single-part uploads.
fn compute_etag(data: &[u8]) -> String {
    format!("\"{}\"", hex::encode(Md5::digest(data)))
}

fn encode_continuation_token(key: &str) -> String {
    BASE64_STANDARD.encode(key.as_bytes())
}

fn decode_continuation_token(token: &str) -> BackendResult<String> {
    let bytes = BASE64_STANDARD
        .decode(token)
        .map_err(|_| BackendError::service("InvalidArgument", "Invalid continuation token"))?;
    String::from_utf8(bytes).map_err(|_| {
        BackendError::service(
            "InvalidArgument",
            "Continuation token contains invalid UTF-8",
        )
    })
}
