//! `aws-sdk-s3` object backend.
//!
//! [`AwsS3Backend`] implements [`ObjectBackend`] on top of an
//! [`aws_sdk_s3::Client`]. It adds no retries of its own: request-level
//! timeouts and retry policy come from the SDK configuration.
//!
//! Service errors are mapped by error code:
//!
//! | S3 code | [`BackendError`] |
//! |---------|------------------|
//! | `NoSuchKey`, `NotFound` | `NoSuchKey` |
//! | `NoSuchBucket` | `NoSuchBucket` |
//! | anything else | `Service` with the service message |
//!
//! Failures that never reached the service (connection, signing, timeouts)
//! become `Transport`. A `HeadBucket` answered with 403 counts as an existing
//! bucket owned by someone else.

use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use aws_config::BehaviorVersion;
use aws_sdk_s3::Client;
use aws_sdk_s3::config::Region;
use aws_sdk_s3::error::{DisplayErrorContext, ProvideErrorMetadata, SdkError};
use aws_sdk_s3::primitives::{ByteStream, DateTime as SdkDateTime};
use aws_sdk_s3::types::{
    self as sdk, BucketLocationConstraint, CreateBucketConfiguration, ServerSideEncryption, Type,
};
use base64::Engine as _;
use base64::engine::general_purpose::STANDARD as BASE64_STANDARD;
use bytes::Bytes;
use chrono::{DateTime, Utc};
use md5::{Digest, Md5};
use percent_encoding::{AsciiSet, NON_ALPHANUMERIC, utf8_percent_encode};
use s3vfs_core::backend::{
    AccessControlPolicy, BackendError, BackendResult, Grant, Grantee, ListEntry, ListPage,
    ListRequest, ObjectBackend, ObjectInfo, ObjectMetadata, Owner, Permission, StoredObject,
};
use s3vfs_core::config::FileSystemOptions;
use tracing::{debug, info};

/// Region S3 treats as the default location (no location constraint).
const DEFAULT_REGION: &str = "us-east-1";

/// Characters escaped in the `x-amz-copy-source` key.
const COPY_SOURCE_ESCAPE: &AsciiSet = &NON_ALPHANUMERIC
    .remove(b'/')
    .remove(b'-')
    .remove(b'_')
    .remove(b'.')
    .remove(b'~');

/// An [`ObjectBackend`] backed by `aws-sdk-s3`.
pub struct AwsS3Backend {
    client: Client,
    closed: AtomicBool,
}

impl fmt::Debug for AwsS3Backend {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AwsS3Backend")
            .field("closed", &self.closed.load(Ordering::Relaxed))
            .finish_non_exhaustive()
    }
}

impl AwsS3Backend {
    /// Wrap an existing client.
    #[must_use]
    pub fn from_client(client: Client) -> Self {
        Self {
            client,
            closed: AtomicBool::new(false),
        }
    }

    /// Build a client from the default AWS configuration chain, overridden by
    /// the region, endpoint and addressing style in `options`.
    pub async fn from_options(options: &FileSystemOptions) -> Self {
        let mut loader = aws_config::defaults(BehaviorVersion::latest());
        if let Some(region) = &options.region {
            loader = loader.region(Region::new(region.clone()));
        }
        let sdk_config = loader.load().await;

        let mut builder = aws_sdk_s3::config::Builder::from(&sdk_config);
        if let Some(endpoint) = &options.endpoint_url {
            builder = builder.endpoint_url(endpoint);
        }
        if options.force_path_style {
            builder = builder.force_path_style(true);
        }

        info!(
            region = ?options.region,
            endpoint = ?options.endpoint_url,
            path_style = options.force_path_style,
            "created S3 client"
        );
        Self::from_client(Client::from_conf(builder.build()))
    }

    /// The wrapped client.
    #[must_use]
    pub fn client(&self) -> &Client {
        &self.client
    }

    fn check_open(&self) -> BackendResult<()> {
        if self.closed.load(Ordering::SeqCst) {
            return Err(BackendError::Shutdown);
        }
        Ok(())
    }
}

#[async_trait]
impl ObjectBackend for AwsS3Backend {
    async fn bucket_exists(&self, bucket: &str) -> BackendResult<bool> {
        self.check_open()?;
        match self.client.head_bucket().bucket(bucket).send().await {
            Ok(_) => Ok(true),
            Err(err) => head_bucket_outcome(map_sdk_error(err, bucket, None)),
        }
    }

    async fn create_bucket(&self, bucket: &str, region: Option<&str>) -> BackendResult<()> {
        self.check_open()?;
        let configuration = region.filter(|r| *r != DEFAULT_REGION).map(|r| {
            CreateBucketConfiguration::builder()
                .location_constraint(BucketLocationConstraint::from(r))
                .build()
        });
        self.client
            .create_bucket()
            .bucket(bucket)
            .set_create_bucket_configuration(configuration)
            .send()
            .await
            .map_err(|e| map_sdk_error(e, bucket, None))?;
        info!(bucket, ?region, "created S3 bucket");
        Ok(())
    }

    async fn head_object(&self, bucket: &str, key: &str) -> BackendResult<Option<ObjectInfo>> {
        self.check_open()?;
        let output = match self.client.head_object().bucket(bucket).key(key).send().await {
            Ok(output) => output,
            Err(err) => {
                return match map_sdk_error(err, bucket, Some(key)) {
                    BackendError::NoSuchKey { .. } => Ok(None),
                    other => Err(other),
                };
            }
        };
        Ok(Some(ObjectInfo {
            key: key.to_owned(),
            size: content_length(output.content_length()),
            last_modified: output.last_modified().and_then(to_chrono),
            etag: output.e_tag().map(str::to_owned),
            metadata: ObjectMetadata {
                content_type: output.content_type().map(str::to_owned),
                user_metadata: output.metadata().cloned().unwrap_or_default(),
                sse_algorithm: output
                    .server_side_encryption()
                    .map(|s| s.as_str().to_owned()),
            },
        }))
    }

    async fn get_object(&self, bucket: &str, key: &str) -> BackendResult<StoredObject> {
        self.check_open()?;
        let output = self
            .client
            .get_object()
            .bucket(bucket)
            .key(key)
            .send()
            .await
            .map_err(|e| map_sdk_error(e, bucket, Some(key)))?;

        let info = ObjectInfo {
            key: key.to_owned(),
            size: content_length(output.content_length()),
            last_modified: output.last_modified().and_then(to_chrono),
            etag: output.e_tag().map(str::to_owned),
            metadata: ObjectMetadata {
                content_type: output.content_type().map(str::to_owned),
                user_metadata: output.metadata().cloned().unwrap_or_default(),
                sse_algorithm: output
                    .server_side_encryption()
                    .map(|s| s.as_str().to_owned()),
            },
        };
        let content = output
            .body
            .collect()
            .await
            .map_err(|e| BackendError::Transport(anyhow::Error::new(e)))?
            .into_bytes();
        Ok(StoredObject { info, content })
    }

    async fn get_object_range(
        &self,
        bucket: &str,
        key: &str,
        offset: u64,
        len: u64,
    ) -> BackendResult<Bytes> {
        self.check_open()?;
        let output = self
            .client
            .get_object()
            .bucket(bucket)
            .key(key)
            .range(range_header(offset, len))
            .send()
            .await
            .map_err(|e| map_sdk_error(e, bucket, Some(key)))?;
        let content = output
            .body
            .collect()
            .await
            .map_err(|e| BackendError::Transport(anyhow::Error::new(e)))?
            .into_bytes();
        Ok(content)
    }

    async fn put_object(
        &self,
        bucket: &str,
        key: &str,
        content: Bytes,
        metadata: &ObjectMetadata,
    ) -> BackendResult<()> {
        self.check_open()?;
        let user_metadata = (!metadata.user_metadata.is_empty())
            .then(|| metadata.user_metadata.clone());
        let encryption = metadata
            .sse_algorithm
            .as_deref()
            .map(ServerSideEncryption::from);
        let size = content.len();

        self.client
            .put_object()
            .bucket(bucket)
            .key(key)
            .content_md5(md5_base64(&content))
            .set_content_type(metadata.content_type.clone())
            .set_metadata(user_metadata)
            .set_server_side_encryption(encryption)
            .body(ByteStream::from(content))
            .send()
            .await
            .map_err(|e| map_sdk_error(e, bucket, Some(key)))?;
        debug!(bucket, key, size, "put S3 object");
        Ok(())
    }

    async fn delete_object(&self, bucket: &str, key: &str) -> BackendResult<()> {
        self.check_open()?;
        self.client
            .delete_object()
            .bucket(bucket)
            .key(key)
            .send()
            .await
            .map_err(|e| map_sdk_error(e, bucket, Some(key)))?;
        Ok(())
    }

    async fn copy_object(&self, bucket: &str, src_key: &str, dst_key: &str) -> BackendResult<()> {
        self.check_open()?;
        self.client
            .copy_object()
            .bucket(bucket)
            .key(dst_key)
            .copy_source(copy_source(bucket, src_key))
            .send()
            .await
            .map_err(|e| map_sdk_error(e, bucket, Some(src_key)))?;
        Ok(())
    }

    async fn list_objects(&self, bucket: &str, request: &ListRequest) -> BackendResult<ListPage> {
        self.check_open()?;
        let max_keys = request
            .max_keys
            .map(|n| i32::try_from(n).unwrap_or(i32::MAX));
        let output = self
            .client
            .list_objects_v2()
            .bucket(bucket)
            .prefix(&request.prefix)
            .set_delimiter(request.delimiter.clone())
            .set_continuation_token(request.continuation_token.clone())
            .set_max_keys(max_keys)
            .send()
            .await
            .map_err(|e| map_sdk_error(e, bucket, None))?;

        let objects = output
            .contents()
            .iter()
            .filter_map(|o| o.key())
            .map(ListEntry::object);
        let prefixes = output
            .common_prefixes()
            .iter()
            .filter_map(|p| p.prefix())
            .map(ListEntry::common_prefix);
        let mut entries: Vec<ListEntry> = objects.chain(prefixes).collect();
        entries.sort_by(|a, b| a.key.cmp(&b.key));

        let next_continuation_token = if output.is_truncated().unwrap_or(false) {
            output.next_continuation_token().map(str::to_owned)
        } else {
            None
        };
        Ok(ListPage {
            entries,
            next_continuation_token,
        })
    }

    async fn get_grants(&self, bucket: &str, key: &str) -> BackendResult<AccessControlPolicy> {
        self.check_open()?;
        let output = self
            .client
            .get_object_acl()
            .bucket(bucket)
            .key(key)
            .send()
            .await
            .map_err(|e| map_sdk_error(e, bucket, Some(key)))?;

        let owner = output.owner().map_or_else(
            || Owner {
                id: String::new(),
                display_name: None,
            },
            owner_from_sdk,
        );
        let grants = output.grants().iter().filter_map(grant_from_sdk).collect();
        Ok(AccessControlPolicy { owner, grants })
    }

    async fn put_grants(
        &self,
        bucket: &str,
        key: &str,
        policy: &AccessControlPolicy,
    ) -> BackendResult<()> {
        self.check_open()?;
        let grants = policy
            .grants
            .iter()
            .map(grant_to_sdk)
            .collect::<BackendResult<Vec<_>>>()?;
        let sdk_policy = sdk::AccessControlPolicy::builder()
            .owner(owner_to_sdk(&policy.owner))
            .set_grants(Some(grants))
            .build();
        self.client
            .put_object_acl()
            .bucket(bucket)
            .key(key)
            .access_control_policy(sdk_policy)
            .send()
            .await
            .map_err(|e| map_sdk_error(e, bucket, Some(key)))?;
        debug!(bucket, key, grants = policy.grants.len(), "put S3 object acl");
        Ok(())
    }

    async fn shutdown(&self) {
        if !self.closed.swap(true, Ordering::SeqCst) {
            info!("S3 client shut down");
        }
    }
}

// ---------------------------------------------------------------------------
// Error mapping
// ---------------------------------------------------------------------------

fn map_sdk_error<E, R>(err: SdkError<E, R>, bucket: &str, key: Option<&str>) -> BackendError
where
    E: ProvideErrorMetadata + std::error::Error + 'static,
    R: fmt::Debug,
{
    let Some(service) = err.as_service_error() else {
        return BackendError::Transport(anyhow::anyhow!("{}", DisplayErrorContext(&err)));
    };
    classify_service_error(service.code(), service.message(), bucket, key)
}

/// Existence answer for a failed `HeadBucket`. A 403 means the bucket exists
/// but belongs to another account.
fn head_bucket_outcome(err: BackendError) -> BackendResult<bool> {
    match err {
        BackendError::NoSuchBucket { .. } | BackendError::NoSuchKey { .. } => Ok(false),
        BackendError::Service {
            code: Some(ref code),
            ..
        } if matches!(code.as_str(), "Forbidden" | "AccessDenied") => Ok(true),
        other => Err(other),
    }
}

fn classify_service_error(
    code: Option<&str>,
    message: Option<&str>,
    bucket: &str,
    key: Option<&str>,
) -> BackendError {
    match (code, key) {
        (Some("NoSuchBucket"), _) | (Some("NotFound"), None) => BackendError::NoSuchBucket {
            bucket: bucket.to_owned(),
        },
        (Some("NoSuchKey" | "NotFound"), Some(key)) => BackendError::NoSuchKey {
            key: key.to_owned(),
        },
        _ => BackendError::Service {
            code: code.map(str::to_owned),
            message: message.map(str::to_owned),
        },
    }
}

// ---------------------------------------------------------------------------
// Conversions
// ---------------------------------------------------------------------------

fn owner_from_sdk(owner: &sdk::Owner) -> Owner {
    Owner {
        id: owner.id().unwrap_or_default().to_owned(),
        display_name: owner.display_name().map(str::to_owned),
    }
}

fn owner_to_sdk(owner: &Owner) -> sdk::Owner {
    sdk::Owner::builder()
        .id(&owner.id)
        .set_display_name(owner.display_name.clone())
        .build()
}

fn grant_from_sdk(grant: &sdk::Grant) -> Option<Grant> {
    let permission = match grant.permission()? {
        sdk::Permission::FullControl => Permission::FullControl,
        sdk::Permission::Read => Permission::Read,
        sdk::Permission::Write => Permission::Write,
        sdk::Permission::ReadAcp => Permission::ReadAcp,
        sdk::Permission::WriteAcp => Permission::WriteAcp,
        _ => return None,
    };
    let grantee = grant.grantee()?;
    let grantee = match grantee.r#type() {
        Type::CanonicalUser => Grantee::CanonicalUser {
            id: grantee.id()?.to_owned(),
            display_name: grantee.display_name().map(str::to_owned),
        },
        Type::Group => Grantee::Group {
            uri: grantee.uri()?.to_owned(),
        },
        Type::AmazonCustomerByEmail => Grantee::Email {
            email: grantee.email_address()?.to_owned(),
        },
        _ => return None,
    };
    Some(Grant::new(grantee, permission))
}

fn grant_to_sdk(grant: &Grant) -> BackendResult<sdk::Grant> {
    let builder = match &grant.grantee {
        Grantee::CanonicalUser { id, display_name } => sdk::Grantee::builder()
            .r#type(Type::CanonicalUser)
            .id(id)
            .set_display_name(display_name.clone()),
        Grantee::Group { uri } => sdk::Grantee::builder().r#type(Type::Group).uri(uri),
        Grantee::Email { email } => sdk::Grantee::builder()
            .r#type(Type::AmazonCustomerByEmail)
            .email_address(email),
    };
    let grantee = builder
        .build()
        .map_err(|e| BackendError::Transport(anyhow::Error::new(e)))?;
    let permission = match grant.permission {
        Permission::FullControl => sdk::Permission::FullControl,
        Permission::Read => sdk::Permission::Read,
        Permission::Write => sdk::Permission::Write,
        Permission::ReadAcp => sdk::Permission::ReadAcp,
        Permission::WriteAcp => sdk::Permission::WriteAcp,
    };
    Ok(sdk::Grant::builder()
        .grantee(grantee)
        .permission(permission)
        .build())
}

fn to_chrono(dt: &SdkDateTime) -> Option<DateTime<Utc>> {
    DateTime::from_timestamp(dt.secs(), dt.subsec_nanos())
}

fn content_length(length: Option<i64>) -> u64 {
    length.and_then(|n| u64::try_from(n).ok()).unwrap_or(0)
}

/// HTTP `Range` value for `len` bytes from `offset` (`len` must be non-zero).
fn range_header(offset: u64, len: u64) -> String {
    let last = offset.saturating_add(len.max(1) - 1);
    format!("bytes={offset}-{last}")
}

fn copy_source(bucket: &str, key: &str) -> String {
    format!("{bucket}/{}", utf8_percent_encode(key, COPY_SOURCE_ESCAPE))
}

/// Base64 MD5 digest for the `Content-MD5` header.
fn md5_base64(data: &[u8]) -> String {
    BASE64_STANDARD.encode(Md5::digest(data))
}
