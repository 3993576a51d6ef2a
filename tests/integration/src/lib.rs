//! Integration tests for the S3 virtual file system.
//!
//! These tests require an S3-compatible endpoint at `localhost:4566`
//! (override with `S3_ENDPOINT_URL`). They are marked `#[ignore]` so they
//! don't run during normal `cargo test`.
//!
//! Run them with:
//! ```text
//! cargo test -p s3vfs-integration -- --ignored
//! ```

use std::sync::{Arc, Once};

use aws_config::BehaviorVersion;
use aws_credential_types::Credentials;
use aws_sdk_s3::config::Region;
use s3vfs_aws::AwsS3Backend;
use s3vfs_core::{FileSystemOptions, S3FileSystem};

static INIT: Once = Once::new();

/// Region every test session binds to.
pub const TEST_REGION: &str = "us-east-1";

/// Initialize tracing (once).
fn init_tracing() {
    INIT.call_once(|| {
        tracing_subscriber::fmt()
            .with_env_filter(
                tracing_subscriber::EnvFilter::try_from_default_env()
                    .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn")),
            )
            .with_test_writer()
            .init();
    });
}

/// Endpoint URL for the server.
fn endpoint_url() -> String {
    std::env::var("S3_ENDPOINT_URL").unwrap_or_else(|_| "http://localhost:4566".to_owned())
}

/// Create a configured S3 client pointing at the local endpoint.
#[must_use]
pub fn s3_client() -> aws_sdk_s3::Client {
    init_tracing();

    let creds = Credentials::new("test", "test", None, None, "integration-test");

    let config = aws_sdk_s3::config::Builder::new()
        .behavior_version(BehaviorVersion::latest())
        .region(Region::new(TEST_REGION))
        .credentials_provider(creds)
        .endpoint_url(endpoint_url())
        .force_path_style(true)
        .build();

    aws_sdk_s3::Client::from_conf(config)
}

/// Generate a unique bucket name for a test.
#[must_use]
pub fn test_bucket_name(prefix: &str) -> String {
    let id = uuid::Uuid::new_v4().to_string()[..8].to_owned();
    format!("vfs-{prefix}-{id}")
}

/// Open a session on `bucket` (created on demand) over a fresh client.
///
/// The session owns its client, so closing it shuts the client down.
pub async fn open_file_system(bucket: &str) -> anyhow::Result<Arc<S3FileSystem>> {
    let backend = Arc::new(AwsS3Backend::from_client(s3_client()));
    let options = FileSystemOptions::builder()
        .region(TEST_REGION)
        .endpoint_url(endpoint_url())
        .force_path_style(true)
        .shutdown_backend_on_close(true)
        .build();
    let fs = S3FileSystem::connect(&format!("s3://{bucket}"), backend, options).await?;
    Ok(fs)
}

/// Delete all objects in a bucket, then delete the bucket.
pub async fn cleanup_bucket(client: &aws_sdk_s3::Client, bucket: &str) {
    let mut continuation_token = None;
    loop {
        let mut req = client.list_objects_v2().bucket(bucket);
        if let Some(token) = continuation_token.take() {
            req = req.continuation_token(token);
        }
        let Ok(resp) = req.send().await else {
            return; // Bucket may not exist.
        };

        for obj in resp.contents() {
            if let Some(key) = obj.key() {
                let _ = client.delete_object().bucket(bucket).key(key).send().await;
            }
        }

        if resp.is_truncated() == Some(true) {
            continuation_token = resp.next_continuation_token().map(ToOwned::to_owned);
        } else {
            break;
        }
    }

    let _ = client.delete_bucket().bucket(bucket).send().await;
}

mod test_acl;
mod test_directories;
mod test_files;
mod test_session;
