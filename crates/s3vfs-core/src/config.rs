//! File-system options.
//!
//! Provides [`FileSystemOptions`], the per-session configuration handed to
//! [`crate::session::S3FileSystem::connect`]. Values can be built in code or
//! loaded from environment variables.

use serde::{Deserialize, Serialize};
use typed_builder::TypedBuilder;

/// Options for one file-system session.
///
/// # Examples
///
/// ```
/// use s3vfs_core::config::FileSystemOptions;
///
/// let options = FileSystemOptions::default();
/// assert!(options.region.is_none());
/// assert!(!options.shutdown_backend_on_close);
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TypedBuilder)]
#[serde(rename_all = "camelCase")]
pub struct FileSystemOptions {
    /// Region of the bucket binding; also the location constraint used when
    /// the bucket has to be created.
    #[builder(default, setter(strip_option, into))]
    pub region: Option<String>,

    /// Custom endpoint URL (e.g. a local S3-compatible server).
    #[builder(default, setter(strip_option, into))]
    pub endpoint_url: Option<String>,

    /// Use path-style addressing instead of virtual-hosted buckets.
    #[builder(default = false)]
    pub force_path_style: bool,

    /// Request `AES256` server-side encryption on every stored object.
    #[builder(default = false)]
    pub server_side_encryption: bool,

    /// Whether closing the session also shuts the backend client down.
    ///
    /// Only the session that owns the client should set this; sessions that
    /// share a client leave it untouched on close.
    #[builder(default = false)]
    pub shutdown_backend_on_close: bool,

    /// Maximum keys requested per list page (`None` uses the backend default).
    #[builder(default, setter(strip_option))]
    pub list_page_size: Option<usize>,

    /// Log level filter string (e.g. `"info"`, `"debug"`).
    #[builder(default = String::from("info"))]
    pub log_level: String,
}

impl Default for FileSystemOptions {
    fn default() -> Self {
        Self {
            region: None,
            endpoint_url: None,
            force_path_style: false,
            server_side_encryption: false,
            shutdown_backend_on_close: false,
            list_page_size: None,
            log_level: String::from("info"),
        }
    }
}

impl FileSystemOptions {
    /// Load options from environment variables.
    ///
    /// | Variable | Default |
    /// |----------|---------|
    /// | `S3VFS_REGION` | *(unset)* |
    /// | `S3_ENDPOINT_URL` | *(unset)* |
    /// | `S3VFS_FORCE_PATH_STYLE` | `false` |
    /// | `S3VFS_SERVER_SIDE_ENCRYPTION` | `false` |
    /// | `S3VFS_SHUTDOWN_ON_CLOSE` | `false` |
    /// | `S3VFS_LIST_PAGE_SIZE` | *(unset)* |
    /// | `LOG_LEVEL` | `info` |
    ///
    /// # Examples
    ///
    /// ```
    /// use s3vfs_core::config::FileSystemOptions;
    ///
    /// let options = FileSystemOptions::from_env();
    /// assert!(!options.log_level.is_empty());
    /// ```
    #[must_use]
    pub fn from_env() -> Self {
        let mut options = Self::default();

        if let Ok(v) = std::env::var("S3VFS_REGION") {
            options.region = Some(v);
        }
        if let Ok(v) = std::env::var("S3_ENDPOINT_URL") {
            options.endpoint_url = Some(v);
        }
        if let Ok(v) = std::env::var("S3VFS_FORCE_PATH_STYLE") {
            options.force_path_style = parse_bool(&v);
        }
        if let Ok(v) = std::env::var("S3VFS_SERVER_SIDE_ENCRYPTION") {
            options.server_side_encryption = parse_bool(&v);
        }
        if let Ok(v) = std::env::var("S3VFS_SHUTDOWN_ON_CLOSE") {
            options.shutdown_backend_on_close = parse_bool(&v);
        }
        if let Ok(v) = std::env::var("S3VFS_LIST_PAGE_SIZE") {
            if let Ok(n) = v.parse::<usize>() {
                options.list_page_size = Some(n);
            }
        }
        if let Ok(v) = std::env::var("LOG_LEVEL") {
            options.log_level = v;
        }

        options
    }
}

/// Parse a string as a boolean, accepting `"1"` and `"true"` (case-insensitive).
fn parse_bool(value: &str) -> bool {
    value == "1" || value.eq_ignore_ascii_case("true")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_should_create_default_options() {
        let options = FileSystemOptions::default();
        assert!(options.region.is_none());
        assert!(options.endpoint_url.is_none());
        assert!(!options.force_path_style);
        assert!(!options.server_side_encryption);
        assert!(!options.shutdown_backend_on_close);
        assert!(options.list_page_size.is_none());
        assert_eq!(options.log_level, "info");
    }

    #[test]
    fn test_should_build_with_typed_builder() {
        let options = FileSystemOptions::builder()
            .region("eu-west-1")
            .endpoint_url("http://localhost:4566")
            .force_path_style(true)
            .server_side_encryption(true)
            .shutdown_backend_on_close(true)
            .list_page_size(10)
            .log_level("debug".into())
            .build();

        assert_eq!(options.region.as_deref(), Some("eu-west-1"));
        assert_eq!(
            options.endpoint_url.as_deref(),
            Some("http://localhost:4566")
        );
        assert!(options.force_path_style);
        assert!(options.server_side_encryption);
        assert!(options.shutdown_backend_on_close);
        assert_eq!(options.list_page_size, Some(10));
        assert_eq!(options.log_level, "debug");
    }

    #[test]
    fn test_should_match_default_when_built_empty() {
        assert_eq!(
            FileSystemOptions::builder().build(),
            FileSystemOptions::default()
        );
    }

    #[test]
    fn test_should_serialize_to_camel_case_json() {
        let options = FileSystemOptions::default();
        let json = serde_json::to_string(&options).expect("test serialization");
        assert!(json.contains("shutdownBackendOnClose"));
        assert!(json.contains("forcePathStyle"));
    }

    #[test]
    fn test_should_parse_bool_values() {
        assert!(parse_bool("1"));
        assert!(parse_bool("true"));
        assert!(parse_bool("TRUE"));
        assert!(!parse_bool("0"));
        assert!(!parse_bool("no"));
        assert!(!parse_bool(""));
    }
}
