//! Virtual paths and their mapping onto backend keys.
//!
//! A [`VirtualPath`] is a bucket plus a normalized list of segments. Keys are
//! the segments joined with [`SEPARATOR`]; a directory marker key carries a
//! trailing separator. [`FileType`] is the three-way classification of what a
//! path currently denotes in the bucket.

use std::fmt;

use percent_encoding::{AsciiSet, CONTROLS, percent_decode_str, utf8_percent_encode};
use serde::{Deserialize, Serialize};

use crate::error::{VfsError, VfsResult};

/// URI scheme served by this provider.
pub const SCHEME: &str = "s3";

/// Separator between path segments and between key components.
pub const SEPARATOR: char = '/';

/// Maximum object key length in bytes.
const MAX_KEY_BYTES: usize = 1024;

/// Bytes escaped when a segment is printed as part of a URI. `%` must be in
/// here so that printing and parsing a path are inverses.
const SEGMENT_ENCODE_SET: &AsciiSet = &CONTROLS
    .add(b' ')
    .add(b'"')
    .add(b'#')
    .add(b'%')
    .add(b'<')
    .add(b'>')
    .add(b'?')
    .add(b'`')
    .add(b'{')
    .add(b'}')
    .add(b'/');

// ---------------------------------------------------------------------------
// VirtualPath
// ---------------------------------------------------------------------------

/// A normalized path inside one bucket.
///
/// Two paths are equal iff their buckets and segment sequences are equal.
///
/// # Examples
///
/// ```
/// use s3vfs_core::path::VirtualPath;
///
/// let path = VirtualPath::parse("s3://vfs-s3-tests/acl/./x/../check_acl.zip").unwrap();
/// assert_eq!(path.bucket(), "vfs-s3-tests");
/// assert_eq!(path.to_key(false), "acl/check_acl.zip");
/// assert_eq!(path.to_string(), "s3://vfs-s3-tests/acl/check_acl.zip");
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct VirtualPath {
    bucket: String,
    segments: Vec<String>,
}

impl VirtualPath {
    /// The root directory of `bucket`.
    #[must_use]
    pub fn root(bucket: impl Into<String>) -> Self {
        Self {
            bucket: bucket.into(),
            segments: Vec::new(),
        }
    }

    /// Parse an absolute `s3://bucket/key/...` URI.
    ///
    /// # Errors
    ///
    /// Returns [`VfsError::PathSyntax`] for a missing or foreign scheme, an
    /// empty bucket, or a key path that fails [`VirtualPath::normalize`].
    pub fn parse(uri: &str) -> VfsResult<Self> {
        let (scheme, rest) = uri
            .split_once("://")
            .ok_or_else(|| syntax_error(uri, "missing scheme"))?;
        if !scheme.eq_ignore_ascii_case(SCHEME) {
            return Err(syntax_error(
                uri,
                &format!("unsupported scheme {scheme}, expected {SCHEME}"),
            ));
        }

        let (bucket, key_path) = rest.split_once(SEPARATOR).unwrap_or((rest, ""));
        if bucket.is_empty() {
            return Err(syntax_error(uri, "missing bucket"));
        }

        Self::normalize(bucket, key_path)
    }

    /// Normalize a raw path relative to the root of `bucket`.
    ///
    /// Redundant separators and `.` segments are dropped, `..` removes the
    /// previous segment, and each segment is percent-decoded.
    ///
    /// # Errors
    ///
    /// Returns [`VfsError::PathSyntax`] when `..` would climb above the bucket
    /// root, a segment is not valid percent-encoded UTF-8 or encodes a
    /// separator, or the resulting key exceeds 1024 bytes.
    pub fn normalize(bucket: &str, raw: &str) -> VfsResult<Self> {
        Self::root(bucket).resolve(raw)
    }

    /// Resolve `raw` against this path.
    ///
    /// A leading separator makes `raw` relative to the bucket root instead.
    ///
    /// # Errors
    ///
    /// Same rules as [`VirtualPath::normalize`].
    pub fn resolve(&self, raw: &str) -> VfsResult<Self> {
        let mut segments = if raw.starts_with(SEPARATOR) {
            Vec::new()
        } else {
            self.segments.clone()
        };

        for part in raw.split(SEPARATOR) {
            match part {
                "" | "." => {}
                ".." => {
                    if segments.pop().is_none() {
                        return Err(syntax_error(raw, "path escapes the bucket root"));
                    }
                }
                _ => segments.push(decode_segment(raw, part)?),
            }
        }

        let path = Self {
            bucket: self.bucket.clone(),
            segments,
        };
        if path.to_key(true).len() > MAX_KEY_BYTES {
            return Err(syntax_error(
                raw,
                &format!("key longer than {MAX_KEY_BYTES} bytes"),
            ));
        }
        Ok(path)
    }

    /// Rebuild a path from a backend key. Empty components are skipped.
    #[must_use]
    pub fn from_key(bucket: impl Into<String>, key: &str) -> Self {
        Self {
            bucket: bucket.into(),
            segments: key
                .split(SEPARATOR)
                .filter(|s| !s.is_empty())
                .map(ToOwned::to_owned)
                .collect(),
        }
    }

    /// The owning bucket.
    #[must_use]
    pub fn bucket(&self) -> &str {
        &self.bucket
    }

    /// The normalized segments.
    #[must_use]
    pub fn segments(&self) -> &[String] {
        &self.segments
    }

    /// Whether this is the bucket root.
    #[must_use]
    pub fn is_root(&self) -> bool {
        self.segments.is_empty()
    }

    /// Number of segments below the root.
    #[must_use]
    pub fn depth(&self) -> usize {
        self.segments.len()
    }

    /// The last segment, `None` for the root.
    #[must_use]
    pub fn name(&self) -> Option<&str> {
        self.segments.last().map(String::as_str)
    }

    /// The parent directory, `None` for the root.
    #[must_use]
    pub fn parent(&self) -> Option<Self> {
        if self.is_root() {
            return None;
        }
        Some(Self {
            bucket: self.bucket.clone(),
            segments: self.segments[..self.segments.len() - 1].to_vec(),
        })
    }

    /// A direct child named `name`.
    ///
    /// # Errors
    ///
    /// Returns [`VfsError::PathSyntax`] if `name` is empty, `.`, `..`, or
    /// contains a separator.
    pub fn child(&self, name: &str) -> VfsResult<Self> {
        if name.is_empty() || name == "." || name == ".." || name.contains(SEPARATOR) {
            return Err(syntax_error(name, "not a single path segment"));
        }
        let mut segments = self.segments.clone();
        segments.push(name.to_owned());
        Ok(Self {
            bucket: self.bucket.clone(),
            segments,
        })
    }

    /// Whether `other` lies strictly below this path in the same bucket.
    #[must_use]
    pub fn is_ancestor_of(&self, other: &Self) -> bool {
        self.bucket == other.bucket
            && other.segments.len() > self.segments.len()
            && other.segments.starts_with(&self.segments)
    }

    /// The backend key for this path.
    ///
    /// With `trailing_slash` the key is the directory marker (`a/b/`). The
    /// root maps to the empty key either way.
    #[must_use]
    pub fn to_key(&self, trailing_slash: bool) -> String {
        let mut key = self.segments.join("/");
        if trailing_slash && !key.is_empty() {
            key.push(SEPARATOR);
        }
        key
    }

    /// The prefix shared by every key below this path (`""` for the root).
    #[must_use]
    pub fn child_prefix(&self) -> String {
        self.to_key(true)
    }
}

impl fmt::Display for VirtualPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{SCHEME}://{}/", self.bucket)?;
        for (i, segment) in self.segments.iter().enumerate() {
            if i > 0 {
                f.write_str("/")?;
            }
            match segment.as_str() {
                // Keys rebuilt by `from_key` may carry dot segments verbatim.
                "." => f.write_str("%2E")?,
                ".." => f.write_str("%2E%2E")?,
                _ => write!(f, "{}", utf8_percent_encode(segment, SEGMENT_ENCODE_SET))?,
            }
        }
        Ok(())
    }
}

fn decode_segment(raw: &str, part: &str) -> VfsResult<String> {
    let decoded = percent_decode_str(part)
        .decode_utf8()
        .map_err(|_| syntax_error(raw, "segment is not valid UTF-8"))?;
    if decoded.contains(SEPARATOR) {
        return Err(syntax_error(raw, "segment encodes a separator"));
    }
    Ok(decoded.into_owned())
}

fn syntax_error(path: &str, reason: &str) -> VfsError {
    VfsError::PathSyntax {
        path: path.to_owned(),
        reason: reason.to_owned(),
    }
}

// ---------------------------------------------------------------------------
// FileType
// ---------------------------------------------------------------------------

/// What a path denotes in the bucket at the time it was classified.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FileType {
    /// An object exists at the exact key.
    File,
    /// A marker `key/` exists, or some key starts with `key/`.
    Directory,
    /// Nothing exists; the path may still be created.
    Imaginary,
}

impl FileType {
    /// Classify a path from what the backend reported.
    ///
    /// Directory evidence wins over an exact object at the same key.
    ///
    /// # Examples
    ///
    /// ```
    /// use s3vfs_core::path::FileType;
    ///
    /// assert_eq!(FileType::classify(true, false), FileType::File);
    /// assert_eq!(FileType::classify(true, true), FileType::Directory);
    /// assert_eq!(FileType::classify(false, false), FileType::Imaginary);
    /// ```
    #[must_use]
    pub fn classify(exact_object: bool, directory_evidence: bool) -> Self {
        if directory_evidence {
            Self::Directory
        } else if exact_object {
            Self::File
        } else {
            Self::Imaginary
        }
    }

    /// Whether something exists at the path.
    #[must_use]
    pub fn exists(self) -> bool {
        !matches!(self, Self::Imaginary)
    }

    /// Return the lowercase name of this file type.
    #[must_use]
    pub fn as_str(&self) -> &str {
        match self {
            Self::File => "file",
            Self::Directory => "directory",
            Self::Imaginary => "imaginary",
        }
    }
}

impl fmt::Display for FileType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
