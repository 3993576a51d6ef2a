//! Data exchanged with an object-storage backend.
//!
//! These types mirror the subset of the S3 data model the file system needs:
//! object info and metadata, paginated listings, and access control policies
//! (owner plus grant list).

use std::collections::HashMap;
use std::fmt;

use bytes::Bytes;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Group URI for "anyone, authenticated or not".
pub const ALL_USERS_URI: &str = "http://acs.amazonaws.com/groups/global/AllUsers";

/// Group URI for "any authenticated account".
pub const AUTHENTICATED_USERS_URI: &str =
    "http://acs.amazonaws.com/groups/global/AuthenticatedUsers";

/// Group URI for the log delivery service.
pub const LOG_DELIVERY_URI: &str = "http://acs.amazonaws.com/groups/s3/LogDelivery";

// ---------------------------------------------------------------------------
// Owner
// ---------------------------------------------------------------------------

/// The owner of a bucket or object.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Owner {
    /// The canonical user ID of the owner.
    pub id: String,
    /// The display name of the owner, when the backend reports one.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub display_name: Option<String>,
}

impl Default for Owner {
    fn default() -> Self {
        Self {
            id: "75aa57f09aa0c8caeab4f8c24e99d10f8e7faeebf76c078efc7c6caea54ba06a".to_owned(),
            display_name: Some("webfile".to_owned()),
        }
    }
}

impl fmt::Display for Owner {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.display_name {
            Some(name) => write!(f, "{name}({})", self.id),
            None => f.write_str(&self.id),
        }
    }
}

// ---------------------------------------------------------------------------
// Grant / Grantee / Permission
// ---------------------------------------------------------------------------

/// A grant pairing a grantee with a permission.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Grant {
    /// The entity receiving the permission.
    pub grantee: Grantee,
    /// The permission granted.
    pub permission: Permission,
}

impl Grant {
    /// Create a grant.
    #[must_use]
    pub fn new(grantee: Grantee, permission: Permission) -> Self {
        Self {
            grantee,
            permission,
        }
    }
}

/// A grantee in a grant.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", tag = "type")]
pub enum Grantee {
    /// A canonical user identified by account ID.
    CanonicalUser {
        /// The canonical user ID.
        id: String,
        /// The display name for the user.
        #[serde(skip_serializing_if = "Option::is_none")]
        display_name: Option<String>,
    },
    /// A predefined group identified by URI.
    Group {
        /// The URI of the group (e.g. [`ALL_USERS_URI`]).
        uri: String,
    },
    /// A grantee identified by email.
    Email {
        /// The email address of the grantee.
        email: String,
    },
}

impl Grantee {
    /// A canonical-user grantee for `owner`.
    #[must_use]
    pub fn owner(owner: &Owner) -> Self {
        Self::CanonicalUser {
            id: owner.id.clone(),
            display_name: owner.display_name.clone(),
        }
    }

    /// A group grantee for `uri`.
    #[must_use]
    pub fn group(uri: &str) -> Self {
        Self::Group {
            uri: uri.to_owned(),
        }
    }
}

/// A permission that can be granted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Permission {
    /// READ, WRITE, READ_ACP and WRITE_ACP together.
    FullControl,
    /// Read the object data.
    Read,
    /// Overwrite or delete the object.
    Write,
    /// Read the object ACL.
    ReadAcp,
    /// Write the object ACL.
    WriteAcp,
}

impl Permission {
    /// Return the S3 wire name of the permission.
    #[must_use]
    pub fn as_str(&self) -> &str {
        match self {
            Self::FullControl => "FULL_CONTROL",
            Self::Read => "READ",
            Self::Write => "WRITE",
            Self::ReadAcp => "READ_ACP",
            Self::WriteAcp => "WRITE_ACP",
        }
    }
}

impl fmt::Display for Permission {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The owner and grant list attached to an object.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AccessControlPolicy {
    /// The object owner.
    pub owner: Owner,
    /// The grants, in backend order.
    pub grants: Vec<Grant>,
}

impl AccessControlPolicy {
    /// The `private` canned policy: the owner has `FULL_CONTROL`, nobody else
    /// has anything.
    #[must_use]
    pub fn private(owner: Owner) -> Self {
        let grants = vec![Grant::new(Grantee::owner(&owner), Permission::FullControl)];
        Self { owner, grants }
    }
}

// ---------------------------------------------------------------------------
// Objects
// ---------------------------------------------------------------------------

/// Metadata sent with a store request and reported back on reads.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ObjectMetadata {
    /// The MIME type of the object.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub content_type: Option<String>,
    /// User-defined metadata (`x-amz-meta-*`).
    #[serde(default)]
    pub user_metadata: HashMap<String, String>,
    /// Server-side encryption algorithm (e.g. `AES256`).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sse_algorithm: Option<String>,
}

/// What the backend knows about an object without its content.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ObjectInfo {
    /// The object key.
    pub key: String,
    /// Content length in bytes.
    pub size: u64,
    /// Last modification time.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_modified: Option<DateTime<Utc>>,
    /// The entity tag.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub etag: Option<String>,
    /// Content type, user metadata and encryption.
    pub metadata: ObjectMetadata,
}

/// An object with its content.
#[derive(Debug, Clone)]
pub struct StoredObject {
    /// Object info and metadata.
    pub info: ObjectInfo,
    /// The full content.
    pub content: Bytes,
}

// ---------------------------------------------------------------------------
// Listing
// ---------------------------------------------------------------------------

/// One page request of a prefix listing.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ListRequest {
    /// Only keys starting with this prefix are returned.
    pub prefix: String,
    /// Group keys by the first occurrence of this delimiter after the prefix.
    pub delimiter: Option<String>,
    /// Token returned by the previous page.
    pub continuation_token: Option<String>,
    /// Maximum entries (keys plus common prefixes) in the page.
    pub max_keys: Option<usize>,
}

impl ListRequest {
    /// List everything below `prefix`.
    #[must_use]
    pub fn new(prefix: impl Into<String>) -> Self {
        Self {
            prefix: prefix.into(),
            ..Self::default()
        }
    }

    /// Group results by `delimiter`.
    #[must_use]
    pub fn with_delimiter(mut self, delimiter: impl Into<String>) -> Self {
        self.delimiter = Some(delimiter.into());
        self
    }

    /// Limit the page size.
    #[must_use]
    pub fn with_max_keys(mut self, max_keys: Option<usize>) -> Self {
        self.max_keys = max_keys;
        self
    }

    /// Continue after a previous page.
    #[must_use]
    pub fn with_continuation_token(mut self, token: Option<String>) -> Self {
        self.continuation_token = token;
        self
    }
}

/// A key or common prefix from a listing.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ListEntry {
    /// The object key, or the common prefix including its trailing delimiter.
    pub key: String,
    /// Whether this entry is a grouped common prefix rather than an object.
    pub is_common_prefix: bool,
}

impl ListEntry {
    /// An object key entry.
    #[must_use]
    pub fn object(key: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            is_common_prefix: false,
        }
    }

    /// A common prefix entry.
    #[must_use]
    pub fn common_prefix(prefix: impl Into<String>) -> Self {
        Self {
            key: prefix.into(),
            is_common_prefix: true,
        }
    }
}

/// One page of a listing.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ListPage {
    /// Objects and common prefixes in key order.
    pub entries: Vec<ListEntry>,
    /// Present when more pages follow.
    pub next_continuation_token: Option<String>,
}
