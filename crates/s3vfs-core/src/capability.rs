//! Provider capabilities.
//!
//! The set of operations this provider advertises is fixed when the process
//! starts and never changes. Hosts read it through
//! [`CapabilitySet::provider`] (or [`crate::session::S3FileSystem::capabilities`])
//! before dispatching an operation.

use std::collections::BTreeSet;
use std::fmt;
use std::sync::LazyLock;

use serde::{Deserialize, Serialize};

/// A file operation a provider may support.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Capability {
    /// Create files and folders.
    Create,
    /// Delete files and folders.
    Delete,
    /// Move or rename files and folders.
    Rename,
    /// Determine whether a path is a file, a folder or absent.
    GetType,
    /// Read the last-modified time.
    GetLastModified,
    /// Change the last-modified time.
    SetLastModified,
    /// Enumerate the children of a folder.
    ListChildren,
    /// Read file content.
    ReadContent,
    /// Write file content.
    WriteContent,
    /// Append to existing file content.
    AppendContent,
    /// Read an arbitrary byte range.
    RandomAccessRead,
    /// Write at an arbitrary offset.
    RandomAccessWrite,
    /// Files have a URI.
    Uri,
    /// Read the access control list.
    AclGet,
    /// Replace the access control list.
    AclSet,
}

impl Capability {
    /// Every capability, in declaration order.
    pub const ALL: [Self; 15] = [
        Self::Create,
        Self::Delete,
        Self::Rename,
        Self::GetType,
        Self::GetLastModified,
        Self::SetLastModified,
        Self::ListChildren,
        Self::ReadContent,
        Self::WriteContent,
        Self::AppendContent,
        Self::RandomAccessRead,
        Self::RandomAccessWrite,
        Self::Uri,
        Self::AclGet,
        Self::AclSet,
    ];

    /// Return the kebab-case name of this capability.
    #[must_use]
    pub fn as_str(&self) -> &str {
        match self {
            Self::Create => "create",
            Self::Delete => "delete",
            Self::Rename => "rename",
            Self::GetType => "get-type",
            Self::GetLastModified => "get-last-modified",
            Self::SetLastModified => "set-last-modified",
            Self::ListChildren => "list-children",
            Self::ReadContent => "read-content",
            Self::WriteContent => "write-content",
            Self::AppendContent => "append-content",
            Self::RandomAccessRead => "random-access-read",
            Self::RandomAccessWrite => "random-access-write",
            Self::Uri => "uri",
            Self::AclGet => "acl-get",
            Self::AclSet => "acl-set",
        }
    }
}

impl fmt::Display for Capability {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Capabilities advertised by the object-storage provider.
///
/// Object storage cannot rewrite a byte range in place or set a modification
/// time, so `RandomAccessWrite` and `SetLastModified` are left out.
const PROVIDER_CAPABILITIES: [Capability; 13] = [
    Capability::Create,
    Capability::Delete,
    Capability::Rename,
    Capability::GetType,
    Capability::GetLastModified,
    Capability::ListChildren,
    Capability::ReadContent,
    Capability::WriteContent,
    Capability::AppendContent,
    Capability::RandomAccessRead,
    Capability::Uri,
    Capability::AclGet,
    Capability::AclSet,
];

static PROVIDER: LazyLock<CapabilitySet> =
    LazyLock::new(|| PROVIDER_CAPABILITIES.into_iter().collect());

/// An immutable set of capabilities.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CapabilitySet(BTreeSet<Capability>);

impl CapabilitySet {
    /// The process-wide provider set. Identical for every session.
    #[must_use]
    pub fn provider() -> &'static Self {
        &PROVIDER
    }

    /// Whether `capability` is in the set.
    #[must_use]
    pub fn supports(&self, capability: Capability) -> bool {
        self.0.contains(&capability)
    }

    /// Iterate in capability order.
    pub fn iter(&self) -> impl Iterator<Item = Capability> + '_ {
        self.0.iter().copied()
    }

    /// Number of capabilities.
    #[must_use]
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Whether the set is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl FromIterator<Capability> for CapabilitySet {
    fn from_iter<I: IntoIterator<Item = Capability>>(iter: I) -> Self {
        Self(iter.into_iter().collect())
    }
}
