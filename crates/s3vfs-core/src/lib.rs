//! Hierarchical virtual file system over a flat object-storage bucket.
//!
//! Object storage offers a flat key space with no folders and an access
//! control model built from grant lists. This crate presents one bucket as a
//! tree of files and directories, and maps a three-actor / two-permission ACL
//! onto the backend's native grants.
//!
//! # Architecture
//!
//! ```text
//!   S3FileSystem (bucket binding, capabilities, ownership of the client)
//!        |
//!        v
//!   FileHandle (path-level operations, ACL get/set)
//!        |
//!        +------------------+--------------------+
//!        v                  v                    v
//!   DirectorySynthesizer  ObjectAdapter     AclTranslator
//!        |                  |                    |
//!        +------------------+--------------------+
//!                           v
//!                 dyn ObjectBackend (aws-sdk-s3, in-memory)
//! ```
//!
//! Directories are never stored as state: a path is a directory when a
//! zero-length marker `dir/` exists or when any key starts with `dir/`.

pub mod acl;
pub mod backend;
pub mod capability;
pub mod config;
pub mod directory;
pub mod error;
pub mod object;
pub mod path;
pub mod session;

pub use acl::{Acl, AclPermission, Actor};
pub use backend::{BackendError, InMemoryBackend, ObjectBackend};
pub use capability::{Capability, CapabilitySet};
pub use config::FileSystemOptions;
pub use error::{VfsError, VfsResult};
pub use path::{FileType, VirtualPath};
pub use session::{FileHandle, FileStat, S3FileSystem};
