//! Access control lists.
//!
//! [`Acl`] is a small discrete model: three actor classes, each allowed any
//! subset of {read, write}. A pair that is not allowed is denied; there is no
//! third state. [`AclTranslator`] converts between this model and the
//! backend's grant list:
//!
//! | Grantee | Actor |
//! |---------|-------|
//! | canonical user equal to the object owner | [`Actor::Owner`] |
//! | group `.../global/AuthenticatedUsers` | [`Actor::AuthorizedUsers`] |
//! | group `.../global/AllUsers` | [`Actor::Everyone`] |
//!
//! `READ` and `WRITE` map one to one, `FULL_CONTROL` maps to both. Grants
//! outside this table (other users, `READ_ACP`, `WRITE_ACP`) are ignored when
//! reading and kept untouched when writing.

use std::collections::BTreeSet;
use std::fmt;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::backend::{
    ALL_USERS_URI, AUTHENTICATED_USERS_URI, AccessControlPolicy, Grant, Grantee, Owner,
    Permission,
};
use crate::error::VfsResult;
use crate::object::ObjectAdapter;

/// An actor class of the discrete permission model.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Actor {
    /// The object owner.
    Owner,
    /// Any authenticated account.
    AuthorizedUsers,
    /// Anyone, authenticated or not.
    Everyone,
}

impl Actor {
    /// Every actor class.
    pub const ALL: [Self; 3] = [Self::Owner, Self::AuthorizedUsers, Self::Everyone];

    /// Return the kebab-case name of this actor.
    #[must_use]
    pub fn as_str(&self) -> &str {
        match self {
            Self::Owner => "owner",
            Self::AuthorizedUsers => "authorized-users",
            Self::Everyone => "everyone",
        }
    }

    fn of_grantee(grantee: &Grantee, owner: &Owner) -> Option<Self> {
        match grantee {
            Grantee::CanonicalUser { id, .. } if *id == owner.id => Some(Self::Owner),
            Grantee::Group { uri } if uri == AUTHENTICATED_USERS_URI => {
                Some(Self::AuthorizedUsers)
            }
            Grantee::Group { uri } if uri == ALL_USERS_URI => Some(Self::Everyone),
            _ => None,
        }
    }

    fn grantee(self, owner: &Owner) -> Grantee {
        match self {
            Self::Owner => Grantee::owner(owner),
            Self::AuthorizedUsers => Grantee::group(AUTHENTICATED_USERS_URI),
            Self::Everyone => Grantee::group(ALL_USERS_URI),
        }
    }
}

impl fmt::Display for Actor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A permission of the discrete model.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum AclPermission {
    /// Read content.
    Read,
    /// Overwrite or delete.
    Write,
}

impl AclPermission {
    /// Both permissions.
    pub const ALL: [Self; 2] = [Self::Read, Self::Write];

    /// Return the kebab-case name of this permission.
    #[must_use]
    pub fn as_str(&self) -> &str {
        match self {
            Self::Read => "read",
            Self::Write => "write",
        }
    }

    fn of_backend(permission: Permission) -> &'static [Self] {
        match permission {
            Permission::FullControl => &Self::ALL,
            Permission::Read => &[Self::Read],
            Permission::Write => &[Self::Write],
            Permission::ReadAcp | Permission::WriteAcp => &[],
        }
    }

    fn backend(self) -> Permission {
        match self {
            Self::Read => Permission::Read,
            Self::Write => Permission::Write,
        }
    }
}

impl fmt::Display for AclPermission {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Which actor classes may read and write an object.
///
/// Mutations only change this value; nothing reaches the backend until it is
/// passed to [`crate::session::FileHandle::set_acl`].
///
/// # Examples
///
/// ```
/// use s3vfs_core::acl::{Acl, AclPermission, Actor};
///
/// let mut acl = Acl::default();
/// acl.allow(Actor::Everyone, AclPermission::Read);
/// assert!(acl.is_allowed(Actor::Everyone, AclPermission::Read));
/// assert!(acl.is_denied(Actor::Everyone, AclPermission::Write));
/// ```
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Acl {
    allowed: BTreeSet<(Actor, AclPermission)>,
}

impl Acl {
    /// Allow `permission` for `actor`.
    pub fn allow(&mut self, actor: Actor, permission: AclPermission) -> &mut Self {
        self.allowed.insert((actor, permission));
        self
    }

    /// Allow both read and write for `actor`.
    pub fn allow_actor(&mut self, actor: Actor) -> &mut Self {
        for permission in AclPermission::ALL {
            self.allow(actor, permission);
        }
        self
    }

    /// Deny `permission` for `actor`.
    pub fn deny(&mut self, actor: Actor, permission: AclPermission) -> &mut Self {
        self.allowed.remove(&(actor, permission));
        self
    }

    /// Deny both read and write for `actor`.
    pub fn deny_actor(&mut self, actor: Actor) -> &mut Self {
        for permission in AclPermission::ALL {
            self.deny(actor, permission);
        }
        self
    }

    /// Deny everything for every actor.
    pub fn deny_all(&mut self) -> &mut Self {
        self.allowed.clear();
        self
    }

    /// Whether `actor` holds `permission`.
    #[must_use]
    pub fn is_allowed(&self, actor: Actor, permission: AclPermission) -> bool {
        self.allowed.contains(&(actor, permission))
    }

    /// Whether `actor` lacks `permission`. Always `!is_allowed`.
    #[must_use]
    pub fn is_denied(&self, actor: Actor, permission: AclPermission) -> bool {
        !self.is_allowed(actor, permission)
    }

    /// The permissions `actor` holds.
    #[must_use]
    pub fn permissions(&self, actor: Actor) -> BTreeSet<AclPermission> {
        AclPermission::ALL
            .into_iter()
            .filter(|p| self.is_allowed(actor, *p))
            .collect()
    }

    /// Read the discrete model out of a backend policy.
    #[must_use]
    pub fn from_policy(policy: &AccessControlPolicy) -> Self {
        let mut acl = Self::default();
        for grant in &policy.grants {
            if let Some(actor) = Actor::of_grantee(&grant.grantee, &policy.owner) {
                for permission in AclPermission::of_backend(grant.permission) {
                    acl.allow(actor, *permission);
                }
            }
        }
        acl
    }

    /// Rebuild the grant list of `existing` so it matches this ACL.
    ///
    /// Grants the model does not describe are kept as they are. A modelled
    /// grant survives when everything it confers is still allowed (so an
    /// owner's `FULL_CONTROL` is kept while the owner may read and write);
    /// otherwise it is dropped. Allowed pairs not covered by a surviving
    /// grant get a new `READ` or `WRITE` grant.
    #[must_use]
    pub fn to_policy(&self, existing: &AccessControlPolicy) -> AccessControlPolicy {
        let owner = &existing.owner;
        let mut covered = BTreeSet::new();
        let mut grants: Vec<Grant> = Vec::with_capacity(existing.grants.len());

        for grant in &existing.grants {
            let actor = Actor::of_grantee(&grant.grantee, owner);
            let conferred = AclPermission::of_backend(grant.permission);
            match actor {
                Some(actor) if !conferred.is_empty() => {
                    if conferred.iter().all(|p| self.is_allowed(actor, *p)) {
                        covered.extend(conferred.iter().map(|p| (actor, *p)));
                        grants.push(grant.clone());
                    }
                }
                _ => grants.push(grant.clone()),
            }
        }

        for &(actor, permission) in self.allowed.difference(&covered) {
            grants.push(Grant::new(actor.grantee(owner), permission.backend()));
        }

        AccessControlPolicy {
            owner: owner.clone(),
            grants,
        }
    }
}

impl fmt::Display for Acl {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, actor) in Actor::ALL.into_iter().enumerate() {
            if i > 0 {
                f.write_str(" ")?;
            }
            let perms: Vec<_> = self
                .permissions(actor)
                .into_iter()
                .map(|p| p.as_str().to_owned())
                .collect();
            write!(f, "{actor}={{{}}}", perms.join(","))?;
        }
        Ok(())
    }
}

/// Reads and commits ACLs through an [`ObjectAdapter`].
#[derive(Debug, Clone)]
pub struct AclTranslator {
    adapter: ObjectAdapter,
}

impl AclTranslator {
    /// Build on top of `adapter`.
    #[must_use]
    pub fn new(adapter: ObjectAdapter) -> Self {
        Self { adapter }
    }

    /// The current ACL of `key`.
    ///
    /// # Errors
    ///
    /// Returns [`crate::VfsError::NotFound`] when the object is absent.
    pub async fn get(&self, key: &str) -> VfsResult<Acl> {
        let policy = self.adapter.grants(key).await?;
        Ok(Acl::from_policy(&policy))
    }

    /// Replace the grant list of `key` so it matches `acl`.
    ///
    /// The current policy is read first so grants outside the model survive;
    /// the rebuilt list is written as a whole.
    ///
    /// # Errors
    ///
    /// Returns [`crate::VfsError::NotFound`] when the object is absent.
    pub async fn set(&self, key: &str, acl: &Acl) -> VfsResult<()> {
        let existing = self.adapter.grants(key).await?;
        let policy = acl.to_policy(&existing);
        debug!(key, %acl, grants = policy.grants.len(), "committing acl");
        self.adapter.put_grants(key, &policy).await
    }
}
