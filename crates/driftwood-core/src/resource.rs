//! Resource type definitions
//!
//! A resource type is described by a typed configuration, a typed
//! identifier and a typed attribute set, plus one of two placements:
//!
//! - [`StandaloneResource`]: the resource is a remote object of its own.
//! - [`MemberResource`]: the resource is one element of a collection held
//!   by a parent object, and is written by read-modify-writing the parent.

use crate::error::Result;
use crate::id::ResourceIdentifier;
use crate::locks::LockKey;
use serde::Serialize;
use serde::de::DeserializeOwned;
use std::fmt;

/// Provider-level values available when deriving identifiers
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProviderScope {
    pub subscription_id: String,
}

impl ProviderScope {
    pub fn new(subscription_id: impl Into<String>) -> Self {
        Self {
            subscription_id: subscription_id.into(),
        }
    }
}

/// Behaviour of Create when the remote object already exists
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum OnConflict {
    /// Fail with [`crate::ReconcileError::AlreadyExists`]
    #[default]
    Fail,
    /// Take over the existing object and update it in place
    Adopt,
}

/// Lifecycle phase of a resource instance
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Absent,
    Creating,
    Present,
    Updating,
    Deleting,
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Phase::Absent => write!(f, "absent"),
            Phase::Creating => write!(f, "creating"),
            Phase::Present => write!(f, "present"),
            Phase::Updating => write!(f, "updating"),
            Phase::Deleting => write!(f, "deleting"),
        }
    }
}

/// A managed object as last read
#[derive(Debug, Clone, PartialEq)]
pub struct ResourceInstance<I, A> {
    pub id: I,
    pub attributes: A,
}

pub type InstanceOf<R> = ResourceInstance<<R as Resource>::Id, <R as Resource>::Attributes>;

/// Common description of a resource type
pub trait Resource: Send + Sync + 'static {
    /// Name used by the host, e.g. `azurerm_resource_group`
    const TYPE_NAME: &'static str;

    /// API version sent with every request for this type
    const API_VERSION: &'static str;

    type Config: Serialize + DeserializeOwned + Clone + fmt::Debug + Send + Sync;
    type Id: ResourceIdentifier;
    type Attributes: Serialize + DeserializeOwned + Clone + fmt::Debug + Send + Sync;

    fn validate(_config: &Self::Config) -> Result<()> {
        Ok(())
    }

    /// Derive the identifier the configuration describes
    fn identify(config: &Self::Config, scope: &ProviderScope) -> Result<Self::Id>;

    /// Locks to hold while mutating this resource
    fn lock_keys(_id: &Self::Id) -> Vec<LockKey> {
        Vec::new()
    }

    fn supports_update() -> bool {
        true
    }

    /// Reason an update from `prior` to `config` cannot happen in place
    ///
    /// Identifier changes are detected by the reconciler; this hook covers
    /// other attributes that force a new resource.
    fn requires_replacement(_prior: &Self::Attributes, _config: &Self::Config) -> Option<String> {
        None
    }
}

/// A resource that is its own remote object
pub trait StandaloneResource: Resource {
    /// Wire representation of the remote object
    type Remote: Serialize + DeserializeOwned + Send;

    fn path(id: &Self::Id) -> String {
        id.encode()
    }

    fn expand(config: &Self::Config) -> Result<Self::Remote>;

    /// Apply `config` onto an existing remote object
    fn patch(remote: &mut Self::Remote, config: &Self::Config) -> Result<()> {
        *remote = Self::expand(config)?;
        Ok(())
    }

    fn flatten(id: &Self::Id, remote: &Self::Remote) -> Self::Attributes;
}

/// A resource that is one member of a collection inside a parent object
///
/// The parent type must retain fields it does not model (for example
/// with `#[serde(flatten)]`), because the whole parent document is written
/// back on every mutation.
pub trait MemberResource: Resource {
    /// Human-readable kind of the parent, used in error messages
    const PARENT_KIND: &'static str;

    type Parent: Serialize + DeserializeOwned + Send + Sync;

    fn parent_path(id: &Self::Id) -> String;

    /// This resource's attributes, if its element is present in `parent`
    fn find(parent: &Self::Parent, id: &Self::Id) -> Option<Self::Attributes>;

    /// Add this resource's element, keeping every sibling
    fn insert(parent: &mut Self::Parent, id: &Self::Id, config: &Self::Config) -> Result<()>;

    /// Replace this resource's element; `false` when it is not present
    fn replace(parent: &mut Self::Parent, id: &Self::Id, config: &Self::Config) -> Result<bool>;

    /// Remove this resource's element; `false` when it was not present
    fn remove(parent: &mut Self::Parent, id: &Self::Id) -> bool;
}
