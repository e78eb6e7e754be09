//! Driftwood reconciliation core
//!
//! Implements the create / read / update / delete lifecycle for resources
//! managed through an ARM-style management API: deterministic identifiers,
//! named locks around read-modify-write of shared parents, polling of
//! long-running operations and detection of out-of-band deletion.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────┐
//! │               host (driftwood CLI)               │
//! └─────────────────┬───────────────────────────────┘
//!                   │ JSON config / attributes
//! ┌─────────────────▼───────────────────────────────┐
//! │  Provider ──► ResourceHandler (per type)         │
//! │  ┌──────────────────────────────────────────┐   │
//! │  │ Reconciler                                │   │
//! │  │  StandaloneOps / MemberOps                │   │
//! │  └──┬──────────┬─────────────┬──────────────┘   │
//! │  LockRegistry  Poller    drift::observe          │
//! └─────────────────┬───────────────────────────────┘
//!                   │ trait ManagementClient
//!         ┌─────────▼────────┐  ┌──────────────┐
//!         │ driftwood-arm    │  │ MemoryClient │
//!         └──────────────────┘  └──────────────┘
//! ```

pub mod client;
pub mod drift;
pub mod error;
pub mod handler;
pub mod id;
pub mod locks;
#[cfg(any(test, feature = "memory"))]
pub mod memory;
pub mod operation;
pub mod poller;
pub mod reconciler;
pub mod resource;
pub mod state;
pub mod timeouts;

// Re-exports
pub use client::{ApiError, Lookup, ManagementClient, Submission};
pub use drift::{Observation, ResponseClass, observe};
pub use error::{ReconcileError, Result};
pub use handler::{MemberHandler, Provider, RawInstance, ResourceHandler, StandaloneHandler};
pub use id::{COMPOSITE_SEPARATOR, ResourceIdentifier, ResourcePath, join_composite, split_composite};
pub use locks::{LockKey, LockKind, LockRegistry, LockScope};
#[cfg(any(test, feature = "memory"))]
pub use memory::{CallKind, MemoryClient};
pub use operation::{OperationHandle, OperationState, OperationStatus, PollConfig};
pub use poller::Poller;
pub use reconciler::{MemberOps, Reconciler, StandaloneOps};
pub use resource::{
    InstanceOf, MemberResource, OnConflict, Phase, ProviderScope, Resource, ResourceInstance,
    StandaloneResource,
};
pub use state::{GlobalState, InstanceState, InstanceStatus, StateLock, StateManager, address, split_address};
pub use timeouts::{Deadline, OperationKind, Timeouts};
