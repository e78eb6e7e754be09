//! Reconciliation error types

use crate::client::ApiError;
use crate::drift::ResponseClass;
use std::time::Duration;
use thiserror::Error;

/// Errors surfaced to the host by reconciliation operations
#[derive(Error, Debug)]
pub enum ReconcileError {
    #[error("Invalid ID: expected {expected} but got {got:?}")]
    InvalidId { expected: String, got: String },

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Unknown resource type: {0}")]
    UnknownResourceType(String),

    #[error(
        "A resource with the ID {id:?} already exists - to be managed this resource needs to be imported into the state. Please see the resource documentation for {resource_type} for more information."
    )]
    AlreadyExists {
        resource_type: &'static str,
        id: String,
    },

    #[error("{parent} was not found (required by {context})")]
    ParentNotFound { context: String, parent: String },

    #[error("{context} was not found")]
    NotFound { context: String },

    #[error("Cannot import non-existent remote object {id:?} ({resource_type})")]
    ImportNotFound {
        resource_type: &'static str,
        id: String,
    },

    #[error("{resource_type} {id:?} must be replaced: {reason}")]
    RequiresReplacement {
        resource_type: &'static str,
        id: String,
        reason: String,
    },

    #[error("API error for {context}: {source}")]
    Remote {
        context: String,
        #[source]
        source: ApiError,
    },

    #[error("Long-running operation for {context} failed: {code}: {message}")]
    OperationFailed {
        context: String,
        code: String,
        message: String,
    },

    #[error("Long-running operation for {context} was canceled remotely")]
    OperationCanceled { context: String },

    #[error("Timeout: {context} did not complete within {after:?}")]
    Timeout { context: String, after: Duration },

    #[error("Cancelled while waiting on {context}")]
    Cancelled { context: String },

    #[error("Lock order violation: cannot acquire {requested} while holding {held}")]
    LockOrder { requested: String, held: String },

    #[error("Malformed response for {context}: {source}")]
    MalformedResponse {
        context: String,
        #[source]
        source: serde_json::Error,
    },

    #[error("Resource {id:?} was created but is tainted: {source}")]
    Tainted {
        id: String,
        #[source]
        source: Box<ReconcileError>,
    },

    #[error("State file error: {0}")]
    StateError(String),

    #[error("Lock acquisition failed: {0}")]
    LockError(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl ReconcileError {
    /// True for deadline expiry, never for remote failures
    pub fn is_timeout(&self) -> bool {
        matches!(self, ReconcileError::Timeout { .. })
    }

    pub fn is_conflict(&self) -> bool {
        matches!(self, ReconcileError::AlreadyExists { .. })
    }

    /// Whether this error describes a missing remote object at any level
    pub fn is_not_found(&self) -> bool {
        match self {
            ReconcileError::NotFound { .. }
            | ReconcileError::ParentNotFound { .. }
            | ReconcileError::ImportNotFound { .. } => true,
            ReconcileError::Remote { source, .. } => source.class() == ResponseClass::NotFound,
            ReconcileError::OperationFailed { code, .. } => {
                code.eq_ignore_ascii_case("NotFound") || code.eq_ignore_ascii_case("ResourceNotFound")
            }
            _ => false,
        }
    }

    /// ID to record when the remote object exists but the follow-up read failed
    pub fn tainted_id(&self) -> Option<&str> {
        match self {
            ReconcileError::Tainted { id, .. } => Some(id),
            _ => None,
        }
    }
}

pub type Result<T> = std::result::Result<T, ReconcileError>;
