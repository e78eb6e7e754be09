//! Management API client seam
//!
//! The reconciler talks to the remote management API only through
//! [`ManagementClient`]. Responses are modelled as explicit sum types so
//! that "not found" can never be confused with a failure.

use crate::drift::ResponseClass;
use crate::operation::{OperationHandle, OperationStatus};
use async_trait::async_trait;
use serde_json::Value;
use thiserror::Error;

/// Error returned by a single management API call
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("HTTP {status} {code}: {message}")]
pub struct ApiError {
    /// HTTP status code, `0` when no response was received
    pub status: u16,
    pub code: String,
    pub message: String,
}

impl ApiError {
    pub fn new(status: u16, code: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            status,
            code: code.into(),
            message: message.into(),
        }
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self::new(404, "NotFound", message)
    }

    /// Error for a request that never produced a response
    pub fn transport(message: impl Into<String>) -> Self {
        Self::new(0, "TransportError", message)
    }

    pub fn class(&self) -> ResponseClass {
        ResponseClass::of(self.status)
    }
}

/// Result of fetching a remote object
#[derive(Debug, Clone, PartialEq)]
pub enum Lookup<T> {
    Found(T),
    NotFound,
}

impl<T> Lookup<T> {
    pub fn map<U>(self, f: impl FnOnce(T) -> U) -> Lookup<U> {
        match self {
            Lookup::Found(value) => Lookup::Found(f(value)),
            Lookup::NotFound => Lookup::NotFound,
        }
    }

    pub fn found(self) -> Option<T> {
        match self {
            Lookup::Found(value) => Some(value),
            Lookup::NotFound => None,
        }
    }
}

/// Result of submitting a mutation
#[derive(Debug, Clone, PartialEq)]
pub enum Submission {
    /// The mutation completed synchronously
    Done(Option<Value>),
    /// The mutation continues remotely and must be polled
    Accepted(OperationHandle),
    /// The target (or its scope) does not exist
    NotFound,
}

/// Outbound management API
///
/// Paths are ARM-style resource IDs. Implementations must report a missing
/// object as [`Lookup::NotFound`] / [`Submission::NotFound`] rather than an
/// error, and must not retry on their own behalf beyond transport concerns.
#[async_trait]
pub trait ManagementClient: Send + Sync {
    async fn get(&self, path: &str, api_version: &str) -> Result<Lookup<Value>, ApiError>;

    async fn put(
        &self,
        path: &str,
        api_version: &str,
        body: &Value,
    ) -> Result<Submission, ApiError>;

    async fn delete(&self, path: &str, api_version: &str) -> Result<Submission, ApiError>;

    /// Fetch the current status of a long-running operation
    async fn operation_status(
        &self,
        handle: &OperationHandle,
    ) -> Result<OperationStatus, ApiError>;
}
