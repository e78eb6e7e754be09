//! Azure Resource Manager backend for driftwood
//!
//! [`ArmClient`] speaks the ARM REST conventions: `api-version` query
//! parameters, bearer tokens, `{"error": {...}}` error bodies and
//! long-running operations announced through `Azure-AsyncOperation` or
//! `Location` headers.

pub mod client;
pub mod error;
pub mod response;

pub use client::{ArmClient, ArmConfig};
pub use error::{ArmError, Result};
pub use response::{parse_error_body, parse_operation_status, parse_retry_after};
