//! Drift detection policy
//!
//! A "not found" response on a read path means the remote object was
//! removed out of band: local state is cleared and the read succeeds.
//! Every other failure is surfaced to the host.

use crate::client::{ApiError, Lookup};
use crate::error::{ReconcileError, Result};

/// Classification of an HTTP status code
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResponseClass {
    Success,
    NotFound,
    Conflict,
    Throttled,
    Client,
    Server,
    /// No response was received
    Transport,
}

impl ResponseClass {
    pub fn of(status: u16) -> Self {
        match status {
            0 => ResponseClass::Transport,
            200..=299 => ResponseClass::Success,
            404 | 410 => ResponseClass::NotFound,
            409 => ResponseClass::Conflict,
            429 => ResponseClass::Throttled,
            400..=499 => ResponseClass::Client,
            _ => ResponseClass::Server,
        }
    }
}

/// What a read observed remotely
#[derive(Debug, Clone, PartialEq)]
pub enum Observation<T> {
    Present(T),
    Gone,
}

impl<T> Observation<T> {
    pub fn into_option(self) -> Option<T> {
        match self {
            Observation::Present(value) => Some(value),
            Observation::Gone => None,
        }
    }

    pub fn is_gone(&self) -> bool {
        matches!(self, Observation::Gone)
    }
}

/// Map a lookup result onto the drift policy
pub fn observe<T>(
    result: std::result::Result<Lookup<T>, ApiError>,
    context: &str,
) -> Result<Observation<T>> {
    match result {
        Ok(Lookup::Found(value)) => Ok(Observation::Present(value)),
        Ok(Lookup::NotFound) => Ok(Observation::Gone),
        Err(err) if err.class() == ResponseClass::NotFound => {
            tracing::debug!(context, status = err.status, "not-found error treated as gone");
            Ok(Observation::Gone)
        }
        Err(source) => Err(ReconcileError::Remote {
            context: context.to_string(),
            source,
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_response_class() {
        assert_eq!(ResponseClass::of(200), ResponseClass::Success);
        assert_eq!(ResponseClass::of(204), ResponseClass::Success);
        assert_eq!(ResponseClass::of(404), ResponseClass::NotFound);
        assert_eq!(ResponseClass::of(410), ResponseClass::NotFound);
        assert_eq!(ResponseClass::of(409), ResponseClass::Conflict);
        assert_eq!(ResponseClass::of(429), ResponseClass::Throttled);
        assert_eq!(ResponseClass::of(403), ResponseClass::Client);
        assert_eq!(ResponseClass::of(503), ResponseClass::Server);
        assert_eq!(ResponseClass::of(0), ResponseClass::Transport);
    }

    #[test]
    fn test_not_found_is_gone() {
        let observed = observe::<u8>(Ok(Lookup::NotFound), "thing").unwrap();
        assert!(observed.is_gone());

        let observed = observe::<u8>(Err(ApiError::not_found("gone")), "thing").unwrap();
        assert!(observed.is_gone());
    }

    #[test]
    fn test_found_is_present() {
        let observed = observe(Ok(Lookup::Found(7)), "thing").unwrap();
        assert_eq!(observed.into_option(), Some(7));
    }

    #[test]
    fn test_other_errors_surface() {
        let err = observe::<u8>(Err(ApiError::new(500, "InternalError", "boom")), "thing")
            .unwrap_err();
        match err {
            ReconcileError::Remote { context, source } => {
                assert_eq!(context, "thing");
                assert_eq!(source.message, "boom");
            }
            other => panic!("unexpected error: {other:?}"),
        }

        let err = observe::<u8>(Err(ApiError::new(403, "Forbidden", "no")), "thing")
            .unwrap_err();
        assert!(!err.is_not_found());
    }
}
