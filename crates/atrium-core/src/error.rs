//! Error taxonomy for routing queries and initialization.
//!
//! Errors are tagged values with stable string codes for operator-facing
//! surfaces. Internal geometry failures never appear here; they are logged
//! and treated as "no collision / no container" so broken geometry cannot
//! block routing.

use thiserror::Error;

/// Which endpoint of a query a failure refers to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Endpoint {
    Start,
    End,
}

impl std::fmt::Display for Endpoint {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Endpoint::Start => write!(f, "start"),
            Endpoint::End => write!(f, "end"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Error)]
pub enum RouteError {
    #[error("routing engine is not initialized")]
    NotInitialized,

    #[error("room {room_id} has no usable door")]
    NoDoor { room_id: String },

    #[error("no path exists between the requested endpoints")]
    NoPath,

    #[error("{endpoint} point cannot be connected to the walkable area")]
    Blocked { endpoint: Endpoint },
}

impl RouteError {
    /// Stable machine-readable code.
    pub fn code(&self) -> &'static str {
        match self {
            RouteError::NotInitialized => "not-initialized",
            RouteError::NoDoor { .. } => "no-door",
            RouteError::NoPath => "no-path",
            RouteError::Blocked { .. } => "blocked",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum InitError {
    #[error("initialization cancelled")]
    Cancelled,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_codes_are_stable() {
        assert_eq!(RouteError::NotInitialized.code(), "not-initialized");
        assert_eq!(
            RouteError::NoDoor { room_id: "r1".into() }.code(),
            "no-door"
        );
        assert_eq!(RouteError::NoPath.code(), "no-path");
        assert_eq!(
            RouteError::Blocked { endpoint: Endpoint::Start }.code(),
            "blocked"
        );
    }

    #[test]
    fn test_messages_are_human_readable() {
        let err = RouteError::NoDoor { room_id: "r7".into() };
        assert_eq!(err.to_string(), "room r7 has no usable door");
    }
}
