//! Error types for the transactional state store.
//!
//! Two layers: [`CoordinatorError`] is the failure vocabulary of the
//! coordination service itself, and [`StateError`] is what the adapter
//! surfaces to its callers. Only `NodeExists` and `NoNode` are ever
//! absorbed on the way up; everything else becomes a fatal `StateError`.

use thiserror::Error;

/// Result type alias for adapter operations.
pub type StateResult<T> = Result<T, StateError>;

/// Result type alias for raw coordination-service calls.
pub type CoordinatorResult<T> = Result<T, CoordinatorError>;

/// Conditions reported by the coordination service.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CoordinatorError {
    #[error("node already exists: {0}")]
    NodeExists(String),

    #[error("no such node: {0}")]
    NoNode(String),

    #[error("node has children: {0}")]
    NotEmpty(String),

    #[error("ephemeral nodes cannot have children: {0}")]
    NoChildrenForEphemerals(String),

    #[error("connection to the coordination service was lost")]
    ConnectionLoss,

    #[error("session expired")]
    SessionExpired,

    #[error("not authorized: {0}")]
    NoAuth(String),

    #[error("invalid ACL for {0}")]
    InvalidAcl(String),

    #[error("invalid path: {0}")]
    InvalidPath(String),

    #[error("connection is closed")]
    Closed,

    #[error("coordination service error: {0}")]
    Other(String),
}

/// Unrecoverable adapter failures. Every variant keeps its underlying cause.
#[derive(Debug, Error)]
pub enum StateError {
    #[error("invalid configuration: {0}")]
    Config(String),

    #[error("failed to connect to {connect_string}: {source}")]
    Connect {
        connect_string: String,
        #[source]
        source: CoordinatorError,
    },

    #[error("failed to provision {path}: {source}")]
    Provision {
        path: String,
        #[source]
        source: CoordinatorError,
    },

    #[error("{op} failed at {path}: {source}")]
    Coordination {
        op: &'static str,
        path: String,
        #[source]
        source: CoordinatorError,
    },

    #[error("serialization error: {0}")]
    Serialize(String),

    #[error("deserialization error: {0}")]
    Deserialize(String),
}

impl StateError {
    pub(crate) fn coordination(op: &'static str, path: &str) -> impl FnOnce(CoordinatorError) -> Self {
        let path = path.to_string();
        move |source| StateError::Coordination { op, path, source }
    }
}

/// Successful result of a mutating operation.
///
/// The failure case is the `Err` arm of [`StateResult`]; together they give
/// the three outcomes a retrying caller needs to tell apart.
#[must_use]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    /// This call changed the store.
    Applied,
    /// The desired end state already held (node existed on create, or was
    /// already gone on delete).
    AlreadySatisfied,
}

impl Outcome {
    pub fn is_applied(self) -> bool {
        matches!(self, Outcome::Applied)
    }

    pub fn label(self) -> &'static str {
        match self {
            Outcome::Applied => "applied",
            Outcome::AlreadySatisfied => "already satisfied",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::error::Error as _;

    #[test]
    fn coordination_error_keeps_cause() {
        let err = StateError::coordination("delete", "/a")(CoordinatorError::NotEmpty("/a".into()));
        assert_eq!(err.to_string(), "delete failed at /a: node has children: /a");
        let source = err.source().unwrap().downcast_ref::<CoordinatorError>().unwrap();
        assert_eq!(source, &CoordinatorError::NotEmpty("/a".into()));
    }

    #[test]
    fn outcome_labels() {
        assert!(Outcome::Applied.is_applied());
        assert!(!Outcome::AlreadySatisfied.is_applied());
        assert_eq!(Outcome::AlreadySatisfied.label(), "already satisfied");
    }
}
