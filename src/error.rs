//! Error handling module for provisiond
//!
//! Provides centralized error handling with proper error types using thiserror.
//! Every operation exposed to API clients returns `ProvisionError`; the HTTP
//! layer maps each variant onto a status code.

use thiserror::Error;
use uuid::Uuid;

use crate::backend::BackendError;
use crate::fsm::TransitionError;
use crate::states::{ProvisionAction, ProvisionState};
use crate::version::{ApiVersion, VersionError};

/// Main error type for provisiond
#[derive(Error, Debug)]
pub enum ProvisionError {
    /// Requested action has no transition out of the node's current state
    #[error("The requested action \"{action}\" can not be performed on node \"{node}\" while it is in state \"{state}\".")]
    InvalidStateRequested {
        node: Uuid,
        action: String,
        state: ProvisionState,
    },

    /// Another action holds the node's reservation
    #[error("Node {node} is locked by host {holder}, please retry after the current operation is completed.")]
    NodeLocked { node: Uuid, holder: String },

    #[error("A node with name {0} already exists.")]
    DuplicateName(String),

    /// Action refused because the maintenance overlay is set
    #[error("The {action} action can not be performed on node {node} because it is in maintenance mode.")]
    NodeInMaintenance { node: Uuid, action: ProvisionAction },

    #[error("Node {0} could not be found.")]
    NotFound(String),

    #[error("Driver {0} could not be found.")]
    DriverNotFound(String),

    #[error("Expected a logical name but received {0}.")]
    InvalidName(String),

    /// Request content failed validation
    #[error("Invalid input: {0}")]
    Validation(String),

    #[error("Invalid patch: {0}")]
    InvalidPatch(String),

    /// Version header could not be negotiated
    #[error(transparent)]
    Version(#[from] VersionError),

    /// Feature exists but not at the negotiated version
    #[error("{feature} is not available at API version {version}; requires {required} or later.")]
    NotAcceptable {
        feature: String,
        version: ApiVersion,
        required: ApiVersion,
    },

    #[error("State machine error: {0}")]
    Transition(#[from] TransitionError),

    #[error("Backend error: {0}")]
    Backend(#[from] BackendError),

    /// JSON serialization/deserialization errors
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("{0}")]
    Internal(String),
}

/// Result type alias for provisiond operations
pub type Result<T> = std::result::Result<T, ProvisionError>;

// Convenient error constructors
impl ProvisionError {
    pub fn invalid_state(node: Uuid, action: impl ToString, state: ProvisionState) -> Self {
        Self::InvalidStateRequested {
            node,
            action: action.to_string(),
            state,
        }
    }

    pub fn not_found(ident: impl Into<String>) -> Self {
        Self::NotFound(ident.into())
    }

    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }

    pub fn invalid_patch(msg: impl Into<String>) -> Self {
        Self::InvalidPatch(msg.into())
    }

    pub fn not_acceptable(feature: impl Into<String>, version: ApiVersion, required: ApiVersion) -> Self {
        Self::NotAcceptable {
            feature: feature.into(),
            version,
            required,
        }
    }

    pub fn internal(msg: impl Into<String>) -> Self {
        Self::Internal(msg.into())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let node = Uuid::nil();
        let err = ProvisionError::invalid_state(node, ProvisionAction::Inspect, ProvisionState::Available);
        let msg = err.to_string();
        assert!(msg.contains("\"inspect\""));
        assert!(msg.contains("\"available\""));

        let err = ProvisionError::validation("driver is required");
        assert_eq!(err.to_string(), "Invalid input: driver is required");
    }

    #[test]
    fn test_version_error_is_transparent() {
        let err: ProvisionError = VersionError::Malformed("x".to_string()).into();
        assert_eq!(
            err.to_string(),
            "Invalid value for X-OpenStack-Ironic-API-Version header: 'x'"
        );
    }
}
