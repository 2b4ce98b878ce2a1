//! Error responses
//!
//! Every failure is rendered as
//! `{"error_message": {"faultstring", "faultcode", "debuginfo"}}`, with
//! `faultcode` `Client` for 4xx and `Server` for 5xx.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;

use crate::error::ProvisionError;
use crate::version::VersionError;

/// HTTP status for a library error.
pub fn status_for(err: &ProvisionError) -> StatusCode {
    match err {
        ProvisionError::InvalidStateRequested { .. }
        | ProvisionError::NodeLocked { .. }
        | ProvisionError::DuplicateName(_)
        | ProvisionError::Transition(_) => StatusCode::CONFLICT,

        ProvisionError::NodeInMaintenance { .. }
        | ProvisionError::InvalidName(_)
        | ProvisionError::Validation(_)
        | ProvisionError::InvalidPatch(_)
        | ProvisionError::DriverNotFound(_)
        | ProvisionError::Version(VersionError::Malformed(_)) => StatusCode::BAD_REQUEST,

        ProvisionError::Version(_) | ProvisionError::NotAcceptable { .. } => {
            StatusCode::NOT_ACCEPTABLE
        }

        ProvisionError::NotFound(_) => StatusCode::NOT_FOUND,

        ProvisionError::Backend(_) | ProvisionError::Json(_) | ProvisionError::Internal(_) => {
            StatusCode::INTERNAL_SERVER_ERROR
        }
    }
}

/// A `ProvisionError` on its way to the client.
#[derive(Debug)]
pub struct ApiError {
    status: StatusCode,
    error: ProvisionError,
}

impl ApiError {
    /// Override the default status for `error`.
    pub fn with_status(status: StatusCode, error: ProvisionError) -> Self {
        Self { status, error }
    }
}

impl From<ProvisionError> for ApiError {
    fn from(error: ProvisionError) -> Self {
        Self {
            status: status_for(&error),
            error,
        }
    }
}

impl From<VersionError> for ApiError {
    fn from(error: VersionError) -> Self {
        ProvisionError::from(error).into()
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let faultcode = if self.status.is_server_error() {
            tracing::error!(status = %self.status, error = %self.error, "request failed");
            "Server"
        } else {
            tracing::debug!(status = %self.status, error = %self.error, "request rejected");
            "Client"
        };

        let body = json!({
            "error_message": {
                "faultstring": self.error.to_string(),
                "faultcode": faultcode,
                "debuginfo": null,
            }
        });
        (self.status, Json(body)).into_response()
    }
}

pub type ApiResult<T> = std::result::Result<T, ApiError>;

#[cfg(test)]
mod tests {
    use super::*;
    use crate::states::ProvisionState;
    use crate::version::ApiVersion;
    use uuid::Uuid;

    #[test]
    fn test_status_mapping() {
        let node = Uuid::nil();
        let cases = [
            (
                ProvisionError::invalid_state(node, "inspect", ProvisionState::Enroll),
                StatusCode::CONFLICT,
            ),
            (
                ProvisionError::NodeLocked { node, holder: "c1".into() },
                StatusCode::CONFLICT,
            ),
            (ProvisionError::DuplicateName("n".into()), StatusCode::CONFLICT),
            (ProvisionError::InvalidName("N!".into()), StatusCode::BAD_REQUEST),
            (ProvisionError::not_found("n"), StatusCode::NOT_FOUND),
            (
                VersionError::Malformed("x".into()).into(),
                StatusCode::BAD_REQUEST,
            ),
            (
                VersionError::UnsupportedMajor { requested: ApiVersion::new(2, 0) }.into(),
                StatusCode::NOT_ACCEPTABLE,
            ),
            (
                ProvisionError::not_acceptable("x", ApiVersion::MIN, ApiVersion::MAX),
                StatusCode::NOT_ACCEPTABLE,
            ),
            (ProvisionError::internal("boom"), StatusCode::INTERNAL_SERVER_ERROR),
        ];
        for (err, status) in cases {
            assert_eq!(status_for(&err), status, "{}", err);
        }
    }

    #[test]
    fn test_override_status() {
        let err = ApiError::with_status(
            StatusCode::NOT_FOUND,
            ProvisionError::DriverNotFound("ipmi".into()),
        );
        assert_eq!(err.into_response().status(), StatusCode::NOT_FOUND);
    }
}
