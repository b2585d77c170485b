//! One error type for every handler, rendered as
//! `{"error": {"code": ..., "message": ...}}`.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::json;
use thiserror::Error;

use crate::engine::{EngineError, ErrorKind};
use crate::identity::IdentityError;

#[derive(Debug, Error)]
pub enum ApiError {
    #[error(transparent)]
    Engine(#[from] EngineError),
    #[error(transparent)]
    Identity(#[from] IdentityError),
    #[error("sign in required")]
    Unauthenticated,
}

impl ApiError {
    pub fn status_code(&self) -> StatusCode {
        match self {
            ApiError::Engine(e) => match e.kind() {
                ErrorKind::Validation => StatusCode::BAD_REQUEST,
                ErrorKind::Conflict => StatusCode::CONFLICT,
                ErrorKind::Authorization => StatusCode::FORBIDDEN,
                ErrorKind::NotFound => StatusCode::NOT_FOUND,
                ErrorKind::Persistence => StatusCode::INTERNAL_SERVER_ERROR,
            },
            ApiError::Identity(IdentityError::Rejected(_)) | ApiError::Unauthenticated => {
                StatusCode::UNAUTHORIZED
            }
            ApiError::Identity(IdentityError::Unsupported(_)) => StatusCode::BAD_REQUEST,
            ApiError::Identity(IdentityError::Upstream(_)) => StatusCode::BAD_GATEWAY,
        }
    }

    /// Stable machine-readable code for clients.
    pub fn code(&self) -> &'static str {
        match self {
            ApiError::Engine(e) => match e {
                EngineError::ApprovedConflict(_) => "approved-conflict",
                EngineError::PendingSaturated(_) => "pending-saturated",
                EngineError::InvalidState { .. } => "invalid-state",
                EngineError::UnknownRoom { .. } => "unknown-room",
                _ => match e.kind() {
                    ErrorKind::Validation => "validation",
                    ErrorKind::Conflict => "conflict",
                    ErrorKind::Authorization => "forbidden",
                    ErrorKind::NotFound => "not-found",
                    ErrorKind::Persistence => "internal",
                },
            },
            ApiError::Identity(IdentityError::Upstream(_)) => "identity-unavailable",
            ApiError::Identity(IdentityError::Unsupported(_)) => "unsupported-credentials",
            ApiError::Identity(IdentityError::Rejected(_)) | ApiError::Unauthenticated => "unauthenticated",
        }
    }

    fn public_message(&self) -> String {
        match self {
            ApiError::Engine(e) if e.kind() == ErrorKind::Persistence => {
                "the change could not be saved; nothing was changed, please try again".into()
            }
            ApiError::Identity(IdentityError::Upstream(_)) => "sign-in service is unavailable".into(),
            other => other.to_string(),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        if status.is_server_error() {
            tracing::error!("request failed: {self}");
        }
        let body = json!({
            "error": {
                "code": self.code(),
                "message": self.public_message(),
            }
        });
        (status, Json(body)).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::Floor;
    use ulid::Ulid;

    #[test]
    fn kinds_map_to_statuses() {
        let cases = [
            (ApiError::from(EngineError::Invalid("x")), StatusCode::BAD_REQUEST),
            (ApiError::from(EngineError::PendingSaturated(4)), StatusCode::CONFLICT),
            (ApiError::from(EngineError::Forbidden("x")), StatusCode::FORBIDDEN),
            (ApiError::from(EngineError::NotFound(Ulid::new())), StatusCode::NOT_FOUND),
            (ApiError::from(EngineError::UnknownFloor(Floor(3))), StatusCode::NOT_FOUND),
            (ApiError::from(EngineError::WalError("disk".into())), StatusCode::INTERNAL_SERVER_ERROR),
            (ApiError::Unauthenticated, StatusCode::UNAUTHORIZED),
        ];
        for (err, status) in cases {
            assert_eq!(err.status_code(), status, "{err}");
        }
    }

    #[test]
    fn persistence_details_stay_internal() {
        let err = ApiError::from(EngineError::WalError("/data/bookings.wal: disk full".into()));
        assert!(!err.public_message().contains("disk"));
        assert_eq!(err.code(), "internal");
    }

    #[test]
    fn conflict_reasons_have_their_own_codes() {
        assert_eq!(ApiError::from(EngineError::ApprovedConflict(Ulid::new())).code(), "approved-conflict");
        assert_eq!(ApiError::from(EngineError::PendingSaturated(4)).code(), "pending-saturated");
    }
}
