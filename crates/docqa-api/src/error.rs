//! ---
//! docqa_section: "05-networking-external-interfaces"
//! docqa_subsection: "module"
//! docqa_type: "source"
//! docqa_scope: "code"
//! docqa_description: "HTTP error mapping for authorization and storage faults."
//! docqa_version: "v0.1.0-alpha"
//! docqa_owner: "tbd"
//! ---
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use docqa_authz::{AccessDenied, IdentityError, RoleError};
use serde::Serialize;

use crate::index::IndexError;

#[derive(Debug, Serialize)]
struct ErrorResponse {
    message: String,
}

/// Error returned by handlers; rendered as `{"message": ...}` with the status code.
#[derive(Debug)]
pub struct ApiError {
    status: StatusCode,
    message: String,
}

impl ApiError {
    pub fn new(status: StatusCode, message: impl Into<String>) -> Self {
        Self {
            status,
            message: message.into(),
        }
    }

    pub fn bad_request(message: impl Into<String>) -> Self {
        Self::new(StatusCode::BAD_REQUEST, message)
    }

    pub fn unauthorized(message: impl Into<String>) -> Self {
        Self::new(StatusCode::UNAUTHORIZED, message)
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self::new(StatusCode::NOT_FOUND, message)
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Self::new(StatusCode::INTERNAL_SERVER_ERROR, message)
    }

    pub fn status(&self) -> StatusCode {
        self.status
    }

    pub fn message(&self) -> &str {
        &self.message
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let body = Json(ErrorResponse {
            message: self.message,
        });
        (self.status, body).into_response()
    }
}

impl From<AccessDenied> for ApiError {
    fn from(denied: AccessDenied) -> Self {
        Self::new(
            StatusCode::FORBIDDEN,
            format!("Not authorized to perform {}", denied.action),
        )
    }
}

impl From<RoleError> for ApiError {
    fn from(err: RoleError) -> Self {
        let status = match err {
            RoleError::ProtectedRole(_) => StatusCode::CONFLICT,
            RoleError::UnknownRole(_)
            | RoleError::DuplicateRole(_)
            | RoleError::LastAdmin { .. }
            | RoleError::InvalidName => StatusCode::BAD_REQUEST,
        };
        Self::new(status, err.to_string())
    }
}

impl From<IdentityError> for ApiError {
    fn from(err: IdentityError) -> Self {
        let status = match err {
            IdentityError::UserExists | IdentityError::InvalidInput(_) => StatusCode::BAD_REQUEST,
            IdentityError::UserNotFound => StatusCode::NOT_FOUND,
            IdentityError::InvalidCredentials
            | IdentityError::InvalidApiKey
            | IdentityError::ApiKeyExpired
            | IdentityError::Inactive => StatusCode::UNAUTHORIZED,
            IdentityError::Hashing(_) => StatusCode::INTERNAL_SERVER_ERROR,
        };
        Self::new(status, err.to_string())
    }
}

impl From<IndexError> for ApiError {
    fn from(err: IndexError) -> Self {
        let status = match err {
            IndexError::NotFound(_) => StatusCode::NOT_FOUND,
            IndexError::Empty(_) => StatusCode::BAD_REQUEST,
            IndexError::Backend(_) => StatusCode::INTERNAL_SERVER_ERROR,
        };
        Self::new(status, err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use docqa_authz::{Action, Resource, ResourceType};

    #[test]
    fn status_mapping() {
        let denied = AccessDenied {
            actor_id: "alice".into(),
            action: Action::Delete,
            resource: Resource::of_type(ResourceType::Document),
        };
        let err = ApiError::from(denied);
        assert_eq!(err.status(), StatusCode::FORBIDDEN);
        assert_eq!(err.message(), "Not authorized to perform delete");

        assert_eq!(
            ApiError::from(RoleError::ProtectedRole("admin".into())).status(),
            StatusCode::CONFLICT
        );
        assert_eq!(
            ApiError::from(RoleError::UnknownRole("ghost".into())).status(),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            ApiError::from(IdentityError::UserNotFound).status(),
            StatusCode::NOT_FOUND
        );
        assert_eq!(
            ApiError::from(IdentityError::ApiKeyExpired).status(),
            StatusCode::UNAUTHORIZED
        );
        assert_eq!(
            ApiError::from(IndexError::NotFound("x.pdf".into())).status(),
            StatusCode::NOT_FOUND
        );
    }
}
