//! Error type for the authentication service

use axum::{
    Json,
    extract::{FromRequest, rejection::JsonRejection},
    http::StatusCode,
    response::{IntoResponse, Response},
};
use marketplace::DomainError;
use serde_json::json;
use thiserror::Error;
use tracing::{error, warn};

#[derive(Error, Debug)]
pub enum AuthError {
    #[error("{0}")]
    Validation(String),

    #[error("{0}")]
    Unauthorized(String),

    #[error("{0}")]
    Forbidden(String),

    #[error("{0}")]
    Conflict(String),

    #[error("{0} not found")]
    NotFound(String),

    #[error("Too many failed attempts, try again later")]
    TooManyAttempts,

    #[error("{0}")]
    Upstream(String),

    #[error(transparent)]
    Internal(#[from] anyhow::Error),
}

impl AuthError {
    pub fn invalid_credentials() -> Self {
        AuthError::Unauthorized("Invalid email or password".to_string())
    }

    fn status(&self) -> StatusCode {
        match self {
            AuthError::Validation(_) => StatusCode::BAD_REQUEST,
            AuthError::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            AuthError::Forbidden(_) => StatusCode::FORBIDDEN,
            AuthError::Conflict(_) => StatusCode::CONFLICT,
            AuthError::NotFound(_) => StatusCode::NOT_FOUND,
            AuthError::TooManyAttempts => StatusCode::TOO_MANY_REQUESTS,
            AuthError::Upstream(_) => StatusCode::BAD_GATEWAY,
            AuthError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl From<DomainError> for AuthError {
    fn from(err: DomainError) -> Self {
        match err {
            DomainError::Validation(msg) => AuthError::Validation(msg),
            DomainError::Auth(msg) => AuthError::Unauthorized(msg),
            DomainError::Permission(msg) => AuthError::Forbidden(msg),
            DomainError::NotFound(what) => AuthError::NotFound(what),
            DomainError::Conflict(msg) => AuthError::Conflict(msg),
            DomainError::Upstream(msg) => AuthError::Upstream(msg),
            other => AuthError::Internal(anyhow::Error::new(other)),
        }
    }
}

impl From<JsonRejection> for AuthError {
    fn from(rejection: JsonRejection) -> Self {
        AuthError::Validation(rejection.body_text())
    }
}

impl IntoResponse for AuthError {
    fn into_response(self) -> Response {
        let status = self.status();

        let message = match &self {
            AuthError::Internal(e) => {
                error!(error = ?e, "Internal error");
                "Internal server error".to_string()
            }
            other => {
                warn!(status = %status, error = %other, "Request failed");
                other.to_string()
            }
        };

        let mut body = json!({
            "success": false,
            "message": message,
        });
        if crate::DEVELOPMENT.get().copied().unwrap_or(false) {
            body["detail"] = json!(format!("{:?}", self));
        }

        (status, Json(body)).into_response()
    }
}

pub type AuthResult<T> = Result<T, AuthError>;

/// JSON body extractor whose rejections use the service error body
#[derive(FromRequest)]
#[from_request(via(axum::Json), rejection(AuthError))]
pub struct AppJson<T>(pub T);

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_domain_errors_keep_their_status() {
        let conflict: AuthError = DomainError::Conflict("Email already registered".into()).into();
        assert_eq!(conflict.status(), StatusCode::CONFLICT);

        let missing: AuthError = DomainError::not_found("User").into();
        assert_eq!(missing.status(), StatusCode::NOT_FOUND);
        assert_eq!(missing.to_string(), "User not found");
    }

    #[test]
    fn test_internal_errors_are_sanitised() {
        let response = AuthError::Internal(anyhow::anyhow!("pool timed out")).into_response();
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    }
}
