//! Middleware for JWT token validation and authentication

use axum::{
    extract::{Request, State},
    middleware::Next,
    response::Response,
};
use axum_extra::{
    TypedHeader,
    headers::{Authorization, authorization::Bearer},
};
use common::jwt::TokenType;
use marketplace::models::Role;
use tracing::debug;
use uuid::Uuid;

use crate::{
    error::{AuthError, AuthResult},
    state::AppState,
};

/// Caller identified by a valid, unrevoked access token
#[derive(Debug, Clone)]
pub struct AuthUser {
    pub id: Uuid,
    pub role: Role,
    /// The raw token, kept so logout can revoke it
    pub token: String,
    pub expires_at: u64,
}

/// Require a bearer access token that has not been logged out
pub async fn auth_middleware(
    State(state): State<AppState>,
    bearer: Option<TypedHeader<Authorization<Bearer>>>,
    mut req: Request,
    next: Next,
) -> AuthResult<Response> {
    let unauthorized = || AuthError::Unauthorized("Authentication required".to_string());

    let TypedHeader(Authorization(bearer)) = bearer.ok_or_else(unauthorized)?;
    let token = bearer.token();

    let claims = state.jwt.validate_token(token).map_err(|e| {
        debug!(error = %e, "Rejected access token");
        AuthError::Unauthorized("Invalid or expired token".to_string())
    })?;

    if claims.token_type != TokenType::Access {
        return Err(AuthError::Unauthorized("Access token required".to_string()));
    }

    if state.sessions.is_blacklisted(token).await? {
        return Err(AuthError::Unauthorized("Token has been revoked".to_string()));
    }

    let role = claims.role.parse::<Role>().map_err(|_| unauthorized())?;
    req.extensions_mut().insert(AuthUser {
        id: claims.sub,
        role,
        token: token.to_string(),
        expires_at: claims.exp,
    });

    Ok(next.run(req).await)
}
