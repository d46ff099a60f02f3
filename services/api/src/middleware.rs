//! Authentication middleware for JWT token validation

use axum::{
    extract::{Request, State},
    middleware::Next,
    response::Response,
};
use axum_extra::{
    TypedHeader,
    headers::{Authorization, authorization::Bearer},
};
use common::jwt::{JwtService, TokenType};
use marketplace::{models::Role, permissions::Actor, store::UserStore};
use tracing::debug;

use crate::{
    error::{ApiError, ApiResult},
    state::AppState,
};

/// Resolve an access token to the calling actor
pub fn authenticate(jwt: &JwtService, token: &str) -> ApiResult<Actor> {
    let claims = jwt.validate_token(token).map_err(|e| {
        debug!(error = %e, "Rejected access token");
        ApiError::Unauthorized("Invalid or expired token".to_string())
    })?;

    if claims.token_type != TokenType::Access {
        return Err(ApiError::Unauthorized("Access token required".to_string()));
    }

    let role = claims
        .role
        .parse::<Role>()
        .map_err(|_| ApiError::unauthorized())?;

    Ok(Actor::new(claims.sub, role))
}

/// [`authenticate`], then refuse accounts that were deactivated after the
/// token was issued
pub async fn resolve_actor(state: &AppState, token: &str) -> ApiResult<Actor> {
    let actor = authenticate(&state.jwt, token)?;

    match state.store.find_user(actor.id).await? {
        Some(user) if user.is_active => Ok(actor),
        _ => {
            debug!(user_id = %actor.id, "Token belongs to a missing or inactive account");
            Err(ApiError::Unauthorized("Account is not active".to_string()))
        }
    }
}

/// Authentication middleware; inserts the [`Actor`] into request extensions
pub async fn auth_middleware(
    State(state): State<AppState>,
    bearer: Option<TypedHeader<Authorization<Bearer>>>,
    mut req: Request,
    next: Next,
) -> ApiResult<Response> {
    let TypedHeader(Authorization(bearer)) = bearer.ok_or_else(ApiError::unauthorized)?;
    let actor = resolve_actor(&state, bearer.token()).await?;

    req.extensions_mut().insert(actor);
    Ok(next.run(req).await)
}
