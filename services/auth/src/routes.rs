//! Authentication service routes

use axum::{
    Extension, Json, Router,
    extract::{Query, State},
    http::StatusCode,
    middleware,
    response::{IntoResponse, Redirect},
    routing::{get, post},
};
use chrono::Utc;
use common::jwt::TokenType;
use marketplace::{
    models::{NewUser, Role, User, Worker},
    store::{UserStore, WorkerStore},
};
use rand::RngCore;
use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::{info, warn};

use crate::{
    accounts::{self, Registration, hash_password},
    error::{AppJson, AuthError, AuthResult},
    middleware::{AuthUser, auth_middleware},
    oauth::STATE_TTL_SECONDS,
    state::AppState,
    validation::{normalize_email, validate_email, validate_phone},
};

/// Successful response body
#[derive(Serialize)]
pub struct Envelope<T> {
    pub success: bool,
    pub data: T,
}

fn success<T: Serialize>(data: T) -> Json<Envelope<T>> {
    Json(Envelope {
        success: true,
        data,
    })
}

/// Issued token pair
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TokenResponse {
    pub access_token: String,
    pub refresh_token: String,
    pub token_type: String,
    pub expires_in: u64,
}

#[derive(Serialize)]
pub struct SessionResponse {
    pub user: User,
    #[serde(flatten)]
    pub tokens: TokenResponse,
}

#[derive(Debug, Deserialize)]
pub struct LoginRequest {
    pub email: String,
    pub password: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RefreshRequest {
    pub refresh_token: String,
}

/// Where to send a one-time code: exactly one of `phone` or `email`
#[derive(Debug, Deserialize)]
pub struct OtpTarget {
    #[serde(default)]
    pub phone: Option<String>,
    #[serde(default)]
    pub email: Option<String>,
}

impl OtpTarget {
    fn resolve(&self) -> AuthResult<String> {
        match (&self.phone, &self.email) {
            (Some(phone), None) => {
                validate_phone(phone).map_err(AuthError::Validation)?;
                Ok(phone.clone())
            }
            (None, Some(email)) => {
                let email = normalize_email(email);
                validate_email(&email).map_err(AuthError::Validation)?;
                Ok(email)
            }
            _ => Err(AuthError::Validation(
                "Provide either phone or email".to_string(),
            )),
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct OtpVerifyRequest {
    #[serde(flatten)]
    pub target: OtpTarget,
    pub code: String,
}

#[derive(Debug, Deserialize)]
pub struct OAuthCallback {
    pub code: String,
    pub state: String,
}

/// Create the router for the authentication service
pub fn create_router(state: AppState) -> Router {
    let protected = Router::new()
        .route("/api/auth/logout", post(logout))
        .route("/api/auth/me", get(me))
        .route_layer(middleware::from_fn_with_state(
            state.clone(),
            auth_middleware,
        ));

    Router::new()
        .route("/health", get(health_check))
        .route("/healthz", get(health_check))
        .route("/api/auth/register", post(register))
        .route("/api/auth/login", post(login))
        .route("/api/auth/refresh", post(refresh))
        .route("/api/auth/otp/request", post(request_otp))
        .route("/api/auth/otp/verify", post(verify_otp))
        .route("/api/auth/google", get(google_login))
        .route("/api/auth/google/callback", get(google_callback))
        .merge(protected)
        .with_state(state)
}

/// Health check endpoint
pub async fn health_check() -> impl IntoResponse {
    Json(json!({
        "status": "OK",
        "timestamp": Utc::now().to_rfc3339(),
    }))
}

/// Sign tokens for `user` and make the refresh token their current session
async fn issue_tokens(state: &AppState, user: &User) -> AuthResult<TokenResponse> {
    let role = user.role.as_str();
    let access_token = state.jwt.generate_access_token(user.id, role)?;
    let refresh_token = state.jwt.generate_refresh_token(user.id, role)?;

    state
        .sessions
        .create_session(user.id, &refresh_token)
        .await?;

    Ok(TokenResponse {
        access_token,
        refresh_token,
        token_type: "Bearer".to_string(),
        expires_in: state.jwt.access_token_expiry(),
    })
}

async fn start_session(state: &AppState, user: User) -> AuthResult<SessionResponse> {
    let tokens = issue_tokens(state, &user).await?;
    Ok(SessionResponse { user, tokens })
}

pub async fn register(
    State(state): State<AppState>,
    AppJson(payload): AppJson<Registration>,
) -> AuthResult<impl IntoResponse> {
    let user = accounts::register(state.store.as_ref(), payload).await?;
    let session = start_session(&state, user).await?;

    Ok((StatusCode::CREATED, success(session)))
}

pub async fn login(
    State(state): State<AppState>,
    AppJson(payload): AppJson<LoginRequest>,
) -> AuthResult<impl IntoResponse> {
    let key = normalize_email(&payload.email);
    if !state.throttle.check(&key).await {
        return Err(AuthError::TooManyAttempts);
    }

    let user = match accounts::authenticate(state.store.as_ref(), &key, &payload.password).await {
        Ok(user) => user,
        Err(e @ AuthError::Unauthorized(_)) => {
            state.throttle.record_failure(&key).await;
            return Err(e);
        }
        Err(e) => return Err(e),
    };
    state.throttle.reset(&key).await;

    info!(user_id = %user.id, "User logged in");
    Ok(success(start_session(&state, user).await?))
}

/// Exchange a refresh token for a new pair; the old refresh token is revoked
pub async fn refresh(
    State(state): State<AppState>,
    AppJson(payload): AppJson<RefreshRequest>,
) -> AuthResult<impl IntoResponse> {
    let invalid = || AuthError::Unauthorized("Invalid refresh token".to_string());

    let claims = state
        .jwt
        .validate_token(&payload.refresh_token)
        .map_err(|_| invalid())?;

    if claims.token_type != TokenType::Refresh {
        return Err(invalid());
    }

    if !state
        .sessions
        .is_session_valid(claims.sub, &payload.refresh_token)
        .await?
    {
        return Err(invalid());
    }

    let user = state
        .store
        .find_user(claims.sub)
        .await?
        .filter(|u| u.is_active)
        .ok_or_else(invalid)?;

    state
        .sessions
        .blacklist_token(&payload.refresh_token, claims.exp)
        .await?;

    Ok(success(issue_tokens(&state, &user).await?))
}

/// Revoke the presented access token and end the refresh session
pub async fn logout(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthUser>,
) -> AuthResult<impl IntoResponse> {
    state
        .sessions
        .blacklist_token(&auth.token, auth.expires_at)
        .await?;
    state.sessions.delete_session(auth.id).await?;

    info!(user_id = %auth.id, "User logged out");
    Ok(Json(json!({
        "success": true,
        "message": "Logged out",
    })))
}

#[derive(Serialize)]
pub struct Profile {
    #[serde(flatten)]
    pub user: User,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub worker: Option<Worker>,
}

pub async fn me(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthUser>,
) -> AuthResult<impl IntoResponse> {
    let user = state
        .store
        .find_user(auth.id)
        .await?
        .ok_or_else(|| AuthError::NotFound("User".to_string()))?;

    let worker = match user.role {
        Role::Worker => state.store.find_worker(user.id).await?,
        _ => None,
    };

    Ok(success(Profile { user, worker }))
}

async fn find_by_target(state: &AppState, target: &OtpTarget) -> AuthResult<Option<User>> {
    let key = target.resolve()?;
    let user = match target.phone {
        Some(_) => state.store.find_user_by_phone(&key).await?,
        None => state.store.find_user_by_email(&key).await?,
    };
    Ok(user)
}

/// Send a login code. The response is the same whether or not an account
/// exists for the target.
pub async fn request_otp(
    State(state): State<AppState>,
    AppJson(payload): AppJson<OtpTarget>,
) -> AuthResult<impl IntoResponse> {
    let key = payload.resolve()?;

    match find_by_target(&state, &payload).await? {
        Some(user) if user.is_active => state.otp.request(&key).await?,
        _ => warn!(target = %key, "One-time code requested for unknown account"),
    }

    Ok(Json(json!({
        "success": true,
        "message": "If the account exists, a code has been sent",
    })))
}

pub async fn verify_otp(
    State(state): State<AppState>,
    AppJson(payload): AppJson<OtpVerifyRequest>,
) -> AuthResult<impl IntoResponse> {
    let key = payload.target.resolve()?;
    if !state.throttle.check(&key).await {
        return Err(AuthError::TooManyAttempts);
    }

    if let Err(e) = state.otp.verify(&key, &payload.code).await {
        state.throttle.record_failure(&key).await;
        return Err(e);
    }
    state.throttle.reset(&key).await;

    let user = find_by_target(&state, &payload.target)
        .await?
        .filter(|u| u.is_active)
        .ok_or_else(|| AuthError::NotFound("User".to_string()))?;

    Ok(success(start_session(&state, user).await?))
}

fn google(state: &AppState) -> AuthResult<&crate::oauth::GoogleOAuth> {
    state
        .google
        .as_ref()
        .ok_or_else(|| AuthError::NotFound("Google sign-in".to_string()))
}

/// Redirect to Google's consent screen
pub async fn google_login(State(state): State<AppState>) -> AuthResult<impl IntoResponse> {
    let (url, csrf, verifier) = google(&state)?.authorize_url();

    state
        .sessions
        .put_oauth_state(csrf.secret(), verifier.secret(), STATE_TTL_SECONDS)
        .await?;

    Ok(Redirect::to(&url))
}

/// Finish Google sign-in, creating a customer account on first use, and hand
/// the tokens to the frontend in the URL fragment
pub async fn google_callback(
    State(state): State<AppState>,
    Query(callback): Query<OAuthCallback>,
) -> AuthResult<impl IntoResponse> {
    let google = google(&state)?;

    let verifier = state
        .sessions
        .take_oauth_state(&callback.state)
        .await?
        .ok_or_else(|| AuthError::Unauthorized("Unknown or expired sign-in state".to_string()))?;

    let profile = google
        .fetch_profile(callback.code, verifier)
        .await
        .map_err(|e| AuthError::Upstream(format!("Google sign-in failed: {}", e)))?;

    if !profile.verified_email {
        return Err(AuthError::Forbidden(
            "Google account email is not verified".to_string(),
        ));
    }

    let email = normalize_email(&profile.email);
    let user = match state.store.find_user_by_email(&email).await? {
        Some(user) => user,
        None => {
            // Unusable password: the account signs in through Google or OTP
            let mut secret = [0u8; 32];
            rand::thread_rng().fill_bytes(&mut secret);

            let name = profile
                .name
                .clone()
                .filter(|n| !n.trim().is_empty())
                .unwrap_or_else(|| email.split('@').next().unwrap_or("Customer").to_string());

            let user = state
                .store
                .insert_user(
                    NewUser {
                        name,
                        email,
                        password_hash: hash_password(&hex::encode(secret))?,
                        role: Role::Customer,
                        phone: None,
                    },
                    None,
                )
                .await?;
            info!(user_id = %user.id, "Created account from Google sign-in");
            user
        }
    };

    if !user.is_active {
        return Err(AuthError::Forbidden("Account is deactivated".to_string()));
    }

    let tokens = issue_tokens(&state, &user).await?;
    Ok(Redirect::to(&format!(
        "{}/auth/callback#accessToken={}&refreshToken={}",
        state.settings.frontend_url.trim_end_matches('/'),
        tokens.access_token,
        tokens.refresh_token
    )))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    use axum::{
        body::Body,
        http::{Request, header},
    };
    use common::jwt::{JwtConfig, JwtService};
    use marketplace::store::MemoryStore;
    use serde_json::Value;
    use tower::ServiceExt;

    use crate::{
        otp::{OtpService, capture::CaptureSender},
        rate_limiter::{LoginThrottle, ThrottleConfig},
        session::{SessionManager, memory::MemoryKv},
        settings::Settings,
    };

    struct Harness {
        state: AppState,
        sender: Arc<CaptureSender>,
    }

    fn harness() -> Harness {
        let settings = Settings::for_test();
        let store = Arc::new(MemoryStore::new());
        let sender = Arc::new(CaptureSender::default());
        let jwt = JwtService::new(JwtConfig {
            secret: "test-secret-that-is-at-least-32-bytes".to_string(),
            access_token_expiry: 900,
            refresh_token_expiry: 3600,
        });

        let state = AppState {
            store: store.clone(),
            sessions: SessionManager::new(Arc::new(MemoryKv::default()), 3600),
            throttle: LoginThrottle::new(ThrottleConfig {
                max_failures: settings.login_max_failures,
                ..ThrottleConfig::default()
            }),
            otp: OtpService::new(store, sender.clone(), settings.otp_ttl_seconds),
            jwt,
            google: None,
            settings: Arc::new(settings),
        };

        Harness { state, sender }
    }

    async fn send(
        state: &AppState,
        method: &str,
        uri: &str,
        token: Option<&str>,
        body: Option<Value>,
    ) -> (StatusCode, Value) {
        let mut request = Request::builder().method(method).uri(uri);
        if let Some(token) = token {
            request = request.header(header::AUTHORIZATION, format!("Bearer {}", token));
        }
        let request = match body {
            Some(body) => request
                .header(header::CONTENT_TYPE, "application/json")
                .body(Body::from(body.to_string())),
            None => request.body(Body::empty()),
        }
        .unwrap();

        let response = create_router(state.clone()).oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        let json = if bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&bytes).unwrap()
        };
        (status, json)
    }

    async fn register_customer(state: &AppState) -> Value {
        let (status, body) = send(
            state,
            "POST",
            "/api/auth/register",
            None,
            Some(json!({
                "name": "Asha Rao",
                "email": "asha@example.com",
                "password": "hunter22",
                "phone": "+919876543210",
            })),
        )
        .await;
        assert_eq!(status, StatusCode::CREATED);
        body
    }

    #[tokio::test]
    async fn test_health() {
        let h = harness();
        for path in ["/health", "/healthz"] {
            let (status, body) = send(&h.state, "GET", path, None, None).await;
            assert_eq!(status, StatusCode::OK);
            assert_eq!(body["status"], "OK");
            assert!(body["timestamp"].is_string());
        }
    }

    #[tokio::test]
    async fn test_register_login_and_me() {
        let h = harness();
        let registered = register_customer(&h.state).await;
        assert_eq!(registered["success"], true);
        assert_eq!(registered["data"]["user"]["role"], "customer");
        assert!(registered["data"]["user"].get("passwordHash").is_none());

        let (status, login) = send(
            &h.state,
            "POST",
            "/api/auth/login",
            None,
            Some(json!({"email": "ASHA@example.com", "password": "hunter22"})),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        let token = login["data"]["accessToken"].as_str().unwrap();

        let (status, me) = send(&h.state, "GET", "/api/auth/me", Some(token), None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(me["data"]["email"], "asha@example.com");
    }

    #[tokio::test]
    async fn test_duplicate_registration_conflicts() {
        let h = harness();
        register_customer(&h.state).await;

        let (status, body) = send(
            &h.state,
            "POST",
            "/api/auth/register",
            None,
            Some(json!({
                "name": "Other",
                "email": "asha@example.com",
                "password": "hunter22",
            })),
        )
        .await;
        assert_eq!(status, StatusCode::CONFLICT);
        assert_eq!(body["success"], false);
    }

    #[tokio::test]
    async fn test_malformed_body_is_a_validation_error() {
        let h = harness();
        let (status, body) = send(
            &h.state,
            "POST",
            "/api/auth/login",
            None,
            Some(json!({"email": "asha@example.com"})),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["success"], false);
        assert!(body["message"].is_string());
    }

    #[tokio::test]
    async fn test_login_locks_after_repeated_failures() {
        let h = harness();
        register_customer(&h.state).await;
        let wrong = json!({"email": "asha@example.com", "password": "wrong-pass1"});

        for _ in 0..3 {
            let (status, _) =
                send(&h.state, "POST", "/api/auth/login", None, Some(wrong.clone())).await;
            assert_eq!(status, StatusCode::UNAUTHORIZED);
        }

        let (status, _) = send(
            &h.state,
            "POST",
            "/api/auth/login",
            None,
            Some(json!({"email": "asha@example.com", "password": "hunter22"})),
        )
        .await;
        assert_eq!(status, StatusCode::TOO_MANY_REQUESTS);
    }

    #[tokio::test]
    async fn test_refresh_rotates_and_revokes() {
        let h = harness();
        let registered = register_customer(&h.state).await;
        let refresh_token = registered["data"]["refreshToken"].as_str().unwrap();

        let (status, rotated) = send(
            &h.state,
            "POST",
            "/api/auth/refresh",
            None,
            Some(json!({"refreshToken": refresh_token})),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_ne!(rotated["data"]["refreshToken"], refresh_token);

        let (status, _) = send(
            &h.state,
            "POST",
            "/api/auth/refresh",
            None,
            Some(json!({"refreshToken": refresh_token})),
        )
        .await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn test_access_token_cannot_refresh() {
        let h = harness();
        let registered = register_customer(&h.state).await;
        let access = registered["data"]["accessToken"].as_str().unwrap();

        let (status, _) = send(
            &h.state,
            "POST",
            "/api/auth/refresh",
            None,
            Some(json!({"refreshToken": access})),
        )
        .await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn test_logout_revokes_access_token() {
        let h = harness();
        let registered = register_customer(&h.state).await;
        let token = registered["data"]["accessToken"].as_str().unwrap();

        let (status, _) = send(&h.state, "POST", "/api/auth/logout", Some(token), None).await;
        assert_eq!(status, StatusCode::OK);

        let (status, _) = send(&h.state, "GET", "/api/auth/me", Some(token), None).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn test_me_requires_token() {
        let h = harness();
        let (status, body) = send(&h.state, "GET", "/api/auth/me", None, None).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
        assert_eq!(body["success"], false);
    }

    #[tokio::test]
    async fn test_otp_login_by_phone() {
        let h = harness();
        register_customer(&h.state).await;

        let (status, _) = send(
            &h.state,
            "POST",
            "/api/auth/otp/request",
            None,
            Some(json!({"phone": "+919876543210"})),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        let code = h.sender.last_code().await.unwrap();

        let (status, body) = send(
            &h.state,
            "POST",
            "/api/auth/otp/verify",
            None,
            Some(json!({"phone": "+919876543210", "code": code})),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["data"]["user"]["email"], "asha@example.com");
        assert!(body["data"]["accessToken"].is_string());
    }

    #[tokio::test]
    async fn test_otp_for_unknown_account_sends_nothing() {
        let h = harness();
        let (status, _) = send(
            &h.state,
            "POST",
            "/api/auth/otp/request",
            None,
            Some(json!({"email": "nobody@example.com"})),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert!(h.sender.last_code().await.is_none());
    }

    #[tokio::test]
    async fn test_otp_target_must_be_unambiguous() {
        let h = harness();
        let (status, _) = send(
            &h.state,
            "POST",
            "/api/auth/otp/request",
            None,
            Some(json!({"phone": "+919876543210", "email": "asha@example.com"})),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_google_unconfigured_is_not_found() {
        let h = harness();
        let (status, _) = send(&h.state, "GET", "/api/auth/google", None, None).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }
}
