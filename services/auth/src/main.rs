use std::sync::{Arc, OnceLock};

use anyhow::Result;
use axum::http::{HeaderValue, Method, header};
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use tracing::{info, warn};

mod accounts;
mod error;
mod middleware;
mod oauth;
mod otp;
mod rate_limiter;
mod routes;
mod session;
mod settings;
mod state;
mod validation;

use common::{
    cache::{RedisConfig, RedisPool},
    database::{DatabaseConfig, health_check, init_pool, run_migrations},
    jwt::{JwtConfig, JwtService},
};
use marketplace::store::PgStore;

use crate::{
    oauth::{GoogleOAuth, GoogleOAuthConfig},
    otp::{LogSender, OtpService},
    rate_limiter::{LoginThrottle, ThrottleConfig},
    session::SessionManager,
    settings::Settings,
    state::AppState,
};

/// Set once at startup; error bodies carry debug detail when true
pub static DEVELOPMENT: OnceLock<bool> = OnceLock::new();

#[tokio::main]
async fn main() -> Result<()> {
    common::telemetry::init_tracing("auth");

    info!("Starting authentication service");

    let settings = Settings::load()?;
    let _ = DEVELOPMENT.set(settings.is_development());

    // Initialize database connection pool
    let db_config = DatabaseConfig::from_env()?;
    let pool = init_pool(&db_config).await?;

    if health_check(&pool).await? {
        info!("Database connection successful");
    } else {
        anyhow::bail!("Failed to connect to database");
    }
    run_migrations(&pool).await?;

    let store = Arc::new(PgStore::new(pool));

    if let (Some(email), Some(password)) = (&settings.admin_email, &settings.admin_password) {
        accounts::seed_admin(store.as_ref(), email, password).await?;
    }

    let jwt = JwtService::new(JwtConfig::from_env()?);

    let redis = RedisPool::new(&RedisConfig::from_env()?).await?;
    let sessions = SessionManager::new(Arc::new(redis), jwt.refresh_token_expiry());

    let google = match GoogleOAuthConfig::from_env() {
        Some(config) => Some(GoogleOAuth::new(config)?),
        None => {
            warn!("GOOGLE_CLIENT_ID not set; Google sign-in disabled");
            None
        }
    };

    let throttle = LoginThrottle::new(ThrottleConfig {
        max_failures: settings.login_max_failures,
        lockout: std::time::Duration::from_secs(settings.login_lockout_seconds),
        ..ThrottleConfig::default()
    });

    let app_state = AppState {
        otp: OtpService::new(store.clone(), Arc::new(LogSender), settings.otp_ttl_seconds),
        store,
        jwt,
        sessions,
        throttle,
        google,
        settings: Arc::new(settings.clone()),
    };

    let cors = CorsLayer::new()
        .allow_origin(settings.frontend_url.parse::<HeaderValue>()?)
        .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
        .allow_headers([header::AUTHORIZATION, header::CONTENT_TYPE])
        .allow_credentials(true);

    let app = routes::create_router(app_state)
        .layer(cors)
        .layer(TraceLayer::new_for_http());

    let addr = format!("0.0.0.0:{}", settings.port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    info!("Authentication service listening on {}", addr);

    axum::serve(listener, app).await?;

    Ok(())
}
