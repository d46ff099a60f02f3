use std::sync::{Arc, OnceLock};

use anyhow::Result;
use axum::http::{HeaderValue, Method, header};
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use tracing::info;

mod error;
mod middleware;
mod realtime;
mod routes;
mod settings;
mod state;

use common::{
    database::{DatabaseConfig, health_check, init_pool, run_migrations},
    jwt::{JwtConfig, JwtService},
};
use marketplace::{
    payment::{RazorpayConfig, RazorpayGateway},
    store::PgStore,
};

use crate::{settings::Settings, state::AppState};

/// Set once at startup; error bodies carry debug detail when true
pub static DEVELOPMENT: OnceLock<bool> = OnceLock::new();

#[tokio::main]
async fn main() -> Result<()> {
    common::telemetry::init_tracing("api");

    info!("Starting API service");

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
    let gateway = Arc::new(RazorpayGateway::new(RazorpayConfig::from_env()?)?);
    let jwt = JwtService::new(JwtConfig::from_env()?);

    let app_state = AppState::new(store, gateway, jwt, settings.commission_rate);
    info!(commission_rate = %settings.commission_rate, "API service initialized successfully");

    let cors = CorsLayer::new()
        .allow_origin(settings.frontend_url.parse::<HeaderValue>()?)
        .allow_methods([Method::GET, Method::POST, Method::PATCH, Method::OPTIONS])
        .allow_headers([header::AUTHORIZATION, header::CONTENT_TYPE])
        .allow_credentials(true);

    let app = routes::create_router(app_state)
        .layer(cors)
        .layer(TraceLayer::new_for_http());

    let addr = format!("0.0.0.0:{}", settings.port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    info!("API service listening on {}", addr);

    axum::serve(listener, app).await?;

    Ok(())
}
