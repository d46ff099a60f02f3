//! Application state shared across handlers

use std::sync::Arc;

use common::jwt::JwtService;
use marketplace::store::Store;

use crate::{
    oauth::GoogleOAuth, otp::OtpService, rate_limiter::LoginThrottle, session::SessionManager,
    settings::Settings,
};

#[derive(Clone)]
pub struct AppState {
    pub store: Arc<dyn Store>,
    pub jwt: JwtService,
    pub sessions: SessionManager,
    pub throttle: LoginThrottle,
    pub otp: OtpService,
    /// Present only when Google sign-in is configured
    pub google: Option<GoogleOAuth>,
    pub settings: Arc<Settings>,
}
