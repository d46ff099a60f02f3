//! Public contact form

use axum::{extract::State, http::StatusCode, response::IntoResponse};
use marketplace::{
    DomainError,
    models::NewContactMessage,
    store::AdminStore,
};
use serde::Deserialize;
use tracing::info;

use super::success;
use crate::{
    error::{ApiResult, AppJson},
    state::AppState,
};

const MAX_MESSAGE_LEN: usize = 5000;

#[derive(Debug, Deserialize)]
pub struct ContactRequest {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub email: String,
    #[serde(default)]
    pub subject: Option<String>,
    #[serde(default)]
    pub message: String,
}

impl ContactRequest {
    fn validate(self) -> Result<NewContactMessage, DomainError> {
        let name = self.name.trim();
        let email = self.email.trim().to_lowercase();
        let message = self.message.trim();

        if name.is_empty() || email.is_empty() || message.is_empty() {
            return Err(DomainError::Validation(
                "name, email and message are required".to_string(),
            ));
        }
        if !looks_like_email(&email) {
            return Err(DomainError::Validation("Invalid email address".to_string()));
        }
        if message.chars().count() > MAX_MESSAGE_LEN {
            return Err(DomainError::Validation("Message is too long".to_string()));
        }

        Ok(NewContactMessage {
            name: name.to_string(),
            email,
            subject: self
                .subject
                .map(|s| s.trim().to_string())
                .filter(|s| !s.is_empty()),
            message: message.to_string(),
        })
    }
}

fn looks_like_email(email: &str) -> bool {
    match email.split_once('@') {
        Some((local, domain)) => {
            !local.is_empty()
                && !domain.contains('@')
                && domain
                    .split_once('.')
                    .is_some_and(|(host, tld)| !host.is_empty() && !tld.is_empty())
        }
        None => false,
    }
}

pub async fn submit(
    State(state): State<AppState>,
    AppJson(request): AppJson<ContactRequest>,
) -> ApiResult<impl IntoResponse> {
    let message = request.validate()?;
    let contact = state.store.insert_contact(message).await?;
    info!(contact_id = %contact.id, "Contact message received");

    Ok((StatusCode::CREATED, success(contact)))
}
