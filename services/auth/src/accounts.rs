//! Password hashing, registration and login

use anyhow::Result;
use argon2::{Argon2, PasswordHash, PasswordHasher, PasswordVerifier, password_hash::SaltString};
use marketplace::{
    DomainError,
    models::{NewUser, NewWorkerProfile, Role, User},
    store::{Store, UserStore},
};
use serde::Deserialize;
use tracing::info;

use crate::{
    error::{AuthError, AuthResult},
    validation::{normalize_email, validate_email, validate_name, validate_password, validate_phone},
};

/// Hash a password with a fresh salt
pub fn hash_password(password: &str) -> Result<String> {
    let salt = SaltString::generate(&mut rand::thread_rng());
    let hash = Argon2::default()
        .hash_password(password.as_bytes(), &salt)
        .map_err(|e| anyhow::anyhow!("Failed to hash password: {}", e))?
        .to_string();

    Ok(hash)
}

/// Check a password against a stored hash; an unparseable hash never matches
pub fn verify_password(password: &str, password_hash: &str) -> bool {
    PasswordHash::new(password_hash)
        .map(|parsed| {
            Argon2::default()
                .verify_password(password.as_bytes(), &parsed)
                .is_ok()
        })
        .unwrap_or(false)
}

/// Registration request
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Registration {
    pub name: String,
    pub email: String,
    pub password: String,
    #[serde(default)]
    pub phone: Option<String>,
    /// `customer` (default) or `worker`; admins are never self-registered
    #[serde(default)]
    pub role: Option<Role>,
    /// Required for workers
    #[serde(default)]
    pub worker: Option<NewWorkerProfile>,
}

/// Validate and store a new account
pub async fn register(store: &dyn Store, registration: Registration) -> AuthResult<User> {
    validate_name(&registration.name).map_err(AuthError::Validation)?;
    let email = normalize_email(&registration.email);
    validate_email(&email).map_err(AuthError::Validation)?;
    validate_password(&registration.password).map_err(AuthError::Validation)?;
    if let Some(phone) = &registration.phone {
        validate_phone(phone).map_err(AuthError::Validation)?;
    }

    let role = registration.role.unwrap_or(Role::Customer);
    let profile = match role {
        Role::Customer => None,
        Role::Worker => match registration.worker {
            Some(profile) if !profile.services.is_empty() => Some(profile),
            _ => {
                return Err(AuthError::Validation(
                    "Workers must offer at least one service".to_string(),
                ));
            }
        },
        Role::Admin => {
            return Err(AuthError::Forbidden(
                "Admin accounts cannot be self-registered".to_string(),
            ));
        }
    };

    let user = store
        .insert_user(
            NewUser {
                name: registration.name.trim().to_string(),
                email,
                password_hash: hash_password(&registration.password)?,
                role,
                phone: registration.phone,
            },
            profile,
        )
        .await?;

    info!(user_id = %user.id, role = %user.role, "Registered user");
    Ok(user)
}

/// Look up an active account by email and password
pub async fn authenticate(store: &dyn Store, email: &str, password: &str) -> AuthResult<User> {
    let user = store
        .find_user_by_email(&normalize_email(email))
        .await?
        .ok_or_else(AuthError::invalid_credentials)?;

    if !verify_password(password, &user.password_hash) {
        return Err(AuthError::invalid_credentials());
    }

    if !user.is_active {
        return Err(AuthError::Forbidden("Account is deactivated".to_string()));
    }

    Ok(user)
}

/// Create the configured admin account unless the email is already taken
pub async fn seed_admin(store: &dyn Store, email: &str, password: &str) -> Result<()> {
    let email = normalize_email(email);
    if store.find_user_by_email(&email).await?.is_some() {
        return Ok(());
    }

    let inserted = store
        .insert_user(
            NewUser {
                name: "Administrator".to_string(),
                email: email.clone(),
                password_hash: hash_password(password)?,
                role: Role::Admin,
                phone: None,
            },
            None,
        )
        .await;

    match inserted {
        Ok(user) => {
            info!(user_id = %user.id, "Seeded admin account");
            Ok(())
        }
        // Another instance seeded it first
        Err(DomainError::Conflict(_)) => Ok(()),
        Err(e) => Err(e.into()),
    }
}
