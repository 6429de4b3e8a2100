use serde::Deserialize;
use tracing::info;

use crate::auth::password::{hash_password, verify_password, MIN_PASSWORD_LEN};
use crate::auth::Session;
use crate::errors::AppError;
use crate::models::User;
use crate::store::{Store, StoreError};

#[derive(Debug, Default, Deserialize)]
pub struct RegisterRequest {
    #[serde(default)]
    pub username: String,
    #[serde(default)]
    pub email: String,
    #[serde(default)]
    pub password: String,
}

#[derive(Debug, Default, Deserialize)]
pub struct LoginRequest {
    #[serde(default)]
    pub email: String,
    #[serde(default)]
    pub password: String,
}

fn duplicate_message(field: &str) -> String {
    match field {
        "username" => "Username already taken".to_string(),
        _ => "Email already in use".to_string(),
    }
}

/// Creates a user. The caller issues the session cookie for the returned id.
pub async fn register(store: &dyn Store, request: RegisterRequest) -> Result<User, AppError> {
    let username = request.username.trim().to_string();
    let email = request.email.trim().to_string();

    if username.is_empty() || email.is_empty() || request.password.is_empty() {
        return Err(AppError::Validation("Missing required fields".to_string()));
    }
    if request.password.chars().count() < MIN_PASSWORD_LEN {
        return Err(AppError::Validation(format!(
            "Password must be at least {MIN_PASSWORD_LEN} characters long"
        )));
    }

    if let Some(existing) = store
        .find_user_by_email_or_username(&email, &username)
        .await?
    {
        let field = if existing.email == email { "email" } else { "username" };
        return Err(AppError::Conflict(duplicate_message(field)));
    }

    let password_hash = hash_password(request.password).await?;
    let user = User::new(username, email, password_hash);

    // The unique constraints still catch a concurrent registration that won the race.
    store.insert_user(&user).await.map_err(|e| match e {
        StoreError::Duplicate(field) => AppError::Conflict(duplicate_message(field)),
        other => AppError::Database(other),
    })?;

    info!("Registered user {} ({})", user.username, user.id);
    Ok(user)
}

pub async fn login(store: &dyn Store, request: LoginRequest) -> Result<User, AppError> {
    let email = request.email.trim();
    if email.is_empty() || request.password.is_empty() {
        return Err(AppError::Validation(
            "Missing email or password".to_string(),
        ));
    }

    let invalid = || AppError::Unauthorized("Invalid credentials".to_string());

    let user = store.find_user_by_email(email).await?.ok_or_else(invalid)?;
    if !verify_password(request.password, user.password_hash.clone()).await? {
        info!("Rejected login for user {}", user.id);
        return Err(invalid());
    }

    info!("User authenticated: {}", user.id);
    Ok(user)
}

/// Resolves the session to its user. A session for a vanished user is unauthorized.
///
/// Write paths call this before inserting rows that reference the user.
pub async fn current_user(store: &dyn Store, session: Session) -> Result<User, AppError> {
    store
        .find_user_by_id(session.user_id)
        .await?
        .ok_or_else(AppError::unauthorized)
}
