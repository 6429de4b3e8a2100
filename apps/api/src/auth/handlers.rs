use axum::{
    extract::State,
    http::{header, StatusCode},
    response::IntoResponse,
    Json,
};
use serde_json::json;

use crate::auth::service::{self, LoginRequest, RegisterRequest};
use crate::auth::Session;
use crate::errors::AppError;
use crate::models::User;
use crate::state::AppState;

/// POST /api/auth/register
pub async fn handle_register(
    State(state): State<AppState>,
    Json(request): Json<RegisterRequest>,
) -> Result<impl IntoResponse, AppError> {
    let user = service::register(state.store.as_ref(), request).await?;
    let cookie = Session::issue_cookie(user.id, state.config.cookie_secure);
    Ok((StatusCode::CREATED, [(header::SET_COOKIE, cookie)], Json(user)))
}

/// POST /api/auth/login
pub async fn handle_login(
    State(state): State<AppState>,
    Json(request): Json<LoginRequest>,
) -> Result<impl IntoResponse, AppError> {
    let user = service::login(state.store.as_ref(), request).await?;
    let cookie = Session::issue_cookie(user.id, state.config.cookie_secure);
    Ok(([(header::SET_COOKIE, cookie)], Json(user)))
}

/// GET /api/auth/me
pub async fn handle_me(
    State(state): State<AppState>,
    session: Session,
) -> Result<Json<User>, AppError> {
    Ok(Json(service::current_user(state.store.as_ref(), session).await?))
}

/// POST /api/auth/logout
///
/// Only clears the client cookie; there is no server-side session to revoke.
pub async fn handle_logout() -> impl IntoResponse {
    (
        [(header::SET_COOKIE, Session::clear_cookie())],
        Json(json!({ "message": "Logged out" })),
    )
}
