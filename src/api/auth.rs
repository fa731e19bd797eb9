//! Login, logout and session introspection.
//!
//! Logout only clears the transport cookie: tokens are stateless, so a
//! bearer token presented directly stays valid until its expiry.

use argon2::password_hash::{PasswordHash, PasswordVerifier};
use argon2::Argon2;
use axum::extract::State;
use axum::http::header::SET_COOKIE;
use axum::response::AppendHeaders;
use axum::Json;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use uuid::Uuid;

use crate::api::AppState;
use crate::auth::{clear_session_cookie, session_cookie, CurrentUser, Role};
use crate::error::{AppError, AppResult};
use crate::middleware::rate_limit::client_key;

#[derive(Debug, Deserialize)]
pub struct LoginRequest {
    pub email: String,
    pub password: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UserInfo {
    pub id: Uuid,
    pub email: String,
    pub display_name: String,
    pub role: String,
}

#[derive(Debug, Serialize)]
pub struct LoginResponse {
    pub token: String,
    pub user: UserInfo,
}

/// POST /api/auth/login
pub async fn login(
    State(state): State<AppState>,
    headers: axum::http::HeaderMap,
    Json(payload): Json<LoginRequest>,
) -> AppResult<(AppendHeaders<[(axum::http::HeaderName, String); 1]>, Json<LoginResponse>)> {
    state
        .limiter
        .admit(
            "auth:login",
            &client_key(&headers),
            state.rate_limits.auth_limit,
            Duration::from_secs(state.rate_limits.auth_window_secs),
        )
        .await?;

    if payload.email.trim().is_empty() || payload.password.is_empty() {
        return Err(AppError::validation("email", "email and password are required"));
    }

    let user = state
        .users
        .find_by_email(&payload.email)
        .await?
        .ok_or_else(|| AppError::unauthorized("Invalid email or password"))?;

    let parsed_hash = PasswordHash::new(&user.password_hash)
        .map_err(|_| AppError::unauthorized("Invalid email or password"))?;
    if Argon2::default()
        .verify_password(payload.password.as_bytes(), &parsed_hash)
        .is_err()
    {
        return Err(AppError::unauthorized("Invalid email or password"));
    }

    let role = Role::from_db(&user.role);
    let (token, _claims) = state
        .tokens
        .issue(user.id, &user.email, role, &user.display_name)?;

    tracing::info!(user_id = %user.id, "user logged in");

    let cookie = session_cookie(
        &token,
        state.auth.session_ttl_secs,
        state.auth.cookie_secure,
    );
    Ok((
        AppendHeaders([(SET_COOKIE, cookie)]),
        Json(LoginResponse {
            token,
            user: UserInfo {
                id: user.id,
                email: user.email,
                display_name: user.display_name,
                role: role.as_str().to_string(),
            },
        }),
    ))
}

/// POST /api/auth/logout — clears the cookie; the token itself stays valid
/// until expiry.
pub async fn logout(
    State(state): State<AppState>,
) -> (AppendHeaders<[(axum::http::HeaderName, String); 1]>, Json<serde_json::Value>) {
    let cookie = clear_session_cookie(state.auth.cookie_secure);
    (
        AppendHeaders([(SET_COOKIE, cookie)]),
        Json(serde_json::json!({ "status": "ok" })),
    )
}

/// GET /api/auth/me
pub async fn me(user: CurrentUser) -> Json<UserInfo> {
    Json(UserInfo {
        id: user.claims.sub,
        email: user.claims.email.clone(),
        display_name: user.claims.name.clone(),
        role: user.claims.role.as_str().to_string(),
    })
}
