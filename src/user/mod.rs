use axum::{
    extract::State,
    http::header::SET_COOKIE,
    response::{IntoResponse, Response},
    Json,
};
use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::{info, warn};

use crate::auth::{session_cookie, AuthUser};
use crate::error::AppError;
use crate::server::AppState;
use crate::tour::Tour;

/// Row from `users`. Holds the password hash, so it is never serialized.
#[derive(Debug, Clone)]
pub struct UserRecord {
    pub id: i64,
    pub name: String,
    pub email: String,
    pub password_hash: String,
    pub token: i64,
}

/// A user together with the full tour graph. Most mutating endpoints answer with this.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct UserProfile {
    pub id: i64,
    pub name: String,
    pub email: String,
    pub token: i64,
    pub tours: Vec<Tour>,
}

#[derive(Deserialize)]
pub struct SignupRequest {
    #[serde(default)]
    pub name: String,
    pub email: String,
    pub password: String,
}

#[derive(Deserialize)]
pub struct LoginRequest {
    pub email: String,
    pub password: String,
}

/// Loads the caller's profile, mapping a vanished account to 404.
pub async fn profile_of(state: &AppState, user_id: i64) -> Result<UserProfile, AppError> {
    state
        .database
        .load_profile(user_id)
        .await?
        .ok_or_else(|| AppError::NotFound("User not found".to_string()))
}

pub async fn signup(
    State(state): State<AppState>,
    Json(payload): Json<SignupRequest>,
) -> Result<Json<UserProfile>, AppError> {
    let email = payload.email.trim();
    if email.is_empty() || payload.password.is_empty() {
        return Err(AppError::BadRequest("Email and password are required".to_string()));
    }

    if state.database.find_user_by_email(email).await?.is_some() {
        return Err(AppError::Conflict("User with this email already exists".to_string()));
    }

    let user_id = match state
        .database
        .create_user(payload.name.trim(), email, &payload.password)
        .await
    {
        Ok(id) => id,
        Err(sqlx::Error::Database(e)) if e.is_unique_violation() => {
            return Err(AppError::Conflict("User with this email already exists".to_string()));
        }
        Err(e) => return Err(e.into()),
    };

    info!(user_id, "user registered");
    Ok(Json(profile_of(&state, user_id).await?))
}

pub async fn login(
    State(state): State<AppState>,
    Json(payload): Json<LoginRequest>,
) -> Result<Response, AppError> {
    let Some(user) = state
        .database
        .authenticate_user(payload.email.trim(), &payload.password)
        .await?
    else {
        warn!("failed login attempt");
        return Err(AppError::Unauthorized("Login failed".to_string()));
    };

    let token = state
        .jwt
        .generate_token(&user.email)
        .map_err(|e| AppError::Internal(e.to_string()))?;
    let cookie = session_cookie(&token, state.config.auth.login_cookie_minutes * 60)?;
    let profile = profile_of(&state, user.id).await?;

    info!(user_id = user.id, "user logged in");
    Ok(([(SET_COOKIE, cookie)], Json(profile)).into_response())
}

pub async fn logout(_user: AuthUser) -> Result<Response, AppError> {
    let cookie = session_cookie("", 0)?;
    Ok((
        [(SET_COOKIE, cookie)],
        Json(json!({ "message": "Logged out successfully" })),
    )
        .into_response())
}

pub async fn me(State(state): State<AppState>, user: AuthUser) -> Result<Json<UserProfile>, AppError> {
    Ok(Json(profile_of(&state, user.id).await?))
}

pub async fn get_name(user: AuthUser) -> Json<serde_json::Value> {
    Json(json!({ "name": user.name }))
}

pub async fn token(State(state): State<AppState>, user: AuthUser) -> Result<Json<serde_json::Value>, AppError> {
    let tokens = state.database.token_balance(user.id).await?;
    Ok(Json(json!({ "tokens": tokens })))
}

pub async fn hello() -> &'static str {
    "Hello, journeyGenie!"
}
