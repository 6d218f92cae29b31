use axum::{
    async_trait,
    extract::{FromRequestParts, Request, State},
    http::{
        header::{AUTHORIZATION, SET_COOKIE},
        request::Parts,
        HeaderMap, HeaderValue,
    },
    middleware::Next,
    response::{IntoResponse, Response},
};
use axum_extra::extract::cookie::CookieJar;
use tracing::{debug, warn};

use crate::error::AppError;
use crate::server::AppState;

pub const JWT_COOKIE: &str = "jwt";

/// The user a verified session token belongs to.
#[derive(Debug, Clone)]
pub struct AuthUser {
    pub id: i64,
    pub email: String,
    pub name: String,
}

#[async_trait]
impl<S> FromRequestParts<S> for AuthUser
where
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        parts
            .extensions
            .get::<AuthUser>()
            .cloned()
            .ok_or_else(|| AppError::Unauthorized("Invalid token".to_string()))
    }
}

/// Session token from the `jwt` cookie, falling back to `Authorization: Bearer`.
pub fn token_from_headers(headers: &HeaderMap) -> Option<String> {
    let jar = CookieJar::from_headers(headers);
    if let Some(cookie) = jar.get(JWT_COOKIE) {
        if !cookie.value().is_empty() {
            return Some(cookie.value().to_string());
        }
    }

    headers
        .get(AUTHORIZATION)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.strip_prefix("Bearer "))
        .map(|token| token.trim().to_string())
        .filter(|token| !token.is_empty())
}

/// `Set-Cookie` value carrying a session token. A zero max-age clears the cookie.
pub fn session_cookie(token: &str, max_age_secs: i64) -> Result<HeaderValue, AppError> {
    HeaderValue::from_str(&format!(
        "{JWT_COOKIE}={token}; Path=/; Max-Age={max_age_secs}; HttpOnly; Secure; SameSite=None"
    ))
    .map_err(|e| AppError::Internal(format!("Failed to build session cookie: {e}")))
}

async fn authenticate(state: &AppState, headers: &HeaderMap) -> Result<(AuthUser, String), AppError> {
    let token = token_from_headers(headers).ok_or_else(|| {
        AppError::Unauthorized("Unauthorized: Missing or invalid token".to_string())
    })?;

    let email = state
        .jwt
        .extract_subject(&token)
        .map_err(|e| AppError::Unauthorized(e.to_string()))?;

    let user = state
        .database
        .find_user_by_email(&email)
        .await?
        .ok_or_else(|| AppError::Unauthorized(format!("User not found with email: {email}")))?;

    if !state.jwt.validate_token(&token, &user.email) {
        return Err(AppError::Unauthorized(
            "Unauthorized: Missing or invalid token".to_string(),
        ));
    }

    Ok((
        AuthUser {
            id: user.id,
            email: user.email,
            name: user.name,
        },
        token,
    ))
}

/// Re-issues the session cookie when the presented token is close to expiry.
fn refresh_cookie(state: &AppState, user: &AuthUser, token: &str) -> Option<HeaderValue> {
    let remaining = state.jwt.remaining_validity_minutes(token).ok()?;
    if remaining >= state.config.auth.refresh_threshold_minutes {
        debug!(remaining, "session token still fresh");
        return None;
    }

    match state.jwt.generate_token(&user.email) {
        Ok(fresh) => {
            debug!(remaining, user = %user.email, "session token refreshed");
            session_cookie(&fresh, state.jwt.validity_minutes() * 60).ok()
        }
        Err(e) => {
            warn!("failed to refresh session token: {e}");
            None
        }
    }
}

/// Stateless session filter for every non-public route.
pub async fn require_jwt(State(state): State<AppState>, mut req: Request, next: Next) -> Response {
    debug!(path = %req.uri().path(), "jwt filter invoked");

    let (user, token) = match authenticate(&state, req.headers()).await {
        Ok(found) => found,
        Err(e) => {
            debug!(path = %req.uri().path(), "rejected: {e}");
            return e.into_response();
        }
    };

    req.extensions_mut().insert(user.clone());
    let mut response = next.run(req).await;

    // A handler that already set the cookie (login, logout) wins over the refresh.
    if !response.headers().contains_key(SET_COOKIE) {
        if let Some(cookie) = refresh_cookie(&state, &user, &token) {
            response.headers_mut().append(SET_COOKIE, cookie);
        }
    }

    response
}
