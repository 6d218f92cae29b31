//! Token balance endpoints and the balance check shared by paid features.

use axum::{
    extract::{Query, State},
    Json,
};
use serde::Deserialize;
use serde_json::{json, Value};
use tracing::info;

use crate::auth::AuthUser;
use crate::error::AppError;
use crate::server::AppState;

#[derive(Deserialize)]
pub struct TokenQuery {
    pub tokens: i64,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CouponRequest {
    #[serde(default)]
    pub coupon_code: String,
}

/// Fails with the "Insufficient tokens" error unless the balance covers `required`.
///
/// This is only the early answer for the user; the actual charge is re-checked in
/// SQL when the paid write happens.
pub async fn ensure_balance(state: &AppState, user_id: i64, required: i64, action: &str) -> Result<i64, AppError> {
    let available = state.database.token_balance(user_id).await?;
    if available < required {
        return Err(AppError::insufficient(required, available, Some(action)));
    }
    Ok(available)
}

/// Bonus for a coupon code, matched case-insensitively.
pub fn coupon_bonus(state: &AppState, code: &str) -> Option<i64> {
    let code = code.trim();
    state
        .config
        .ledger
        .coupons
        .iter()
        .find(|(known, _)| known.eq_ignore_ascii_case(code))
        .map(|(_, bonus)| *bonus)
}

fn overflow() -> AppError {
    AppError::BadRequest("Token balance would overflow".to_string())
}

fn positive(tokens: i64) -> Result<i64, AppError> {
    if tokens <= 0 {
        return Err(AppError::BadRequest("Token amount must be positive".to_string()));
    }
    Ok(tokens)
}

pub async fn balance(State(state): State<AppState>, user: AuthUser) -> Result<Json<Value>, AppError> {
    let tokens = state.database.token_balance(user.id).await?;
    Ok(Json(json!({ "tokens": tokens })))
}

pub async fn deduct(
    State(state): State<AppState>,
    user: AuthUser,
    Query(query): Query<TokenQuery>,
) -> Result<Json<Value>, AppError> {
    let amount = positive(query.tokens)?;

    match state.database.deduct_tokens(user.id, amount).await? {
        Some(tokens) => Ok(Json(json!({
            "tokens": tokens,
            "message": format!("{amount} tokens deducted successfully"),
        }))),
        None => {
            let available = state.database.token_balance(user.id).await?;
            Err(AppError::insufficient(amount, available, None))
        }
    }
}

pub async fn add(
    State(state): State<AppState>,
    user: AuthUser,
    Query(query): Query<TokenQuery>,
) -> Result<Json<Value>, AppError> {
    let amount = positive(query.tokens)?;
    let tokens = state
        .database
        .add_tokens(user.id, amount)
        .await?
        .ok_or_else(overflow)?;
    info!(user_id = user.id, amount, "tokens added");
    Ok(Json(json!({
        "tokens": tokens,
        "message": format!("{amount} tokens added successfully"),
    })))
}

pub async fn apply_coupon(
    State(state): State<AppState>,
    user: AuthUser,
    Json(payload): Json<CouponRequest>,
) -> Result<Json<Value>, AppError> {
    let bonus = coupon_bonus(&state, &payload.coupon_code)
        .ok_or_else(|| AppError::BadRequest("Invalid coupon code.".to_string()))?;

    let tokens = state
        .database
        .add_tokens(user.id, bonus)
        .await?
        .ok_or_else(overflow)?;
    info!(user_id = user.id, bonus, "coupon applied");
    Ok(Json(json!({
        "tokens": tokens,
        "message": format!("{bonus} tokens added successfully"),
    })))
}
