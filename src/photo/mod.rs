use axum::{
    extract::{Multipart, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use chrono::Utc;
use serde::Deserialize;
use serde_json::json;
use tracing::{debug, info};

use crate::auth::AuthUser;
use crate::error::AppError;
use crate::media::{ResourceType, Upload};
use crate::server::AppState;
use crate::tour::ensure_day_owner;
use crate::user::{profile_of, UserProfile};

#[derive(Deserialize)]
pub struct PhotoRequest {
    pub link: String,
    pub dayid: i64,
}

/// Multipart fields of an upload, read before any validation happens.
#[derive(Default)]
struct UploadForm {
    bytes: Vec<u8>,
    file_name: Option<String>,
    content_type: Option<String>,
    day_id: Option<i64>,
}

fn failure(status: StatusCode, message: impl Into<String>) -> Response {
    (status, Json(json!({ "success": false, "message": message.into() }))).into_response()
}

/// Records a link to an image hosted elsewhere.
pub async fn add(
    State(state): State<AppState>,
    user: AuthUser,
    Json(payload): Json<PhotoRequest>,
) -> Result<Json<UserProfile>, AppError> {
    let link = payload.link.trim();
    if link.is_empty() {
        return Err(AppError::BadRequest("Photo link is required".to_string()));
    }
    ensure_day_owner(&state, payload.dayid, &user).await?;
    state.database.add_photo(payload.dayid, link).await?;
    Ok(Json(profile_of(&state, user.id).await?))
}

async fn read_form(mut multipart: Multipart) -> Result<UploadForm, AppError> {
    let mut form = UploadForm::default();

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| AppError::BadRequest(format!("Invalid multipart body: {e}")))?
    {
        let name = field.name().unwrap_or_default().to_string();
        match name.as_str() {
            "file" => {
                form.file_name = field.file_name().map(str::to_string);
                form.content_type = field.content_type().map(str::to_string);
                form.bytes = field
                    .bytes()
                    .await
                    .map_err(|e| AppError::BadRequest(format!("Failed to read file: {e}")))?
                    .to_vec();
            }
            "dayid" => {
                let text = field
                    .text()
                    .await
                    .map_err(|e| AppError::BadRequest(format!("Failed to read dayid: {e}")))?;
                let day_id = text
                    .trim()
                    .parse()
                    .map_err(|_| AppError::BadRequest(format!("Invalid dayid: {text}")))?;
                form.day_id = Some(day_id);
            }
            _ => {}
        }
    }

    Ok(form)
}

/// Uploads an image for a day, stores it and charges for it.
pub async fn upload(
    State(state): State<AppState>,
    user: AuthUser,
    multipart: Multipart,
) -> Result<Response, AppError> {
    let form = read_form(multipart).await?;

    if form.bytes.is_empty() {
        return Err(AppError::BadRequest("No file provided or file is empty".to_string()));
    }
    let day_id = form
        .day_id
        .ok_or_else(|| AppError::BadRequest("dayid is required".to_string()))?;

    match state.database.day_owner(day_id).await? {
        None => return Ok(failure(StatusCode::BAD_REQUEST, format!("Day not found with id: {day_id}"))),
        Some(owner) if owner != user.id => {
            return Ok(failure(StatusCode::FORBIDDEN, "Day does not belong to you"));
        }
        Some(_) => {}
    }

    let content_type = form.content_type.unwrap_or_default();
    if !content_type.starts_with("image/") {
        debug!(%content_type, "rejected upload");
        return Ok(failure(StatusCode::BAD_REQUEST, "Only image files are allowed"));
    }

    let cost = state.config.ledger.photo_cost;
    crate::ledger::ensure_balance(&state, user.id, cost, "upload a photo").await?;

    let public_id = format!("day_{day_id}_photo_{}", Utc::now().timestamp_millis());
    let photo_url = state
        .media
        .upload(Upload {
            bytes: form.bytes,
            file_name: form.file_name.unwrap_or_else(|| format!("{public_id}.jpg")),
            content_type,
            public_id,
            resource_type: ResourceType::Image,
        })
        .await?;

    let Some(photo_id) = state
        .database
        .add_photo_charged(user.id, day_id, &photo_url, cost)
        .await?
    else {
        let available = state.database.token_balance(user.id).await?;
        return Err(AppError::insufficient(cost, available, Some("upload a photo")));
    };

    info!(photo_id, day_id, user_id = user.id, "photo uploaded");
    Ok(Json(json!({
        "success": true,
        "message": "Photo uploaded successfully",
        "photoId": photo_id,
        "photoUrl": photo_url,
        "dayId": day_id,
    }))
    .into_response())
}
