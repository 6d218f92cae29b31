//! Slideshow videos from a tour's photos.
//!
//! Frames are downloaded into a scratch directory, stitched with ffmpeg's concat
//! demuxer and the resulting MP4 is uploaded as a video resource.

use axum::{
    extract::{Path, State},
    Json,
};
use std::path::{Path as FsPath, PathBuf};
use tokio::process::Command;
use tracing::{debug, info, warn};

use crate::auth::AuthUser;
use crate::error::AppError;
use crate::ledger::ensure_balance;
use crate::media::{ResourceType, Upload};
use crate::server::AppState;
use crate::tour::Tour;
use crate::user::{profile_of, UserProfile};

const ACTION: &str = "generate a video";

/// Photo links in slideshow order: days by date string, photos by id.
pub fn collect_frame_urls(tour: &Tour) -> Vec<String> {
    let mut days: Vec<_> = tour.days.iter().collect();
    days.sort_by(|a, b| a.date.cmp(&b.date));

    days.into_iter()
        .flat_map(|day| {
            let mut photos: Vec<_> = day.photos.iter().collect();
            photos.sort_by_key(|photo| photo.id);
            photos
                .into_iter()
                .filter_map(|photo| photo.link.as_deref())
                .filter(|link| !link.trim().is_empty())
                .map(str::to_string)
                .collect::<Vec<_>>()
        })
        .collect()
}

/// Quotes a path for a concat list entry.
fn escape_concat_path(path: &FsPath) -> String {
    path.display().to_string().replace('\'', "'\\''")
}

/// Concat demuxer input. The last frame is listed twice so its duration is honoured.
pub fn concat_list(frames: &[PathBuf], frame_seconds: f64) -> String {
    let mut list = String::new();
    for frame in frames {
        list.push_str(&format!("file '{}'\n", escape_concat_path(frame)));
        list.push_str(&format!("duration {frame_seconds}\n"));
    }
    if let Some(last) = frames.last() {
        list.push_str(&format!("file '{}'\n", escape_concat_path(last)));
    }
    list
}

pub fn ffmpeg_args(list: &FsPath, output: &FsPath) -> Vec<String> {
    let mut args: Vec<String> = ["-y", "-f", "concat", "-safe", "0", "-i"]
        .iter()
        .map(|arg| arg.to_string())
        .collect();
    args.push(list.display().to_string());
    args.extend(
        ["-vf", "scale=1280:-2,format=yuv420p", "-r", "30", "-movflags", "+faststart"]
            .iter()
            .map(|arg| arg.to_string()),
    );
    args.push(output.display().to_string());
    args
}

async fn download_frames(state: &AppState, urls: &[String], dir: &FsPath) -> Result<Vec<PathBuf>, AppError> {
    let mut frames = Vec::with_capacity(urls.len());
    for (index, url) in urls.iter().enumerate() {
        let response = state
            .http
            .get(url)
            .send()
            .await
            .map_err(|e| AppError::Upstream(format!("Failed to download photo: {e}")))?;
        if !response.status().is_success() {
            return Err(AppError::Upstream(format!(
                "Failed to download photo: {} returned {}",
                url,
                response.status()
            )));
        }
        let bytes = response
            .bytes()
            .await
            .map_err(|e| AppError::Upstream(format!("Failed to download photo: {e}")))?;

        let frame = dir.join(format!("img_{index:05}.jpg"));
        tokio::fs::write(&frame, &bytes)
            .await
            .map_err(|e| AppError::Internal(format!("Failed to write frame: {e}")))?;
        frames.push(frame);
    }
    Ok(frames)
}

async fn render(state: &AppState, tour_id: i64, urls: &[String]) -> Result<Vec<u8>, AppError> {
    // Dropping the TempDir removes the frames and the output on every path.
    let work_dir = tempfile::Builder::new()
        .prefix(&format!("jg-video-{tour_id}-"))
        .tempdir()
        .map_err(|e| AppError::Internal(format!("Failed to create work dir: {e}")))?;

    let frames = download_frames(state, urls, work_dir.path()).await?;

    let list = work_dir.path().join("list.txt");
    tokio::fs::write(&list, concat_list(&frames, state.config.video.frame_seconds))
        .await
        .map_err(|e| AppError::Internal(format!("Failed to write concat list: {e}")))?;

    let output = work_dir.path().join(format!("tour-{tour_id}.mp4"));
    let args = ffmpeg_args(&list, &output);
    debug!(ffmpeg = %state.config.video.ffmpeg_path, ?args, "running ffmpeg");

    let result = Command::new(&state.config.video.ffmpeg_path)
        .args(&args)
        .output()
        .await
        .map_err(|e| AppError::Internal(format!("Failed to start ffmpeg: {e}")))?;

    for line in String::from_utf8_lossy(&result.stderr).lines() {
        debug!("ffmpeg: {line}");
    }

    if !result.status.success() || !output.exists() {
        warn!(tour_id, status = ?result.status.code(), "ffmpeg failed");
        return Err(AppError::Internal("Video encoding failed (ffmpeg)".to_string()));
    }

    tokio::fs::read(&output)
        .await
        .map_err(|e| AppError::Internal(format!("Failed to read rendered video: {e}")))
}

pub async fn generate(
    State(state): State<AppState>,
    user: AuthUser,
    Path(tour_id): Path<i64>,
) -> Result<Json<UserProfile>, AppError> {
    let cost = state.config.ledger.video_cost;
    ensure_balance(&state, user.id, cost, ACTION).await?;

    let tour = state
        .database
        .get_tour(tour_id)
        .await?
        .ok_or_else(|| AppError::BadRequest("Tour not found".to_string()))?;
    match state.database.tour_owner(tour_id).await? {
        Some(owner) if owner == user.id => {}
        _ => return Err(AppError::Forbidden("Forbidden".to_string())),
    }

    let urls = collect_frame_urls(&tour);
    if urls.is_empty() {
        return Err(AppError::BadRequest("No photos found for this tour".to_string()));
    }

    info!(tour_id, frames = urls.len(), "rendering tour video");
    let video = render(&state, tour_id, &urls).await?;

    let video_url = state
        .media
        .upload(Upload {
            bytes: video,
            file_name: format!("tour-{tour_id}.mp4"),
            content_type: "video/mp4".to_string(),
            public_id: format!("tour_{tour_id}_video"),
            resource_type: ResourceType::Video,
        })
        .await?;

    if !state
        .database
        .save_video_charged(user.id, tour_id, &video_url, cost)
        .await?
    {
        let available = state.database.token_balance(user.id).await?;
        return Err(AppError::insufficient(cost, available, Some(ACTION)));
    }

    info!(tour_id, user_id = user.id, "tour video stored");
    Ok(Json(profile_of(&state, user.id).await?))
}
