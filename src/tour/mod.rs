//! Tours, their days and activities.
//!
//! The structs mirror the JSON the frontend expects (camelCase, nested
//! `days -> activities/photos`). Handlers here are the hand-editing endpoints; the
//! AI planner lives in `plan`.

use axum::{
    extract::{Path, State},
    Json,
};
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::auth::AuthUser;
use crate::error::AppError;
use crate::server::AppState;
use crate::user::{profile_of, UserProfile};

pub const STATUS_DONE: &str = "done";

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Tour {
    pub id: i64,
    pub title: Option<String>,
    pub start_location: Option<String>,
    pub destination: String,
    pub start_date: String,
    pub end_date: String,
    pub budget: Option<String>,
    pub video: Option<String>,
    pub blog: Option<String>,
    pub days: Vec<Day>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Day {
    pub id: i64,
    pub date: String,
    pub activities: Vec<Activity>,
    pub photos: Vec<Photo>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Activity {
    pub id: i64,
    pub description: Option<String>,
    pub status: String,
}

impl Activity {
    pub fn is_done(&self) -> bool {
        self.status.eq_ignore_ascii_case(STATUS_DONE)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Photo {
    pub id: i64,
    pub link: Option<String>,
}

/// A tour that has not been stored yet.
#[derive(Debug, Clone)]
pub struct NewTour {
    pub title: Option<String>,
    pub start_location: Option<String>,
    pub destination: String,
    pub start_date: String,
    pub end_date: String,
    pub budget: Option<String>,
    pub days: Vec<NewDay>,
}

#[derive(Debug, Clone)]
pub struct NewDay {
    pub date: String,
    pub activities: Vec<String>,
}

#[derive(Deserialize)]
pub struct TitleRequest {
    pub tourid: i64,
    pub title: String,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateTourRequest {
    pub title: Option<String>,
    pub start_location: Option<String>,
    pub destination: String,
    pub start_date: String,
    pub end_date: String,
    pub budget: Option<String>,
}

#[derive(Deserialize)]
pub struct ActivityRequest {
    pub description: String,
    pub dayid: i64,
}

pub fn parse_date(value: &str) -> Result<NaiveDate, AppError> {
    NaiveDate::parse_from_str(value.trim(), "%Y-%m-%d")
        .map_err(|_| AppError::BadRequest(format!("Invalid date: {value}")))
}

/// Longest trip, in days, that can be planned or created.
pub const MAX_TOUR_DAYS: i64 = 366;

/// Number of days from `start` to `end`, both included, within `1..=MAX_TOUR_DAYS`.
pub fn tour_length(start: NaiveDate, end: NaiveDate) -> Result<i64, AppError> {
    let days = (end - start).num_days() + 1;
    if !(1..=MAX_TOUR_DAYS).contains(&days) {
        return Err(AppError::BadRequest("Invalid date range".to_string()));
    }
    Ok(days)
}

/// Every date from `start` to `end`, both included, as `yyyy-MM-dd`.
pub fn days_in_range(start: NaiveDate, end: NaiveDate) -> Vec<String> {
    start
        .iter_days()
        .take_while(|day| *day <= end)
        .map(|day| day.format("%Y-%m-%d").to_string())
        .collect()
}

fn check_owner(owner: Option<i64>, user: &AuthUser, what: &str) -> Result<(), AppError> {
    match owner {
        None => Err(AppError::NotFound(format!("{what} not found"))),
        Some(owner) if owner != user.id => {
            Err(AppError::Forbidden(format!("{what} does not belong to you")))
        }
        Some(_) => Ok(()),
    }
}

pub async fn ensure_tour_owner(state: &AppState, tour_id: i64, user: &AuthUser) -> Result<(), AppError> {
    check_owner(state.database.tour_owner(tour_id).await?, user, "Tour")
}

pub async fn ensure_day_owner(state: &AppState, day_id: i64, user: &AuthUser) -> Result<(), AppError> {
    check_owner(state.database.day_owner(day_id).await?, user, "Day")
}

pub async fn update_title(
    State(state): State<AppState>,
    user: AuthUser,
    Json(payload): Json<TitleRequest>,
) -> Result<Json<UserProfile>, AppError> {
    ensure_tour_owner(&state, payload.tourid, &user).await?;
    state
        .database
        .update_tour_title(payload.tourid, payload.title.trim())
        .await?;
    Ok(Json(profile_of(&state, user.id).await?))
}

pub async fn create_tour(
    State(state): State<AppState>,
    user: AuthUser,
    Json(payload): Json<CreateTourRequest>,
) -> Result<Json<UserProfile>, AppError> {
    if payload.destination.trim().is_empty() {
        return Err(AppError::BadRequest("Destination is required".to_string()));
    }
    let start = parse_date(&payload.start_date)?;
    let end = parse_date(&payload.end_date)?;
    tour_length(start, end)?;

    let tour = NewTour {
        title: payload.title,
        start_location: payload.start_location,
        destination: payload.destination.trim().to_string(),
        start_date: payload.start_date.trim().to_string(),
        end_date: payload.end_date.trim().to_string(),
        budget: payload.budget,
        days: days_in_range(start, end)
            .into_iter()
            .map(|date| NewDay {
                date,
                activities: Vec::new(),
            })
            .collect(),
    };

    let tour_id = state
        .database
        .create_tour(user.id, &tour, 0)
        .await?
        .ok_or_else(|| AppError::Internal("Failed to create tour".to_string()))?;

    info!(tour_id, user_id = user.id, "tour created by hand");
    Ok(Json(profile_of(&state, user.id).await?))
}

pub async fn delete_tour(
    State(state): State<AppState>,
    user: AuthUser,
    Path(tour_id): Path<i64>,
) -> Result<Json<UserProfile>, AppError> {
    ensure_tour_owner(&state, tour_id, &user).await?;
    state.database.delete_tour(tour_id).await?;
    info!(tour_id, user_id = user.id, "tour deleted");
    Ok(Json(profile_of(&state, user.id).await?))
}

pub async fn add_activity(
    State(state): State<AppState>,
    user: AuthUser,
    Json(payload): Json<ActivityRequest>,
) -> Result<Json<UserProfile>, AppError> {
    ensure_day_owner(&state, payload.dayid, &user).await?;
    state
        .database
        .add_activity(payload.dayid, payload.description.trim())
        .await?;
    Ok(Json(profile_of(&state, user.id).await?))
}

pub async fn complete_activity(
    State(state): State<AppState>,
    user: AuthUser,
    Path(activity_id): Path<i64>,
) -> Result<Json<UserProfile>, AppError> {
    check_owner(state.database.activity_owner(activity_id).await?, &user, "Activity")?;
    state.database.complete_activity(activity_id).await?;
    Ok(Json(profile_of(&state, user.id).await?))
}
