//! AI itinerary planning: a free preview and a paid commit.
//!
//! The preview asks Gemini for a round-trip plan priced in Bangladeshi Taka and
//! hands the JSON straight back. The commit turns such a plan (possibly edited by
//! the user) into a stored tour, one token per day.

use axum::{extract::State, Json};
use chrono::Duration;
use serde::Deserialize;
use serde_json::{Map, Value};
use tracing::{debug, info};

use crate::auth::AuthUser;
use crate::error::AppError;
use crate::gemini::{strip_json_fences, GenerationConfig};
use crate::ledger::ensure_balance;
use crate::server::AppState;
use crate::tour::{parse_date, tour_length, NewDay, NewTour};
use crate::user::{profile_of, UserProfile};

/// Exchange rate Gemini is told to assume when it only knows USD prices.
const USD_TO_BDT: f64 = 120.0;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PlanRequest {
    pub start_location: Option<String>,
    pub destination: Option<String>,
    pub start_date: Option<String>,
    pub end_date: Option<String>,
    pub budget: Option<String>,
}

fn required(value: &Option<String>, message: &str) -> Result<String, AppError> {
    match value.as_deref().map(str::trim) {
        Some(v) if !v.is_empty() => Ok(v.to_string()),
        _ => Err(AppError::BadRequest(message.to_string())),
    }
}

pub fn build_prompt(start_location: &str, destination: &str, days: i64, budget: &str, start_date: &str) -> String {
    format!(
        r#"You are a travel assistant AI. Create a detailed {days}-day ROUND-TRIP itinerary that:
  - STARTS in {start_location},
  - TRAVELS to {destination},
  - and RETURNS to {start_location} by the end of the trip.

Budget level: {budget}.
Use calendar dates starting from {start_date} (yyyy-MM-dd).
For currency, ALWAYS give Bangladeshi Taka (BDT) values for costs, using an approximate conversion of
1 USD = {USD_TO_BDT:.2} BDT when needed.

HARD REQUIREMENTS:
- Day 1 must include transit from {start_location} to {destination} (a realistic transport option AND its cost in BDT).
- The FINAL day must include transit from {destination} back to {start_location} (transport option AND cost in BDT).
- Each day must contain:
    - "date" (yyyy-MM-dd)
    - "title" (short summary)
    - "transportation" (the day's movement; long-haul legs go on Day 1 and the final day)
    - "transportationCostBdt" (number, estimated)
    - "hotel" (name or suggestion; may repeat across days)
    - "hotelCostBdt" (number for that night; 0 if not applicable)
    - "activities": array of objects like
        {{"name": "Visit XYZ", "timeOfDay": "morning|afternoon|evening", "costBdt": 0}}
      where costBdt is always present (0 when free)
    - "dailyTotalBdt": transportationCostBdt + hotelCostBdt + sum of activity costBdt

ALSO RETURN a top-level "tripTotalBdt": the sum of dailyTotalBdt over all days.

OUTPUT FORMAT:
Return ONLY valid JSON (no markdown) with exactly this schema:

{{
  "days": [
    {{
      "date": "2025-08-15",
      "title": "Arrival and sightseeing",
      "transportation": "Bus from START to DEST, taxi to hotel",
      "transportationCostBdt": 0,
      "hotel": "Hotel Sunshine",
      "hotelCostBdt": 0,
      "activities": [
        {{"name": "Visit the Old Town", "timeOfDay": "morning", "costBdt": 0}},
        {{"name": "Lunch at a local restaurant", "timeOfDay": "afternoon", "costBdt": 1500}}
      ],
      "dailyTotalBdt": 0
    }}
  ],
  "tripTotalBdt": 0
}}

Make the plan realistic for the given budget and city.
"#
    )
}

pub async fn preview(
    State(state): State<AppState>,
    _user: AuthUser,
    Json(req): Json<PlanRequest>,
) -> Result<Json<Value>, AppError> {
    let start_location = required(&req.start_location, "Start location is required")?;
    let destination = required(&req.destination, "Destination is required")?;
    let start_date = required(&req.start_date, "Start date is required")?;
    let end_date = required(&req.end_date, "End date is required")?;

    let start = parse_date(&start_date)?;
    let end = parse_date(&end_date)?;
    let days = tour_length(start, end)?;

    let budget = req.budget.clone().unwrap_or_default();
    let prompt = build_prompt(&start_location, &destination, days, &budget, &start_date);
    debug!(days, "requesting plan preview");

    let text = state.gemini.generate(&prompt, &GenerationConfig::PLAN).await?;
    let mut plan: Map<String, Value> = serde_json::from_str(strip_json_fences(&text))
        .map_err(|e| AppError::Internal(format!("Failed to parse Gemini response as JSON: {e}")))?;

    plan.insert("startLocation".to_string(), Value::from(req.start_location));
    plan.insert("destination".to_string(), Value::from(req.destination));
    plan.insert("startDate".to_string(), Value::from(req.start_date));
    plan.insert("endDate".to_string(), Value::from(req.end_date));
    plan.insert("budget".to_string(), Value::from(req.budget));

    Ok(Json(Value::Object(plan)))
}

pub async fn commit(
    State(state): State<AppState>,
    user: AuthUser,
    Json(plan): Json<Value>,
) -> Result<Json<UserProfile>, AppError> {
    let plan = plan
        .as_object()
        .ok_or_else(|| AppError::BadRequest("Plan must be a JSON object".to_string()))?;

    let day_count = plan.get("days").and_then(Value::as_array).map_or(0, Vec::len) as i64;
    let cost = day_count * state.config.ledger.tour_cost_per_day;
    let action = format!("start this {day_count}-day tour");
    ensure_balance(&state, user.id, cost, &action).await?;

    let tour = plan_to_tour(plan)?;

    match state.database.create_tour(user.id, &tour, cost).await? {
        Some(tour_id) => {
            info!(tour_id, user_id = user.id, days = day_count, cost, "plan committed");
            Ok(Json(profile_of(&state, user.id).await?))
        }
        None => {
            let available = state.database.token_balance(user.id).await?;
            Err(AppError::insufficient(cost, available, Some(&action)))
        }
    }
}

/// Converts a plan object into a tour ready to insert.
pub fn plan_to_tour(plan: &Map<String, Value>) -> Result<NewTour, AppError> {
    let field = |key: &str| opt_string(plan, key).filter(|v| !v.trim().is_empty());

    let destination = field("destination")
        .ok_or_else(|| AppError::BadRequest("Destination is required".to_string()))?;
    let start_date = field("startDate")
        .ok_or_else(|| AppError::BadRequest("Start date is required".to_string()))?;
    let end_date = field("endDate")
        .ok_or_else(|| AppError::BadRequest("End date is required".to_string()))?;
    let first_day = parse_date(&start_date).ok();

    let days = plan
        .get("days")
        .and_then(Value::as_array)
        .map(|days| days.as_slice())
        .unwrap_or_default()
        .iter()
        .enumerate()
        .filter_map(|(index, day)| {
            let day = day.as_object()?;
            let date = opt_string(day, "date")
                .filter(|d| !d.trim().is_empty())
                .or_else(|| {
                    first_day.map(|d| (d + Duration::days(index as i64)).format("%Y-%m-%d").to_string())
                })
                .unwrap_or_else(|| start_date.clone());
            Some(NewDay {
                date,
                activities: day_activities(day),
            })
        })
        .collect();

    Ok(NewTour {
        title: field("title"),
        start_location: field("startLocation"),
        destination,
        start_date,
        end_date,
        budget: opt_string(plan, "budget"),
        days,
    })
}

/// Activity descriptions for one plan day, with transport and hotel entries on top.
pub fn day_activities(day: &Map<String, Value>) -> Vec<String> {
    let mut activities: Vec<String> = day
        .get("activities")
        .and_then(Value::as_array)
        .map(|list| list.iter().filter_map(Value::as_object).map(describe_activity).collect())
        .unwrap_or_default();

    let transport = synthetic_entry(day, "Transport", "transportation", "transportationCostBdt", "transportation_cost_bdt");
    let has_transport = transport.is_some();
    if let Some(entry) = transport {
        activities.insert(0, entry);
    }

    if let Some(entry) = synthetic_entry(day, "Hotel", "hotel", "hotelCostBdt", "hotel_cost_bdt") {
        activities.insert(usize::from(has_transport), entry);
    }

    activities
}

fn synthetic_entry(day: &Map<String, Value>, label: &str, text_key: &str, camel: &str, snake: &str) -> Option<String> {
    let text = opt_string(day, text_key).filter(|t| has_text(t));
    let cost = read_number(day, &[camel, snake]);

    if text.is_none() && !cost.is_some_and(|c| c > 0.0) {
        return None;
    }

    Some(format!(
        "{label}: {} - Cost: {}",
        text.as_deref().unwrap_or("—"),
        cost.map_or_else(|| "৳0".to_string(), format_bdt)
    ))
}

/// "Name (timeOfDay) - Cost: ৳N" for one Gemini activity object.
pub fn describe_activity(activity: &Map<String, Value>) -> String {
    let name = opt_string(activity, "description")
        .filter(|n| has_text(n))
        .or_else(|| opt_string(activity, "name"));
    let time_of_day = opt_string(activity, "timeOfDay").filter(|t| has_text(t));

    let bdt = ["costBdt", "cost_bdt", "priceBdt", "price_bdt"]
        .iter()
        .find_map(|key| activity.get(*key).filter(|v| !v.is_null()))
        .and_then(|value| match value {
            Value::Number(n) => n.as_f64(),
            other => value_text(other)
                .chars()
                .filter(|c| c.is_ascii_digit() || *c == '.')
                .collect::<String>()
                .parse::<f64>()
                .ok(),
        })
        .map(format_bdt);

    let mut out = name.unwrap_or_default();
    if let Some(time) = time_of_day {
        out.push_str(&format!(" ({time})"));
    }

    let cost = bdt
        .or_else(|| opt_string(activity, "cost").filter(|c| has_text(c)))
        .unwrap_or_else(|| "৳0".to_string());
    out.push_str(&format!(" - Cost: {cost}"));
    out
}

/// First key that holds a number, or a string with a number in it.
pub fn read_number(map: &Map<String, Value>, keys: &[&str]) -> Option<f64> {
    keys.iter().find_map(|key| match map.get(*key)? {
        Value::Null => None,
        Value::Number(n) => n.as_f64(),
        other => {
            let digits: String = value_text(other)
                .chars()
                .filter(|c| c.is_ascii_digit() || *c == '.' || *c == '-')
                .collect();
            if has_text(&digits) {
                digits.parse().ok()
            } else {
                None
            }
        }
    })
}

/// Rounds half up, like the prices shown in the frontend.
pub fn format_bdt(value: f64) -> String {
    format!("৳{}", (value + 0.5).floor() as i64)
}

fn has_text(value: &str) -> bool {
    !value.trim().is_empty()
}

fn value_text(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

fn opt_string(map: &Map<String, Value>, key: &str) -> Option<String> {
    match map.get(key)? {
        Value::Null => None,
        other => Some(value_text(other)),
    }
}
