use axum::{
    extract::{Path, State},
    Json,
};
use chrono::NaiveDate;
use tracing::info;

use crate::auth::AuthUser;
use crate::error::AppError;
use crate::gemini::GenerationConfig;
use crate::ledger::ensure_balance;
use crate::server::AppState;
use crate::tour::{ensure_tour_owner, Day, Tour};
use crate::user::{profile_of, UserProfile};

const ACTION: &str = "generate a blog";

/// Generates a poetic blog for the tour, stores it and charges for it.
pub async fn generate(
    State(state): State<AppState>,
    user: AuthUser,
    Path(tour_id): Path<i64>,
) -> Result<Json<UserProfile>, AppError> {
    let cost = state.config.ledger.blog_cost;
    ensure_balance(&state, user.id, cost, ACTION).await?;
    ensure_tour_owner(&state, tour_id, &user).await?;

    let tour = state
        .database
        .get_tour(tour_id)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("Tour not found with id: {tour_id}")))?;

    let text = state
        .gemini
        .generate(&build_prompt(&tour), &GenerationConfig::BLOG)
        .await?;
    let blog = text.trim();
    if blog.is_empty() {
        return Err(AppError::Upstream("Empty text from Gemini".to_string()));
    }

    if !state.database.save_blog_charged(user.id, tour_id, blog, cost).await? {
        let available = state.database.token_balance(user.id).await?;
        return Err(AppError::insufficient(cost, available, Some(ACTION)));
    }

    info!(tour_id, user_id = user.id, chars = blog.len(), "blog generated");
    Ok(Json(profile_of(&state, user.id).await?))
}

pub fn build_prompt(tour: &Tour) -> String {
    let mut days: Vec<&Day> = tour.days.iter().collect();
    days.sort_by_key(|day| {
        let date = parse(&day.date);
        (date.is_none(), date)
    });

    let mut by_day = String::new();
    for (index, day) in days.iter().enumerate() {
        by_day.push_str(&format!("Day {} ({})\n", index + 1, pretty_date(&day.date)));

        let (done, pending): (Vec<_>, Vec<_>) = day.activities.iter().partition(|a| a.is_done());
        if done.is_empty() && pending.is_empty() {
            by_day.push_str("  * No activities recorded\n\n");
            continue;
        }
        if !done.is_empty() {
            by_day.push_str("  * Completed:\n");
            for activity in &done {
                by_day.push_str(&format!("    - {}\n", safe(activity.description.as_deref())));
            }
        }
        if !pending.is_empty() {
            by_day.push_str("  * Not completed:\n");
            for activity in &pending {
                by_day.push_str(&format!("    - {}\n", safe(activity.description.as_deref())));
            }
        }
        by_day.push('\n');
    }

    format!(
        "You are a travel blogger AI. Write ONE cohesive blog post in a poetic, fancy yet readable tone (about 350 to 600 words).\n\
         Start with an evocative title on its own line (no markdown). Use plain text paragraphs only.\n\
         Weave completed activities in vividly; mention uncompleted ones as rain-checked dreams or missed chances.\n\
         End with a reflective single line.\n\
         \n\
         TRIP FACTS\n\
         * Title: {}\n\
         * From: {}\n\
         * Destination: {}\n\
         * Dates: {} to {}\n\
         * Budget: {}\n\
         \n\
         ACTIVITIES BY DAY\n\
         {}",
        safe(tour.title.as_deref()),
        safe(tour.start_location.as_deref()),
        safe(Some(&tour.destination)),
        pretty_date(&tour.start_date),
        pretty_date(&tour.end_date),
        safe(tour.budget.as_deref()),
        by_day
    )
}

/// Blank or missing values print as "-".
fn safe(value: Option<&str>) -> String {
    match value.map(str::trim) {
        Some(v) if !v.is_empty() => v.to_string(),
        _ => "-".to_string(),
    }
}

fn parse(value: &str) -> Option<NaiveDate> {
    NaiveDate::parse_from_str(value.trim(), "%Y-%m-%d").ok()
}

/// `2025-08-15` becomes `15 Aug 2025`; anything unparseable is printed as is.
fn pretty_date(value: &str) -> String {
    match parse(value) {
        Some(date) => date.format("%d %b %Y").to_string(),
        None => safe(Some(value)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tour::Activity;

    fn activity(id: i64, description: &str, status: &str) -> Activity {
        Activity {
            id,
            description: Some(description.to_string()),
            status: status.to_string(),
        }
    }

    fn day(id: i64, date: &str, activities: Vec<Activity>) -> Day {
        Day {
            id,
            date: date.to_string(),
            activities,
            photos: vec![],
        }
    }

    fn tour(days: Vec<Day>) -> Tour {
        Tour {
            id: 1,
            title: None,
            start_location: Some("Dhaka".to_string()),
            destination: "Bandarban".to_string(),
            start_date: "2025-08-05".to_string(),
            end_date: "2025-08-06".to_string(),
            budget: Some("  ".to_string()),
            video: None,
            blog: None,
            days,
        }
    }

    #[test]
    fn test_pretty_date() {
        assert_eq!(pretty_date("2025-08-05"), "05 Aug 2025");
        assert_eq!(pretty_date("someday"), "someday");
        assert_eq!(pretty_date(""), "-");
    }

    #[test]
    fn test_prompt_facts_use_placeholders() {
        let prompt = build_prompt(&tour(vec![]));
        assert!(prompt.contains("* Title: -\n"));
        assert!(prompt.contains("* Budget: -\n"));
        assert!(prompt.contains("* Dates: 05 Aug 2025 to 06 Aug 2025\n"));
    }

    #[test]
    fn test_days_sorted_with_unparseable_last() {
        let prompt = build_prompt(&tour(vec![
            day(1, "later", vec![]),
            day(2, "2025-08-06", vec![activity(1, "Nilgiri", "pending")]),
            day(3, "2025-08-05", vec![activity(2, "Boga lake", "done"), activity(3, "Chimbuk", "pending")]),
        ]));

        let first = prompt.find("Day 1 (05 Aug 2025)").unwrap();
        let second = prompt.find("Day 2 (06 Aug 2025)").unwrap();
        let third = prompt.find("Day 3 (later)").unwrap();
        assert!(first < second && second < third);

        assert!(prompt.contains("  * Completed:\n    - Boga lake\n  * Not completed:\n    - Chimbuk\n"));
        assert!(prompt.contains("Day 3 (later)\n  * No activities recorded\n"));
    }
}
