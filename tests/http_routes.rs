mod common;

use axum::http::{header, StatusCode};
use serde_json::json;

use common::*;

#[tokio::test]
async fn test_public_probe() {
    let app = test_app().await;
    let response = send(&app, request("GET", "/test-no-auth", None, None)).await;
    assert_eq!(response.status, StatusCode::OK);
    assert_eq!(response.body, "Hello, journeyGenie!");
}

#[tokio::test]
async fn test_protected_route_requires_token() {
    let app = test_app().await;

    let response = send(&app, request("GET", "/user/me", None, None)).await;
    assert_eq!(response.status, StatusCode::UNAUTHORIZED);
    assert_eq!(response.body["error"], "Unauthorized: Missing or invalid token");

    let response = send(&app, request("GET", "/user/me", Some("jwt=not-a-token"), None)).await;
    assert_eq!(response.status, StatusCode::UNAUTHORIZED);
    assert!(response.body["error"].is_string());
}

#[tokio::test]
async fn test_signup_rejects_duplicate_email() {
    let app = test_app().await;
    let body = json!({"name": "Ana", "email": "ana@example.com", "password": "secret"});

    let first = send(&app, request("POST", "/user/signup", None, Some(body.clone()))).await;
    assert_eq!(first.status, StatusCode::OK);
    assert_eq!(first.body["email"], "ana@example.com");
    assert_eq!(first.body["token"], 0);
    assert!(first.body.get("password").is_none());

    let second = send(&app, request("POST", "/user/signup", None, Some(body))).await;
    assert_eq!(second.status, StatusCode::CONFLICT);
    assert_eq!(second.body["error"], "User with this email already exists");
}

#[tokio::test]
async fn test_login_sets_session_cookie() {
    let app = test_app().await;
    login_as(&app, "ana@example.com").await;

    let wrong = send(
        &app,
        request("POST", "/user/login", None, Some(json!({"email": "ana@example.com", "password": "nope"}))),
    )
    .await;
    assert_eq!(wrong.status, StatusCode::UNAUTHORIZED);
    assert_eq!(wrong.body["error"], "Login failed");

    let ok = send(
        &app,
        request("POST", "/user/login", None, Some(json!({"email": "ana@example.com", "password": "pa55word"}))),
    )
    .await;
    assert_eq!(ok.status, StatusCode::OK);
    let cookie = ok.set_cookie().unwrap();
    assert!(cookie.starts_with("jwt="));
    assert!(cookie.contains("Max-Age=1800"));
    assert!(cookie.contains("HttpOnly"));
    assert!(cookie.contains("SameSite=None"));
    assert_eq!(ok.body["email"], "ana@example.com");
}

#[tokio::test]
async fn test_session_via_cookie_and_bearer() {
    let app = test_app().await;
    let cookie = login_as(&app, "ana@example.com").await;

    let me = get(&app, "/user/me", &cookie).await;
    assert_eq!(me.status, StatusCode::OK);
    assert_eq!(me.body["tours"], json!([]));
    // A fresh 25-minute token is not refreshed.
    assert!(me.set_cookie().is_none());

    let token = cookie.trim_start_matches("jwt=");
    let request = axum::http::Request::builder()
        .uri("/user/getName")
        .header(header::AUTHORIZATION, format!("Bearer {token}"))
        .body(axum::body::Body::empty())
        .unwrap();
    let name = send(&app, request).await;
    assert_eq!(name.status, StatusCode::OK);
    assert_eq!(name.body["name"], "Traveller");
}

#[tokio::test]
async fn test_short_lived_token_is_refreshed() {
    let mut config = test_config();
    config.auth.token_validity_minutes = 3;
    let app = test_app_with(config).await;
    let cookie = login_as(&app, "ana@example.com").await;

    let response = get(&app, "/user/token", &cookie).await;
    assert_eq!(response.status, StatusCode::OK);
    let refreshed = response.set_cookie().unwrap();
    assert!(refreshed.starts_with("jwt="));
    assert!(refreshed.contains("Max-Age=180"));
}

#[tokio::test]
async fn test_logout_clears_cookie() {
    let app = test_app().await;
    let cookie = login_as(&app, "ana@example.com").await;

    let response = send(&app, request("POST", "/user/logout", Some(&cookie), None)).await;
    assert_eq!(response.status, StatusCode::OK);
    assert_eq!(response.body["message"], "Logged out successfully");
    assert!(response.set_cookie().unwrap().contains("Max-Age=0"));
}

#[tokio::test]
async fn test_token_ledger() {
    let app = test_app().await;
    let cookie = login_as(&app, "ana@example.com").await;

    let added = send(&app, request("POST", "/token/add?tokens=5", Some(&cookie), None)).await;
    assert_eq!(added.body["tokens"], 5);
    assert_eq!(added.body["message"], "5 tokens added successfully");

    let deducted = send(&app, request("POST", "/token/deduct?tokens=3", Some(&cookie), None)).await;
    assert_eq!(deducted.status, StatusCode::OK);
    assert_eq!(deducted.body["tokens"], 2);
    assert_eq!(deducted.body["message"], "3 tokens deducted successfully");

    let too_much = send(&app, request("POST", "/token/deduct?tokens=5", Some(&cookie), None)).await;
    assert_eq!(too_much.status, StatusCode::BAD_REQUEST);
    assert_eq!(too_much.body["error"], "Insufficient tokens");
    assert_eq!(too_much.body["tokensAvailable"], 2);

    let zero = send(&app, request("POST", "/token/add?tokens=0", Some(&cookie), None)).await;
    assert_eq!(zero.status, StatusCode::BAD_REQUEST);

    let coupon = post(&app, "/token/apply-coupon", &cookie, json!({"couponCode": "SIZAN"})).await;
    assert_eq!(coupon.status, StatusCode::OK);
    assert_eq!(coupon.body["tokens"], 12);

    let bad = post(&app, "/token/apply-coupon", &cookie, json!({"couponCode": "free"})).await;
    assert_eq!(bad.status, StatusCode::BAD_REQUEST);
    assert_eq!(bad.body["error"], "Invalid coupon code.");

    let balance = get(&app, "/token/balance", &cookie).await;
    assert_eq!(balance.body["tokens"], 12);
}

#[tokio::test]
async fn test_credit_past_the_maximum_is_refused() {
    let app = test_app().await;
    let cookie = login_as(&app, "ana@example.com").await;

    let full = send(
        &app,
        request("POST", &format!("/token/add?tokens={}", i64::MAX), Some(&cookie), None),
    )
    .await;
    assert_eq!(full.status, StatusCode::OK);

    let one_more = send(&app, request("POST", "/token/add?tokens=1", Some(&cookie), None)).await;
    assert_eq!(one_more.status, StatusCode::BAD_REQUEST);
    assert_eq!(one_more.body["error"], "Token balance would overflow");

    let coupon = post(&app, "/token/apply-coupon", &cookie, json!({"couponCode": "sizan"})).await;
    assert_eq!(coupon.status, StatusCode::BAD_REQUEST);

    let balance = get(&app, "/token/balance", &cookie).await;
    assert_eq!(balance.status, StatusCode::OK);
    assert_eq!(balance.body["tokens"], i64::MAX);
    assert_eq!(get(&app, "/user/me", &cookie).await.status, StatusCode::OK);
}

#[tokio::test]
async fn test_tour_editing_flow() {
    let app = test_app().await;
    let cookie = login_as(&app, "ana@example.com").await;

    let profile = create_tour(&app, &cookie, "2025-03-30", "2025-04-01").await;
    let tour = &profile["tours"][0];
    let tour_id = tour["id"].as_i64().unwrap();
    let days = tour["days"].as_array().unwrap();
    assert_eq!(days.len(), 3);
    assert_eq!(days[2]["date"], "2025-04-01");
    assert_eq!(tour["startLocation"], "Dhaka");
    let day_id = days[0]["id"].as_i64().unwrap();

    let renamed = post(&app, "/tour/title", &cookie, json!({"tourid": tour_id, "title": "Clouds"})).await;
    assert_eq!(renamed.status, StatusCode::OK);
    assert_eq!(renamed.body["tours"][0]["title"], "Clouds");

    let added = post(&app, "/activity/add", &cookie, json!({"description": "Nilgiri sunrise", "dayid": day_id})).await;
    assert_eq!(added.status, StatusCode::OK);
    let activity = &added.body["tours"][0]["days"][0]["activities"][0];
    assert_eq!(activity["status"], "pending");
    let activity_id = activity["id"].as_i64().unwrap();

    let done = send(
        &app,
        request("POST", &format!("/activity/{activity_id}/complete"), Some(&cookie), None),
    )
    .await;
    assert_eq!(done.status, StatusCode::OK);
    assert_eq!(done.body["tours"][0]["days"][0]["activities"][0]["status"], "done");

    let linked = post(&app, "/photo/add", &cookie, json!({"link": "https://img.example/1.jpg", "dayid": day_id})).await;
    assert_eq!(linked.status, StatusCode::OK);
    assert_eq!(linked.body["tours"][0]["days"][0]["photos"][0]["link"], "https://img.example/1.jpg");

    let deleted = send(&app, request("DELETE", &format!("/tour/{tour_id}"), Some(&cookie), None)).await;
    assert_eq!(deleted.status, StatusCode::OK);
    assert_eq!(deleted.body["tours"], json!([]));

    let missing = post(&app, "/tour/title", &cookie, json!({"tourid": tour_id, "title": "Gone"})).await;
    assert_eq!(missing.status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_other_users_tours_are_forbidden() {
    let app = test_app().await;
    let owner = login_as(&app, "owner@example.com").await;
    let intruder = login_as(&app, "intruder@example.com").await;

    let profile = create_tour(&app, &owner, "2025-05-01", "2025-05-01").await;
    let tour_id = profile["tours"][0]["id"].as_i64().unwrap();
    let day_id = profile["tours"][0]["days"][0]["id"].as_i64().unwrap();

    let title = post(&app, "/tour/title", &intruder, json!({"tourid": tour_id, "title": "Mine"})).await;
    assert_eq!(title.status, StatusCode::FORBIDDEN);

    let activity = post(&app, "/activity/add", &intruder, json!({"description": "x", "dayid": day_id})).await;
    assert_eq!(activity.status, StatusCode::FORBIDDEN);

    let delete = send(&app, request("DELETE", &format!("/tour/{tour_id}"), Some(&intruder), None)).await;
    assert_eq!(delete.status, StatusCode::FORBIDDEN);

    let unknown_day = post(&app, "/activity/add", &intruder, json!({"description": "x", "dayid": 9999})).await;
    assert_eq!(unknown_day.status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_manual_tour_validates_dates() {
    let app = test_app().await;
    let cookie = login_as(&app, "ana@example.com").await;

    let body = json!({"destination": "Sylhet", "startDate": "2025-05-03", "endDate": "2025-05-01"});
    let reversed = post(&app, "/tour/create", &cookie, body).await;
    assert_eq!(reversed.status, StatusCode::BAD_REQUEST);

    let body = json!({"destination": "Sylhet", "startDate": "03/05/2025", "endDate": "2025-05-04"});
    let malformed = post(&app, "/tour/create", &cookie, body).await;
    assert_eq!(malformed.status, StatusCode::BAD_REQUEST);

    let body = json!({"destination": "Sylhet", "startDate": "1900-01-01", "endDate": "2099-12-31"});
    let endless = post(&app, "/tour/create", &cookie, body).await;
    assert_eq!(endless.status, StatusCode::BAD_REQUEST);
    assert_eq!(endless.body["error"], "Invalid date range");

    let body = json!({"destination": "Sylhet", "startDate": "2024-01-01", "endDate": "2024-12-31"});
    let leap_year = post(&app, "/tour/create", &cookie, body).await;
    assert_eq!(leap_year.status, StatusCode::OK);
    assert_eq!(leap_year.body["tours"][0]["days"].as_array().unwrap().len(), 366);
    assert_eq!(leap_year.body["token"], 0);
}

#[tokio::test]
async fn test_commit_charges_one_token_per_day() {
    let app = test_app().await;
    let cookie = login_as(&app, "ana@example.com").await;

    let plan = json!({
        "startLocation": "Dhaka",
        "destination": "Sylhet",
        "startDate": "2025-08-15",
        "endDate": "2025-08-16",
        "budget": "medium",
        "days": [
            {
                "date": "2025-08-15",
                "transportation": "Train to Sylhet",
                "transportationCostBdt": 650,
                "hotel": "Hotel Noorjahan",
                "hotelCostBdt": 3500,
                "activities": [{"name": "Shahjalal shrine", "timeOfDay": "evening", "costBdt": 0}]
            },
            {"date": "2025-08-16", "activities": [{"name": "Ratargul", "costBdt": "1,200 BDT"}]}
        ]
    });

    let broke = post(&app, "/api/plan/commit", &cookie, plan.clone()).await;
    assert_eq!(broke.status, StatusCode::BAD_REQUEST);
    assert_eq!(
        broke.body["error"],
        "Insufficient tokens. You need at least 2 tokens to start this 2-day tour."
    );

    fund(&app, &cookie, 3).await;
    let committed = post(&app, "/api/plan/commit", &cookie, plan).await;
    assert_eq!(committed.status, StatusCode::OK, "{:?}", committed.body);
    assert_eq!(committed.body["token"], 1);

    let day_one = &committed.body["tours"][0]["days"][0]["activities"];
    assert_eq!(day_one[0]["description"], "Transport: Train to Sylhet - Cost: ৳650");
    assert_eq!(day_one[1]["description"], "Hotel: Hotel Noorjahan - Cost: ৳3500");
    assert_eq!(day_one[2]["description"], "Shahjalal shrine (evening) - Cost: ৳0");
    assert_eq!(
        committed.body["tours"][0]["days"][1]["activities"][0]["description"],
        "Ratargul - Cost: ৳1200"
    );
}

#[tokio::test]
async fn test_commit_requires_destination() {
    let app = test_app().await;
    let cookie = login_as(&app, "ana@example.com").await;

    let plan = json!({"startDate": "2025-08-15", "endDate": "2025-08-15", "days": []});
    let response = post(&app, "/api/plan/commit", &cookie, plan).await;
    assert_eq!(response.status, StatusCode::BAD_REQUEST);
    assert_eq!(response.body["error"], "Destination is required");
}

#[tokio::test]
async fn test_paid_features_check_balance_first() {
    let app = test_app().await;
    let cookie = login_as(&app, "ana@example.com").await;
    let profile = create_tour(&app, &cookie, "2025-06-01", "2025-06-02").await;
    let tour_id = profile["tours"][0]["id"].as_i64().unwrap();

    let blog = send(&app, request("POST", &format!("/api/blog/generate/{tour_id}"), Some(&cookie), None)).await;
    assert_eq!(blog.status, StatusCode::BAD_REQUEST);
    assert_eq!(
        blog.body["error"],
        "Insufficient tokens. You need at least 5 tokens to generate a blog."
    );

    let video = send(&app, request("POST", &format!("/tour/{tour_id}/video/generate"), Some(&cookie), None)).await;
    assert_eq!(video.status, StatusCode::BAD_REQUEST);
    assert_eq!(
        video.body["error"],
        "Insufficient tokens. You need at least 10 tokens to generate a video."
    );
}

#[tokio::test]
async fn test_video_needs_photos() {
    let app = test_app().await;
    let cookie = login_as(&app, "ana@example.com").await;
    fund(&app, &cookie, 10).await;
    let profile = create_tour(&app, &cookie, "2025-06-01", "2025-06-02").await;
    let tour_id = profile["tours"][0]["id"].as_i64().unwrap();

    let response = send(&app, request("POST", &format!("/tour/{tour_id}/video/generate"), Some(&cookie), None)).await;
    assert_eq!(response.status, StatusCode::BAD_REQUEST);
    assert_eq!(response.body["error"], "No photos found for this tour");

    let missing = send(&app, request("POST", "/tour/4242/video/generate", Some(&cookie), None)).await;
    assert_eq!(missing.status, StatusCode::BAD_REQUEST);

    let balance = get(&app, "/token/balance", &cookie).await;
    assert_eq!(balance.body["tokens"], 10);
}
