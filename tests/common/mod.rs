#![allow(dead_code)]

use axum::body::Body;
use axum::http::{header, HeaderMap, Request, StatusCode};
use axum::Router;
use http_body_util::BodyExt;
use serde_json::{json, Value};
use tower::ServiceExt;

use journey_genie::config::Config;
use journey_genie::database::Database;
use journey_genie::server::{create_router, AppState};

pub struct TestApp {
    pub router: Router,
    pub state: AppState,
}

pub struct TestResponse {
    pub status: StatusCode,
    pub headers: HeaderMap,
    pub body: Value,
}

impl TestResponse {
    /// The `jwt=...` pair from a Set-Cookie header, ready to send back as a Cookie.
    pub fn session_cookie(&self) -> Option<String> {
        self.headers
            .get_all(header::SET_COOKIE)
            .iter()
            .filter_map(|v| v.to_str().ok())
            .find(|v| v.starts_with("jwt="))
            .and_then(|v| v.split(';').next())
            .map(str::to_string)
    }

    pub fn set_cookie(&self) -> Option<String> {
        self.headers
            .get(header::SET_COOKIE)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string)
    }
}

pub fn test_config() -> Config {
    let mut config = Config::default();
    config.auth.jwt_secret = "integration-test-secret".to_string();
    config.database.url = "sqlite::memory:".to_string();
    config.database.max_connections = 1;
    config
}

pub async fn test_app_with(config: Config) -> TestApp {
    let database = Database::connect(&config.database.url, config.database.max_connections)
        .await
        .unwrap();
    database.migrate().await.unwrap();

    let state = AppState::new(config, database).unwrap();
    TestApp {
        router: create_router(state.clone()),
        state,
    }
}

pub async fn test_app() -> TestApp {
    test_app_with(test_config()).await
}

pub fn request(method: &str, uri: &str, cookie: Option<&str>, body: Option<Value>) -> Request<Body> {
    let mut builder = Request::builder().method(method).uri(uri);
    if let Some(cookie) = cookie {
        builder = builder.header(header::COOKIE, cookie);
    }
    match body {
        Some(body) => builder
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(body.to_string()))
            .unwrap(),
        None => builder.body(Body::empty()).unwrap(),
    }
}

pub async fn send(app: &TestApp, request: Request<Body>) -> TestResponse {
    let response = app.router.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let headers = response.headers().clone();
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    let body = serde_json::from_slice(&bytes)
        .unwrap_or_else(|_| Value::String(String::from_utf8_lossy(&bytes).to_string()));

    TestResponse { status, headers, body }
}

pub async fn get(app: &TestApp, uri: &str, cookie: &str) -> TestResponse {
    send(app, request("GET", uri, Some(cookie), None)).await
}

pub async fn post(app: &TestApp, uri: &str, cookie: &str, body: Value) -> TestResponse {
    send(app, request("POST", uri, Some(cookie), Some(body))).await
}

/// Registers and logs in a user, returning the session cookie.
pub async fn login_as(app: &TestApp, email: &str) -> String {
    let signup = send(
        app,
        request(
            "POST",
            "/user/signup",
            None,
            Some(json!({"name": "Traveller", "email": email, "password": "pa55word"})),
        ),
    )
    .await;
    assert_eq!(signup.status, StatusCode::OK, "{:?}", signup.body);

    let login = send(
        app,
        request(
            "POST",
            "/user/login",
            None,
            Some(json!({"email": email, "password": "pa55word"})),
        ),
    )
    .await;
    assert_eq!(login.status, StatusCode::OK, "{:?}", login.body);
    login.session_cookie().unwrap()
}

/// Gives the caller `amount` tokens.
pub async fn fund(app: &TestApp, cookie: &str, amount: i64) {
    let response = send(app, request("POST", &format!("/token/add?tokens={amount}"), Some(cookie), None)).await;
    assert_eq!(response.status, StatusCode::OK);
}

/// Creates a tour by hand and returns the refreshed profile.
pub async fn create_tour(app: &TestApp, cookie: &str, start: &str, end: &str) -> Value {
    let response = post(
        app,
        "/tour/create",
        cookie,
        json!({
            "title": "Hill tracts",
            "startLocation": "Dhaka",
            "destination": "Bandarban",
            "startDate": start,
            "endDate": end,
            "budget": "medium"
        }),
    )
    .await;
    assert_eq!(response.status, StatusCode::OK, "{:?}", response.body);
    response.body
}
