//! Weather forecasts and routes for trip planning.
//!
//! Place names are resolved with the Open-Meteo geocoder, forecasts come from
//! Open-Meteo and routes from an OSRM server. All three base URLs are configurable.

use axum::{
    extract::{Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use chrono::{Duration, NaiveDate, Utc};
use reqwest::Client;
use serde::Deserialize;
use serde_json::{json, Map, Value};
use thiserror::Error;
use tracing::{debug, warn};

use crate::config::GeoConfig;
use crate::error::AppError;
use crate::server::AppState;
use crate::tour::parse_date;

const DAILY_FIELDS: &str = "temperature_2m_max,temperature_2m_min,precipitation_sum,\
precipitation_probability_max,wind_speed_10m_max,wind_gusts_10m_max,uv_index_max,weathercode";

#[derive(Debug, Error)]
pub enum GeoError {
    #[error("Failed to reach provider: {0}")]
    Request(#[from] reqwest::Error),
    #[error("Provider returned {status}")]
    Status { status: u16, body: String },
}

impl From<GeoError> for AppError {
    fn from(err: GeoError) -> Self {
        match err {
            GeoError::Status { status, body } => AppError::Provider {
                message: "Geo provider error".to_string(),
                status,
                body,
            },
            other => AppError::Upstream(other.to_string()),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Place {
    pub name: String,
    pub latitude: f64,
    pub longitude: f64,
}

#[derive(Debug, Clone)]
pub struct GeoClient {
    http: Client,
    geocoding_url: String,
    forecast_url: String,
    routing_url: String,
}

impl GeoClient {
    pub fn new(http: Client, config: &GeoConfig) -> Self {
        GeoClient {
            http,
            geocoding_url: config.geocoding_url.trim_end_matches('/').to_string(),
            forecast_url: config.forecast_url.trim_end_matches('/').to_string(),
            routing_url: config.routing_url.trim_end_matches('/').to_string(),
        }
    }

    async fn get_json(&self, url: &str, query: &[(&str, String)]) -> Result<Value, GeoError> {
        let response = self
            .http
            .get(url)
            .header("Accept", "application/json")
            .query(query)
            .send()
            .await?;

        let status = response.status();
        if status != StatusCode::OK {
            let body = response.text().await.unwrap_or_default();
            warn!(url, status = status.as_u16(), "geo provider error");
            return Err(GeoError::Status {
                status: status.as_u16(),
                body,
            });
        }
        Ok(response.json().await?)
    }

    /// Best match for a place name, if the geocoder knows it.
    pub async fn geocode(&self, place: &str) -> Result<Option<Place>, GeoError> {
        let url = format!("{}/v1/search", self.geocoding_url);
        let body = self
            .get_json(&url, &[("name", place.to_string()), ("count", "1".to_string())])
            .await?;
        Ok(first_place(&body, place))
    }

    /// The `daily` block of an Open-Meteo forecast.
    pub async fn forecast(&self, place: &Place, start: NaiveDate, end: NaiveDate) -> Result<Value, GeoError> {
        let url = format!("{}/v1/forecast", self.forecast_url);
        let body = self
            .get_json(
                &url,
                &[
                    ("latitude", place.latitude.to_string()),
                    ("longitude", place.longitude.to_string()),
                    ("start_date", start.to_string()),
                    ("end_date", end.to_string()),
                    ("daily", DAILY_FIELDS.to_string()),
                    ("windspeed_unit", "kmh".to_string()),
                    ("timezone", "auto".to_string()),
                ],
            )
            .await?;
        Ok(body.get("daily").cloned().unwrap_or(Value::Null))
    }

    pub async fn route(&self, profile: &str, from: &Place, to: &Place) -> Result<Value, GeoError> {
        let url = format!(
            "{}/route/v1/{}/{},{};{},{}",
            self.routing_url, profile, from.longitude, from.latitude, to.longitude, to.latitude
        );
        self.get_json(
            &url,
            &[
                ("overview", "full".to_string()),
                ("geometries", "geojson".to_string()),
                ("alternatives", "false".to_string()),
                ("steps", "false".to_string()),
            ],
        )
        .await
    }
}

fn first_place(body: &Value, fallback_name: &str) -> Option<Place> {
    let first = body.get("results")?.as_array()?.first()?;
    Some(Place {
        name: first
            .get("name")
            .and_then(Value::as_str)
            .unwrap_or(fallback_name)
            .to_string(),
        latitude: first.get("latitude").and_then(Value::as_f64).unwrap_or(0.0),
        longitude: first.get("longitude").and_then(Value::as_f64).unwrap_or(0.0),
    })
}

/// The part of a requested date range the forecast provider can answer.
#[derive(Debug, PartialEq)]
pub struct Window {
    pub start: NaiveDate,
    pub end: NaiveDate,
    pub note: Option<String>,
}

impl Window {
    pub fn is_empty(&self) -> bool {
        self.start > self.end
    }
}

pub fn clamp_window(start: NaiveDate, end: NaiveDate, today: NaiveDate, horizon_days: i64) -> Window {
    let max_end = today + Duration::days(horizon_days);
    let used_start = start.max(today);
    let used_end = end.min(max_end);

    let mut note = String::new();
    if used_start != start {
        note.push_str(&format!("Start clamped to {used_start}. "));
    }
    if used_end != end {
        note.push_str(&format!("Forecast shown only up to {used_end} (provider limit)."));
    }
    let note = note.trim();

    Window {
        start: used_start,
        end: used_end,
        note: (!note.is_empty()).then(|| note.to_string()),
    }
}

/// Reshapes Open-Meteo's column arrays into one object per day.
pub fn forecast_rows(daily: &Value) -> Vec<Value> {
    let column = |name: &str| daily.get(name).and_then(Value::as_array).cloned().unwrap_or_default();
    let number = |values: &[Value], i: usize| values.get(i).and_then(Value::as_f64).unwrap_or(0.0);

    let time = column("time");
    let t_max = column("temperature_2m_max");
    let t_min = column("temperature_2m_min");
    let precip = column("precipitation_sum");
    let precip_prob = column("precipitation_probability_max");
    let wind = column("wind_speed_10m_max");
    let gust = column("wind_gusts_10m_max");
    let uv = column("uv_index_max");
    let mut code = column("weathercode");
    if code.is_empty() {
        code = column("weather_code");
    }

    time.iter()
        .enumerate()
        .map(|(i, date)| {
            json!({
                "date": date.as_str().unwrap_or_default(),
                "tMax": number(&t_max, i),
                "tMin": number(&t_min, i),
                "precipMm": number(&precip, i),
                "precipProb": number(&precip_prob, i),
                "windMaxKph": number(&wind, i),
                "gustMaxKph": number(&gust, i),
                "uvMax": number(&uv, i),
                "weatherCode": number(&code, i) as i64,
            })
        })
        .collect()
}

/// OSRM profile for a travel mode. Unknown modes drive.
pub fn osrm_profile(mode: &str) -> &'static str {
    match mode.to_lowercase().as_str() {
        "walking" => "walking",
        "cycling" => "cycling",
        _ => "driving",
    }
}

fn round1(value: f64) -> f64 {
    (value * 10.0 + 0.5).floor() / 10.0
}

fn place_json(place: &Place) -> Value {
    json!({ "name": place.name, "lat": place.latitude, "lon": place.longitude })
}

/// Leaflet-friendly summary of the first OSRM route.
pub fn route_summary(from: &Place, to: &Place, mode: &str, body: &Value) -> Result<Value, AppError> {
    let route = body
        .get("routes")
        .and_then(Value::as_array)
        .and_then(|routes| routes.first())
        .ok_or_else(|| AppError::BadRequest("No route found".to_string()))?;

    let coordinates = route
        .pointer("/geometry/coordinates")
        .and_then(Value::as_array)
        .filter(|coords| !coords.is_empty())
        .ok_or_else(|| AppError::BadRequest("No geometry".to_string()))?;

    let (mut min_lat, mut min_lon, mut max_lat, mut max_lon) = (90.0_f64, 180.0_f64, -90.0_f64, -180.0_f64);
    let mut latlngs = Vec::with_capacity(coordinates.len());
    for point in coordinates {
        let lon = point.get(0).and_then(Value::as_f64).unwrap_or(0.0);
        let lat = point.get(1).and_then(Value::as_f64).unwrap_or(0.0);
        min_lat = min_lat.min(lat);
        max_lat = max_lat.max(lat);
        min_lon = min_lon.min(lon);
        max_lon = max_lon.max(lon);
        latlngs.push(json!([lat, lon]));
    }

    let distance_m = route.get("distance").and_then(Value::as_f64).unwrap_or(0.0);
    let duration_s = route.get("duration").and_then(Value::as_f64).unwrap_or(0.0);

    Ok(json!({
        "start": place_json(from),
        "end": place_json(to),
        "profile": mode.to_lowercase(),
        "distanceKm": round1(distance_m / 1000.0),
        "durationMin": round1(duration_s / 60.0),
        "latlngs": latlngs,
        "bounds": [[min_lat, min_lon], [max_lat, max_lon]],
    }))
}

#[derive(Deserialize)]
pub struct WeatherQuery {
    pub place: String,
    pub start: String,
    pub end: String,
}

#[derive(Deserialize)]
pub struct RouteQuery {
    pub start: String,
    pub end: String,
    #[serde(default = "default_mode")]
    pub mode: String,
}

fn default_mode() -> String {
    "driving".to_string()
}

/// Relays a provider's own status and body to the caller.
fn passthrough(status: u16, body: String) -> Response {
    let status = StatusCode::from_u16(status).unwrap_or(StatusCode::BAD_GATEWAY);
    (status, body).into_response()
}

pub async fn weather(State(state): State<AppState>, Query(query): Query<WeatherQuery>) -> Result<Response, AppError> {
    let start = parse_date(&query.start)?;
    let end = parse_date(&query.end)?;
    let today = Utc::now().date_naive();
    let window = clamp_window(start, end, today, state.config.geo.forecast_horizon_days);

    if window.is_empty() {
        let note = window
            .note
            .unwrap_or_else(|| "Requested window not available yet.".to_string());
        return Ok(Json(json!({ "place": query.place, "note": note, "days": [] })).into_response());
    }

    let place = match state.geo.geocode(&query.place).await {
        Ok(Some(place)) => place,
        Ok(None) => return Err(AppError::NotFound(format!("Destination not found: {}", query.place))),
        Err(GeoError::Status { status, body }) => return Ok(passthrough(status, body)),
        Err(e) => return Err(e.into()),
    };

    debug!(place = %place.name, start = %window.start, end = %window.end, "fetching forecast");
    let daily = match state.geo.forecast(&place, window.start, window.end).await {
        Ok(daily) => daily,
        Err(GeoError::Status { status, body }) => return Ok(passthrough(status, body)),
        Err(e) => return Err(e.into()),
    };

    let mut out = Map::new();
    out.insert("place".to_string(), json!(place.name));
    out.insert("latitude".to_string(), json!(place.latitude));
    out.insert("longitude".to_string(), json!(place.longitude));
    if let Some(note) = window.note {
        out.insert("note".to_string(), json!(note));
    }
    out.insert("days".to_string(), Value::Array(forecast_rows(&daily)));

    Ok(Json(Value::Object(out)).into_response())
}

/// Geocodes one end of a route. A geocoder that answers with an error status or
/// no results means "not found"; an unreachable geocoder is an upstream failure.
async fn locate(state: &AppState, name: &str, missing: &str) -> Result<Place, AppError> {
    match state.geo.geocode(name).await {
        Ok(Some(place)) => Ok(place),
        Ok(None) | Err(GeoError::Status { .. }) => Err(AppError::BadRequest(missing.to_string())),
        Err(e) => Err(e.into()),
    }
}

pub async fn route(State(state): State<AppState>, Query(query): Query<RouteQuery>) -> Result<Json<Value>, AppError> {
    let from = locate(&state, &query.start, "Start location not found").await?;
    let to = locate(&state, &query.end, "End location not found").await?;

    let body = match state.geo.route(osrm_profile(&query.mode), &from, &to).await {
        Ok(body) => body,
        Err(GeoError::Status { status, body }) => {
            return Err(AppError::Provider {
                message: "Route provider error".to_string(),
                status,
                body,
            })
        }
        Err(e) => return Err(e.into()),
    };

    Ok(Json(route_summary(&from, &to, &query.mode, &body)?))
}

#[cfg(test)]
mod tests {
    use super::*;
    use mockito::{Matcher, Server};

    fn date(value: &str) -> NaiveDate {
        NaiveDate::parse_from_str(value, "%Y-%m-%d").unwrap()
    }

    fn dhaka() -> Place {
        Place {
            name: "Dhaka".to_string(),
            latitude: 23.81,
            longitude: 90.41,
        }
    }

    #[test]
    fn window_inside_horizon_is_untouched() {
        let window = clamp_window(date("2025-08-20"), date("2025-08-22"), date("2025-08-17"), 16);
        assert_eq!(window.start, date("2025-08-20"));
        assert_eq!(window.end, date("2025-08-22"));
        assert_eq!(window.note, None);
    }

    #[test]
    fn window_is_clamped_on_both_ends() {
        let window = clamp_window(date("2025-08-10"), date("2025-09-30"), date("2025-08-17"), 16);
        assert_eq!(window.start, date("2025-08-17"));
        assert_eq!(window.end, date("2025-09-02"));
        assert_eq!(
            window.note.as_deref(),
            Some("Start clamped to 2025-08-17. Forecast shown only up to 2025-09-02 (provider limit).")
        );
    }

    #[test]
    fn window_beyond_horizon_is_empty() {
        let window = clamp_window(date("2025-12-01"), date("2025-12-05"), date("2025-08-17"), 16);
        assert!(window.is_empty());
        assert_eq!(
            window.note.as_deref(),
            Some("Forecast shown only up to 2025-09-02 (provider limit).")
        );
    }

    #[test]
    fn forecast_columns_become_rows() {
        let daily = json!({
            "time": ["2025-08-20", "2025-08-21"],
            "temperature_2m_max": [29.1, 30.0],
            "temperature_2m_min": [19.3, null],
            "precipitation_sum": [3.2, 0.0],
            "precipitation_probability_max": [55, 10],
            "wind_speed_10m_max": [28.5, 12.0],
            "wind_gusts_10m_max": [44.2, 20.0],
            "uv_index_max": [6.7, 7.1],
            "weathercode": [61, 1]
        });
        let rows = forecast_rows(&daily);
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0]["date"], "2025-08-20");
        assert_eq!(rows[0]["precipProb"], 55.0);
        assert_eq!(rows[0]["weatherCode"], 61);
        assert_eq!(rows[1]["tMin"], 0.0);
        assert!(forecast_rows(&Value::Null).is_empty());
    }

    #[test]
    fn unknown_modes_drive() {
        assert_eq!(osrm_profile("Walking"), "walking");
        assert_eq!(osrm_profile("cycling"), "cycling");
        assert_eq!(osrm_profile("boat"), "driving");
    }

    #[test]
    fn route_summary_flips_coordinates_and_bounds() {
        let to = Place {
            name: "Gazipur".to_string(),
            latitude: 24.0,
            longitude: 90.4,
        };
        let body = json!({
            "routes": [{
                "distance": 12345.0,
                "duration": 1799.0,
                "geometry": {"coordinates": [[90.41, 23.81], [90.5, 23.9], [90.4, 24.0]]}
            }]
        });
        let summary = route_summary(&dhaka(), &to, "Cycling", &body).unwrap();
        assert_eq!(summary["profile"], "cycling");
        assert_eq!(summary["distanceKm"], 12.3);
        assert_eq!(summary["durationMin"], 30.0);
        assert_eq!(summary["latlngs"][0], json!([23.81, 90.41]));
        assert_eq!(summary["bounds"], json!([[23.81, 90.4], [24.0, 90.5]]));
        assert_eq!(summary["start"]["name"], "Dhaka");
    }

    #[test]
    fn empty_routes_are_rejected() {
        assert!(route_summary(&dhaka(), &dhaka(), "driving", &json!({"routes": []})).is_err());
        let no_geometry = json!({"routes": [{"geometry": {"coordinates": []}}]});
        assert!(route_summary(&dhaka(), &dhaka(), "driving", &no_geometry).is_err());
    }

    #[tokio::test]
    async fn geocode_reads_first_result() {
        let mut server = Server::new_async().await;
        let mock = server
            .mock("GET", "/v1/search")
            .match_query(Matcher::AllOf(vec![
                Matcher::UrlEncoded("name".into(), "Cox's Bazar".into()),
                Matcher::UrlEncoded("count".into(), "1".into()),
            ]))
            .with_status(200)
            .with_body(json!({"results": [{"name": "Cox's Bazar", "latitude": 21.45, "longitude": 91.97}]}).to_string())
            .create_async()
            .await;

        let config = GeoConfig {
            geocoding_url: server.url(),
            ..GeoConfig::default()
        };
        let client = GeoClient::new(Client::new(), &config);
        let place = client.geocode("Cox's Bazar").await.unwrap().unwrap();
        assert_eq!(place.latitude, 21.45);
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn geocode_without_results_is_none() {
        let mut server = Server::new_async().await;
        let _mock = server
            .mock("GET", "/v1/search")
            .match_query(Matcher::Any)
            .with_status(200)
            .with_body("{}")
            .create_async()
            .await;

        let config = GeoConfig {
            geocoding_url: server.url(),
            ..GeoConfig::default()
        };
        let client = GeoClient::new(Client::new(), &config);
        assert_eq!(client.geocode("Atlantis").await.unwrap(), None);
    }
}
