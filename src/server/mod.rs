//! HTTP wiring: shared state, the route table and the serve loop.
//!
//! Routes fall into two groups. The public group (signup, login, a health probe)
//! is reachable without a session; everything else sits behind [`require_jwt`].

use axum::{
    extract::DefaultBodyLimit,
    http::{
        header::{AUTHORIZATION, CONTENT_TYPE},
        HeaderValue, Method,
    },
    middleware::from_fn_with_state,
    routing::{delete, get, post},
    Router,
};
use std::sync::Arc;
use std::time::Duration;
use tokio::{net::TcpListener, signal};
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use tracing::{info, warn};

use crate::auth::{require_jwt, JwtService};
use crate::config::Config;
use crate::database::Database;
use crate::gemini::GeminiClient;
use crate::geo::GeoClient;
use crate::media::MediaClient;
use crate::{blog, geo, ledger, photo, plan, tour, user, video};

const OUTBOUND_TIMEOUT: Duration = Duration::from_secs(120);

/// State cloned into every handler.
#[derive(Clone)]
pub struct AppState {
    pub database: Arc<Database>,
    pub jwt: Arc<JwtService>,
    pub config: Arc<Config>,
    pub gemini: GeminiClient,
    pub media: MediaClient,
    pub geo: GeoClient,
    /// Plain client for fetching arbitrary URLs (video frames).
    pub http: reqwest::Client,
}

impl AppState {
    pub fn new(config: Config, database: Database) -> Result<Self, reqwest::Error> {
        let http = reqwest::Client::builder().timeout(OUTBOUND_TIMEOUT).build()?;

        if config.gemini.api_key.is_empty() {
            warn!("GEMINI_API_KEY is not set; plan and blog generation will fail");
        }

        let media = MediaClient::new(http.clone(), &config.media);
        if !media.is_configured() {
            warn!("CLOUDINARY_URL is not set; photo uploads and videos will fail");
        }

        Ok(AppState {
            database: Arc::new(database),
            jwt: Arc::new(JwtService::from_config(&config.auth)),
            gemini: GeminiClient::new(http.clone(), &config.gemini),
            media,
            geo: GeoClient::new(http.clone(), &config.geo),
            http,
            config: Arc::new(config),
        })
    }
}

fn cors_layer(frontend_url: &str) -> CorsLayer {
    let origin = frontend_url.trim().trim_end_matches('/');
    if origin.is_empty() {
        return CorsLayer::permissive();
    }

    match HeaderValue::from_str(origin) {
        Ok(origin) => CorsLayer::new()
            .allow_origin(origin)
            .allow_credentials(true)
            .allow_methods([Method::GET, Method::POST, Method::DELETE, Method::OPTIONS])
            .allow_headers([CONTENT_TYPE, AUTHORIZATION])
            .max_age(Duration::from_secs(60 * 60)),
        Err(_) => {
            warn!("invalid frontend_url {origin:?}; falling back to permissive CORS");
            CorsLayer::permissive()
        }
    }
}

pub fn create_router(state: AppState) -> Router {
    let public = Router::new()
        .route("/user/signup", post(user::signup))
        .route("/user/login", post(user::login))
        .route("/test-no-auth", get(user::hello));

    let protected = Router::new()
        // account
        .route("/user/logout", post(user::logout))
        .route("/user/me", get(user::me))
        .route("/user/getName", get(user::get_name))
        .route("/user/token", get(user::token))
        // ledger
        .route("/token/balance", get(ledger::balance))
        .route("/token/deduct", post(ledger::deduct))
        .route("/token/add", post(ledger::add))
        .route("/token/apply-coupon", post(ledger::apply_coupon))
        // itinerary
        .route("/api/plan/preview", post(plan::preview))
        .route("/api/plan/commit", post(plan::commit))
        .route("/tour/title", post(tour::update_title))
        .route("/tour/create", post(tour::create_tour))
        .route("/tour/:id", delete(tour::delete_tour))
        .route("/activity/add", post(tour::add_activity))
        .route("/activity/:id/complete", post(tour::complete_activity))
        // generated content
        .route("/api/blog/generate/:tourId", post(blog::generate))
        .route("/photo/add", post(photo::add))
        .route("/photo/upload", post(photo::upload))
        .route("/tour/:id/video/generate", post(video::generate))
        // trip tools
        .route("/api/weather", get(geo::weather))
        .route("/api/route", get(geo::route))
        .route_layer(from_fn_with_state(state.clone(), require_jwt));

    let body_limit = state.config.server.body_limit_mb * 1024 * 1024;

    Router::new()
        .merge(public)
        .merge(protected)
        .layer(DefaultBodyLimit::max(body_limit))
        .layer(TraceLayer::new_for_http())
        .layer(cors_layer(&state.config.server.frontend_url))
        .with_state(state)
}

/// Binds the configured address and serves until Ctrl+C or SIGTERM.
pub async fn serve(state: AppState) -> std::io::Result<()> {
    let address = state.config.server_address();
    let app = create_router(state);

    let listener = TcpListener::bind(&address).await?;
    info!("Server running on {address}");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    info!("Server shut down");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            warn!("failed to listen for Ctrl+C: {e}");
            std::future::pending::<()>().await;
        }
        info!("Received Ctrl+C, shutting down");
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
                info!("Received terminate signal, shutting down");
            }
            Err(e) => {
                warn!("failed to install SIGTERM handler: {e}");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}
