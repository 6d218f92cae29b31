use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::env;
use std::fs;
use std::path::Path;
use thiserror::Error;
use tracing::info;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file: {0}")]
    Io(#[from] std::io::Error),
    #[error("failed to parse config file: {0}")]
    Parse(#[from] toml::de::Error),
}

#[derive(Debug, Deserialize, Serialize, Clone, Default)]
#[serde(default)]
pub struct Config {
    pub server: ServerConfig,
    pub database: DatabaseConfig,
    pub auth: AuthConfig,
    pub ledger: LedgerConfig,
    pub gemini: GeminiConfig,
    pub media: MediaConfig,
    pub geo: GeoConfig,
    pub video: VideoConfig,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
#[serde(default)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    /// Origin allowed to send credentialed requests. Empty means permissive CORS.
    pub frontend_url: String,
    pub backend_url: String,
    pub body_limit_mb: usize,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
#[serde(default)]
pub struct DatabaseConfig {
    pub url: String,
    pub max_connections: u32,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
#[serde(default)]
pub struct AuthConfig {
    /// HMAC secret for session tokens. Empty means a random key per process.
    pub jwt_secret: String,
    pub token_validity_minutes: i64,
    pub refresh_threshold_minutes: i64,
    pub login_cookie_minutes: i64,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
#[serde(default)]
pub struct LedgerConfig {
    pub blog_cost: i64,
    pub video_cost: i64,
    pub photo_cost: i64,
    pub tour_cost_per_day: i64,
    pub coupons: HashMap<String, i64>,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
#[serde(default)]
pub struct GeminiConfig {
    pub api_key: String,
    pub base_url: String,
    pub model: String,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
#[serde(default)]
pub struct MediaConfig {
    /// `cloudinary://<api_key>:<api_secret>@<cloud_name>`
    pub cloudinary_url: String,
    pub api_base: String,
    pub folder: String,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
#[serde(default)]
pub struct GeoConfig {
    pub geocoding_url: String,
    pub forecast_url: String,
    pub routing_url: String,
    pub forecast_horizon_days: i64,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
#[serde(default)]
pub struct VideoConfig {
    pub ffmpeg_path: String,
    pub frame_seconds: f64,
}

impl Config {
    /// Load configuration from a TOML file
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let config_str = fs::read_to_string(path)?;
        let config: Config = toml::from_str(&config_str)?;
        Ok(config)
    }

    /// Load configuration from the default config.toml file
    pub fn load() -> Result<Self, ConfigError> {
        Self::load_from_file("config.toml")
    }

    /// Apply overrides from the process environment (and `.env`, once loaded by dotenvy).
    pub fn with_env_overrides(mut self) -> Self {
        override_from_env(&mut self.server.frontend_url, "FRONTEND_URL");
        override_from_env(&mut self.server.backend_url, "BACKEND_URL");
        override_from_env(&mut self.database.url, "DATABASE_URL");
        override_from_env(&mut self.auth.jwt_secret, "JWT_SECRET");
        override_from_env(&mut self.gemini.api_key, "GEMINI_API_KEY");
        override_from_env(&mut self.media.cloudinary_url, "CLOUDINARY_URL");
        self
    }

    /// Get the server bind address
    pub fn server_address(&self) -> String {
        format!("{}:{}", self.server.host, self.server.port)
    }
}

fn override_from_env(target: &mut String, key: &str) {
    if let Ok(value) = env::var(key) {
        if !value.trim().is_empty() {
            info!("{key} taken from environment");
            *target = value.trim().to_string();
        }
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 8080,
            frontend_url: String::new(),
            backend_url: "http://localhost:8080".to_string(),
            body_limit_mb: 20,
        }
    }
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            url: "sqlite:./journey_genie.db".to_string(),
            max_connections: 10,
        }
    }
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            jwt_secret: String::new(),
            token_validity_minutes: 25,
            refresh_threshold_minutes: 5,
            login_cookie_minutes: 30,
        }
    }
}

impl Default for LedgerConfig {
    fn default() -> Self {
        Self {
            blog_cost: 5,
            video_cost: 10,
            photo_cost: 1,
            tour_cost_per_day: 1,
            coupons: HashMap::from([("sizan".to_string(), 10)]),
        }
    }
}

impl Default for GeminiConfig {
    fn default() -> Self {
        Self {
            api_key: String::new(),
            base_url: "https://generativelanguage.googleapis.com".to_string(),
            model: "gemini-2.0-flash".to_string(),
        }
    }
}

impl Default for MediaConfig {
    fn default() -> Self {
        Self {
            cloudinary_url: String::new(),
            api_base: "https://api.cloudinary.com".to_string(),
            folder: "journey-genie".to_string(),
        }
    }
}

impl Default for GeoConfig {
    fn default() -> Self {
        Self {
            geocoding_url: "https://geocoding-api.open-meteo.com".to_string(),
            forecast_url: "https://api.open-meteo.com".to_string(),
            routing_url: "https://router.project-osrm.org".to_string(),
            forecast_horizon_days: 16,
        }
    }
}

impl Default for VideoConfig {
    fn default() -> Self {
        Self {
            ffmpeg_path: "/usr/bin/ffmpeg".to_string(),
            frame_seconds: 2.5,
        }
    }
}
