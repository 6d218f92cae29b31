//! Signed uploads to Cloudinary.
//!
//! Credentials come from a `cloudinary://<api_key>:<api_secret>@<cloud_name>` URL.
//! Every upload is signed with SHA-256 over the sorted parameters followed by the
//! API secret, and the hosted `secure_url` is returned.

use chrono::Utc;
use reqwest::multipart::{Form, Part};
use reqwest::Client;
use serde::Deserialize;
use sha2::{Digest, Sha256};
use std::collections::BTreeMap;
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::config::MediaConfig;
use crate::error::AppError;

#[derive(Debug, Error)]
pub enum MediaError {
    #[error("Cloud storage service unavailable")]
    NotConfigured,
    #[error("Invalid Cloudinary URL")]
    InvalidUrl,
    #[error("Error uploading file to cloud storage: {0}")]
    Request(#[from] reqwest::Error),
    #[error("Upload provider error")]
    Status { status: u16, body: String },
    #[error("Upload response has no secure_url")]
    MissingUrl,
}

impl From<MediaError> for AppError {
    fn from(err: MediaError) -> Self {
        match err {
            MediaError::NotConfigured | MediaError::InvalidUrl => AppError::Internal(err.to_string()),
            MediaError::Status { status, body } => AppError::Provider {
                message: "Upload provider error".to_string(),
                status,
                body,
            },
            other => AppError::Upstream(other.to_string()),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResourceType {
    Image,
    Video,
}

impl ResourceType {
    fn as_str(self) -> &'static str {
        match self {
            ResourceType::Image => "image",
            ResourceType::Video => "video",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Credentials {
    pub api_key: String,
    pub api_secret: String,
    pub cloud_name: String,
}

impl Credentials {
    pub fn parse(url: &str) -> Result<Self, MediaError> {
        let rest = url.trim().strip_prefix("cloudinary://").ok_or(MediaError::InvalidUrl)?;
        let (keys, cloud_name) = rest.rsplit_once('@').ok_or(MediaError::InvalidUrl)?;
        let (api_key, api_secret) = keys.split_once(':').ok_or(MediaError::InvalidUrl)?;

        if api_key.is_empty() || api_secret.is_empty() || cloud_name.is_empty() {
            return Err(MediaError::InvalidUrl);
        }

        Ok(Credentials {
            api_key: api_key.to_string(),
            api_secret: api_secret.to_string(),
            cloud_name: cloud_name.trim_end_matches('/').to_string(),
        })
    }
}

/// A file to upload.
pub struct Upload {
    pub bytes: Vec<u8>,
    pub file_name: String,
    pub content_type: String,
    pub public_id: String,
    pub resource_type: ResourceType,
}

#[derive(Deserialize)]
struct UploadResponse {
    secure_url: Option<String>,
}

#[derive(Debug, Clone)]
pub struct MediaClient {
    http: Client,
    api_base: String,
    folder: String,
    credentials: Option<Credentials>,
}

impl MediaClient {
    /// An unset or malformed Cloudinary URL leaves the client unconfigured; uploads then fail.
    pub fn new(http: Client, config: &MediaConfig) -> Self {
        let credentials = if config.cloudinary_url.trim().is_empty() {
            None
        } else {
            match Credentials::parse(&config.cloudinary_url) {
                Ok(credentials) => Some(credentials),
                Err(e) => {
                    warn!("ignoring Cloudinary URL: {e}");
                    None
                }
            }
        };

        MediaClient {
            http,
            api_base: config.api_base.trim_end_matches('/').to_string(),
            folder: config.folder.clone(),
            credentials,
        }
    }

    pub fn is_configured(&self) -> bool {
        self.credentials.is_some()
    }

    /// Uploads a file and returns its hosted URL.
    pub async fn upload(&self, upload: Upload) -> Result<String, MediaError> {
        let credentials = self.credentials.as_ref().ok_or(MediaError::NotConfigured)?;

        let mut params = BTreeMap::new();
        params.insert("folder", self.folder.clone());
        params.insert("overwrite", "true".to_string());
        params.insert("public_id", upload.public_id.clone());
        params.insert("timestamp", Utc::now().timestamp().to_string());
        params.insert("unique_filename", "false".to_string());
        let signature = sign(&params, &credentials.api_secret);

        let file = Part::bytes(upload.bytes)
            .file_name(upload.file_name)
            .mime_str(&upload.content_type)?;

        let mut form = Form::new()
            .part("file", file)
            .text("api_key", credentials.api_key.clone())
            .text("signature", signature)
            .text("signature_algorithm", "sha256");
        for (key, value) in params {
            form = form.text(key, value);
        }

        let url = format!(
            "{}/v1_1/{}/{}/upload",
            self.api_base,
            credentials.cloud_name,
            upload.resource_type.as_str()
        );
        debug!(public_id = %upload.public_id, "uploading to Cloudinary");

        let response = self.http.post(&url).multipart(form).send().await?;
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            warn!(status = status.as_u16(), "Cloudinary upload failed");
            return Err(MediaError::Status {
                status: status.as_u16(),
                body,
            });
        }

        let parsed: UploadResponse = response.json().await?;
        let secure_url = parsed.secure_url.ok_or(MediaError::MissingUrl)?;
        info!(public_id = %upload.public_id, "upload stored");
        Ok(secure_url)
    }
}

/// `k1=v1&k2=v2...` over the parameters in key order.
pub fn string_to_sign(params: &BTreeMap<&str, String>) -> String {
    params
        .iter()
        .map(|(key, value)| format!("{key}={value}"))
        .collect::<Vec<_>>()
        .join("&")
}

pub fn sign(params: &BTreeMap<&str, String>, api_secret: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(string_to_sign(params).as_bytes());
    hasher.update(api_secret.as_bytes());
    hex::encode(hasher.finalize())
}
