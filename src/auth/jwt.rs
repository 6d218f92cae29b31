//! Session token issue and validation.
//!
//! Tokens are HS256 JWTs whose subject is the user's email. They carry no other
//! claims besides `iat`/`exp`; everything else is looked up per request.

use chrono::Utc;
use jsonwebtoken::errors::ErrorKind;
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use rand::RngCore;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::config::AuthConfig;

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct Claims {
    pub sub: String,
    pub iat: i64,
    pub exp: i64,
}

#[derive(Debug, Error)]
pub enum JwtError {
    #[error("JWT expired")]
    Expired,
    #[error("Invalid JWT: {0}")]
    Invalid(String),
    #[error("Failed to sign JWT: {0}")]
    Signing(String),
}

pub struct JwtService {
    encoding: EncodingKey,
    decoding: DecodingKey,
    validity_minutes: i64,
}

impl JwtService {
    pub fn new(secret: &[u8], validity_minutes: i64) -> Self {
        JwtService {
            encoding: EncodingKey::from_secret(secret),
            decoding: DecodingKey::from_secret(secret),
            validity_minutes,
        }
    }

    /// Builds the service from `[auth]`. Without a configured secret every process
    /// start gets a fresh key, which invalidates all outstanding sessions.
    pub fn from_config(config: &AuthConfig) -> Self {
        if config.jwt_secret.is_empty() {
            Self::new(&random_secret(), config.token_validity_minutes)
        } else {
            Self::new(config.jwt_secret.as_bytes(), config.token_validity_minutes)
        }
    }

    pub fn validity_minutes(&self) -> i64 {
        self.validity_minutes
    }

    pub fn generate_token(&self, email: &str) -> Result<String, JwtError> {
        let now = Utc::now().timestamp();
        let claims = Claims {
            sub: email.to_string(),
            iat: now,
            exp: now + self.validity_minutes * 60,
        };
        encode(&Header::new(Algorithm::HS256), &claims, &self.encoding)
            .map_err(|e| JwtError::Signing(e.to_string()))
    }

    fn decode_claims(&self, token: &str) -> Result<Claims, JwtError> {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.leeway = 0;
        validation.set_required_spec_claims(&["exp", "sub"]);

        decode::<Claims>(token, &self.decoding, &validation)
            .map(|data| data.claims)
            .map_err(|e| match e.kind() {
                ErrorKind::ExpiredSignature => JwtError::Expired,
                _ => JwtError::Invalid(e.to_string()),
            })
    }

    /// The email carried by a verified, unexpired token.
    pub fn extract_subject(&self, token: &str) -> Result<String, JwtError> {
        self.decode_claims(token).map(|claims| claims.sub)
    }

    pub fn validate_token(&self, token: &str, email: &str) -> bool {
        match self.decode_claims(token) {
            Ok(claims) => claims.sub == email && claims.exp > Utc::now().timestamp(),
            Err(_) => false,
        }
    }

    pub fn remaining_validity_minutes(&self, token: &str) -> Result<i64, JwtError> {
        let claims = self.decode_claims(token)?;
        Ok((claims.exp - Utc::now().timestamp()).div_euclid(60))
    }
}

fn random_secret() -> [u8; 32] {
    let mut secret = [0u8; 32];
    rand::thread_rng().fill_bytes(&mut secret);
    secret
}
