//! Access tokens: issuing, verification, and the `token` cookie.
//!
//! The same HS256 token gates two boundaries: HTTP requests carry it in
//! the `token` cookie, realtime connections present it in the handshake
//! frame. Both fail closed.

use std::sync::Arc;

use axum::extract::FromRequestParts;
use axum::http::header::COOKIE;
use axum::http::request::Parts;
use axum::http::HeaderMap;
use chrono::Utc;
use jsonwebtoken::errors::ErrorKind;
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::config::DeploymentMode;
use crate::error::{AppError, AuthError};
use crate::state::AppState;
use crate::types::Document;

pub const TOKEN_COOKIE: &str = "token";

/// Decoded token claims. Issuers may put anything in a token; only
/// `exp` is required, and realtime sessions additionally need `email`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Claims {
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub iat: Option<i64>,
    pub exp: i64,
    #[serde(flatten)]
    pub extra: Document,
}

pub struct TokenKeys {
    encoding: EncodingKey,
    decoding: DecodingKey,
    validation: Validation,
    ttl_secs: i64,
}

impl TokenKeys {
    pub fn new(secret: &[u8], ttl_secs: i64) -> Self {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.validate_exp = true;
        // Claims are caller-defined; an `aud` among them must not fail decoding.
        validation.validate_aud = false;
        Self {
            encoding: EncodingKey::from_secret(secret),
            decoding: DecodingKey::from_secret(secret),
            validation,
            ttl_secs,
        }
    }

    /// Sign the caller's claims, stamping `iat` and `exp`.
    pub fn issue(&self, mut claims: Document) -> Result<String, jsonwebtoken::errors::Error> {
        let now = Utc::now().timestamp();
        claims.insert("iat".into(), Value::from(now));
        claims.insert("exp".into(), Value::from(now + self.ttl_secs));
        encode(&Header::default(), &claims, &self.encoding)
    }

    pub fn verify(&self, token: &str) -> Result<Claims, AuthError> {
        if token.is_empty() {
            return Err(AuthError::MissingToken);
        }
        decode::<Claims>(token, &self.decoding, &self.validation)
            .map(|data| data.claims)
            .map_err(|e| match e.kind() {
                ErrorKind::ExpiredSignature => AuthError::Expired,
                _ => AuthError::InvalidToken,
            })
    }
}

// ═══════════════════════════════════════════════════════════════
// Cookie
// ═══════════════════════════════════════════════════════════════

fn cookie_attributes(mode: DeploymentMode) -> &'static str {
    if mode.is_production() {
        "HttpOnly; Path=/; Secure; SameSite=None"
    } else {
        "HttpOnly; Path=/; SameSite=Strict"
    }
}

/// `Set-Cookie` value carrying a freshly issued token.
pub fn token_cookie(token: &str, mode: DeploymentMode) -> String {
    format!("{TOKEN_COOKIE}={token}; {}", cookie_attributes(mode))
}

/// `Set-Cookie` value that clears the token. Attributes must match the
/// issuing cookie or browsers keep the old one.
pub fn clear_token_cookie(mode: DeploymentMode) -> String {
    format!(
        "{TOKEN_COOKIE}=; {}; Max-Age=0; Expires=Thu, 01 Jan 1970 00:00:00 GMT",
        cookie_attributes(mode)
    )
}

/// Value of cookie `name` from the request's `Cookie` headers.
pub fn cookie_value<'a>(headers: &'a HeaderMap, name: &str) -> Option<&'a str> {
    headers
        .get_all(COOKIE)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .flat_map(|v| v.split(';'))
        .filter_map(|pair| pair.trim().split_once('='))
        .find(|(k, _)| *k == name)
        .map(|(_, v)| v)
}

// ═══════════════════════════════════════════════════════════════
// Extractor
// ═══════════════════════════════════════════════════════════════

/// Verified caller of a cookie-protected route.
#[derive(Debug, Clone)]
pub struct AuthUser(pub Claims);

impl FromRequestParts<Arc<AppState>> for AuthUser {
    type Rejection = AppError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &Arc<AppState>,
    ) -> Result<Self, Self::Rejection> {
        let token = cookie_value(&parts.headers, TOKEN_COOKIE)
            .filter(|t| !t.is_empty())
            .ok_or(AuthError::MissingToken)?;
        let claims = state.tokens.verify(token)?;
        Ok(AuthUser(claims))
    }
}
