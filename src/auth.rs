//! Bearer token verification.
//!
//! Identity is issued elsewhere; this service only checks an HS256 token and
//! reads the caller's username from it.

use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

use async_trait::async_trait;
use axum::extract::{FromRef, FromRequestParts};
use axum::http::{header, request::Parts};
use jsonwebtoken::{Algorithm, DecodingKey, EncodingKey, Header, Validation, decode, encode};
use serde::{Deserialize, Serialize};

use crate::errors::{ApiError, ErrorContext, ErrorResponse};

/// The authenticated caller
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Identity {
    pub username: String,
}

#[derive(Debug, thiserror::Error)]
pub enum AuthError {
    #[error("missing bearer token")]
    MissingToken,

    #[error("invalid token: {0}")]
    InvalidToken(String),

    #[error("token carries no usable identity")]
    MissingIdentity,
}

/// JWT claims accepted by [`JwtVerifier`]
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sub: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub username: Option<String>,
    pub exp: usize,
}

/// Resolves a bearer token to the caller's identity.
#[async_trait]
pub trait IdentityVerifier: Send + Sync {
    async fn verify(&self, token: &str) -> Result<Identity, AuthError>;
}

pub struct JwtVerifier {
    decoding_key: DecodingKey,
    validation: Validation,
}

impl JwtVerifier {
    pub fn new(secret: &str) -> Self {
        Self {
            decoding_key: DecodingKey::from_secret(secret.as_bytes()),
            validation: Validation::new(Algorithm::HS256),
        }
    }
}

#[async_trait]
impl IdentityVerifier for JwtVerifier {
    async fn verify(&self, token: &str) -> Result<Identity, AuthError> {
        let token_data = decode::<Claims>(token, &self.decoding_key, &self.validation)
            .map_err(|e| AuthError::InvalidToken(e.to_string()))?;

        // Prefer the explicit username claim, fall back to the subject
        let claims = token_data.claims;
        let username = claims
            .username
            .filter(|name| !name.trim().is_empty())
            .or(claims.sub.filter(|sub| !sub.trim().is_empty()))
            .ok_or(AuthError::MissingIdentity)?;

        Ok(Identity { username })
    }
}

/// Sign an HS256 token for `username`, valid for `ttl_secs` seconds.
pub fn sign_token(username: &str, secret: &str, ttl_secs: u64) -> anyhow::Result<String> {
    let expiration = SystemTime::now().duration_since(UNIX_EPOCH)?.as_secs() + ttl_secs;

    let claims = Claims {
        sub: Some(username.to_string()),
        username: Some(username.to_string()),
        exp: expiration as usize,
    };

    Ok(encode(
        &Header::new(Algorithm::HS256),
        &claims,
        &EncodingKey::from_secret(secret.as_bytes()),
    )?)
}

/// Extract the token from an `Authorization: Bearer <token>` header value
pub fn bearer_token(value: &str) -> Option<&str> {
    value
        .strip_prefix("Bearer ")
        .map(str::trim)
        .filter(|token| !token.is_empty())
}

/// Extractor for handlers that require an authenticated caller
#[derive(Debug, Clone)]
pub struct CurrentUser(pub Identity);

#[async_trait]
impl<S> FromRequestParts<S> for CurrentUser
where
    Arc<dyn IdentityVerifier>: FromRef<S>,
    S: Send + Sync,
{
    type Rejection = ErrorResponse;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let verifier = <Arc<dyn IdentityVerifier> as FromRef<S>>::from_ref(state);

        let token = parts
            .headers
            .get(header::AUTHORIZATION)
            .and_then(|value| value.to_str().ok())
            .and_then(bearer_token)
            .ok_or(AuthError::MissingToken);

        let identity = match token {
            Ok(token) => verifier.verify(token).await,
            Err(e) => Err(e),
        };

        identity.map(CurrentUser).map_err(|e| {
            ApiError::Unauthorized(e.to_string()).to_response_with_context(ErrorContext::new(
                "authenticate",
                "identity",
            ))
        })
    }
}
