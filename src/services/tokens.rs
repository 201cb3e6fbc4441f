// src/services/tokens.rs
//! Access/refresh token issuance and verification.
//!
//! Both tokens are HS256 JWTs carrying the same claim shape but signed with
//! different secrets, so a refresh token can never pass as an access token.
//! Every verification failure collapses into [`TokenError::InvalidToken`].

use chrono::Duration;
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, error};
use uuid::Uuid;

use crate::common::clock::Clock;
use crate::common::config::{AuthConfig, TOKEN_AUDIENCE, TOKEN_ISSUER};

#[derive(Debug, Error)]
pub enum TokenError {
    #[error("Invalid or expired token")]
    InvalidToken,

    #[error("Token signing failed: {0}")]
    Signing(String),
}

/// JWT claims
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct TokenClaims {
    #[serde(rename = "userId")]
    pub user_id: String,
    pub email: String,
    /// Account token version at issuance; a bump revokes the token
    pub ver: i64,
    pub iss: String,
    pub aud: String,
    pub iat: i64,
    pub exp: i64,
    pub jti: String,
}

/// Identity a token pair is minted for
#[derive(Debug, Clone)]
pub struct TokenSubject {
    pub user_id: String,
    pub email: String,
    pub token_version: i64,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TokenPair {
    pub access_token: String,
    pub refresh_token: String,
    /// Access token lifetime in seconds
    pub expires_in: i64,
}

struct KeyPair {
    encoding: EncodingKey,
    decoding: DecodingKey,
}

impl KeyPair {
    fn from_secret(secret: &str) -> Self {
        Self {
            encoding: EncodingKey::from_secret(secret.as_bytes()),
            decoding: DecodingKey::from_secret(secret.as_bytes()),
        }
    }
}

#[derive(Clone)]
pub struct TokenService {
    access: Arc<KeyPair>,
    refresh: Arc<KeyPair>,
    access_ttl: Duration,
    refresh_ttl: Duration,
    clock: Arc<dyn Clock>,
}

impl TokenService {
    pub fn new(config: &AuthConfig, clock: Arc<dyn Clock>) -> Self {
        Self {
            access: Arc::new(KeyPair::from_secret(&config.jwt_secret)),
            refresh: Arc::new(KeyPair::from_secret(&config.jwt_refresh_secret)),
            access_ttl: config.access_token_ttl,
            refresh_ttl: config.refresh_token_ttl,
            clock,
        }
    }

    pub fn refresh_ttl(&self) -> Duration {
        self.refresh_ttl
    }

    fn sign(&self, keys: &KeyPair, subject: &TokenSubject, ttl: Duration) -> Result<String, TokenError> {
        let now = self.clock.now();
        let claims = TokenClaims {
            user_id: subject.user_id.clone(),
            email: subject.email.clone(),
            ver: subject.token_version,
            iss: TOKEN_ISSUER.to_string(),
            aud: TOKEN_AUDIENCE.to_string(),
            iat: now.timestamp(),
            exp: (now + ttl).timestamp(),
            jti: Uuid::new_v4().to_string(),
        };

        encode(&Header::new(Algorithm::HS256), &claims, &keys.encoding).map_err(|e| {
            error!(error = %e, "Failed to sign token");
            TokenError::Signing(e.to_string())
        })
    }

    pub fn issue_pair(&self, subject: &TokenSubject) -> Result<TokenPair, TokenError> {
        let pair = TokenPair {
            access_token: self.sign(&self.access, subject, self.access_ttl)?,
            refresh_token: self.sign(&self.refresh, subject, self.refresh_ttl)?,
            expires_in: self.access_ttl.num_seconds(),
        };
        debug!(user_id = %subject.user_id, "Issued token pair");
        Ok(pair)
    }

    fn verify(&self, keys: &KeyPair, token: &str) -> Result<TokenClaims, TokenError> {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.set_issuer(&[TOKEN_ISSUER]);
        validation.set_audience(&[TOKEN_AUDIENCE]);
        // Expiry is judged against the injected clock below
        validation.validate_exp = false;
        validation.leeway = 0;
        validation.set_required_spec_claims(&["exp", "iss", "aud"]);

        let claims = decode::<TokenClaims>(token, &keys.decoding, &validation)
            .map_err(|e| {
                debug!(error = %e, "Token rejected");
                TokenError::InvalidToken
            })?
            .claims;

        if claims.exp <= self.clock.now().timestamp() {
            debug!("Token rejected: expired");
            return Err(TokenError::InvalidToken);
        }
        Ok(claims)
    }

    pub fn verify_access(&self, token: &str) -> Result<TokenClaims, TokenError> {
        self.verify(&self.access, token)
    }

    pub fn verify_refresh(&self, token: &str) -> Result<TokenClaims, TokenError> {
        self.verify(&self.refresh, token)
    }
}

/// Token from an `Authorization: Bearer <token>` header value. Anything else is `None`.
pub fn extract_bearer(header: &str) -> Option<&str> {
    header
        .strip_prefix("Bearer ")
        .map(str::trim)
        .filter(|token| !token.is_empty())
}
