//! Persisted identity records and the inputs used to write them

use chrono::{DateTime, TimeZone, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use std::fmt;
use std::str::FromStr;

/// External OAuth identity source
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, sqlx::Type)]
#[serde(rename_all = "lowercase")]
#[sqlx(rename_all = "lowercase")]
pub enum Provider {
    Google,
    Github,
}

impl Provider {
    pub fn as_str(&self) -> &'static str {
        match self {
            Provider::Google => "google",
            Provider::Github => "github",
        }
    }
}

impl fmt::Display for Provider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Provider {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "google" => Ok(Provider::Google),
            "github" => Ok(Provider::Github),
            other => Err(format!("unsupported OAuth provider: {other}")),
        }
    }
}

/// User database model. The email is stored normalized and is unique.
#[derive(FromRow, Clone)]
pub struct User {
    pub id: String,
    pub email: String,
    pub password_hash: Option<String>,
    pub name: Option<String>,
    pub avatar_url: Option<String>,
    pub email_verified: bool,
    pub is_verified: bool,
    pub is_github_verified: bool,
    pub token_version: i64,
    pub created_at: i64,
}

impl User {
    pub fn has_password(&self) -> bool {
        self.password_hash.is_some()
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        millis_to_datetime(self.created_at)
    }
}

impl fmt::Debug for User {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("User")
            .field("id", &self.id)
            .field("email", &self.email)
            .field("has_password", &self.has_password())
            .field("name", &self.name)
            .field("email_verified", &self.email_verified)
            .field("is_verified", &self.is_verified)
            .field("is_github_verified", &self.is_github_verified)
            .field("token_version", &self.token_version)
            .finish()
    }
}

/// One (provider, provider_id) identity owned by exactly one user
#[derive(FromRow, Clone)]
pub struct OAuthAccount {
    pub id: String,
    pub user_id: String,
    pub provider: Provider,
    pub provider_id: String,
    pub access_token: Option<String>,
    pub refresh_token: Option<String>,
    pub expires_at: Option<i64>,
    pub created_at: i64,
}

impl OAuthAccount {
    pub fn linked_at(&self) -> DateTime<Utc> {
        millis_to_datetime(self.created_at)
    }
}

impl fmt::Debug for OAuthAccount {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("OAuthAccount")
            .field("id", &self.id)
            .field("user_id", &self.user_id)
            .field("provider", &self.provider)
            .field("provider_id", &self.provider_id)
            .field("expires_at", &self.expires_at)
            .finish_non_exhaustive()
    }
}

/// Who an OTP proves control for: an existing account or a bare email
/// collected before any account exists.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum OtpSubject {
    UserId(String),
    Email(String),
}

impl OtpSubject {
    pub fn kind(&self) -> &'static str {
        match self {
            OtpSubject::UserId(_) => "user",
            OtpSubject::Email(_) => "email",
        }
    }
}

#[derive(FromRow, Clone)]
pub struct OtpRecord {
    pub id: String,
    pub user_id: Option<String>,
    pub email: Option<String>,
    pub code: String,
    pub expires_at: i64,
    pub created_at: i64,
}

impl OtpRecord {
    pub fn subject(&self) -> Option<OtpSubject> {
        match (&self.user_id, &self.email) {
            (Some(id), None) => Some(OtpSubject::UserId(id.clone())),
            (None, Some(email)) => Some(OtpSubject::Email(email.clone())),
            _ => None,
        }
    }

    pub fn expires_at(&self) -> DateTime<Utc> {
        millis_to_datetime(self.expires_at)
    }
}

impl fmt::Debug for OtpRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("OtpRecord")
            .field("id", &self.id)
            .field("subject", &self.subject())
            .field("expires_at", &self.expires_at)
            .finish_non_exhaustive()
    }
}

/// Input for creating a user
#[derive(Clone)]
pub struct NewUser {
    pub email: String,
    pub password_hash: Option<String>,
    pub name: Option<String>,
    pub avatar_url: Option<String>,
}

/// Partial profile update; `None` leaves the column untouched
#[derive(Debug, Clone, Default)]
pub struct ProfileUpdate {
    pub name: Option<String>,
    pub avatar_url: Option<String>,
}

/// Partial update of the per-path verification booleans
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct VerifiedFlags {
    pub email_verified: Option<bool>,
    pub is_verified: Option<bool>,
    pub github_verified: Option<bool>,
}

impl VerifiedFlags {
    /// Email control proven, by OTP or by a provider vouching for it
    pub fn email_proven() -> Self {
        Self {
            email_verified: Some(true),
            is_verified: Some(true),
            github_verified: None,
        }
    }

    pub fn github() -> Self {
        Self {
            github_verified: Some(true),
            ..Self::default()
        }
    }
}

/// Insert-or-update keyed on (provider, provider_id)
#[derive(Clone)]
pub struct OAuthAccountUpsert {
    pub user_id: String,
    pub provider: Provider,
    pub provider_id: String,
    pub access_token: Option<String>,
    pub refresh_token: Option<String>,
    pub expires_at: Option<i64>,
}

pub fn millis_to_datetime(millis: i64) -> DateTime<Utc> {
    Utc.timestamp_millis_opt(millis)
        .single()
        .unwrap_or(DateTime::<Utc>::MIN_UTC)
}
