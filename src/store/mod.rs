//! # Credential Store
//!
//! Typed query contract over persisted users, linked OAuth accounts and OTP
//! records. The identity, OTP and account services only see the
//! [`CredentialStore`] trait; [`SqliteCredentialStore`] is the production
//! implementation. The store is the single source of truth: uniqueness of
//! `users.email` and of `(provider, provider_id)` is enforced here and
//! surfaces as [`StoreError::Conflict`].

pub mod models;
pub mod sqlite;


use async_trait::async_trait;
use chrono::{DateTime, Utc};
use thiserror::Error;

pub use models::{
    NewUser, OAuthAccount, OAuthAccountUpsert, OtpRecord, OtpSubject, ProfileUpdate, Provider,
    User, VerifiedFlags,
};
pub use sqlite::SqliteCredentialStore;

#[derive(Debug, Error)]
pub enum StoreError {
    /// A unique constraint rejected the write
    #[error("Conflicting record: {0}")]
    Conflict(String),

    /// The store could not be reached in time; safe to retry
    #[error("Credential store unavailable: {0}")]
    Unavailable(String),

    #[error("Database error: {0}")]
    Database(sqlx::Error),
}

impl From<sqlx::Error> for StoreError {
    fn from(err: sqlx::Error) -> Self {
        match &err {
            sqlx::Error::Database(db_err) if db_err.is_unique_violation() => {
                StoreError::Conflict(db_err.message().to_string())
            }
            sqlx::Error::PoolTimedOut => StoreError::Unavailable(err.to_string()),
            _ => StoreError::Database(err),
        }
    }
}

pub type StoreResult<T> = Result<T, StoreError>;

#[async_trait]
pub trait CredentialStore: Send + Sync {
    // ---- Users ----

    async fn find_user_by_email(&self, email: &str) -> StoreResult<Option<User>>;
    async fn find_user_by_id(&self, id: &str) -> StoreResult<Option<User>>;
    /// Fails with `Conflict` when the email is already taken
    async fn create_user(&self, input: NewUser, now: DateTime<Utc>) -> StoreResult<User>;
    async fn update_password(&self, user_id: &str, password_hash: &str) -> StoreResult<bool>;
    async fn update_profile(
        &self,
        user_id: &str,
        update: ProfileUpdate,
    ) -> StoreResult<Option<User>>;
    async fn set_verified_flags(
        &self,
        user_id: &str,
        flags: VerifiedFlags,
    ) -> StoreResult<Option<User>>;
    /// Invalidates every token issued so far; returns the new version
    async fn bump_token_version(&self, user_id: &str) -> StoreResult<Option<i64>>;
    async fn delete_user(&self, user_id: &str) -> StoreResult<bool>;

    // ---- OAuth accounts ----

    /// Insert, or overwrite owner and tokens of an existing (provider, provider_id) row
    async fn upsert_oauth_account(
        &self,
        input: OAuthAccountUpsert,
        now: DateTime<Utc>,
    ) -> StoreResult<OAuthAccount>;
    /// Strict insert; `Conflict` if the (provider, provider_id) pair is already linked
    async fn insert_oauth_account(
        &self,
        input: OAuthAccountUpsert,
        now: DateTime<Utc>,
    ) -> StoreResult<OAuthAccount>;
    async fn find_oauth_account(
        &self,
        provider: Provider,
        provider_id: &str,
    ) -> StoreResult<Option<OAuthAccount>>;
    async fn list_oauth_accounts_for_user(&self, user_id: &str) -> StoreResult<Vec<OAuthAccount>>;
    async fn delete_oauth_account(&self, user_id: &str, provider: Provider) -> StoreResult<bool>;

    // ---- OTPs ----

    async fn insert_otp(
        &self,
        subject: &OtpSubject,
        code: &str,
        created_at: DateTime<Utc>,
        expires_at: DateTime<Utc>,
    ) -> StoreResult<OtpRecord>;
    async fn delete_otps_for_subject(&self, subject: &OtpSubject) -> StoreResult<u64>;
    /// Unexpired record for exactly this subject and code
    async fn find_live_otp(
        &self,
        subject: &OtpSubject,
        code: &str,
        now: DateTime<Utc>,
    ) -> StoreResult<Option<OtpRecord>>;
    async fn delete_otp_by_id(&self, id: &str) -> StoreResult<bool>;
    /// Records created after `since`, expired or not
    async fn count_otps_created_since(
        &self,
        subject: &OtpSubject,
        since: DateTime<Utc>,
    ) -> StoreResult<i64>;
    async fn delete_expired_otps(&self, now: DateTime<Utc>) -> StoreResult<u64>;
}

/// Single-connection in-memory store with the schema applied
#[cfg(test)]
pub async fn memory_store() -> SqliteCredentialStore {
    use sqlx::sqlite::SqlitePoolOptions;

    let pool = SqlitePoolOptions::new()
        .max_connections(1)
        .idle_timeout(None)
        .max_lifetime(None)
        .connect("sqlite::memory:")
        .await
        .unwrap();
    crate::common::migrations::run_migrations(&pool).await.unwrap();
    SqliteCredentialStore::new(pool)
}
