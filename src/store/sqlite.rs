//! SQLite implementation of [`CredentialStore`]

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::SqlitePool;
use tracing::debug;

use super::{
    CredentialStore, NewUser, OAuthAccount, OAuthAccountUpsert, OtpRecord, OtpSubject,
    ProfileUpdate, Provider, StoreResult, User, VerifiedFlags,
};
use crate::common::id_generator::{generate_oauth_account_id, generate_otp_id, generate_user_id};

#[derive(Clone)]
pub struct SqliteCredentialStore {
    pool: SqlitePool,
}

impl SqliteCredentialStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    #[cfg(test)]
    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }
}

/// Column and bound value selecting one OTP subject
fn subject_filter(subject: &OtpSubject) -> (&'static str, &str) {
    match subject {
        OtpSubject::UserId(id) => ("user_id", id.as_str()),
        OtpSubject::Email(email) => ("email", email.as_str()),
    }
}

#[async_trait]
impl CredentialStore for SqliteCredentialStore {
    async fn find_user_by_email(&self, email: &str) -> StoreResult<Option<User>> {
        let user = sqlx::query_as::<_, User>("SELECT * FROM users WHERE email = ?")
            .bind(email)
            .fetch_optional(&self.pool)
            .await?;
        Ok(user)
    }

    async fn find_user_by_id(&self, id: &str) -> StoreResult<Option<User>> {
        let user = sqlx::query_as::<_, User>("SELECT * FROM users WHERE id = ?")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(user)
    }

    async fn create_user(&self, input: NewUser, now: DateTime<Utc>) -> StoreResult<User> {
        let user = sqlx::query_as::<_, User>(
            r#"
            INSERT INTO users (id, email, password_hash, name, avatar_url, created_at)
            VALUES (?, ?, ?, ?, ?, ?)
            RETURNING *
            "#,
        )
        .bind(generate_user_id())
        .bind(&input.email)
        .bind(&input.password_hash)
        .bind(&input.name)
        .bind(&input.avatar_url)
        .bind(now.timestamp_millis())
        .fetch_one(&self.pool)
        .await?;

        debug!(user_id = %user.id, "User row created");
        Ok(user)
    }

    async fn update_password(&self, user_id: &str, password_hash: &str) -> StoreResult<bool> {
        let result = sqlx::query("UPDATE users SET password_hash = ? WHERE id = ?")
            .bind(password_hash)
            .bind(user_id)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn update_profile(
        &self,
        user_id: &str,
        update: ProfileUpdate,
    ) -> StoreResult<Option<User>> {
        let user = sqlx::query_as::<_, User>(
            r#"
            UPDATE users
            SET name = COALESCE(?, name),
                avatar_url = COALESCE(?, avatar_url)
            WHERE id = ?
            RETURNING *
            "#,
        )
        .bind(update.name)
        .bind(update.avatar_url)
        .bind(user_id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(user)
    }

    async fn set_verified_flags(
        &self,
        user_id: &str,
        flags: VerifiedFlags,
    ) -> StoreResult<Option<User>> {
        let user = sqlx::query_as::<_, User>(
            r#"
            UPDATE users
            SET email_verified = COALESCE(?, email_verified),
                is_verified = COALESCE(?, is_verified),
                is_github_verified = COALESCE(?, is_github_verified)
            WHERE id = ?
            RETURNING *
            "#,
        )
        .bind(flags.email_verified)
        .bind(flags.is_verified)
        .bind(flags.github_verified)
        .bind(user_id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(user)
    }

    async fn bump_token_version(&self, user_id: &str) -> StoreResult<Option<i64>> {
        let version: Option<(i64,)> = sqlx::query_as(
            "UPDATE users SET token_version = token_version + 1 WHERE id = ? RETURNING token_version",
        )
        .bind(user_id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(version.map(|(v,)| v))
    }

    async fn delete_user(&self, user_id: &str) -> StoreResult<bool> {
        // Linked accounts and OTPs go with it via ON DELETE CASCADE
        let result = sqlx::query("DELETE FROM users WHERE id = ?")
            .bind(user_id)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn upsert_oauth_account(
        &self,
        input: OAuthAccountUpsert,
        now: DateTime<Utc>,
    ) -> StoreResult<OAuthAccount> {
        let account = sqlx::query_as::<_, OAuthAccount>(
            r#"
            INSERT INTO oauth_accounts
                (id, user_id, provider, provider_id, access_token, refresh_token, expires_at, created_at)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?)
            ON CONFLICT(provider, provider_id) DO UPDATE SET
                user_id = excluded.user_id,
                access_token = excluded.access_token,
                refresh_token = excluded.refresh_token,
                expires_at = excluded.expires_at
            RETURNING *
            "#,
        )
        .bind(generate_oauth_account_id())
        .bind(&input.user_id)
        .bind(input.provider)
        .bind(&input.provider_id)
        .bind(&input.access_token)
        .bind(&input.refresh_token)
        .bind(input.expires_at)
        .bind(now.timestamp_millis())
        .fetch_one(&self.pool)
        .await?;
        Ok(account)
    }

    async fn insert_oauth_account(
        &self,
        input: OAuthAccountUpsert,
        now: DateTime<Utc>,
    ) -> StoreResult<OAuthAccount> {
        let account = sqlx::query_as::<_, OAuthAccount>(
            r#"
            INSERT INTO oauth_accounts
                (id, user_id, provider, provider_id, access_token, refresh_token, expires_at, created_at)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?)
            RETURNING *
            "#,
        )
        .bind(generate_oauth_account_id())
        .bind(&input.user_id)
        .bind(input.provider)
        .bind(&input.provider_id)
        .bind(&input.access_token)
        .bind(&input.refresh_token)
        .bind(input.expires_at)
        .bind(now.timestamp_millis())
        .fetch_one(&self.pool)
        .await?;
        Ok(account)
    }

    async fn find_oauth_account(
        &self,
        provider: Provider,
        provider_id: &str,
    ) -> StoreResult<Option<OAuthAccount>> {
        let account = sqlx::query_as::<_, OAuthAccount>(
            "SELECT * FROM oauth_accounts WHERE provider = ? AND provider_id = ?",
        )
        .bind(provider)
        .bind(provider_id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(account)
    }

    async fn list_oauth_accounts_for_user(&self, user_id: &str) -> StoreResult<Vec<OAuthAccount>> {
        let accounts = sqlx::query_as::<_, OAuthAccount>(
            "SELECT * FROM oauth_accounts WHERE user_id = ? ORDER BY created_at ASC",
        )
        .bind(user_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(accounts)
    }

    async fn delete_oauth_account(&self, user_id: &str, provider: Provider) -> StoreResult<bool> {
        let result = sqlx::query("DELETE FROM oauth_accounts WHERE user_id = ? AND provider = ?")
            .bind(user_id)
            .bind(provider)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn insert_otp(
        &self,
        subject: &OtpSubject,
        code: &str,
        created_at: DateTime<Utc>,
        expires_at: DateTime<Utc>,
    ) -> StoreResult<OtpRecord> {
        let (user_id, email) = match subject {
            OtpSubject::UserId(id) => (Some(id.as_str()), None),
            OtpSubject::Email(email) => (None, Some(email.as_str())),
        };

        let record = sqlx::query_as::<_, OtpRecord>(
            r#"
            INSERT INTO otps (id, user_id, email, code, expires_at, created_at)
            VALUES (?, ?, ?, ?, ?, ?)
            RETURNING *
            "#,
        )
        .bind(generate_otp_id())
        .bind(user_id)
        .bind(email)
        .bind(code)
        .bind(expires_at.timestamp_millis())
        .bind(created_at.timestamp_millis())
        .fetch_one(&self.pool)
        .await?;
        Ok(record)
    }

    async fn delete_otps_for_subject(&self, subject: &OtpSubject) -> StoreResult<u64> {
        let (column, value) = subject_filter(subject);
        let result = sqlx::query(&format!("DELETE FROM otps WHERE {} = ?", column))
            .bind(value)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected())
    }

    async fn find_live_otp(
        &self,
        subject: &OtpSubject,
        code: &str,
        now: DateTime<Utc>,
    ) -> StoreResult<Option<OtpRecord>> {
        let (column, value) = subject_filter(subject);
        let record = sqlx::query_as::<_, OtpRecord>(&format!(
            "SELECT * FROM otps WHERE {} = ? AND code = ? AND expires_at > ? LIMIT 1",
            column
        ))
        .bind(value)
        .bind(code)
        .bind(now.timestamp_millis())
        .fetch_optional(&self.pool)
        .await?;
        Ok(record)
    }

    async fn delete_otp_by_id(&self, id: &str) -> StoreResult<bool> {
        let result = sqlx::query("DELETE FROM otps WHERE id = ?")
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn count_otps_created_since(
        &self,
        subject: &OtpSubject,
        since: DateTime<Utc>,
    ) -> StoreResult<i64> {
        let (column, value) = subject_filter(subject);
        let (count,): (i64,) = sqlx::query_as(&format!(
            "SELECT COUNT(*) FROM otps WHERE {} = ? AND created_at > ?",
            column
        ))
        .bind(value)
        .bind(since.timestamp_millis())
        .fetch_one(&self.pool)
        .await?;
        Ok(count)
    }

    async fn delete_expired_otps(&self, now: DateTime<Utc>) -> StoreResult<u64> {
        let result = sqlx::query("DELETE FROM otps WHERE expires_at <= ?")
            .bind(now.timestamp_millis())
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected())
    }
}
