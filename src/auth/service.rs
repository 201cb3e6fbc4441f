//! Password, OTP and session flows for accounts
//!
//! Handlers hand in shape-validated input; everything semantic (existence,
//! expiry, uniqueness, token versions) is checked here.

use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::common::clock::Clock;
use crate::common::error::AuthError;
use crate::common::helpers::normalize_email;
use crate::common::safe_email_log;
use crate::services::email::AlertDetails;
use crate::services::{
    Mailer, OtpService, PasswordHasherService, PendingRegistration, PendingRegistrationStore,
    TokenPair, TokenService, TokenSubject,
};
use crate::store::{
    CredentialStore, NewUser, OAuthAccount, OtpSubject, ProfileUpdate, StoreError, User,
    VerifiedFlags,
};

const INVALID_CREDENTIALS: &str = "Invalid email or password";
const INVALID_REFRESH: &str = "Invalid or expired refresh token";
const INVALID_CODE: &str = "Invalid or expired verification code";
const ALREADY_VERIFIED: &str = "Email is already verified";
const WAIT_FOR_CODE: &str = "Please wait before requesting another verification code";

#[derive(Clone)]
pub struct AuthService {
    store: Arc<dyn CredentialStore>,
    otp: OtpService,
    pending: PendingRegistrationStore,
    tokens: TokenService,
    hasher: PasswordHasherService,
    mailer: Arc<dyn Mailer>,
    clock: Arc<dyn Clock>,
    resend_window_minutes: i64,
}

pub fn token_subject(user: &User) -> TokenSubject {
    TokenSubject {
        user_id: user.id.clone(),
        email: user.email.clone(),
        token_version: user.token_version,
    }
}

impl AuthService {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        store: Arc<dyn CredentialStore>,
        otp: OtpService,
        pending: PendingRegistrationStore,
        tokens: TokenService,
        hasher: PasswordHasherService,
        mailer: Arc<dyn Mailer>,
        clock: Arc<dyn Clock>,
        resend_window_minutes: i64,
    ) -> Self {
        Self {
            store,
            otp,
            pending,
            tokens,
            hasher,
            mailer,
            clock,
            resend_window_minutes,
        }
    }

    pub fn tokens(&self) -> &TokenService {
        &self.tokens
    }

    pub fn issue_pair(&self, user: &User) -> Result<TokenPair, AuthError> {
        Ok(self.tokens.issue_pair(&token_subject(user))?)
    }

    async fn require_user(&self, user_id: &str) -> Result<User, AuthError> {
        self.store
            .find_user_by_id(user_id)
            .await?
            .ok_or_else(|| AuthError::NotFound("User not found".into()))
    }

    // ---- Registration ----

    /// Stage a signup and email its OTP. Nothing is persisted as a user yet.
    pub async fn pre_register(
        &self,
        email: &str,
        password: &str,
        name: &str,
    ) -> Result<(), AuthError> {
        let email = normalize_email(email);

        if self.store.find_user_by_email(&email).await?.is_some() {
            return Err(AuthError::Validation("Email already registered".into()));
        }

        let subject = OtpSubject::Email(email.clone());
        if self
            .otp
            .has_recent_otp(&subject, self.resend_window_minutes)
            .await?
        {
            return Err(AuthError::RateLimited(WAIT_FOR_CODE.into()));
        }

        let password_hash = self.hasher.hash(password).await?;
        let record = self.otp.create_otp(&subject).await?;
        self.mailer
            .send_verification_email(&email, Some(name), &record.code)
            .await?;

        self.pending
            .set(
                &email,
                PendingRegistration {
                    email: email.clone(),
                    name: name.trim().to_string(),
                    password_hash,
                },
            )
            .await;

        info!(email = %safe_email_log(&email), "Registration staged");
        Ok(())
    }

    /// Promote a staged signup into a verified user once its OTP checks out
    pub async fn verify_registration(
        &self,
        email: &str,
        code: &str,
    ) -> Result<(User, TokenPair), AuthError> {
        let email = normalize_email(email);

        let Some(pending) = self.pending.get(&email).await else {
            return Err(AuthError::Validation(
                "No pending registration found. Please sign up again.".into(),
            ));
        };

        if !self
            .otp
            .verify_otp(&OtpSubject::Email(email.clone()), code)
            .await?
        {
            return Err(AuthError::Validation(INVALID_CODE.into()));
        }

        let new_user = NewUser {
            email: pending.email.clone(),
            password_hash: Some(pending.password_hash.clone()),
            name: Some(pending.name.clone()),
            avatar_url: None,
        };

        let created = match self.store.create_user(new_user, self.clock.now()).await {
            Ok(user) => Some(user),
            // Someone registered this email meanwhile; the OTP still proves control of it
            Err(StoreError::Conflict(_)) => None,
            Err(e) => return Err(e.into()),
        };
        let user_id = match &created {
            Some(user) => user.id.clone(),
            None => {
                warn!(email = %safe_email_log(&email), "Registration raced with another signup");
                self.store
                    .find_user_by_email(&email)
                    .await?
                    .ok_or_else(|| AuthError::Internal("conflicting user vanished".into()))?
                    .id
            }
        };

        let user = self
            .store
            .set_verified_flags(&user_id, VerifiedFlags::email_proven())
            .await?
            .ok_or_else(|| AuthError::Internal("registered user vanished".into()))?;

        self.pending.delete(&email).await;

        if created.is_some() {
            self.send_welcome(&user).await;
        }

        let tokens = self.issue_pair(&user)?;
        info!(user_id = %user.id, "Registration completed");
        Ok((user, tokens))
    }

    // ---- Sessions ----

    pub async fn login(&self, email: &str, password: &str) -> Result<(User, TokenPair), AuthError> {
        let email = normalize_email(email);

        let Some(user) = self.store.find_user_by_email(&email).await? else {
            debug!(email = %safe_email_log(&email), "Login for unknown email");
            return Err(AuthError::Unauthorized(INVALID_CREDENTIALS.into()));
        };

        let Some(hash) = user.password_hash.as_deref() else {
            return Err(AuthError::Unauthorized(
                "Please login with your social account".into(),
            ));
        };

        if !self.hasher.verify(password, hash).await? {
            warn!(user_id = %user.id, "Login with wrong password");
            return Err(AuthError::Unauthorized(INVALID_CREDENTIALS.into()));
        }

        let tokens = self.issue_pair(&user)?;
        info!(user_id = %user.id, "Login successful");
        Ok((user, tokens))
    }

    /// Rotate a refresh token into a fresh pair
    pub async fn refresh(&self, refresh_token: &str) -> Result<(User, TokenPair), AuthError> {
        let claims = self
            .tokens
            .verify_refresh(refresh_token)
            .map_err(|_| AuthError::Unauthorized(INVALID_REFRESH.into()))?;

        let Some(user) = self.store.find_user_by_id(&claims.user_id).await? else {
            return Err(AuthError::Unauthorized("User not found".into()));
        };

        if claims.ver != user.token_version {
            warn!(user_id = %user.id, "Refresh with revoked token version");
            return Err(AuthError::Unauthorized(INVALID_REFRESH.into()));
        }

        let tokens = self.issue_pair(&user)?;
        debug!(user_id = %user.id, "Token pair rotated");
        Ok((user, tokens))
    }

    /// Resolve a bearer access token to its current user
    pub async fn authenticate(&self, access_token: &str) -> Result<User, AuthError> {
        let claims = self.tokens.verify_access(access_token).map_err(|_| {
            AuthError::Unauthorized("Invalid or expired access token".into())
        })?;

        let Some(user) = self.store.find_user_by_id(&claims.user_id).await? else {
            return Err(AuthError::Unauthorized("User not found".into()));
        };

        if claims.ver != user.token_version {
            return Err(AuthError::Unauthorized("Invalid or expired access token".into()));
        }
        Ok(user)
    }

    /// Revoke every token issued to the user so far
    pub async fn logout_all(&self, user_id: &str) -> Result<(), AuthError> {
        self.store
            .bump_token_version(user_id)
            .await?
            .ok_or_else(|| AuthError::NotFound("User not found".into()))?;
        info!(user_id = %user_id, "All sessions revoked");
        Ok(())
    }

    // ---- Profile ----

    pub async fn profile(&self, user_id: &str) -> Result<(User, Vec<OAuthAccount>), AuthError> {
        let user = self.require_user(user_id).await?;
        let accounts = self.store.list_oauth_accounts_for_user(user_id).await?;
        Ok((user, accounts))
    }

    pub async fn update_profile(
        &self,
        user_id: &str,
        update: ProfileUpdate,
    ) -> Result<User, AuthError> {
        let update = ProfileUpdate {
            name: update.name.map(|n| n.trim().to_string()),
            avatar_url: update.avatar_url,
        };
        self.store
            .update_profile(user_id, update)
            .await?
            .ok_or_else(|| AuthError::NotFound("User not found".into()))
    }

    /// Replace the password and revoke outstanding tokens. Returns a pair for
    /// the caller's own session.
    pub async fn change_password(
        &self,
        user_id: &str,
        current_password: &str,
        new_password: &str,
        details: &AlertDetails,
    ) -> Result<TokenPair, AuthError> {
        let user = self.require_user(user_id).await?;

        let Some(hash) = user.password_hash.as_deref() else {
            return Err(AuthError::Validation(
                "Cannot change password for OAuth-only accounts".into(),
            ));
        };

        if !self.hasher.verify(current_password, hash).await? {
            return Err(AuthError::Unauthorized("Current password is incorrect".into()));
        }

        let user = self.replace_password(&user, new_password).await?;
        self.send_alert(&user, "Password Changed", details).await;
        self.issue_pair(&user)
    }

    pub async fn delete_account(
        &self,
        user_id: &str,
        password: Option<&str>,
    ) -> Result<(), AuthError> {
        let user = self.require_user(user_id).await?;

        if let Some(hash) = user.password_hash.as_deref() {
            let supplied = password.unwrap_or_default();
            if supplied.is_empty() || !self.hasher.verify(supplied, hash).await? {
                return Err(AuthError::Unauthorized("Password is incorrect".into()));
            }
        }

        self.store.delete_user(user_id).await?;
        info!(user_id = %user_id, "Account deleted");
        Ok(())
    }

    // ---- Email verification ----

    /// Email a verification code. Unknown and already-verified addresses get
    /// the same answer as real ones.
    pub async fn send_verification(&self, email: &str) -> Result<(), AuthError> {
        let email = normalize_email(email);
        match self.store.find_user_by_email(&email).await? {
            Some(user) if !user.is_verified => match self.issue_verification_code(&user).await {
                Err(AuthError::RateLimited(_)) => {
                    debug!(user_id = %user.id, "Verification resend inside the window, skipped");
                    Ok(())
                }
                other => other,
            },
            _ => {
                debug!(email = %safe_email_log(&email), "Verification request needs no code");
                Ok(())
            }
        }
    }

    pub async fn verify_email(&self, email: &str, code: &str) -> Result<User, AuthError> {
        let email = normalize_email(email);
        let Some(user) = self.store.find_user_by_email(&email).await? else {
            return Err(AuthError::NotFound("User not found".into()));
        };
        self.consume_verification_code(user, code).await
    }

    pub async fn resend_verification(&self, user_id: &str) -> Result<(), AuthError> {
        let user = self.require_user(user_id).await?;
        if user.is_verified {
            return Err(AuthError::Validation(ALREADY_VERIFIED.into()));
        }
        self.issue_verification_code(&user).await
    }

    pub async fn verify_email_authenticated(
        &self,
        user_id: &str,
        code: &str,
    ) -> Result<User, AuthError> {
        let user = self.require_user(user_id).await?;
        self.consume_verification_code(user, code).await
    }

    async fn issue_verification_code(&self, user: &User) -> Result<(), AuthError> {
        let subject = OtpSubject::UserId(user.id.clone());
        if self
            .otp
            .has_recent_otp(&subject, self.resend_window_minutes)
            .await?
        {
            return Err(AuthError::RateLimited(WAIT_FOR_CODE.into()));
        }

        let record = self.otp.create_otp(&subject).await?;
        self.mailer
            .send_verification_email(&user.email, user.name.as_deref(), &record.code)
            .await?;
        info!(user_id = %user.id, "Verification code sent");
        Ok(())
    }

    async fn consume_verification_code(&self, user: User, code: &str) -> Result<User, AuthError> {
        if user.is_verified {
            return Err(AuthError::Validation(ALREADY_VERIFIED.into()));
        }

        if !self
            .otp
            .verify_otp(&OtpSubject::UserId(user.id.clone()), code)
            .await?
        {
            return Err(AuthError::Validation(INVALID_CODE.into()));
        }

        let user = self
            .store
            .set_verified_flags(&user.id, VerifiedFlags::email_proven())
            .await?
            .ok_or_else(|| AuthError::NotFound("User not found".into()))?;

        self.send_welcome(&user).await;
        info!(user_id = %user.id, "Email verified");
        Ok(user)
    }

    // ---- Password reset ----

    /// Always succeeds from the caller's point of view so the response never
    /// reveals whether the address has a password account.
    pub async fn request_password_reset(&self, email: &str) -> Result<(), AuthError> {
        let email = normalize_email(email);

        let user = match self.store.find_user_by_email(&email).await? {
            Some(user) if user.has_password() => user,
            _ => {
                debug!(email = %safe_email_log(&email), "Reset requested for non-password account");
                return Ok(());
            }
        };

        let subject = OtpSubject::UserId(user.id.clone());
        if self
            .otp
            .has_recent_otp(&subject, self.resend_window_minutes)
            .await?
        {
            debug!(user_id = %user.id, "Reset code requested inside resend window");
            return Ok(());
        }

        let record = self.otp.create_otp(&subject).await?;
        self.mailer
            .send_password_reset_email(&user.email, user.name.as_deref(), &record.code)
            .await?;
        info!(user_id = %user.id, "Password reset code sent");
        Ok(())
    }

    pub async fn reset_password(
        &self,
        email: &str,
        code: &str,
        new_password: &str,
        details: &AlertDetails,
    ) -> Result<(), AuthError> {
        let email = normalize_email(email);
        let Some(user) = self.store.find_user_by_email(&email).await? else {
            return Err(AuthError::NotFound("User not found".into()));
        };

        if !self
            .otp
            .verify_otp(&OtpSubject::UserId(user.id.clone()), code)
            .await?
        {
            return Err(AuthError::Validation("Invalid or expired reset code".into()));
        }

        let user = self.replace_password(&user, new_password).await?;
        self.send_alert(&user, "Password Reset", details).await;
        info!(user_id = %user.id, "Password reset");
        Ok(())
    }

    /// Store a new hash and bump the token version
    async fn replace_password(&self, user: &User, new_password: &str) -> Result<User, AuthError> {
        let hash = self.hasher.hash(new_password).await?;
        if !self.store.update_password(&user.id, &hash).await? {
            return Err(AuthError::NotFound("User not found".into()));
        }
        let version = self
            .store
            .bump_token_version(&user.id)
            .await?
            .ok_or_else(|| AuthError::NotFound("User not found".into()))?;

        Ok(User {
            password_hash: Some(hash),
            token_version: version,
            ..user.clone()
        })
    }

    // ---- Best-effort notifications ----

    async fn send_welcome(&self, user: &User) {
        if let Err(e) = self
            .mailer
            .send_welcome_email(&user.email, user.name.as_deref())
            .await
        {
            warn!(error = %e, user_id = %user.id, "Welcome email failed");
        }
    }

    async fn send_alert(&self, user: &User, action: &str, details: &AlertDetails) {
        if let Err(e) = self
            .mailer
            .send_security_alert(&user.email, user.name.as_deref(), action, details)
            .await
        {
            warn!(error = %e, user_id = %user.id, action, "Security alert email failed");
        }
    }
}
