//! Maps provider assertions onto exactly one user.
//!
//! Precedence, evaluated in order:
//! 1. an existing `(provider, provider_id)` link
//! 2. an explicit link request from an authenticated user
//! 3. a user already holding the asserted (provider-verified) email
//! 4. a fresh user
//!
//! Unique-constraint conflicts mean a concurrent request won the race; the
//! whole resolution is retried so it lands on the row that request created.

use async_trait::async_trait;
use std::sync::Arc;
use tracing::{debug, info, warn};

use super::models::{
    pick_primary_verified, ProviderAssertion, ProviderEmail, Resolution, ResolutionKind,
};
use crate::common::clock::Clock;
use crate::common::error::AuthError;
use crate::common::helpers::normalize_email;
use crate::common::safe_email_log;
use crate::oauth::ProviderError;
use crate::store::{
    CredentialStore, NewUser, OAuthAccount, OAuthAccountUpsert, Provider, StoreError, User,
    VerifiedFlags,
};

const MAX_RESOLVE_ATTEMPTS: usize = 3;

const LAST_METHOD_MESSAGE: &str =
    "Cannot unlink the only authentication method. Please set a password first.";

/// Secondary email source for providers that may hide addresses from the profile
#[async_trait]
pub trait ProviderEmailLookup: Send + Sync {
    async fn fetch_emails(
        &self,
        provider: Provider,
        access_token: &str,
    ) -> Result<Vec<ProviderEmail>, ProviderError>;
}

#[derive(Clone)]
pub struct IdentityService {
    store: Arc<dyn CredentialStore>,
    clock: Arc<dyn Clock>,
    email_lookup: Arc<dyn ProviderEmailLookup>,
}

/// One pass either resolves or reports that it lost a race
enum Attempt {
    Done(Resolution),
    Raced,
}

impl IdentityService {
    pub fn new(
        store: Arc<dyn CredentialStore>,
        clock: Arc<dyn Clock>,
        email_lookup: Arc<dyn ProviderEmailLookup>,
    ) -> Self {
        Self {
            store,
            clock,
            email_lookup,
        }
    }

    /// Resolve an OAuth callback into a user. `link_to` carries the id of an
    /// authenticated user who started the flow to attach this provider.
    pub async fn resolve(
        &self,
        assertion: &ProviderAssertion,
        link_to: Option<&str>,
    ) -> Result<Resolution, AuthError> {
        // Looked up at most once even across retries
        let mut email: Option<ProviderEmail> = None;

        for attempt in 1..=MAX_RESOLVE_ATTEMPTS {
            match self.try_resolve(assertion, link_to, &mut email).await? {
                Attempt::Done(resolution) => {
                    info!(
                        user_id = %resolution.user.id,
                        provider = %assertion.provider,
                        kind = ?resolution.kind,
                        "OAuth identity resolved"
                    );
                    return Ok(resolution);
                }
                Attempt::Raced => {
                    debug!(attempt, provider = %assertion.provider, "Resolution raced, retrying");
                }
            }
        }

        Err(AuthError::Internal(format!(
            "{} identity could not be resolved after {} attempts",
            assertion.provider, MAX_RESOLVE_ATTEMPTS
        )))
    }

    async fn try_resolve(
        &self,
        assertion: &ProviderAssertion,
        link_to: Option<&str>,
        email: &mut Option<ProviderEmail>,
    ) -> Result<Attempt, AuthError> {
        if let Some(existing) = self
            .store
            .find_oauth_account(assertion.provider, &assertion.provider_id)
            .await?
        {
            return self.reuse_link(assertion, existing, link_to).await.map(Attempt::Done);
        }

        if let Some(user_id) = link_to {
            let Some(user) = self.store.find_user_by_id(user_id).await? else {
                return Err(AuthError::NotFound("User not found".into()));
            };
            return self.attach(assertion, user, ResolutionKind::Linked).await;
        }

        if email.is_none() {
            *email = Some(self.select_email(assertion).await?);
        }
        let Some(chosen) = email.as_ref() else {
            return Err(AuthError::Internal("email selection produced nothing".into()));
        };

        if let Some(user) = self.store.find_user_by_email(&chosen.email).await? {
            if !chosen.verified {
                warn!(
                    provider = %assertion.provider,
                    email = %safe_email_log(&chosen.email),
                    "Refusing to merge on an email the provider has not verified"
                );
                return Err(AuthError::Unauthorized(
                    "An account with this email already exists. Sign in and link this provider from your account settings.".into(),
                ));
            }
            return self.attach(assertion, user, ResolutionKind::MergedByEmail).await;
        }

        self.create_from_assertion(assertion, chosen).await
    }

    /// Branch 1: the identity is already linked
    async fn reuse_link(
        &self,
        assertion: &ProviderAssertion,
        existing: OAuthAccount,
        link_to: Option<&str>,
    ) -> Result<Resolution, AuthError> {
        let (owner_id, kind) = match link_to {
            Some(requested) if requested != existing.user_id => {
                if self.store.find_user_by_id(requested).await?.is_none() {
                    return Err(AuthError::NotFound("User not found".into()));
                }
                self.ensure_not_last_method(&existing.user_id).await?;
                warn!(
                    provider = %assertion.provider,
                    account_id = %existing.id,
                    from_user_id = %existing.user_id,
                    to_user_id = %requested,
                    "Reassigning OAuth identity to requesting user"
                );
                (
                    requested.to_string(),
                    ResolutionKind::Reassigned {
                        from_user_id: existing.user_id.clone(),
                    },
                )
            }
            _ => (existing.user_id.clone(), ResolutionKind::ExistingLink),
        };

        let account = self
            .store
            .upsert_oauth_account(upsert_for(assertion, &owner_id), self.clock.now())
            .await?;

        let user = self
            .apply_flags(&owner_id, provider_flags(assertion.provider))
            .await?;

        Ok(Resolution {
            user,
            account,
            kind,
        })
    }

    /// Strict insert of a new link onto `user`
    async fn attach(
        &self,
        assertion: &ProviderAssertion,
        user: User,
        kind: ResolutionKind,
    ) -> Result<Attempt, AuthError> {
        let account = match self
            .store
            .insert_oauth_account(upsert_for(assertion, &user.id), self.clock.now())
            .await
        {
            Ok(account) => account,
            Err(StoreError::Conflict(_)) => return Ok(Attempt::Raced),
            Err(e) => return Err(e.into()),
        };

        let user = self
            .apply_flags(&user.id, provider_flags(assertion.provider))
            .await?;

        Ok(Attempt::Done(Resolution {
            user,
            account,
            kind,
        }))
    }

    /// Branch 4: nobody holds the identity or the email
    async fn create_from_assertion(
        &self,
        assertion: &ProviderAssertion,
        email: &ProviderEmail,
    ) -> Result<Attempt, AuthError> {
        let new_user = NewUser {
            email: email.email.clone(),
            password_hash: None,
            name: assertion.preferred_name(),
            avatar_url: assertion.avatar_url.clone(),
        };

        let user = match self.store.create_user(new_user, self.clock.now()).await {
            Ok(user) => user,
            Err(StoreError::Conflict(_)) => return Ok(Attempt::Raced),
            Err(e) => return Err(e.into()),
        };

        // The provider's sign-in substitutes for an OTP round trip. Flags go on
        // before the link so a user whose link insert loses a race is still verified.
        let flags = VerifiedFlags {
            email_verified: email.verified.then_some(true),
            is_verified: Some(true),
            github_verified: None,
        };
        let user = self.apply_flags(&user.id, flags).await?;
        self.attach(assertion, user, ResolutionKind::Created).await
    }

    async fn apply_flags(&self, user_id: &str, flags: VerifiedFlags) -> Result<User, AuthError> {
        let user = if flags == VerifiedFlags::default() {
            self.store.find_user_by_id(user_id).await?
        } else {
            self.store.set_verified_flags(user_id, flags).await?
        };
        user.ok_or_else(|| AuthError::Internal(format!("linked user {} is missing", user_id)))
    }

    /// Primary+verified address from the assertion; GitHub may need a second
    /// lookup since users can hide their address from the public profile.
    async fn select_email(&self, assertion: &ProviderAssertion) -> Result<ProviderEmail, AuthError> {
        if let Some(email) = assertion.primary_verified_email() {
            return Ok(normalized(email));
        }

        if assertion.provider == Provider::Github {
            if let Some(token) = assertion.access_token.as_deref() {
                let fetched = self
                    .email_lookup
                    .fetch_emails(assertion.provider, token)
                    .await?;
                if let Some(email) = pick_primary_verified(&fetched).or(fetched.first()) {
                    return Ok(normalized(email));
                }
            }
        }

        assertion
            .emails
            .first()
            .map(normalized)
            .ok_or_else(|| ProviderError::NoEmail.into())
    }

    pub async fn list_accounts(&self, user_id: &str) -> Result<Vec<OAuthAccount>, AuthError> {
        Ok(self.store.list_oauth_accounts_for_user(user_id).await?)
    }

    /// Remove a provider link. Refused when it is the last way to sign in.
    /// Provider verification flags are left as they were.
    pub async fn unlink(&self, user_id: &str, provider: Provider) -> Result<(), AuthError> {
        let Some(user) = self.store.find_user_by_id(user_id).await? else {
            return Err(AuthError::NotFound("User not found".into()));
        };

        let accounts = self.store.list_oauth_accounts_for_user(user_id).await?;
        if !accounts.iter().any(|a| a.provider == provider) {
            return Err(AuthError::NotFound(format!("{} account not found", provider)));
        }

        if !user.has_password() && accounts.len() == 1 {
            return Err(AuthError::Validation(LAST_METHOD_MESSAGE.into()));
        }

        if !self.store.delete_oauth_account(user_id, provider).await? {
            return Err(AuthError::NotFound(format!("{} account not found", provider)));
        }

        info!(user_id = %user_id, provider = %provider, "OAuth account unlinked");
        Ok(())
    }

    /// Refuse to take away the only sign-in method `user_id` has
    async fn ensure_not_last_method(&self, user_id: &str) -> Result<(), AuthError> {
        let Some(owner) = self.store.find_user_by_id(user_id).await? else {
            return Ok(());
        };
        if owner.has_password() {
            return Ok(());
        }
        let accounts = self.store.list_oauth_accounts_for_user(user_id).await?;
        if accounts.len() <= 1 {
            warn!(user_id = %user_id, "Refusing to reassign the owner's only sign-in method");
            return Err(AuthError::Validation(LAST_METHOD_MESSAGE.into()));
        }
        Ok(())
    }

    /// Mark GitHub verification for a user who holds a GitHub link
    pub async fn verify_github(&self, user_id: &str) -> Result<User, AuthError> {
        let accounts = self.store.list_oauth_accounts_for_user(user_id).await?;
        if !accounts.iter().any(|a| a.provider == Provider::Github) {
            return Err(AuthError::Validation(
                "No GitHub account linked. Please link your GitHub account first.".into(),
            ));
        }
        self.apply_flags(user_id, VerifiedFlags::github()).await
    }
}

fn normalized(email: &ProviderEmail) -> ProviderEmail {
    ProviderEmail {
        email: normalize_email(&email.email),
        ..email.clone()
    }
}

fn provider_flags(provider: Provider) -> VerifiedFlags {
    match provider {
        Provider::Github => VerifiedFlags::github(),
        Provider::Google => VerifiedFlags::default(),
    }
}

fn upsert_for(assertion: &ProviderAssertion, user_id: &str) -> OAuthAccountUpsert {
    OAuthAccountUpsert {
        user_id: user_id.to_string(),
        provider: assertion.provider,
        provider_id: assertion.provider_id.clone(),
        access_token: assertion.access_token.clone(),
        refresh_token: assertion.refresh_token.clone(),
        expires_at: assertion.expires_at,
    }
}
