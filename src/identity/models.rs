//! Provider assertions and reconciliation outcomes

use std::fmt;

use crate::store::{OAuthAccount, Provider, User};

/// One email address as reported by a provider
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProviderEmail {
    pub email: String,
    pub primary: bool,
    pub verified: bool,
}

/// What a provider told us about the person completing its OAuth flow
#[derive(Clone)]
pub struct ProviderAssertion {
    pub provider: Provider,
    pub provider_id: String,
    pub emails: Vec<ProviderEmail>,
    pub display_name: Option<String>,
    /// Login handle, used as the name when no display name is set
    pub username: Option<String>,
    pub avatar_url: Option<String>,
    pub access_token: Option<String>,
    pub refresh_token: Option<String>,
    /// Provider token expiry, epoch millis
    pub expires_at: Option<i64>,
}

impl ProviderAssertion {
    /// The address the provider marks both primary and verified
    pub fn primary_verified_email(&self) -> Option<&ProviderEmail> {
        pick_primary_verified(&self.emails)
    }

    pub fn preferred_name(&self) -> Option<String> {
        self.display_name
            .as_deref()
            .or(self.username.as_deref())
            .map(str::trim)
            .filter(|n| !n.is_empty())
            .map(str::to_string)
    }
}

impl fmt::Debug for ProviderAssertion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ProviderAssertion")
            .field("provider", &self.provider)
            .field("provider_id", &self.provider_id)
            .field("emails", &self.emails.len())
            .field("display_name", &self.display_name)
            .finish_non_exhaustive()
    }
}

pub fn pick_primary_verified(emails: &[ProviderEmail]) -> Option<&ProviderEmail> {
    emails.iter().find(|e| e.primary && e.verified)
}

/// Which reconciliation branch produced the user
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ResolutionKind {
    /// The (provider, provider_id) pair was already linked; tokens refreshed
    ExistingLink,
    /// An authenticated user claimed an identity another user held
    Reassigned { from_user_id: String },
    /// An authenticated user attached a new provider
    Linked,
    /// Attached to the user already holding the asserted email
    MergedByEmail,
    /// New user created from the assertion
    Created,
}

#[derive(Debug, Clone)]
pub struct Resolution {
    pub user: User,
    pub account: OAuthAccount,
    pub kind: ResolutionKind,
}
