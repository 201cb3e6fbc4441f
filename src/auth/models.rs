//! Request bodies and user views for the auth and email routes

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::oauth::models::LinkedAccountView;
use crate::store::{OAuthAccount, User};

#[derive(Deserialize)]
pub struct PreRegisterRequest {
    pub email: String,
    pub password: String,
    pub name: String,
}

#[derive(Debug, Deserialize)]
pub struct VerifyRegistrationRequest {
    pub email: String,
    pub otp: String,
}

#[derive(Deserialize)]
pub struct LoginRequest {
    pub email: String,
    pub password: String,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RefreshRequest {
    pub refresh_token: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct UpdateProfileRequest {
    pub name: Option<String>,
    #[serde(alias = "avatarUrl")]
    pub avatar_url: Option<String>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChangePasswordRequest {
    pub current_password: String,
    pub new_password: String,
}

#[derive(Default, Deserialize)]
pub struct DeleteAccountRequest {
    pub password: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct EmailRequest {
    pub email: String,
}

#[derive(Debug, Deserialize)]
pub struct VerifyEmailRequest {
    pub email: String,
    pub otp: String,
}

#[derive(Debug, Deserialize)]
pub struct OtpRequest {
    pub otp: String,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResetPasswordRequest {
    pub email: String,
    pub otp: String,
    pub new_password: String,
}

// Secrets stay out of Debug output
macro_rules! redacted_debug {
    ($ty:ident { $($field:ident),* }) => {
        impl fmt::Debug for $ty {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.debug_struct(stringify!($ty))
                    $(.field(stringify!($field), &self.$field))*
                    .finish_non_exhaustive()
            }
        }
    };
}

redacted_debug!(PreRegisterRequest { email, name });
redacted_debug!(LoginRequest { email });
redacted_debug!(ChangePasswordRequest {});
redacted_debug!(DeleteAccountRequest {});
redacted_debug!(ResetPasswordRequest { email });

/// Public shape of a user
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UserView {
    pub id: String,
    pub email: String,
    pub name: Option<String>,
    pub avatar_url: Option<String>,
    pub is_verified: bool,
    pub email_verified: bool,
    pub is_github_verified: bool,
    pub has_password: bool,
    pub created_at: String,
}

impl From<&User> for UserView {
    fn from(user: &User) -> Self {
        Self {
            id: user.id.clone(),
            email: user.email.clone(),
            name: user.name.clone(),
            avatar_url: user.avatar_url.clone(),
            is_verified: user.is_verified,
            email_verified: user.email_verified,
            is_github_verified: user.is_github_verified,
            has_password: user.has_password(),
            created_at: user.created_at().to_rfc3339(),
        }
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ProfileView {
    #[serde(flatten)]
    pub user: UserView,
    pub oauth_accounts: Vec<LinkedAccountView>,
}

impl ProfileView {
    pub fn new(user: &User, accounts: &[OAuthAccount]) -> Self {
        Self {
            user: user.into(),
            oauth_accounts: accounts.iter().map(LinkedAccountView::from).collect(),
        }
    }
}
