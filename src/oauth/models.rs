//! Provider wire formats and OAuth route payloads

use serde::{Deserialize, Serialize};

use crate::store::{OAuthAccount, Provider};

/// Token endpoint response shared by Google and GitHub.
/// GitHub reports failures with HTTP 200 and an `error` field.
#[derive(Debug, Deserialize)]
pub struct ProviderTokenResponse {
    pub access_token: Option<String>,
    pub refresh_token: Option<String>,
    pub expires_in: Option<i64>,
    pub error: Option<String>,
    pub error_description: Option<String>,
}

/// Google OpenID Connect userinfo
#[derive(Debug, Deserialize)]
pub struct GoogleUserInfo {
    pub sub: String,
    pub email: Option<String>,
    #[serde(default)]
    pub email_verified: bool,
    pub name: Option<String>,
    pub picture: Option<String>,
}

/// GitHub `GET /user`
#[derive(Debug, Deserialize)]
pub struct GithubUser {
    pub id: i64,
    pub login: String,
    pub name: Option<String>,
    pub email: Option<String>,
    pub avatar_url: Option<String>,
}

/// One entry of GitHub `GET /user/emails`
#[derive(Debug, Deserialize)]
pub struct GithubEmail {
    pub email: String,
    #[serde(default)]
    pub primary: bool,
    #[serde(default)]
    pub verified: bool,
}

/// Query string of a provider redirect back to us
#[derive(Debug, Deserialize)]
pub struct CallbackQuery {
    pub code: Option<String>,
    pub state: Option<String>,
    pub error: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct ErrorQuery {
    #[serde(alias = "message")]
    pub error: Option<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LinkResponse {
    pub authorization_url: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LinkedAccountView {
    pub provider: Provider,
    pub provider_id: String,
    pub linked_at: String,
}

impl From<&OAuthAccount> for LinkedAccountView {
    fn from(account: &OAuthAccount) -> Self {
        Self {
            provider: account.provider,
            provider_id: account.provider_id.clone(),
            linked_at: account.linked_at().to_rfc3339(),
        }
    }
}
