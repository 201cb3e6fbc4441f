//! HTTP client for the Google and GitHub OAuth endpoints

use async_trait::async_trait;
use chrono::Duration;
use reqwest::{header, Client, RequestBuilder, Response};
use serde::de::DeserializeOwned;
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, error};

use super::models::{GithubEmail, GithubUser, GoogleUserInfo, ProviderTokenResponse};
use crate::common::clock::Clock;
use crate::common::config::{AuthConfig, ProviderCredentials};
use crate::identity::{ProviderAssertion, ProviderEmail, ProviderEmailLookup};
use crate::store::Provider;

const GOOGLE_AUTHORIZE_URL: &str = "https://accounts.google.com/o/oauth2/v2/auth";
const GOOGLE_TOKEN_URL: &str = "https://oauth2.googleapis.com/token";
const GOOGLE_USERINFO_URL: &str = "https://openidconnect.googleapis.com/v1/userinfo";
const GITHUB_AUTHORIZE_URL: &str = "https://github.com/login/oauth/authorize";
const GITHUB_TOKEN_URL: &str = "https://github.com/login/oauth/access_token";
const GITHUB_USER_URL: &str = "https://api.github.com/user";
const GITHUB_EMAILS_URL: &str = "https://api.github.com/user/emails";
const USER_AGENT: &str = "authgate";

#[derive(Debug, Error)]
pub enum ProviderError {
    #[error("{0} OAuth is not configured")]
    NotConfigured(Provider),

    #[error("Provider request timed out: {0}")]
    Timeout(String),

    #[error("Provider request failed: {0}")]
    Request(String),

    #[error("Provider rejected the request: {0}")]
    Rejected(String),

    #[error("Unexpected provider response: {0}")]
    InvalidResponse(String),

    #[error("No email found in provider profile")]
    NoEmail,
}

impl From<reqwest::Error> for ProviderError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            ProviderError::Timeout(err.to_string())
        } else {
            ProviderError::Request(err.to_string())
        }
    }
}

#[derive(Clone)]
pub struct OAuthClient {
    http: Client,
    google: Option<ProviderCredentials>,
    github: Option<ProviderCredentials>,
    clock: Arc<dyn Clock>,
}

impl OAuthClient {
    pub fn new(http: Client, config: &AuthConfig, clock: Arc<dyn Clock>) -> Self {
        Self {
            http,
            google: config.google.clone(),
            github: config.github.clone(),
            clock,
        }
    }

    pub fn is_configured(&self, provider: Provider) -> bool {
        self.credentials(provider).is_ok()
    }

    fn credentials(&self, provider: Provider) -> Result<&ProviderCredentials, ProviderError> {
        match provider {
            Provider::Google => self.google.as_ref(),
            Provider::Github => self.github.as_ref(),
        }
        .ok_or(ProviderError::NotConfigured(provider))
    }

    /// Consent screen URL carrying our `state` nonce
    pub fn authorize_url(&self, provider: Provider, state: &str) -> Result<String, ProviderError> {
        let creds = self.credentials(provider)?;
        let url = match provider {
            Provider::Google => format!(
                "{}?client_id={}&redirect_uri={}&response_type=code&scope={}&state={}",
                GOOGLE_AUTHORIZE_URL,
                urlencoding::encode(&creds.client_id),
                urlencoding::encode(&creds.callback_url),
                urlencoding::encode("openid email profile"),
                urlencoding::encode(state)
            ),
            Provider::Github => format!(
                "{}?client_id={}&redirect_uri={}&scope={}&state={}",
                GITHUB_AUTHORIZE_URL,
                urlencoding::encode(&creds.client_id),
                urlencoding::encode(&creds.callback_url),
                urlencoding::encode("user:email"),
                urlencoding::encode(state)
            ),
        };
        Ok(url)
    }

    /// Trade an authorization code for provider tokens, then read the profile
    pub async fn fetch_assertion(
        &self,
        provider: Provider,
        code: &str,
    ) -> Result<ProviderAssertion, ProviderError> {
        let tokens = self.exchange_code(provider, code).await?;
        let access_token = tokens
            .access_token
            .ok_or_else(|| ProviderError::InvalidResponse("missing access_token".into()))?;
        let expires_at = tokens
            .expires_in
            .map(|secs| (self.clock.now() + Duration::seconds(secs)).timestamp_millis());

        let mut assertion = match provider {
            Provider::Google => self.google_profile(&access_token).await?,
            Provider::Github => self.github_profile(&access_token).await?,
        };
        assertion.access_token = Some(access_token);
        assertion.refresh_token = tokens.refresh_token;
        assertion.expires_at = expires_at;
        Ok(assertion)
    }

    async fn exchange_code(
        &self,
        provider: Provider,
        code: &str,
    ) -> Result<ProviderTokenResponse, ProviderError> {
        let creds = self.credentials(provider)?;
        let url = match provider {
            Provider::Google => GOOGLE_TOKEN_URL,
            Provider::Github => GITHUB_TOKEN_URL,
        };

        let params = [
            ("code", code),
            ("client_id", creds.client_id.as_str()),
            ("client_secret", creds.client_secret.as_str()),
            ("redirect_uri", creds.callback_url.as_str()),
            ("grant_type", "authorization_code"),
        ];

        debug!(provider = %provider, "Exchanging authorization code");

        let request = self
            .http
            .post(url)
            .header(header::ACCEPT, "application/json")
            .form(&params);
        let tokens: ProviderTokenResponse = send_json(request).await?;

        if let Some(err) = tokens.error {
            let detail = tokens.error_description.unwrap_or_default();
            error!(provider = %provider, error = %err, "Code exchange rejected");
            return Err(ProviderError::Rejected(format!("{}: {}", err, detail)));
        }
        Ok(tokens)
    }

    async fn google_profile(&self, access_token: &str) -> Result<ProviderAssertion, ProviderError> {
        let request = self.http.get(GOOGLE_USERINFO_URL).bearer_auth(access_token);
        let info: GoogleUserInfo = send_json(request).await?;

        let emails = info
            .email
            .map(|email| ProviderEmail {
                email,
                primary: true,
                verified: info.email_verified,
            })
            .into_iter()
            .collect();

        Ok(ProviderAssertion {
            provider: Provider::Google,
            provider_id: info.sub,
            emails,
            display_name: info.name,
            username: None,
            avatar_url: info.picture,
            access_token: None,
            refresh_token: None,
            expires_at: None,
        })
    }

    async fn github_profile(&self, access_token: &str) -> Result<ProviderAssertion, ProviderError> {
        let user: GithubUser = send_json(github_get(&self.http, GITHUB_USER_URL, access_token)).await?;

        // The public profile email carries no verification status
        let emails = user
            .email
            .map(|email| ProviderEmail {
                email,
                primary: true,
                verified: false,
            })
            .into_iter()
            .collect();

        Ok(ProviderAssertion {
            provider: Provider::Github,
            provider_id: user.id.to_string(),
            emails,
            display_name: user.name,
            username: Some(user.login),
            avatar_url: user.avatar_url,
            access_token: None,
            refresh_token: None,
            expires_at: None,
        })
    }
}

#[async_trait]
impl ProviderEmailLookup for OAuthClient {
    async fn fetch_emails(
        &self,
        provider: Provider,
        access_token: &str,
    ) -> Result<Vec<ProviderEmail>, ProviderError> {
        if provider != Provider::Github {
            return Ok(Vec::new());
        }
        let emails: Vec<GithubEmail> =
            send_json(github_get(&self.http, GITHUB_EMAILS_URL, access_token)).await?;
        Ok(emails
            .into_iter()
            .map(|e| ProviderEmail {
                email: e.email,
                primary: e.primary,
                verified: e.verified,
            })
            .collect())
    }
}

fn github_get(http: &Client, url: &str, access_token: &str) -> RequestBuilder {
    http.get(url)
        .header(header::AUTHORIZATION, format!("token {}", access_token))
        .header(header::USER_AGENT, USER_AGENT)
        .header(header::ACCEPT, "application/vnd.github+json")
}

async fn send_json<T: DeserializeOwned>(request: RequestBuilder) -> Result<T, ProviderError> {
    let response: Response = request.send().await?;
    let status = response.status();

    if !status.is_success() {
        let body = response
            .text()
            .await
            .unwrap_or_else(|_| "Unknown error".to_string());
        error!(status = %status, error = %body, "Provider request failed");
        return Err(ProviderError::Rejected(format!("HTTP {}", status)));
    }

    response
        .json::<T>()
        .await
        .map_err(|e| ProviderError::InvalidResponse(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::common::clock::ManualClock;

    fn client() -> OAuthClient {
        let config = AuthConfig {
            github: Some(ProviderCredentials {
                client_id: "gh-client".to_string(),
                client_secret: "gh-secret".to_string(),
                callback_url: "http://localhost:8080/api/auth/github/callback".to_string(),
            }),
            ..AuthConfig::default()
        };
        OAuthClient::new(Client::new(), &config, Arc::new(ManualClock::new()))
    }

    #[test]
    fn test_github_authorize_url() {
        let url = client().authorize_url(Provider::Github, "nonce-1").unwrap();
        assert!(url.starts_with(GITHUB_AUTHORIZE_URL));
        assert!(url.contains("client_id=gh-client"));
        assert!(url.contains("scope=user%3Aemail"));
        assert!(url.contains("state=nonce-1"));
        assert!(url.contains(
            "redirect_uri=http%3A%2F%2Flocalhost%3A8080%2Fapi%2Fauth%2Fgithub%2Fcallback"
        ));
    }

    #[test]
    fn test_unconfigured_provider() {
        let client = client();
        assert!(!client.is_configured(Provider::Google));
        assert!(matches!(
            client.authorize_url(Provider::Google, "nonce"),
            Err(ProviderError::NotConfigured(Provider::Google))
        ));
    }

    #[test]
    fn test_github_token_error_shape_parses() {
        let body = r#"{"error":"bad_verification_code","error_description":"The code passed is incorrect or expired."}"#;
        let parsed: ProviderTokenResponse = serde_json::from_str(body).unwrap();
        assert_eq!(parsed.error.as_deref(), Some("bad_verification_code"));
        assert!(parsed.access_token.is_none());
    }

    #[test]
    fn test_google_userinfo_defaults_unverified() {
        let parsed: GoogleUserInfo =
            serde_json::from_str(r#"{"sub":"123","email":"a@x.com"}"#).unwrap();
        assert!(!parsed.email_verified);
    }
}
