//! Tests for auth module
//!
//! Service-level flows run against an in-memory store with a manual clock
//! and a recording mailer; the router tests drive the real handlers.

#[cfg(test)]
mod tests {
    use super::super::*;
    use crate::common::clock::{Clock, ManualClock};
    use crate::common::config::AuthConfig;
    use crate::common::error::AuthError;
    use crate::services::email::AlertDetails;
    use crate::services::mailer::RecordingMailer;
    use crate::services::{
        oauth_state_store, pending_registration_store, OtpService, PasswordHasherService,
        TokenService,
    };
    use crate::store::{memory_store, CredentialStore, NewUser, SqliteCredentialStore, User};
    use chrono::Duration;
    use std::sync::Arc;

    const EMAIL: &str = "ada@example.com";
    const PASSWORD: &str = "Passw0rd!";
    const NEW_PASSWORD: &str = "N3wPassw0rd!";

    struct Fixture {
        store: Arc<SqliteCredentialStore>,
        clock: Arc<ManualClock>,
        mailer: Arc<RecordingMailer>,
        config: AuthConfig,
        auth: AuthService,
    }

    fn test_config() -> AuthConfig {
        AuthConfig {
            jwt_secret: "test-access-secret".to_string(),
            jwt_refresh_secret: "test-refresh-secret".to_string(),
            password_hash_iterations: 1,
            ..AuthConfig::default()
        }
    }

    async fn fixture_with(mailer: RecordingMailer) -> Fixture {
        let config = test_config();
        let store = Arc::new(memory_store().await);
        let clock = Arc::new(ManualClock::new());
        let mailer = Arc::new(mailer);

        let auth = AuthService::new(
            store.clone(),
            OtpService::new(store.clone(), clock.clone(), config.otp_ttl_minutes),
            pending_registration_store(config.pending_registration_ttl_minutes, clock.clone()),
            TokenService::new(&config, clock.clone()),
            PasswordHasherService::new(config.password_hash_iterations),
            mailer.clone(),
            clock.clone(),
            config.otp_resend_window_minutes,
        );

        Fixture {
            store,
            clock,
            mailer,
            config,
            auth,
        }
    }

    async fn fixture() -> Fixture {
        fixture_with(RecordingMailer::default()).await
    }

    /// Registered and verified through the public flow
    async fn registered(f: &Fixture) -> (User, crate::services::TokenPair) {
        f.auth.pre_register(EMAIL, PASSWORD, "Ada Lovelace").await.unwrap();
        let code = f.mailer.last_code_for(EMAIL).unwrap();
        f.auth.verify_registration(EMAIL, &code).await.unwrap()
    }

    /// Password account that never proved its email
    async fn unverified_user(f: &Fixture, email: &str) -> User {
        let hash = PasswordHasherService::new(1).hash(PASSWORD).await.unwrap();
        f.store
            .create_user(
                NewUser {
                    email: email.to_string(),
                    password_hash: Some(hash),
                    name: Some("Grace Hopper".to_string()),
                    avatar_url: None,
                },
                f.clock.now(),
            )
            .await
            .unwrap()
    }

    // ---- Registration ----

    #[tokio::test]
    async fn test_registration_creates_one_verified_user() {
        let f = fixture().await;
        f.auth.pre_register(EMAIL, PASSWORD, "Ada Lovelace").await.unwrap();
        assert!(f.store.find_user_by_email(EMAIL).await.unwrap().is_none());

        let code = f.mailer.last_code_for(EMAIL).unwrap();
        let wrong = if code == "000000" { "111111" } else { "000000" };
        let err = f.auth.verify_registration(EMAIL, wrong).await.unwrap_err();
        assert!(matches!(err, AuthError::Validation(msg) if msg == "Invalid or expired verification code"));

        let (user, tokens) = f.auth.verify_registration(EMAIL, &code).await.unwrap();
        assert!(user.is_verified);
        assert!(user.email_verified);
        assert!(user.has_password());
        assert_eq!(user.name.as_deref(), Some("Ada Lovelace"));
        assert!(!tokens.access_token.is_empty());

        // Pending entry is consumed
        let err = f.auth.verify_registration(EMAIL, &code).await.unwrap_err();
        assert!(matches!(err, AuthError::Validation(msg) if msg.starts_with("No pending registration")));

        assert_eq!(
            f.mailer.subjects_for(EMAIL),
            vec!["Verify Your Email Address", "Welcome to Our Platform!"]
        );
    }

    #[tokio::test]
    async fn test_registration_normalizes_email() {
        let f = fixture().await;
        f.auth
            .pre_register("  Ada@Example.COM ", PASSWORD, "Ada Lovelace")
            .await
            .unwrap();
        let code = f.mailer.last_code_for(EMAIL).unwrap();
        let (user, _) = f.auth.verify_registration("ADA@example.com", &code).await.unwrap();
        assert_eq!(user.email, EMAIL);
    }

    #[tokio::test]
    async fn test_pre_register_rejects_taken_email() {
        let f = fixture().await;
        registered(&f).await;
        let err = f
            .auth
            .pre_register(EMAIL, PASSWORD, "Ada Lovelace")
            .await
            .unwrap_err();
        assert!(matches!(err, AuthError::Validation(msg) if msg == "Email already registered"));
    }

    #[tokio::test]
    async fn test_pre_register_resend_window() {
        let f = fixture().await;
        f.auth.pre_register(EMAIL, PASSWORD, "Ada Lovelace").await.unwrap();
        let err = f
            .auth
            .pre_register(EMAIL, PASSWORD, "Ada Lovelace")
            .await
            .unwrap_err();
        assert!(matches!(err, AuthError::RateLimited(_)));

        f.clock
            .advance(Duration::minutes(f.config.otp_resend_window_minutes) + Duration::seconds(1));
        f.auth.pre_register(EMAIL, PASSWORD, "Ada Lovelace").await.unwrap();
        assert_eq!(f.mailer.subjects_for(EMAIL).len(), 2);
    }

    #[tokio::test]
    async fn test_pending_registration_expires() {
        let f = fixture().await;
        f.auth.pre_register(EMAIL, PASSWORD, "Ada Lovelace").await.unwrap();
        let code = f.mailer.last_code_for(EMAIL).unwrap();

        f.clock.advance(Duration::minutes(11));
        let err = f.auth.verify_registration(EMAIL, &code).await.unwrap_err();
        assert!(matches!(err, AuthError::Validation(msg) if msg.starts_with("No pending registration")));
        assert!(f.store.find_user_by_email(EMAIL).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_mail_failure_leaves_nothing_staged() {
        let f = fixture_with(RecordingMailer::failing()).await;
        let err = f
            .auth
            .pre_register(EMAIL, PASSWORD, "Ada Lovelace")
            .await
            .unwrap_err();
        assert!(matches!(err, AuthError::Internal(_)));

        let err = f.auth.verify_registration(EMAIL, "123456").await.unwrap_err();
        assert!(matches!(err, AuthError::Validation(msg) if msg.starts_with("No pending registration")));
    }

    #[tokio::test]
    async fn test_registration_race_keeps_existing_password() {
        let f = fixture().await;
        f.auth.pre_register(EMAIL, PASSWORD, "Ada Lovelace").await.unwrap();
        let code = f.mailer.last_code_for(EMAIL).unwrap();

        // Another path created the account between signup and confirmation
        let existing = unverified_user(&f, EMAIL).await;

        let (user, _) = f.auth.verify_registration(EMAIL, &code).await.unwrap();
        assert_eq!(user.id, existing.id);
        assert!(user.is_verified);
        assert_eq!(user.password_hash, existing.password_hash);
        assert!(!f.mailer.subjects_for(EMAIL).contains(&"Welcome to Our Platform!".to_string()));
    }

    // ---- Sessions ----

    #[tokio::test]
    async fn test_login_outcomes() {
        let f = fixture().await;
        let (user, _) = registered(&f).await;

        let (logged_in, _) = f.auth.login(EMAIL, PASSWORD).await.unwrap();
        assert_eq!(logged_in.id, user.id);

        for (email, password) in [(EMAIL, "Wr0ngPass!"), ("nobody@example.com", PASSWORD)] {
            let err = f.auth.login(email, password).await.unwrap_err();
            assert!(matches!(err, AuthError::Unauthorized(msg) if msg == "Invalid email or password"));
        }
    }

    #[tokio::test]
    async fn test_login_refused_for_oauth_only_account() {
        let f = fixture().await;
        f.store
            .create_user(
                NewUser {
                    email: "oauth@example.com".to_string(),
                    password_hash: None,
                    name: None,
                    avatar_url: None,
                },
                f.clock.now(),
            )
            .await
            .unwrap();

        let err = f.auth.login("oauth@example.com", PASSWORD).await.unwrap_err();
        assert!(matches!(err, AuthError::Unauthorized(msg) if msg == "Please login with your social account"));
    }

    #[tokio::test]
    async fn test_refresh_rotates_and_rejects_access_tokens() {
        let f = fixture().await;
        let (user, tokens) = registered(&f).await;

        let (refreshed_user, rotated) = f.auth.refresh(&tokens.refresh_token).await.unwrap();
        assert_eq!(refreshed_user.id, user.id);
        assert_ne!(rotated.refresh_token, tokens.refresh_token);

        let err = f.auth.refresh(&tokens.access_token).await.unwrap_err();
        assert!(matches!(err, AuthError::Unauthorized(_)));
    }

    #[tokio::test]
    async fn test_refresh_token_expires() {
        let f = fixture().await;
        let (_, tokens) = registered(&f).await;
        f.clock.advance(Duration::days(7) + Duration::seconds(1));
        assert!(f.auth.refresh(&tokens.refresh_token).await.is_err());
    }

    #[tokio::test]
    async fn test_logout_all_revokes_outstanding_tokens() {
        let f = fixture().await;
        let (user, tokens) = registered(&f).await;
        assert!(f.auth.authenticate(&tokens.access_token).await.is_ok());

        f.auth.logout_all(&user.id).await.unwrap();

        assert!(matches!(
            f.auth.refresh(&tokens.refresh_token).await,
            Err(AuthError::Unauthorized(_))
        ));
        assert!(matches!(
            f.auth.authenticate(&tokens.access_token).await,
            Err(AuthError::Unauthorized(_))
        ));

        // A fresh login works again
        let (_, fresh) = f.auth.login(EMAIL, PASSWORD).await.unwrap();
        assert!(f.auth.authenticate(&fresh.access_token).await.is_ok());
    }

    // ---- Profile and password ----

    #[tokio::test]
    async fn test_update_profile_keeps_unset_fields() {
        let f = fixture().await;
        let (user, _) = registered(&f).await;

        let updated = f
            .auth
            .update_profile(
                &user.id,
                crate::store::ProfileUpdate {
                    name: None,
                    avatar_url: Some("https://cdn.example.com/ada.png".to_string()),
                },
            )
            .await
            .unwrap();
        assert_eq!(updated.name.as_deref(), Some("Ada Lovelace"));
        assert_eq!(updated.avatar_url.as_deref(), Some("https://cdn.example.com/ada.png"));
    }

    #[tokio::test]
    async fn test_change_password_revokes_old_tokens() {
        let f = fixture().await;
        let (user, old) = registered(&f).await;

        let err = f
            .auth
            .change_password(&user.id, "Wr0ngPass!", NEW_PASSWORD, &AlertDetails::default())
            .await
            .unwrap_err();
        assert!(matches!(err, AuthError::Unauthorized(msg) if msg == "Current password is incorrect"));

        let details = AlertDetails {
            ip: Some("203.0.113.7".to_string()),
            user_agent: Some("test-agent".to_string()),
        };
        let fresh = f
            .auth
            .change_password(&user.id, PASSWORD, NEW_PASSWORD, &details)
            .await
            .unwrap();

        assert!(f.auth.refresh(&old.refresh_token).await.is_err());
        assert!(f.auth.refresh(&fresh.refresh_token).await.is_ok());
        assert!(f.auth.login(EMAIL, PASSWORD).await.is_err());
        assert!(f.auth.login(EMAIL, NEW_PASSWORD).await.is_ok());
        assert!(f
            .mailer
            .subjects_for(EMAIL)
            .contains(&"Security Alert - Account Activity".to_string()));
    }

    #[tokio::test]
    async fn test_delete_account_requires_password() {
        let f = fixture().await;
        let (user, _) = registered(&f).await;

        for supplied in [None, Some("Wr0ngPass!")] {
            let err = f.auth.delete_account(&user.id, supplied).await.unwrap_err();
            assert!(matches!(err, AuthError::Unauthorized(msg) if msg == "Password is incorrect"));
        }

        f.auth.delete_account(&user.id, Some(PASSWORD)).await.unwrap();
        assert!(f.store.find_user_by_id(&user.id).await.unwrap().is_none());
    }

    // ---- Email verification ----

    #[tokio::test]
    async fn test_verify_email_by_address() {
        let f = fixture().await;
        let user = unverified_user(&f, "grace@example.com").await;

        f.auth.send_verification("grace@example.com").await.unwrap();
        let code = f.mailer.last_code_for("grace@example.com").unwrap();

        let verified = f.auth.verify_email("grace@example.com", &code).await.unwrap();
        assert_eq!(verified.id, user.id);
        assert!(verified.is_verified && verified.email_verified);

        let err = f
            .auth
            .verify_email("grace@example.com", &code)
            .await
            .unwrap_err();
        assert!(matches!(err, AuthError::Validation(msg) if msg == "Email is already verified"));
    }

    #[tokio::test]
    async fn test_send_verification_is_ambiguous() {
        let f = fixture().await;
        registered(&f).await;
        let before = f.mailer.sent.lock().unwrap().len();

        f.auth.send_verification("nobody@example.com").await.unwrap();
        f.auth.send_verification(EMAIL).await.unwrap();

        assert_eq!(f.mailer.sent.lock().unwrap().len(), before);

        // An unverified address inside the resend window answers like an unknown one
        unverified_user(&f, "grace@example.com").await;
        f.auth.send_verification("grace@example.com").await.unwrap();
        f.auth.send_verification("grace@example.com").await.unwrap();
        f.auth.send_verification("nobody@example.com").await.unwrap();
        f.auth.send_verification("nobody@example.com").await.unwrap();

        assert_eq!(f.mailer.subjects_for("grace@example.com").len(), 1);
        assert!(f.mailer.subjects_for("nobody@example.com").is_empty());
    }

    #[tokio::test]
    async fn test_authenticated_verification_flow() {
        let f = fixture().await;
        let user = unverified_user(&f, "grace@example.com").await;

        f.auth.resend_verification(&user.id).await.unwrap();
        assert!(matches!(
            f.auth.resend_verification(&user.id).await,
            Err(AuthError::RateLimited(_))
        ));

        let code = f.mailer.last_code_for("grace@example.com").unwrap();
        f.clock.advance(Duration::minutes(f.config.otp_ttl_minutes) + Duration::seconds(1));
        assert!(matches!(
            f.auth.verify_email_authenticated(&user.id, &code).await,
            Err(AuthError::Validation(_))
        ));

        f.auth.resend_verification(&user.id).await.unwrap();
        let code = f.mailer.last_code_for("grace@example.com").unwrap();
        let verified = f.auth.verify_email_authenticated(&user.id, &code).await.unwrap();
        assert!(verified.is_verified);

        assert!(matches!(
            f.auth.resend_verification(&user.id).await,
            Err(AuthError::Validation(msg)) if msg == "Email is already verified"
        ));
    }

    // ---- Password reset ----

    #[tokio::test]
    async fn test_password_reset_flow() {
        let f = fixture().await;
        let (_, old) = registered(&f).await;

        f.auth.request_password_reset("nobody@example.com").await.unwrap();
        assert!(f.mailer.subjects_for("nobody@example.com").is_empty());

        f.auth.request_password_reset(EMAIL).await.unwrap();
        let code = f.mailer.last_code_for(EMAIL).unwrap();

        // Inside the window a second request is silent
        f.auth.request_password_reset(EMAIL).await.unwrap();
        let resets = f
            .mailer
            .subjects_for(EMAIL)
            .into_iter()
            .filter(|s| s == "Password Reset Request")
            .count();
        assert_eq!(resets, 1);

        let wrong = if code == "000000" { "111111" } else { "000000" };
        let err = f
            .auth
            .reset_password(EMAIL, wrong, NEW_PASSWORD, &AlertDetails::default())
            .await
            .unwrap_err();
        assert!(matches!(err, AuthError::Validation(msg) if msg == "Invalid or expired reset code"));

        f.auth
            .reset_password(EMAIL, &code, NEW_PASSWORD, &AlertDetails::default())
            .await
            .unwrap();

        assert!(f.auth.login(EMAIL, NEW_PASSWORD).await.is_ok());
        assert!(f.auth.refresh(&old.refresh_token).await.is_err());

        // Codes are single use
        assert!(f
            .auth
            .reset_password(EMAIL, &code, PASSWORD, &AlertDetails::default())
            .await
            .is_err());
    }

    #[tokio::test]
    async fn test_reset_password_unknown_user() {
        let f = fixture().await;
        let err = f
            .auth
            .reset_password("nobody@example.com", "123456", NEW_PASSWORD, &AlertDetails::default())
            .await
            .unwrap_err();
        assert!(matches!(err, AuthError::NotFound(_)));
    }

    // ---- Router ----

    mod router {
        use super::*;
        use crate::common::AppState;
        use crate::identity::IdentityService;
        use crate::oauth::{oauth_routes, OAuthClient};
        use axum::{
            body::{to_bytes, Body},
            extract::Extension,
            http::{header, Request, StatusCode},
            response::Response,
            Router,
        };
        use tokio::sync::RwLock;
        use tower::ServiceExt;

        async fn app(f: &Fixture) -> Router {
            let clock: Arc<dyn Clock> = f.clock.clone();
            let oauth = OAuthClient::new(reqwest::Client::new(), &f.config, clock.clone());
            let state = AppState {
                config: Arc::new(f.config.clone()),
                db: f.store.pool().clone(),
                auth: f.auth.clone(),
                identity: IdentityService::new(f.store.clone(), clock.clone(), Arc::new(oauth.clone())),
                oauth,
                oauth_states: oauth_state_store(clock),
            };

            Router::new()
                .merge(auth_routes())
                .merge(email_routes())
                .merge(oauth_routes())
                .layer(Extension(Arc::new(RwLock::new(state))))
        }

        fn post_json(uri: &str, body: serde_json::Value) -> Request<Body> {
            Request::builder()
                .method("POST")
                .uri(uri)
                .header(header::CONTENT_TYPE, "application/json")
                .body(Body::from(body.to_string()))
                .unwrap()
        }

        fn with_bearer(method: &str, uri: &str, token: &str) -> Request<Body> {
            Request::builder()
                .method(method)
                .uri(uri)
                .header(header::AUTHORIZATION, format!("Bearer {}", token))
                .body(Body::empty())
                .unwrap()
        }

        async fn json_body(response: Response) -> serde_json::Value {
            let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
            serde_json::from_slice(&bytes).unwrap()
        }

        fn set_cookie(response: &Response) -> String {
            response
                .headers()
                .get(header::SET_COOKIE)
                .and_then(|v| v.to_str().ok())
                .unwrap_or_default()
                .to_string()
        }

        #[tokio::test]
        async fn test_pre_register_validates_shape() {
            let f = fixture().await;
            let response = app(&f)
                .await
                .oneshot(post_json(
                    "/api/auth/pre-register",
                    serde_json::json!({ "email": "not-an-email", "password": "weak", "name": "A" }),
                ))
                .await
                .unwrap();

            assert_eq!(response.status(), StatusCode::BAD_REQUEST);
            let body = json_body(response).await;
            assert_eq!(body["success"], false);
            assert_eq!(body["code"], "VALIDATION_ERROR");
            assert!(f.mailer.sent.lock().unwrap().is_empty());
        }

        #[tokio::test]
        async fn test_signup_session_over_http() {
            let f = fixture().await;
            let app = app(&f).await;

            let response = app
                .clone()
                .oneshot(post_json(
                    "/api/auth/pre-register",
                    serde_json::json!({ "email": EMAIL, "password": PASSWORD, "name": "Ada Lovelace" }),
                ))
                .await
                .unwrap();
            assert_eq!(response.status(), StatusCode::OK);

            let code = f.mailer.last_code_for(EMAIL).unwrap();
            let response = app
                .clone()
                .oneshot(post_json(
                    "/api/auth/verify-registration",
                    serde_json::json!({ "email": EMAIL, "otp": code }),
                ))
                .await
                .unwrap();
            assert_eq!(response.status(), StatusCode::CREATED);
            let cookie = set_cookie(&response);
            assert!(cookie.starts_with("refreshToken="));
            assert!(cookie.contains("HttpOnly"));
            assert!(cookie.contains("SameSite=Strict"));

            let body = json_body(response).await;
            assert_eq!(body["data"]["user"]["email"], EMAIL);
            assert_eq!(body["data"]["user"]["isVerified"], true);
            assert!(body["data"].get("refreshToken").is_none());
            let access = body["data"]["accessToken"].as_str().unwrap().to_string();

            let response = app
                .clone()
                .oneshot(with_bearer("GET", "/api/auth/profile", &access))
                .await
                .unwrap();
            assert_eq!(response.status(), StatusCode::OK);
            let body = json_body(response).await;
            assert_eq!(body["data"]["user"]["oauthAccounts"], serde_json::json!([]));

            // Refresh reads the cookie
            let refresh_cookie = cookie.split(';').next().unwrap().to_string();
            let response = app
                .clone()
                .oneshot(
                    Request::builder()
                        .method("POST")
                        .uri("/api/auth/refresh-token")
                        .header(header::COOKIE, refresh_cookie)
                        .body(Body::empty())
                        .unwrap(),
                )
                .await
                .unwrap();
            assert_eq!(response.status(), StatusCode::OK);
            assert!(set_cookie(&response).starts_with("refreshToken="));
        }

        #[tokio::test]
        async fn test_protected_routes_need_bearer() {
            let f = fixture().await;
            let app = app(&f).await;

            let response = app
                .clone()
                .oneshot(
                    Request::builder()
                        .uri("/api/auth/profile")
                        .body(Body::empty())
                        .unwrap(),
                )
                .await
                .unwrap();
            assert_eq!(response.status(), StatusCode::UNAUTHORIZED);

            let response = app
                .oneshot(with_bearer("GET", "/api/auth/accounts", "garbage"))
                .await
                .unwrap();
            assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
        }

        #[tokio::test]
        async fn test_change_password_requires_verified_email() {
            let f = fixture().await;
            unverified_user(&f, "grace@example.com").await;
            let (_, tokens) = f.auth.login("grace@example.com", PASSWORD).await.unwrap();

            let request = Request::builder()
                .method("PUT")
                .uri("/api/auth/change-password")
                .header(header::AUTHORIZATION, format!("Bearer {}", tokens.access_token))
                .header(header::CONTENT_TYPE, "application/json")
                .body(Body::from(
                    serde_json::json!({ "currentPassword": PASSWORD, "newPassword": NEW_PASSWORD })
                        .to_string(),
                ))
                .unwrap();

            let response = app(&f).await.oneshot(request).await.unwrap();
            assert_eq!(response.status(), StatusCode::FORBIDDEN);
            let body = json_body(response).await;
            assert_eq!(body["message"], "Email verification required");
        }

        #[tokio::test]
        async fn test_logout_clears_cookie() {
            let f = fixture().await;
            let response = app(&f)
                .await
                .oneshot(post_json("/api/auth/logout", serde_json::json!({})))
                .await
                .unwrap();
            assert_eq!(response.status(), StatusCode::OK);
            assert!(set_cookie(&response).contains("Max-Age=0"));
        }

        #[tokio::test]
        async fn test_forgot_password_same_answer_for_unknown_email() {
            let f = fixture().await;
            registered(&f).await;
            let app = app(&f).await;

            let mut messages = Vec::new();
            for email in [EMAIL, "nobody@example.com"] {
                let response = app
                    .clone()
                    .oneshot(post_json(
                        "/api/email/forgot-password",
                        serde_json::json!({ "email": email }),
                    ))
                    .await
                    .unwrap();
                assert_eq!(response.status(), StatusCode::OK);
                messages.push(json_body(response).await["message"].clone());
            }
            assert_eq!(messages[0], messages[1]);
        }

        #[tokio::test]
        async fn test_link_rejects_unknown_and_disabled_providers() {
            let f = fixture().await;
            let (_, tokens) = registered(&f).await;
            let app = app(&f).await;

            let response = app
                .clone()
                .oneshot(with_bearer("POST", "/api/auth/link/myspace", &tokens.access_token))
                .await
                .unwrap();
            assert_eq!(response.status(), StatusCode::BAD_REQUEST);

            let response = app
                .oneshot(with_bearer("POST", "/api/auth/link/google", &tokens.access_token))
                .await
                .unwrap();
            assert_eq!(response.status(), StatusCode::NOT_FOUND);
        }

        #[tokio::test]
        async fn test_callback_with_unknown_state_redirects_to_error() {
            let f = fixture().await;
            let response = app(&f)
                .await
                .oneshot(
                    Request::builder()
                        .uri("/api/auth/github/callback?code=abc&state=forged")
                        .body(Body::empty())
                        .unwrap(),
                )
                .await
                .unwrap();

            assert!(response.status().is_redirection());
            let location = response
                .headers()
                .get(header::LOCATION)
                .and_then(|v| v.to_str().ok())
                .unwrap();
            assert!(location.starts_with("http://localhost:3000/auth/error?message="));
        }
    }
}
