// src/services/mailer.rs
//! Outbound email transport

use async_trait::async_trait;
use aws_config::BehaviorVersion;
use aws_sdk_sesv2::config::Region;
use aws_sdk_sesv2::types::{Body, Content, Destination, EmailContent, Message};
use aws_sdk_sesv2::Client as SesClient;
use chrono::Utc;
use std::time::Duration;
use thiserror::Error;
use tracing::{error, info};

use super::email::{
    password_reset_email, security_alert_email, verification_email, welcome_email, AlertDetails,
    RenderedEmail,
};
use crate::common::safe_email_log;

#[derive(Debug, Error)]
pub enum MailError {
    #[error("Email transport failed: {0}")]
    Transport(String),

    #[error("Email transport timed out")]
    Timeout,
}

#[async_trait]
pub trait Mailer: Send + Sync {
    /// Deliver one rendered message
    async fn deliver(&self, to: &str, email: RenderedEmail) -> Result<(), MailError>;

    /// Minutes quoted in OTP emails
    fn otp_ttl_minutes(&self) -> i64;

    async fn send_verification_email(
        &self,
        to: &str,
        name: Option<&str>,
        code: &str,
    ) -> Result<(), MailError> {
        self.deliver(to, verification_email(name, code, self.otp_ttl_minutes()))
            .await
    }

    async fn send_password_reset_email(
        &self,
        to: &str,
        name: Option<&str>,
        code: &str,
    ) -> Result<(), MailError> {
        self.deliver(to, password_reset_email(name, code, self.otp_ttl_minutes()))
            .await
    }

    async fn send_welcome_email(&self, to: &str, name: Option<&str>) -> Result<(), MailError> {
        self.deliver(to, welcome_email(name)).await
    }

    async fn send_security_alert(
        &self,
        to: &str,
        name: Option<&str>,
        action: &str,
        details: &AlertDetails,
    ) -> Result<(), MailError> {
        self.deliver(to, security_alert_email(name, action, Utc::now(), details))
            .await
    }
}

/// Amazon SES v2 transport. Credentials come from the default AWS chain.
pub struct SesMailer {
    client: SesClient,
    from_email: String,
    timeout: Duration,
    otp_ttl_minutes: i64,
}

impl SesMailer {
    pub async fn new(
        region: &str,
        from_email: String,
        timeout: Duration,
        otp_ttl_minutes: i64,
    ) -> Self {
        let aws_config = aws_config::defaults(BehaviorVersion::latest())
            .region(Region::new(region.to_string()))
            .load()
            .await;

        Self {
            client: SesClient::new(&aws_config),
            from_email,
            timeout,
            otp_ttl_minutes,
        }
    }
}

#[async_trait]
impl Mailer for SesMailer {
    async fn deliver(&self, to: &str, email: RenderedEmail) -> Result<(), MailError> {
        let destination = Destination::builder().to_addresses(to).build();

        let subject = Content::builder()
            .data(email.subject)
            .charset("UTF-8")
            .build()
            .map_err(|e| MailError::Transport(format!("Failed to build subject: {}", e)))?;

        let html = Content::builder()
            .data(email.html)
            .charset("UTF-8")
            .build()
            .map_err(|e| MailError::Transport(format!("Failed to build body: {}", e)))?;

        let message = Message::builder()
            .subject(subject)
            .body(Body::builder().html(html).build())
            .build();

        let send = self
            .client
            .send_email()
            .from_email_address(&self.from_email)
            .destination(destination)
            .content(EmailContent::builder().simple(message).build())
            .send();

        let result = tokio::time::timeout(self.timeout, send)
            .await
            .map_err(|_| {
                error!(to = %safe_email_log(to), "SES send timed out");
                MailError::Timeout
            })?
            .map_err(|e| {
                error!(error = %e, to = %safe_email_log(to), "Failed to send email via SES");
                MailError::Transport(e.to_string())
            })?;

        info!(
            to = %safe_email_log(to),
            message_id = ?result.message_id(),
            "Email sent via SES"
        );
        Ok(())
    }

    fn otp_ttl_minutes(&self) -> i64 {
        self.otp_ttl_minutes
    }
}

/// Development transport that only logs. Message bodies, and so codes, are never logged.
pub struct LogMailer {
    otp_ttl_minutes: i64,
}

impl LogMailer {
    pub fn new(otp_ttl_minutes: i64) -> Self {
        Self { otp_ttl_minutes }
    }
}

#[async_trait]
impl Mailer for LogMailer {
    async fn deliver(&self, to: &str, email: RenderedEmail) -> Result<(), MailError> {
        info!(
            to = %safe_email_log(to),
            subject = %email.subject,
            "SES not configured, email not sent"
        );
        Ok(())
    }

    fn otp_ttl_minutes(&self) -> i64 {
        self.otp_ttl_minutes
    }
}

#[cfg(test)]
pub use recording::RecordingMailer;
