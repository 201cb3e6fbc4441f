// src/services/email.rs
//! HTML bodies for account emails

use chrono::{DateTime, Utc};

/// A rendered message ready for transport
#[derive(Debug, Clone)]
pub struct RenderedEmail {
    pub subject: String,
    pub html: String,
}

/// Extra context shown in a security alert
#[derive(Debug, Clone, Default)]
pub struct AlertDetails {
    pub ip: Option<String>,
    pub user_agent: Option<String>,
}

const STYLE: &str = r#"
        body { font-family: Arial, sans-serif; line-height: 1.6; color: #333; }
        .container { max-width: 600px; margin: 0 auto; padding: 20px; }
        .header { background-color: #4F46E5; color: white; padding: 20px; text-align: center; }
        .content { padding: 20px; background-color: #f9f9f9; }
        .code { font-size: 32px; font-weight: bold; letter-spacing: 8px; text-align: center; padding: 16px; background: #fff; border: 2px dashed #4F46E5; margin: 20px 0; }
        .alert { background: #FEF3C7; border-left: 4px solid #F59E0B; padding: 12px; margin: 16px 0; }
        .footer { padding: 20px; text-align: center; font-size: 12px; color: #666; }
"#;

pub fn escape_html(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    for c in raw.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            _ => out.push(c),
        }
    }
    out
}

fn greeting_name(name: Option<&str>) -> String {
    escape_html(name.filter(|n| !n.trim().is_empty()).unwrap_or("User"))
}

fn layout(title: &str, content: &str) -> String {
    format!(
        r#"<!DOCTYPE html>
<html>
<head>
    <meta charset="UTF-8">
    <style>{}</style>
</head>
<body>
    <div class="container">
        <div class="header">
            <h1>{}</h1>
        </div>
        <div class="content">
{}
        </div>
        <div class="footer">
            <p>This is an automated message, please do not reply to this email.</p>
        </div>
    </div>
</body>
</html>"#,
        STYLE, title, content
    )
}

pub fn verification_email(name: Option<&str>, code: &str, ttl_minutes: i64) -> RenderedEmail {
    let content = format!(
        r#"            <h2>Hello {}!</h2>
            <p>Thank you for registering with our service. To complete your registration, please verify your email address using the verification code below:</p>
            <div class="code">{}</div>
            <p>This verification code will expire in {} minutes.</p>
            <p>If you didn't create an account with us, please ignore this email.</p>
            <p>Best regards,<br>The Security Team</p>"#,
        greeting_name(name),
        code,
        ttl_minutes
    );
    RenderedEmail {
        subject: "Verify Your Email Address".to_string(),
        html: layout("Email Verification", &content),
    }
}

pub fn password_reset_email(name: Option<&str>, code: &str, ttl_minutes: i64) -> RenderedEmail {
    let content = format!(
        r#"            <h2>Hello {}!</h2>
            <p>We received a request to reset your password. Use the verification code below to reset your password:</p>
            <div class="code">{}</div>
            <p>This verification code will expire in {} minutes.</p>
            <p>If you didn't request a password reset, please ignore this email. Your password will remain unchanged.</p>
            <p>Best regards,<br>The Security Team</p>"#,
        greeting_name(name),
        code,
        ttl_minutes
    );
    RenderedEmail {
        subject: "Password Reset Request".to_string(),
        html: layout("Password Reset Request", &content),
    }
}

pub fn welcome_email(name: Option<&str>) -> RenderedEmail {
    let content = format!(
        r#"            <h2>Hello {}!</h2>
            <p>Welcome to our platform! Your email has been successfully verified and your account is now active.</p>
            <p>If you have any questions or need assistance, please don't hesitate to contact our support team.</p>
            <p>Best regards,<br>The Team</p>"#,
        greeting_name(name)
    );
    RenderedEmail {
        subject: "Welcome to Our Platform!".to_string(),
        html: layout("Welcome to Our Platform!", &content),
    }
}

pub fn security_alert_email(
    name: Option<&str>,
    action: &str,
    at: DateTime<Utc>,
    details: &AlertDetails,
) -> RenderedEmail {
    let mut lines = format!(
        "<strong>Action:</strong> {}<br>\n                <strong>Time:</strong> {}<br>",
        escape_html(action),
        at.format("%Y-%m-%d %H:%M:%S UTC")
    );
    if let Some(ip) = &details.ip {
        lines.push_str(&format!("\n                <strong>IP Address:</strong> {}<br>", escape_html(ip)));
    }
    if let Some(agent) = &details.user_agent {
        lines.push_str(&format!("\n                <strong>Device:</strong> {}<br>", escape_html(agent)));
    }

    let content = format!(
        r#"            <h2>Hello {}!</h2>
            <p>We're writing to inform you about recent activity on your account:</p>
            <div class="alert">
                {}
            </div>
            <p>If this was you, no further action is required. If you don't recognize this activity, please:</p>
            <ul>
                <li>Change your password immediately</li>
                <li>Review your account settings</li>
                <li>Contact our support team</li>
            </ul>
            <p>Best regards,<br>The Security Team</p>"#,
        greeting_name(name),
        lines
    );
    RenderedEmail {
        subject: "Security Alert - Account Activity".to_string(),
        html: layout("Security Alert", &content),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_verification_email_carries_code_and_ttl() {
        let email = verification_email(Some("Ada"), "482913", 10);
        assert_eq!(email.subject, "Verify Your Email Address");
        assert!(email.html.contains("482913"));
        assert!(email.html.contains("expire in 10 minutes"));
        assert!(email.html.contains("Hello Ada!"));
    }

    #[test]
    fn test_missing_name_falls_back() {
        let email = welcome_email(None);
        assert!(email.html.contains("Hello User!"));
    }

    #[test]
    fn test_names_are_escaped() {
        let email = password_reset_email(Some("<script>x</script>"), "111111", 10);
        assert!(!email.html.contains("<script>"));
        assert!(email.html.contains("&lt;script&gt;"));
    }

    #[test]
    fn test_alert_optional_details() {
        let at = Utc.with_ymd_and_hms(2024, 1, 1, 12, 0, 0).unwrap();
        let bare = security_alert_email(Some("Ada"), "Password reset", at, &AlertDetails::default());
        assert!(bare.html.contains("Password reset"));
        assert!(!bare.html.contains("IP Address"));

        let details = AlertDetails {
            ip: Some("10.0.0.1".to_string()),
            user_agent: None,
        };
        let full = security_alert_email(Some("Ada"), "Password reset", at, &details);
        assert!(full.html.contains("10.0.0.1"));
        assert!(full.html.contains("2024-01-01 12:00:00 UTC"));
    }
}
