// src/services/mod.rs
//
// Credential lifecycle services shared by the auth, email and OAuth routes

pub mod email;
pub mod mailer;
pub mod monitoring;
pub mod otp;
pub mod password;
pub mod pending;
pub mod tokens;

// Re-export commonly used types for convenience
pub use mailer::{LogMailer, MailError, Mailer, SesMailer};
pub use otp::OtpService;
pub use password::{PasswordError, PasswordHasherService};
pub use pending::{
    oauth_state_store, pending_registration_store, OAuthIntent, OAuthStateStore,
    PendingRegistration, PendingRegistrationStore,
};
pub use tokens::{TokenError, TokenPair, TokenService, TokenSubject};
