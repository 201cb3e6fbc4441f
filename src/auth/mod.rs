//! # Auth Module
//!
//! Password accounts, OTP email verification, password reset and the
//! access/refresh session model, plus the `AuthedUser` extractor that
//! protects routes.

pub mod cookies;
pub mod email_handlers;
pub mod extractors;
pub mod handlers;
pub mod models;
pub mod routes;
pub mod service;
pub mod validators;

#[cfg(test)]
mod tests;

pub use extractors::AuthedUser;
pub use routes::{auth_routes, email_routes};
pub use service::AuthService;
