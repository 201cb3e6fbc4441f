//! # Identity Module
//!
//! Reconciles OAuth provider assertions with stored users:
//! - reuse of existing (provider, provider_id) links
//! - explicit linking and reassignment for signed-in users
//! - merge onto an existing account by provider-verified email
//! - creation of new OAuth-only users
//! - unlinking with a last-sign-in-method guard

pub mod engine;
pub mod models;


pub use engine::{IdentityService, ProviderEmailLookup};
pub use models::{ProviderAssertion, ProviderEmail, ResolutionKind};
