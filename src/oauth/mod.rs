//! # OAuth Module
//!
//! Google and GitHub sign-in: the provider HTTP client, the `state` nonce
//! round trip and the routes that hand assertions to the identity engine.

pub mod client;
pub mod handlers;
pub mod models;
pub mod routes;

pub use client::{OAuthClient, ProviderError};
pub use routes::oauth_routes;
