// src/common/id_generator.rs
//! Crockford Base32 ID Generator
//!
//! Generates human-readable, prefixed IDs using Crockford Base32 encoding.
//! Format: PREFIX_XXXXXXXXXXXX (e.g., U_K7NP3XQ2MW8R for users)
//!
//! - No ambiguous characters (excludes I, L, O, U)
//! - Case-insensitive
//! - 60 bits of randomness per identifier

use rand::Rng;

/// Crockford Base32 alphabet (excludes I, L, O, U to avoid confusion)
const CROCKFORD_ALPHABET: &[u8; 32] = b"0123456789ABCDEFGHJKMNPQRSTVWXYZ";

/// Random characters after the prefix separator
const ID_LENGTH: usize = 12;

/// Entity type prefixes for ID generation
#[derive(Debug, Clone, Copy)]
pub enum EntityPrefix {
    /// User (U_)
    User,
    /// Linked OAuth account (OA_)
    OAuthAccount,
    /// One-time passcode record (K_) - K for Key
    Otp,
}

impl EntityPrefix {
    /// Get the string prefix for this entity type
    pub fn as_str(&self) -> &'static str {
        match self {
            EntityPrefix::User => "U",
            EntityPrefix::OAuthAccount => "OA",
            EntityPrefix::Otp => "K",
        }
    }
}

/// Generate a random Crockford Base32 string of specified length
fn generate_crockford_string(length: usize) -> String {
    let mut rng = rand::thread_rng();
    (0..length)
        .map(|_| {
            let idx = rng.gen_range(0..32);
            CROCKFORD_ALPHABET[idx] as char
        })
        .collect()
}

/// Generate a prefixed ID using Crockford Base32 encoding
///
/// # Example
/// ```
/// let user_id = generate_id(EntityPrefix::User);
/// // Returns something like "U_K7NP3XQ2MW8R"
/// ```
pub fn generate_id(prefix: EntityPrefix) -> String {
    format!("{}_{}", prefix.as_str(), generate_crockford_string(ID_LENGTH))
}

/// Generate a raw Crockford Base32 string without prefix
/// Used for opaque nonces such as the OAuth `state` parameter
pub fn generate_raw_id(length: usize) -> String {
    generate_crockford_string(length)
}

/// Generate a User ID (U_XXXXXXXXXXXX)
pub fn generate_user_id() -> String {
    generate_id(EntityPrefix::User)
}

/// Generate an OAuth account ID (OA_XXXXXXXXXXXX)
pub fn generate_oauth_account_id() -> String {
    generate_id(EntityPrefix::OAuthAccount)
}

/// Generate an OTP record ID (K_XXXXXXXXXXXX)
pub fn generate_otp_id() -> String {
    generate_id(EntityPrefix::Otp)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn test_generate_id_format() {
        let user_id = generate_user_id();
        assert!(user_id.starts_with("U_"));
        assert_eq!(user_id.len(), 2 + ID_LENGTH);

        let account_id = generate_oauth_account_id();
        assert!(account_id.starts_with("OA_"));
        assert_eq!(account_id.len(), 3 + ID_LENGTH);
    }

    #[test]
    fn test_crockford_alphabet_only() {
        let id = generate_otp_id();
        let random_part = &id[2..];

        for c in random_part.chars() {
            assert!(
                CROCKFORD_ALPHABET.contains(&(c as u8)),
                "Character '{}' not in Crockford alphabet",
                c
            );
        }

        assert!(!random_part.contains('I'));
        assert!(!random_part.contains('L'));
        assert!(!random_part.contains('O'));
        assert!(!random_part.contains('U'));
    }

    #[test]
    fn test_uniqueness() {
        let mut ids = HashSet::new();
        for _ in 0..1000 {
            assert!(ids.insert(generate_user_id()), "Duplicate ID generated");
        }
    }

    #[test]
    fn test_raw_id() {
        let raw = generate_raw_id(32);
        assert_eq!(raw.len(), 32);
        assert!(!raw.contains('_'));
    }
}
