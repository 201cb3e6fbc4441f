// src/services/pending.rs
//! Process-local, TTL-bound key/value staging.
//!
//! Holds pending registrations until their OTP arrives and OAuth `state`
//! nonces until the provider redirects back. Entries expire lazily on read
//! and are swept periodically. Nothing here survives a restart; a
//! multi-process deployment must pin a user's flow to one process.

use chrono::{DateTime, Duration, Utc};
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::{debug, info};

use crate::common::clock::Clock;
use crate::store::Provider;

struct Entry<V> {
    value: V,
    created_at: DateTime<Utc>,
}

pub struct ExpiringStore<V> {
    entries: Arc<RwLock<HashMap<String, Entry<V>>>>,
    ttl: Duration,
    clock: Arc<dyn Clock>,
    label: &'static str,
}

impl<V> Clone for ExpiringStore<V> {
    fn clone(&self) -> Self {
        Self {
            entries: self.entries.clone(),
            ttl: self.ttl,
            clock: self.clock.clone(),
            label: self.label,
        }
    }
}

impl<V: Clone + Send + Sync + 'static> ExpiringStore<V> {
    pub fn new(label: &'static str, ttl: Duration, clock: Arc<dyn Clock>) -> Self {
        Self {
            entries: Arc::new(RwLock::new(HashMap::new())),
            ttl,
            clock,
            label,
        }
    }

    fn is_expired(&self, created_at: DateTime<Utc>, now: DateTime<Utc>) -> bool {
        now - created_at > self.ttl
    }

    /// Insert or replace; the TTL restarts from now
    pub async fn set(&self, key: &str, value: V) {
        let entry = Entry {
            value,
            created_at: self.clock.now(),
        };
        self.entries.write().await.insert(key.to_string(), entry);
    }

    /// Live value for `key`; an expired entry is removed and reported absent
    pub async fn get(&self, key: &str) -> Option<V> {
        let now = self.clock.now();
        let mut entries = self.entries.write().await;
        match entries.get(key) {
            Some(entry) if self.is_expired(entry.created_at, now) => {
                entries.remove(key);
                debug!(store = self.label, "Dropped expired entry on read");
                None
            }
            Some(entry) => Some(entry.value.clone()),
            None => None,
        }
    }

    /// Remove and return a live value in one step
    pub async fn take(&self, key: &str) -> Option<V> {
        let now = self.clock.now();
        let entry = self.entries.write().await.remove(key)?;
        (!self.is_expired(entry.created_at, now)).then_some(entry.value)
    }

    pub async fn delete(&self, key: &str) -> bool {
        self.entries.write().await.remove(key).is_some()
    }

    /// Evict every expired entry, returning how many were removed
    pub async fn sweep(&self) -> usize {
        let now = self.clock.now();
        let mut entries = self.entries.write().await;
        let before = entries.len();
        entries.retain(|_, entry| !self.is_expired(entry.created_at, now));
        before - entries.len()
    }

    #[cfg(test)]
    pub async fn len(&self) -> usize {
        self.entries.read().await.len()
    }

    /// Spawn the periodic sweep on the runtime
    pub fn start_sweep_task(&self, every_minutes: u64) -> tokio::task::JoinHandle<()> {
        let store = self.clone();
        tokio::spawn(async move {
            let mut interval =
                tokio::time::interval(std::time::Duration::from_secs(every_minutes.max(1) * 60));
            loop {
                interval.tick().await;
                let removed = store.sweep().await;
                if removed > 0 {
                    info!(store = store.label, removed, "Swept expired entries");
                }
            }
        })
    }
}

/// Signup intent waiting for its OTP. The password is already hashed.
#[derive(Clone)]
pub struct PendingRegistration {
    pub email: String,
    pub name: String,
    pub password_hash: String,
}

impl fmt::Debug for PendingRegistration {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PendingRegistration")
            .field("email", &self.email)
            .field("name", &self.name)
            .field("password_hash", &"<redacted>")
            .finish()
    }
}

pub type PendingRegistrationStore = ExpiringStore<PendingRegistration>;

pub fn pending_registration_store(
    ttl_minutes: i64,
    clock: Arc<dyn Clock>,
) -> PendingRegistrationStore {
    ExpiringStore::new("pending_registrations", Duration::minutes(ttl_minutes), clock)
}

/// What an OAuth `state` nonce was minted for
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OAuthIntent {
    pub provider: Provider,
    /// Set when an authenticated user asked to attach this provider
    pub link_to: Option<String>,
}

pub type OAuthStateStore = ExpiringStore<OAuthIntent>;

pub const OAUTH_STATE_TTL_MINUTES: i64 = 10;

pub fn oauth_state_store(clock: Arc<dyn Clock>) -> OAuthStateStore {
    ExpiringStore::new("oauth_states", Duration::minutes(OAUTH_STATE_TTL_MINUTES), clock)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::common::clock::ManualClock;

    fn pending(email: &str) -> PendingRegistration {
        PendingRegistration {
            email: email.to_string(),
            name: "Ada".to_string(),
            password_hash: "$argon2id$secret".to_string(),
        }
    }

    #[tokio::test]
    async fn test_get_within_ttl() {
        let clock = Arc::new(ManualClock::new());
        let store = pending_registration_store(10, clock.clone());
        store.set("a@x.com", pending("a@x.com")).await;

        clock.advance(Duration::minutes(9));
        assert_eq!(store.get("a@x.com").await.unwrap().email, "a@x.com");
    }

    #[tokio::test]
    async fn test_get_after_ttl_evicts() {
        let clock = Arc::new(ManualClock::new());
        let store = pending_registration_store(10, clock.clone());
        store.set("a@x.com", pending("a@x.com")).await;

        clock.advance(Duration::minutes(10) + Duration::seconds(1));
        assert!(store.get("a@x.com").await.is_none());
        assert_eq!(store.len().await, 0);
    }

    #[tokio::test]
    async fn test_set_restarts_ttl() {
        let clock = Arc::new(ManualClock::new());
        let store = pending_registration_store(10, clock.clone());
        store.set("a@x.com", pending("a@x.com")).await;
        clock.advance(Duration::minutes(8));
        store.set("a@x.com", pending("a@x.com")).await;
        clock.advance(Duration::minutes(8));

        assert!(store.get("a@x.com").await.is_some());
    }

    #[tokio::test]
    async fn test_sweep_counts_evictions() {
        let clock = Arc::new(ManualClock::new());
        let store = pending_registration_store(10, clock.clone());
        store.set("old@x.com", pending("old@x.com")).await;
        clock.advance(Duration::minutes(6));
        store.set("new@x.com", pending("new@x.com")).await;
        clock.advance(Duration::minutes(5));

        assert_eq!(store.sweep().await, 1);
        assert!(store.get("new@x.com").await.is_some());
    }

    #[tokio::test]
    async fn test_take_is_single_use() {
        let clock = Arc::new(ManualClock::new());
        let states = oauth_state_store(clock);
        let intent = OAuthIntent {
            provider: Provider::Github,
            link_to: Some("U1".to_string()),
        };
        states.set("nonce", intent.clone()).await;

        assert_eq!(states.take("nonce").await, Some(intent));
        assert_eq!(states.take("nonce").await, None);
    }

    #[tokio::test]
    async fn test_concurrent_writers_and_sweeper() {
        let clock = Arc::new(ManualClock::new());
        let store = pending_registration_store(10, clock);
        let mut handles = Vec::new();
        for i in 0..32 {
            let store = store.clone();
            handles.push(tokio::spawn(async move {
                let key = format!("u{i}@x.com");
                store.set(&key, pending(&key)).await;
                store.sweep().await;
                store.get(&key).await.is_some()
            }));
        }
        for handle in handles {
            assert!(handle.await.unwrap());
        }
        assert_eq!(store.len().await, 32);
    }

    #[test]
    fn test_debug_redacts_hash() {
        let rendered = format!("{:?}", pending("a@x.com"));
        assert!(!rendered.contains("secret"));
    }
}
