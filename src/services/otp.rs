// src/services/otp.rs
//! One-time passcode lifecycle: issue, rate-limit probe, single-use verify, purge.

use chrono::Duration;
use rand::Rng;
use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::common::clock::Clock;
use crate::store::{CredentialStore, OtpRecord, OtpSubject, StoreError};

/// Codes are drawn uniformly from this inclusive range
const OTP_MIN: u32 = 100_000;
const OTP_MAX: u32 = 999_999;

#[derive(Clone)]
pub struct OtpService {
    store: Arc<dyn CredentialStore>,
    clock: Arc<dyn Clock>,
    ttl: Duration,
}

pub fn generate_code() -> String {
    rand::thread_rng().gen_range(OTP_MIN..=OTP_MAX).to_string()
}

impl OtpService {
    pub fn new(store: Arc<dyn CredentialStore>, clock: Arc<dyn Clock>, ttl_minutes: i64) -> Self {
        Self {
            store,
            clock,
            ttl: Duration::minutes(ttl_minutes),
        }
    }

    /// Replace any existing code for `subject` with a fresh one.
    ///
    /// Delete and insert are separate statements; two concurrent calls can
    /// briefly leave two live codes, each still single use.
    pub async fn create_otp(&self, subject: &OtpSubject) -> Result<OtpRecord, StoreError> {
        let now = self.clock.now();
        let replaced = self.store.delete_otps_for_subject(subject).await?;
        let record = self
            .store
            .insert_otp(subject, &generate_code(), now, now + self.ttl)
            .await?;

        debug!(
            otp_id = %record.id,
            subject_kind = subject.kind(),
            replaced,
            expires_at = %record.expires_at(),
            "Issued OTP"
        );
        Ok(record)
    }

    /// Consume a matching unexpired code. Wrong and expired codes are
    /// indistinguishable to the caller.
    pub async fn verify_otp(&self, subject: &OtpSubject, code: &str) -> Result<bool, StoreError> {
        let Some(record) = self
            .store
            .find_live_otp(subject, code, self.clock.now())
            .await?
        else {
            debug!(subject_kind = subject.kind(), "OTP verification failed");
            return Ok(false);
        };

        // Losing a delete race to a concurrent verify means someone else consumed it
        if !self.store.delete_otp_by_id(&record.id).await? {
            warn!(otp_id = %record.id, "OTP consumed concurrently");
            return Ok(false);
        }
        Ok(true)
    }

    /// True if any code, expired or not, was issued for `subject` within the window
    pub async fn has_recent_otp(
        &self,
        subject: &OtpSubject,
        window_minutes: i64,
    ) -> Result<bool, StoreError> {
        let since = self.clock.now() - Duration::minutes(window_minutes);
        Ok(self.store.count_otps_created_since(subject, since).await? > 0)
    }

    pub async fn purge_expired(&self) -> Result<u64, StoreError> {
        let removed = self.store.delete_expired_otps(self.clock.now()).await?;
        if removed > 0 {
            info!(removed, "Purged expired OTPs");
        }
        Ok(removed)
    }

    /// Spawn the periodic purge of expired rows
    pub fn start_purge_task(self, every_minutes: u64) -> tokio::task::JoinHandle<()> {
        tokio::spawn(async move {
            let mut interval =
                tokio::time::interval(std::time::Duration::from_secs(every_minutes.max(1) * 60));
            loop {
                interval.tick().await;
                if let Err(e) = self.purge_expired().await {
                    warn!(error = %e, "Expired OTP purge failed");
                }
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::common::clock::ManualClock;
    use crate::store::memory_store;
    use chrono::{TimeZone, Utc};

    async fn service_with_store() -> (OtpService, Arc<dyn CredentialStore>, Arc<ManualClock>) {
        let clock = Arc::new(ManualClock::new());
        let store: Arc<dyn CredentialStore> = Arc::new(memory_store().await);
        (OtpService::new(store.clone(), clock.clone(), 10), store, clock)
    }

    async fn service() -> (OtpService, Arc<ManualClock>) {
        let (otp, _, clock) = service_with_store().await;
        (otp, clock)
    }

    fn email() -> OtpSubject {
        OtpSubject::Email("a@x.com".to_string())
    }

    #[test]
    fn test_generated_codes_are_six_digits() {
        for _ in 0..200 {
            let code: u32 = generate_code().parse().unwrap();
            assert!((OTP_MIN..=OTP_MAX).contains(&code));
        }
    }

    #[tokio::test]
    async fn test_second_issue_invalidates_first() {
        let (otp, store, _) = service_with_store().await;
        let first = otp.create_otp(&email()).await.unwrap();
        let second = otp.create_otp(&email()).await.unwrap();

        let epoch = Utc.timestamp_millis_opt(0).unwrap();
        assert_eq!(store.count_otps_created_since(&email(), epoch).await.unwrap(), 1);
        if first.code != second.code {
            assert!(!otp.verify_otp(&email(), &first.code).await.unwrap());
        }
        assert!(otp.verify_otp(&email(), &second.code).await.unwrap());
    }

    #[tokio::test]
    async fn test_code_expires_after_ttl() {
        let (otp, clock) = service().await;
        let record = otp.create_otp(&email()).await.unwrap();

        assert_eq!(record.expires_at(), clock.now() + Duration::minutes(10));
    }

    #[tokio::test]
    async fn test_code_is_single_use() {
        let (otp, _) = service().await;
        let record = otp.create_otp(&email()).await.unwrap();

        assert!(otp.verify_otp(&email(), &record.code).await.unwrap());
        assert!(!otp.verify_otp(&email(), &record.code).await.unwrap());
    }

    #[tokio::test]
    async fn test_expired_code_fails() {
        let (otp, clock) = service().await;
        let record = otp.create_otp(&email()).await.unwrap();

        clock.advance(Duration::minutes(10) + Duration::seconds(1));
        assert!(!otp.verify_otp(&email(), &record.code).await.unwrap());
    }

    #[tokio::test]
    async fn test_code_is_bound_to_subject() {
        let (otp, _) = service().await;
        let record = otp.create_otp(&email()).await.unwrap();

        let other = OtpSubject::Email("b@x.com".to_string());
        assert!(!otp.verify_otp(&other, &record.code).await.unwrap());
        assert!(otp.verify_otp(&email(), &record.code).await.unwrap());
    }

    #[tokio::test]
    async fn test_recent_otp_window() {
        let (otp, clock) = service().await;
        otp.create_otp(&email()).await.unwrap();

        assert!(otp.has_recent_otp(&email(), 1).await.unwrap());
        clock.advance(Duration::seconds(61));
        assert!(!otp.has_recent_otp(&email(), 1).await.unwrap());
    }

    #[tokio::test]
    async fn test_purge_removes_only_expired() {
        let (otp, clock) = service().await;
        otp.create_otp(&email()).await.unwrap();
        clock.advance(Duration::minutes(11));
        otp.create_otp(&OtpSubject::Email("b@x.com".to_string()))
            .await
            .unwrap();

        assert_eq!(otp.purge_expired().await.unwrap(), 1);
    }
}
