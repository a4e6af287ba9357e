//! The Credential Pool (spec §4.M6): a rotating, cooldown-aware set of LLM
//! provider secrets.

use crate::error::{LlmError, LlmResult};
use chrono::{DateTime, Utc};
use meridian_core::{Credential, CredentialId};
use std::sync::Mutex;

/// The exponential backoff ladder, in seconds, keyed by consecutive failure
/// count (1st failure → 60s, 2nd → 300s, ...), clamped at the last entry.
const COOLDOWN_LADDER_S: [i64; 4] = [60, 300, 1500, 3600];

/// Whether a completion failure was transient or a hard auth rejection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureKind {
    /// Temporary; apply a cooldown and keep the credential.
    Transient,
    /// The credential itself is invalid; evict it permanently.
    AuthInvalid,
}

/// A rotating pool of per-provider credentials with cooldown-aware
/// selection.
#[derive(Default)]
pub struct CredentialPool {
    credentials: Mutex<Vec<Credential>>,
}

impl CredentialPool {
    /// Create an empty pool.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Add (or replace, by id) a credential.
    pub fn add(&self, credential: Credential) {
        let mut creds = self.credentials.lock().expect("credential pool lock poisoned");
        creds.retain(|c| c.id != credential.id);
        creds.push(credential);
    }

    /// Remove a credential permanently.
    pub fn remove(&self, id: CredentialId) {
        self.credentials.lock().expect("credential pool lock poisoned").retain(|c| c.id != id);
    }

    /// Select the highest-priority, not-currently-cooling-down credential
    /// for `provider`; ties broken by least-recently-used first (stable
    /// round robin).
    pub fn acquire(&self, provider: &str) -> LlmResult<Credential> {
        let now = Utc::now();
        let mut creds = self.credentials.lock().expect("credential pool lock poisoned");
        let chosen_id = creds
            .iter()
            .filter(|c| c.provider == provider && c.cooldown_until.is_none_or(|t| t <= now))
            .max_by(|a, b| {
                a.priority
                    .cmp(&b.priority)
                    .then_with(|| b.last_used_at.cmp(&a.last_used_at))
            })
            .map(|c| c.id)
            .ok_or_else(|| LlmError::ProviderUnavailable(format!("no eligible credential for provider {provider}")))?;

        let credential = creds.iter_mut().find(|c| c.id == chosen_id).expect("id just selected above");
        credential.last_used_at = Some(now);
        Ok(credential.clone())
    }

    /// Reset a credential's failure count and cooldown after a successful
    /// call.
    pub fn report_success(&self, id: CredentialId) {
        let mut creds = self.credentials.lock().expect("credential pool lock poisoned");
        if let Some(credential) = creds.iter_mut().find(|c| c.id == id) {
            credential.error_count = 0;
            credential.cooldown_until = None;
        }
    }

    /// Record a failure. `AuthInvalid` evicts the credential permanently;
    /// `Transient` applies the next cooldown on the ladder.
    pub fn report_failure(&self, id: CredentialId, kind: FailureKind) {
        if kind == FailureKind::AuthInvalid {
            self.remove(id);
            return;
        }
        let mut creds = self.credentials.lock().expect("credential pool lock poisoned");
        if let Some(credential) = creds.iter_mut().find(|c| c.id == id) {
            credential.error_count += 1;
            let cooldown_s = cooldown_for(credential.error_count);
            credential.cooldown_until = Some(next_eligible_at(cooldown_s));
        }
    }
}

fn cooldown_for(error_count: u32) -> i64 {
    let index = (error_count.saturating_sub(1)) as usize;
    COOLDOWN_LADDER_S[index.min(COOLDOWN_LADDER_S.len() - 1)]
}

fn next_eligible_at(cooldown_s: i64) -> DateTime<Utc> {
    Utc::now() + chrono::Duration::seconds(cooldown_s)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn credential(provider: &str, priority: i32) -> Credential {
        Credential {
            id: CredentialId::new(),
            provider: provider.to_string(),
            secret: "s3cr3t".to_string(),
            priority,
            cooldown_until: None,
            error_count: 0,
            last_used_at: None,
        }
    }

    #[test]
    fn acquire_prefers_highest_priority() {
        let pool = CredentialPool::new();
        let low = credential("openai", 1);
        let high = credential("openai", 10);
        let high_id = high.id;
        pool.add(low);
        pool.add(high);

        assert_eq!(pool.acquire("openai").unwrap().id, high_id);
    }

    #[test]
    fn acquire_round_robins_among_equal_priority() {
        let pool = CredentialPool::new();
        let a = credential("openai", 5);
        let b = credential("openai", 5);
        let a_id = a.id;
        let b_id = b.id;
        pool.add(a);
        pool.add(b);

        let first = pool.acquire("openai").unwrap().id;
        let second = pool.acquire("openai").unwrap().id;
        assert_ne!(first, second);
        assert!((first == a_id && second == b_id) || (first == b_id && second == a_id));
    }

    #[test]
    fn cooldown_ladder_follows_60_300_1500_3600() {
        assert_eq!(cooldown_for(1), 60);
        assert_eq!(cooldown_for(2), 300);
        assert_eq!(cooldown_for(3), 1500);
        assert_eq!(cooldown_for(4), 3600);
        assert_eq!(cooldown_for(10), 3600);
    }

    #[test]
    fn cooling_down_credential_is_skipped_until_cooldown_expires() {
        let pool = CredentialPool::new();
        let cred = credential("openai", 5);
        let id = cred.id;
        pool.add(cred);

        pool.report_failure(id, FailureKind::Transient);
        let err = pool.acquire("openai").unwrap_err();
        assert!(matches!(err, LlmError::ProviderUnavailable(_)));
    }

    #[test]
    fn auth_invalid_evicts_the_credential_permanently() {
        let pool = CredentialPool::new();
        let cred = credential("openai", 5);
        let id = cred.id;
        pool.add(cred);

        pool.report_failure(id, FailureKind::AuthInvalid);
        assert!(pool.acquire("openai").is_err());
    }

    #[test]
    fn report_success_resets_error_count_and_cooldown() {
        let pool = CredentialPool::new();
        let cred = credential("openai", 5);
        let id = cred.id;
        pool.add(cred);

        pool.report_failure(id, FailureKind::Transient);
        pool.report_success(id);
        assert!(pool.acquire("openai").is_ok());
    }
}
