//! The Quota Manager (spec §4.M3): absolute limits, rolling rate limits, and
//! per-tenant concurrency slots.

use crate::error::{QuotaError, QuotaResult};
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use meridian_core::{QuotaKind, TenantId};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{Mutex, Semaphore};
use tracing::{debug, warn};

/// The window length for each rate-limited [`QuotaKind`], in seconds.
fn window_seconds(kind: QuotaKind) -> u64 {
    match kind {
        QuotaKind::ApiCallsPerMinute => 60,
        QuotaKind::TokensPerDay => 86_400,
        _ => 0,
    }
}

struct RateWindow {
    origin: DateTime<Utc>,
    count: u64,
}

struct TenantState {
    limits: HashMap<QuotaKind, u64>,
    absolute_usage: Mutex<HashMap<QuotaKind, u64>>,
    rate_windows: Mutex<HashMap<QuotaKind, RateWindow>>,
    concurrency: Arc<Semaphore>,
}

/// Holds a concurrency slot for a tenant; releases it on drop.
pub struct ConcurrencySlot {
    _permit: tokio::sync::OwnedSemaphorePermit,
}

/// Tracks and enforces per-tenant quotas and rate limits, in-process.
pub struct QuotaManager {
    tenants: DashMap<TenantId, Arc<TenantState>>,
    slot_acquire_timeout: Duration,
}

impl QuotaManager {
    /// Create a manager. `slot_acquire_timeout` bounds
    /// [`QuotaManager::acquire_concurrent_slot`].
    #[must_use]
    pub fn new(slot_acquire_timeout: Duration) -> Self {
        Self {
            tenants: DashMap::new(),
            slot_acquire_timeout,
        }
    }

    /// Register (or replace) a tenant's quota limits and concurrency cap.
    pub fn configure_tenant(&self, tenant_id: TenantId, limits: HashMap<QuotaKind, u64>) {
        let concurrency_cap = limits
            .get(&QuotaKind::ConcurrentRequests)
            .copied()
            .unwrap_or(1)
            .max(1) as usize;
        self.tenants.insert(
            tenant_id,
            Arc::new(TenantState {
                limits,
                absolute_usage: Mutex::new(HashMap::new()),
                rate_windows: Mutex::new(HashMap::new()),
                concurrency: Arc::new(Semaphore::new(concurrency_cap)),
            }),
        );
    }

    fn state(&self, tenant_id: &TenantId) -> QuotaResult<Arc<TenantState>> {
        self.tenants
            .get(tenant_id)
            .map(|e| e.clone())
            .ok_or_else(|| QuotaError::TenantNotFound(tenant_id.to_string()))
    }

    /// Check whether `amount` more usage of `kind` would stay within limit,
    /// without recording it.
    pub async fn can_proceed(&self, tenant_id: &TenantId, kind: QuotaKind, amount: u64) -> QuotaResult<bool> {
        let state = self.state(tenant_id)?;
        let Some(&limit) = state.limits.get(&kind) else {
            return Ok(true);
        };
        if kind.is_rate_limited() {
            let windows = state.rate_windows.lock().await;
            let current = windows.get(&kind).map_or(0, |w| w.count);
            Ok(current + amount <= limit)
        } else {
            let usage = state.absolute_usage.lock().await;
            let current = usage.get(&kind).copied().unwrap_or(0);
            Ok(current + amount <= limit)
        }
    }

    /// `can_proceed` as a hard check, failing with [`QuotaError::Exceeded`].
    pub async fn check(&self, tenant_id: &TenantId, kind: QuotaKind) -> QuotaResult<()> {
        if self.can_proceed(tenant_id, kind, 0).await? {
            Ok(())
        } else {
            Err(QuotaError::Exceeded {
                tenant: tenant_id.to_string(),
                kind,
            })
        }
    }

    /// Record `amount` of usage against `kind`, failing (without recording)
    /// if it would exceed the tenant's limit.
    pub async fn record_usage(&self, tenant_id: &TenantId, kind: QuotaKind, amount: u64) -> QuotaResult<()> {
        let state = self.state(tenant_id)?;
        if kind.is_rate_limited() {
            let mut windows = state.rate_windows.lock().await;
            let window_len = Duration::from_secs(window_seconds(kind));
            let now = Utc::now();
            let entry = windows.entry(kind).or_insert_with(|| RateWindow { origin: now, count: 0 });
            if now.signed_duration_since(entry.origin).to_std().unwrap_or_default() >= window_len {
                entry.origin = now;
                entry.count = 0;
            }
            let limit = state.limits.get(&kind).copied().unwrap_or(u64::MAX);
            if entry.count + amount > limit {
                return Err(QuotaError::Exceeded {
                    tenant: tenant_id.to_string(),
                    kind,
                });
            }
            entry.count += amount;
        } else {
            let mut usage = state.absolute_usage.lock().await;
            let limit = state.limits.get(&kind).copied().unwrap_or(u64::MAX);
            let current = usage.get(&kind).copied().unwrap_or(0);
            if current + amount > limit {
                return Err(QuotaError::Exceeded {
                    tenant: tenant_id.to_string(),
                    kind,
                });
            }
            usage.insert(kind, current + amount);
        }
        debug!(tenant = %tenant_id, kind = crate::error::quota_kind_name(kind), amount, "recorded quota usage");
        Ok(())
    }

    /// Check a rate-limited kind's current window without recording usage.
    pub async fn check_rate_limit(&self, tenant_id: &TenantId, kind: QuotaKind) -> QuotaResult<()> {
        self.check(tenant_id, kind).await
    }

    /// Acquire a concurrency slot, blocking up to the configured timeout.
    pub async fn acquire_concurrent_slot(&self, tenant_id: &TenantId) -> QuotaResult<ConcurrencySlot> {
        let state = self.state(tenant_id)?;
        let semaphore = state.concurrency.clone();
        match tokio::time::timeout(self.slot_acquire_timeout, semaphore.acquire_owned()).await {
            Ok(Ok(permit)) => Ok(ConcurrencySlot { _permit: permit }),
            Ok(Err(_)) => {
                warn!(tenant = %tenant_id, "concurrency semaphore closed");
                Err(QuotaError::SlotTimeout(tenant_id.to_string()))
            }
            Err(_) => Err(QuotaError::SlotTimeout(tenant_id.to_string())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tenant() -> TenantId {
        TenantId::new("t1")
    }

    #[tokio::test]
    async fn absolute_limit_is_enforced() {
        let manager = QuotaManager::new(Duration::from_millis(100));
        manager.configure_tenant(tenant(), HashMap::from([(QuotaKind::Sessions, 2)]));

        manager.record_usage(&tenant(), QuotaKind::Sessions, 1).await.unwrap();
        manager.record_usage(&tenant(), QuotaKind::Sessions, 1).await.unwrap();
        let err = manager
            .record_usage(&tenant(), QuotaKind::Sessions, 1)
            .await
            .unwrap_err();
        assert!(matches!(err, QuotaError::Exceeded { .. }));
    }

    #[tokio::test]
    async fn rate_limited_kind_resets_after_window() {
        let manager = QuotaManager::new(Duration::from_millis(100));
        manager.configure_tenant(tenant(), HashMap::from([(QuotaKind::ApiCallsPerMinute, 1)]));

        manager
            .record_usage(&tenant(), QuotaKind::ApiCallsPerMinute, 1)
            .await
            .unwrap();
        assert!(manager
            .record_usage(&tenant(), QuotaKind::ApiCallsPerMinute, 1)
            .await
            .is_err());
    }

    #[tokio::test]
    async fn concurrency_slots_are_capped_and_released_on_drop() {
        let manager = QuotaManager::new(Duration::from_millis(50));
        manager.configure_tenant(tenant(), HashMap::from([(QuotaKind::ConcurrentRequests, 1)]));

        let slot = manager.acquire_concurrent_slot(&tenant()).await.unwrap();
        let err = manager.acquire_concurrent_slot(&tenant()).await.unwrap_err();
        assert!(matches!(err, QuotaError::SlotTimeout(_)));

        drop(slot);
        assert!(manager.acquire_concurrent_slot(&tenant()).await.is_ok());
    }

    #[tokio::test]
    async fn unconfigured_tenant_is_not_found() {
        let manager = QuotaManager::new(Duration::from_millis(50));
        let err = manager.check(&tenant(), QuotaKind::Sessions).await.unwrap_err();
        assert!(matches!(err, QuotaError::TenantNotFound(_)));
    }
}
