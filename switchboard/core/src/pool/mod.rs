//! Credential Pools and the Provider Manager
//!
//! The single source of truth for "is provider X usable right now, and with
//! which credential".
//!
//! # Architecture
//!
//! ```text
//! +-------------------+
//! |  ProviderManager  |   immutable map, built once at startup
//! +---------+---------+
//!           |
//!     +-----+------+-------------+
//!     |            |             |
//!     v            v             v
//! Mutex<Pool>  Mutex<Pool>  Mutex<Pool>   one lock per provider
//!     |
//!     +-- cursor (last returned ordinal)
//!     +-- [Credential 0, Credential 1, ...]
//! ```
//!
//! # Thread Safety
//!
//! Each pool has its own `parking_lot::Mutex`; operations on different
//! providers never contend. Selection and cursor advance happen under the same
//! lock, so two concurrent callers always observe distinct rotation positions.
//! No lock is held across an await point.

mod credential;
pub mod schedule;

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::Serialize;

pub use credential::{Credential, CredentialLease, CredentialSnapshot, CredentialState};

use crate::providers::ProviderId;

// ============================================================================
// Credential Pool
// ============================================================================

/// Ordered credentials for one provider plus the rotation cursor
#[derive(Debug)]
pub struct CredentialPool {
    provider: ProviderId,
    daily_limit: u32,
    credentials: Vec<Credential>,
    /// Ordinal returned by the previous selection
    cursor: Option<usize>,
}

impl CredentialPool {
    /// Build a pool; ordinals follow the order of `secrets`
    pub fn new<I, S>(provider: ProviderId, daily_limit: u32, secrets: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let credentials = secrets
            .into_iter()
            .enumerate()
            .map(|(index, secret)| Credential::new(index, secret))
            .collect();

        Self {
            provider,
            daily_limit,
            credentials,
            cursor: None,
        }
    }

    /// Number of credentials in the pool
    #[must_use]
    pub fn len(&self) -> usize {
        self.credentials.len()
    }

    /// Whether the pool has no credentials at all
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.credentials.is_empty()
    }

    fn has_capacity(&self) -> bool {
        self.credentials
            .iter()
            .any(|c| c.is_usable(self.daily_limit))
    }

    /// Round-robin from the slot after the last returned ordinal
    fn select(&mut self) -> Option<CredentialLease> {
        let len = self.credentials.len();
        if len == 0 {
            return None;
        }

        let start = self.cursor.map_or(0, |c| (c + 1) % len);
        let chosen = (0..len)
            .map(|offset| (start + offset) % len)
            .find(|&idx| self.credentials[idx].is_usable(self.daily_limit))?;

        self.cursor = Some(chosen);
        let credential = &mut self.credentials[chosen];
        credential.state = CredentialState::InUse;
        Some(credential.lease(self.provider))
    }

    fn get_mut(&mut self, index: usize) -> Option<&mut Credential> {
        self.credentials.get_mut(index)
    }

    fn reset(&mut self) {
        for credential in &mut self.credentials {
            credential.is_rate_limited = false;
            credential.rate_limited_at = None;
            credential.requests_served_today = 0;
            if credential.state == CredentialState::RateLimited {
                credential.state = CredentialState::Fresh;
            }
        }
    }

    fn reenable_before(&mut self, cutoff: DateTime<Utc>) -> usize {
        let mut reenabled = 0;
        for credential in &mut self.credentials {
            let expired = credential
                .rate_limited_at
                .map_or(true, |flagged_at| flagged_at <= cutoff);
            if credential.is_rate_limited && expired {
                credential.is_rate_limited = false;
                credential.rate_limited_at = None;
                credential.state = CredentialState::Fresh;
                reenabled += 1;
            }
        }
        reenabled
    }

    fn health(&self) -> ProviderHealth {
        let available = self
            .credentials
            .iter()
            .filter(|c| c.is_usable(self.daily_limit))
            .count();
        let rate_limited = self.credentials.iter().filter(|c| c.is_rate_limited).count();
        let used_today = self
            .credentials
            .iter()
            .map(|c| u64::from(c.requests_served_today))
            .sum();

        ProviderHealth {
            provider: self.provider,
            available_credentials: available,
            total_credentials: self.credentials.len(),
            rate_limited_credentials: rate_limited,
            used_today,
            total_capacity: u64::from(self.daily_limit) * self.credentials.len() as u64,
        }
    }
}

// ============================================================================
// Health Snapshot
// ============================================================================

/// Read-only capacity summary for one provider
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct ProviderHealth {
    /// Provider this summary describes
    pub provider: ProviderId,
    /// Credentials that could be selected right now
    pub available_credentials: usize,
    /// Credentials in the pool
    pub total_credentials: usize,
    /// Credentials excluded by a rate-limit signal
    pub rate_limited_credentials: usize,
    /// Requests served across the pool since the last reset
    pub used_today: u64,
    /// Daily ceiling multiplied by pool size
    pub total_capacity: u64,
}

// ============================================================================
// Provider Manager
// ============================================================================

/// Owns every credential pool and all credential state
///
/// Construct one per process and share it behind an `Arc`.
#[derive(Debug, Default)]
pub struct ProviderManager {
    pools: HashMap<ProviderId, Mutex<CredentialPool>>,
    resets: AtomicU64,
}

impl ProviderManager {
    /// Create a manager with no pools
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a pool for a provider, replacing any previous one
    #[must_use]
    pub fn with_pool<I, S>(mut self, provider: ProviderId, daily_limit: u32, secrets: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let pool = CredentialPool::new(provider, daily_limit, secrets);
        tracing::debug!(
            provider = %provider,
            credentials = pool.len(),
            daily_limit,
            "Registered credential pool"
        );
        self.pools.insert(provider, Mutex::new(pool));
        self
    }

    /// Providers that have a pool, sorted
    #[must_use]
    pub fn providers(&self) -> Vec<ProviderId> {
        let mut providers: Vec<_> = self.pools.keys().copied().collect();
        providers.sort();
        providers
    }

    /// True iff at least one credential is not rate limited and under its ceiling
    #[must_use]
    pub fn has_capacity(&self, provider: ProviderId) -> bool {
        self.pools
            .get(&provider)
            .is_some_and(|pool| pool.lock().has_capacity())
    }

    /// Select the next usable credential in rotation
    #[must_use]
    pub fn next_credential(&self, provider: ProviderId) -> Option<CredentialLease> {
        let lease = self.pools.get(&provider)?.lock().select();
        if let Some(ref lease) = lease {
            tracing::trace!(provider = %provider, credential = lease.index(), "Selected credential");
        }
        lease
    }

    /// Record a successful request
    ///
    /// Never clears a rate-limit flag; only a reset does that.
    pub fn mark_success(&self, provider: ProviderId, index: usize) {
        self.with_credential(provider, index, |credential| {
            credential.requests_served_today = credential.requests_served_today.saturating_add(1);
            credential.last_used_at = Some(Utc::now());
            credential.consecutive_errors = 0;
            if !credential.is_rate_limited {
                credential.state = CredentialState::Healthy;
            }
        });
    }

    /// Record a failed request
    ///
    /// A rate-limit hint excludes the credential until the next reset. Other
    /// errors are counted but leave the credential selectable.
    pub fn mark_error(&self, provider: ProviderId, index: usize, message: &str, rate_limited: bool) {
        self.with_credential(provider, index, |credential| {
            credential.consecutive_errors = credential.consecutive_errors.saturating_add(1);
            credential.last_error_message = Some(message.to_string());
            if rate_limited {
                if !credential.is_rate_limited {
                    credential.rate_limited_at = Some(Utc::now());
                }
                credential.is_rate_limited = true;
                credential.state = CredentialState::RateLimited;
                tracing::warn!(
                    provider = %provider,
                    credential = index,
                    "Credential rate limited until reset"
                );
            } else if !credential.is_rate_limited {
                credential.state = CredentialState::Errored;
            }
        });
    }

    /// Clear rate-limit flags and daily counters for one provider, or all
    pub fn reset_all(&self, provider: Option<ProviderId>) {
        self.resets.fetch_add(1, Ordering::Relaxed);
        match provider {
            Some(provider) => {
                if let Some(pool) = self.pools.get(&provider) {
                    pool.lock().reset();
                }
                tracing::info!(provider = %provider, "Reset credential pool");
            }
            None => {
                for pool in self.pools.values() {
                    pool.lock().reset();
                }
                tracing::info!("Reset all credential pools");
            }
        }
    }

    /// Re-enable credentials flagged as rate limited at or before `cutoff`
    ///
    /// Daily counters are left untouched. Returns the number re-enabled.
    pub fn reenable_rate_limited(&self, cutoff: DateTime<Utc>) -> usize {
        let reenabled: usize = self
            .pools
            .values()
            .map(|pool| pool.lock().reenable_before(cutoff))
            .sum();
        if reenabled > 0 {
            tracing::info!(reenabled, "Re-enabled rate limited credentials");
        }
        reenabled
    }

    /// Number of `reset_all` invocations since startup
    #[must_use]
    pub fn reset_count(&self) -> u64 {
        self.resets.load(Ordering::Relaxed)
    }

    /// Capacity summary for every registered provider, sorted by provider
    #[must_use]
    pub fn health_status(&self) -> Vec<ProviderHealth> {
        self.providers()
            .into_iter()
            .filter_map(|p| self.pools.get(&p).map(|pool| pool.lock().health()))
            .collect()
    }

    /// Counters of every credential in a provider's pool
    #[must_use]
    pub fn snapshot(&self, provider: ProviderId) -> Vec<CredentialSnapshot> {
        self.pools
            .get(&provider)
            .map(|pool| {
                pool.lock()
                    .credentials
                    .iter()
                    .map(Credential::snapshot)
                    .collect()
            })
            .unwrap_or_default()
    }

    fn with_credential(&self, provider: ProviderId, index: usize, f: impl FnOnce(&mut Credential)) {
        let Some(pool) = self.pools.get(&provider) else {
            tracing::warn!(provider = %provider, "Outcome reported for provider without a pool");
            return;
        };
        let mut pool = pool.lock();
        match pool.get_mut(index) {
            Some(credential) => f(credential),
            None => {
                tracing::warn!(provider = %provider, credential = index, "Outcome reported for unknown credential");
            }
        }
    }
}

// ============================================================================
// Tests
// ============================================================================
