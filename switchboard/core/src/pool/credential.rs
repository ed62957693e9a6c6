//! Credentials
//!
//! One API secret and its usage/health bookkeeping. Credentials are only ever
//! mutated through [`ProviderManager`](super::ProviderManager); everything that
//! leaves the manager is either a [`CredentialLease`] (what the router hands to
//! an adapter) or a [`CredentialSnapshot`] (for observability and tests).

use std::fmt;

use chrono::{DateTime, Utc};
use secrecy::{ExposeSecret, SecretString};
use serde::Serialize;

use crate::providers::ProviderId;

/// Lifecycle state of a credential
///
/// ```text
/// Fresh --select--> InUse --success--> Healthy
///                     |
///                     +--rate limit--> RateLimited  (sticky until reset)
///                     |
///                     +--other error--> Errored     (still selectable)
/// ```
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CredentialState {
    /// Never used, or freshly reset
    #[default]
    Fresh,
    /// Handed out and awaiting an outcome
    InUse,
    /// Last call succeeded
    Healthy,
    /// Last call failed with a non rate-limit error
    Errored,
    /// Provider signalled quota exhaustion; excluded until reset
    RateLimited,
}

/// A single API key with its counters
pub struct Credential {
    secret: SecretString,
    pub(crate) index: usize,
    pub(crate) requests_served_today: u32,
    pub(crate) is_rate_limited: bool,
    pub(crate) rate_limited_at: Option<DateTime<Utc>>,
    pub(crate) last_error_message: Option<String>,
    pub(crate) last_used_at: Option<DateTime<Utc>>,
    pub(crate) consecutive_errors: u32,
    pub(crate) state: CredentialState,
}

impl Credential {
    /// Create a credential at a fixed position in its pool
    pub fn new(index: usize, secret: impl Into<String>) -> Self {
        Self {
            secret: SecretString::from(secret.into()),
            index,
            requests_served_today: 0,
            is_rate_limited: false,
            rate_limited_at: None,
            last_error_message: None,
            last_used_at: None,
            consecutive_errors: 0,
            state: CredentialState::Fresh,
        }
    }

    /// Position within the pool, stable for the process lifetime
    #[must_use]
    pub fn index(&self) -> usize {
        self.index
    }

    /// Whether this credential may be handed out under the given ceiling
    #[must_use]
    pub fn is_usable(&self, daily_limit: u32) -> bool {
        !self.is_rate_limited && self.requests_served_today < daily_limit
    }

    pub(crate) fn lease(&self, provider: ProviderId) -> CredentialLease {
        CredentialLease {
            provider,
            index: self.index,
            secret: self.secret.clone(),
        }
    }

    pub(crate) fn snapshot(&self) -> CredentialSnapshot {
        CredentialSnapshot {
            index: self.index,
            requests_served_today: self.requests_served_today,
            is_rate_limited: self.is_rate_limited,
            last_error_message: self.last_error_message.clone(),
            last_used_at: self.last_used_at,
            consecutive_errors: self.consecutive_errors,
            state: self.state,
        }
    }
}

impl fmt::Debug for Credential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credential")
            .field("index", &self.index)
            .field("requests_served_today", &self.requests_served_today)
            .field("is_rate_limited", &self.is_rate_limited)
            .field("consecutive_errors", &self.consecutive_errors)
            .field("state", &self.state)
            .finish_non_exhaustive()
    }
}

/// Read-only handle to a selected credential
///
/// Carries the secret to the adapter and identifies the credential when the
/// outcome is reported back to the manager.
#[derive(Clone)]
pub struct CredentialLease {
    provider: ProviderId,
    index: usize,
    secret: SecretString,
}

impl CredentialLease {
    /// Provider owning the credential
    #[must_use]
    pub fn provider(&self) -> ProviderId {
        self.provider
    }

    /// Ordinal index within the provider's pool
    #[must_use]
    pub fn index(&self) -> usize {
        self.index
    }

    /// Expose the secret value. Only adapters building a request should call this.
    #[must_use]
    pub fn secret(&self) -> &str {
        self.secret.expose_secret()
    }
}

impl fmt::Debug for CredentialLease {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "CredentialLease({}#{})", self.provider, self.index)
    }
}

/// Point-in-time copy of a credential's counters (no secret)
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct CredentialSnapshot {
    /// Ordinal index within the pool
    pub index: usize,
    /// Requests served since the last reset
    pub requests_served_today: u32,
    /// Whether the credential is excluded until reset
    pub is_rate_limited: bool,
    /// Most recent error text
    pub last_error_message: Option<String>,
    /// Time of the last successful request
    pub last_used_at: Option<DateTime<Utc>>,
    /// Errors since the last success
    pub consecutive_errors: u32,
    /// Lifecycle state
    pub state: CredentialState,
}
