//! Fallback Bookkeeping
//!
//! Tracks what a single routed request has tried so far, classifies adapter
//! failures, and builds the bounded error summary returned when every
//! provider is exhausted.
//!
//! # Two Phases
//!
//! ```text
//! Phase 1 (capacity-aware)      Phase 2 (forced retry)
//!   groq      -- no capacity      reset_all()
//!   openrouter-- HTTP 500    -->  groq       -- ok
//!   gemini    -- HTTP 429
//! ```
//!
//! Only errors seen in phase 1 feed the summary, up to three; phase 2 errors
//! are used only when phase 1 produced none.

use std::fmt;

use crate::providers::ProviderId;

/// Most provider errors carried in an exhaustion summary
pub const MAX_REPORTED_ERRORS: usize = 3;

/// Substrings that mark a provider error as a quota/rate-limit signal
const RATE_LIMIT_MARKERS: [&str; 4] = ["rate", "limit", "quota", "429"];

// ============================================================================
// Classification
// ============================================================================

/// How a failure affects the credential that produced it
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ErrorClass {
    /// Disable the credential until reset
    RateLimited,
    /// Count it, keep the credential selectable
    Other,
}

/// Classify an adapter error by its rendered message
///
/// Case-insensitive substring match on "rate", "limit", "quota" and "429".
#[must_use]
pub fn classify_error(message: &str) -> ErrorClass {
    let lowered = message.to_ascii_lowercase();
    if RATE_LIMIT_MARKERS.iter().any(|m| lowered.contains(m)) {
        ErrorClass::RateLimited
    } else {
        ErrorClass::Other
    }
}

// ============================================================================
// Attempt Log
// ============================================================================

/// Router pass
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Phase {
    /// Providers without capacity are skipped
    CapacityAware,
    /// After a global reset, every provider is tried once more
    ForcedRetry,
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::CapacityAware => write!(f, "phase 1"),
            Self::ForcedRetry => write!(f, "phase 2"),
        }
    }
}

/// Why a provider was passed over without a call
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SkipReason {
    /// Every credential is rate limited or over its ceiling
    NoCapacity,
    /// No adapter registered, or it lacks the requested capability
    Unsupported,
}

/// Result of considering one provider
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum AttemptOutcome {
    /// Not called
    Skipped(SkipReason),
    /// Called and failed
    Failed {
        /// Classification applied to the credential
        class: ErrorClass,
        /// Rendered adapter error
        message: String,
    },
    /// Called and succeeded
    Succeeded,
}

/// One entry of the attempt log
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Attempt {
    /// Provider considered
    pub provider: ProviderId,
    /// Pass it happened in
    pub phase: Phase,
    /// What happened
    pub outcome: AttemptOutcome,
}

impl fmt::Display for Attempt {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {} ", self.phase, self.provider)?;
        match &self.outcome {
            AttemptOutcome::Skipped(SkipReason::NoCapacity) => write!(f, "skipped (no capacity)"),
            AttemptOutcome::Skipped(SkipReason::Unsupported) => write!(f, "skipped (unsupported)"),
            AttemptOutcome::Failed {
                class: ErrorClass::RateLimited,
                ..
            } => write!(f, "failed (rate limited)"),
            AttemptOutcome::Failed { .. } => write!(f, "failed"),
            AttemptOutcome::Succeeded => write!(f, "ok"),
        }
    }
}

/// Per-request fallback state
#[derive(Clone, Debug)]
pub struct FallbackContext {
    /// Correlation id for logs
    pub request_id: String,
    phase: Phase,
    attempts: Vec<Attempt>,
    errors: Vec<String>,
    late_errors: Vec<String>,
}

impl FallbackContext {
    /// Start tracking a request in phase 1
    pub fn new(request_id: impl Into<String>) -> Self {
        Self {
            request_id: request_id.into(),
            phase: Phase::CapacityAware,
            attempts: Vec::new(),
            errors: Vec::new(),
            late_errors: Vec::new(),
        }
    }

    /// Current pass
    #[must_use]
    pub fn phase(&self) -> Phase {
        self.phase
    }

    /// Move to another pass
    pub fn enter_phase(&mut self, phase: Phase) {
        self.phase = phase;
    }

    /// Record a provider that was passed over
    pub fn record_skip(&mut self, provider: ProviderId, reason: SkipReason) {
        self.push(provider, AttemptOutcome::Skipped(reason));
    }

    /// Record a failed call
    pub fn record_failure(&mut self, provider: ProviderId, message: &str, class: ErrorClass) {
        let errors = match self.phase {
            Phase::CapacityAware => &mut self.errors,
            Phase::ForcedRetry => &mut self.late_errors,
        };
        if errors.len() < MAX_REPORTED_ERRORS {
            errors.push(format!("{provider}: {message}"));
        }
        self.push(
            provider,
            AttemptOutcome::Failed {
                class,
                message: message.to_string(),
            },
        );
    }

    /// Record a successful call
    pub fn record_success(&mut self, provider: ProviderId) {
        self.push(provider, AttemptOutcome::Succeeded);
    }

    /// Every provider considered, in order
    #[must_use]
    pub fn attempts(&self) -> &[Attempt] {
        &self.attempts
    }

    /// One-line rendering of the attempt log for exhaustion logs
    #[must_use]
    pub fn trail(&self) -> String {
        self.attempts
            .iter()
            .map(ToString::to_string)
            .collect::<Vec<_>>()
            .join(", ")
    }

    /// Bounded list of errors for the summary
    #[must_use]
    pub fn reported_errors(&self) -> &[String] {
        if self.errors.is_empty() {
            &self.late_errors
        } else {
            &self.errors
        }
    }

    /// Exhaustion message surfaced to the caller
    #[must_use]
    pub fn summary(&self) -> String {
        let errors = self.reported_errors();
        if errors.is_empty() {
            "All providers failed: no provider had available capacity".to_string()
        } else {
            format!("All providers failed: {}", errors.join("; "))
        }
    }

    fn push(&mut self, provider: ProviderId, outcome: AttemptOutcome) {
        self.attempts.push(Attempt {
            provider,
            phase: self.phase,
            outcome,
        });
    }
}
