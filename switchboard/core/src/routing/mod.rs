//! Request Routing
//!
//! Provider selection with two-phase fallback over shared credential pools.
//!
//! # Architecture
//!
//! ```text
//! +------------------+
//! |  RequestRouter   |  <-- Entry point for completions
//! +--------+---------+
//!          |
//!          v
//! +------------------+
//! | FallbackContext  |  <-- Per-request attempt log and error summary
//! +--------+---------+
//!          |
//!          v
//! +------------------+
//! | ProviderManager  |  <-- Capacity, credential rotation, outcomes
//! +--------+---------+
//!          |
//!    +-----+-----+
//!    |     |     |
//!    v     v     v
//! +----+ +----+ +------+
//! |Groq| |... | |Gemini|  <-- Provider adapters
//! +----+ +----+ +------+
//! ```
//!
//! # Fallback
//!
//! 1. **Capacity-aware pass**: providers without capacity are skipped
//! 2. **Forced retry**: one global reset, then every provider once more
//!
//! Streaming uses only the first pass and never switches provider after the
//! first delta has been delivered.

pub mod fallback;
pub mod router;

#[cfg(test)]
pub mod test_utils;

pub use fallback::{classify_error, Attempt, AttemptOutcome, ErrorClass, FallbackContext, Phase, SkipReason};
pub use router::{ChatStream, RequestRouter};
