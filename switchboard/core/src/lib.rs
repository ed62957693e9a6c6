//! Switchboard Core - Credential Pooling and Multi-Provider Completion Routing
//!
//! This crate owns a pool of API credentials per completion provider, decides
//! which credential to hand out next, records the outcome of every call, and
//! routes chat completions across providers with a two-phase fallback. It has
//! no HTTP server surface; callers embed it or drive it from the CLI.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────┐
//! │                           Callers                             │
//! │        CLI  ·  services  ·  dashboards (health_status)        │
//! └──────────────────────────────┬───────────────────────────────┘
//!                                │ ChatRequest
//! ┌──────────────────────────────┼───────────────────────────────┐
//! │                       SWITCHBOARD CORE                        │
//! │  ┌───────────────────────────┴─────────────────────────────┐ │
//! │  │                     RequestRouter                        │ │
//! │  │   phase 1: capacity-aware  ·  phase 2: reset and retry   │ │
//! │  └──────┬──────────────────────────────────────┬───────────┘ │
//! │         │ has_capacity / next_credential       │ call        │
//! │  ┌──────┴──────────┐                    ┌──────┴──────────┐  │
//! │  │ ProviderManager │  <-- outcomes ---  │ ProviderAdapter │  │
//! │  │ (pools, locks)  │                    │ (wire formats)  │  │
//! │  └──────┬──────────┘                    └─────────────────┘  │
//! │         │                                                    │
//! │  ┌──────┴──────────┐                                         │
//! │  │  ResetScheduler │  daily reset · hourly re-enable         │
//! │  └─────────────────┘                                         │
//! └──────────────────────────────────────────────────────────────┘
//! ```
//!
//! # Key Types
//!
//! - [`ProviderManager`]: credential pools, rotation and outcome bookkeeping
//! - [`RequestRouter`]: single-shot and streaming completions with fallback
//! - [`ProviderAdapter`]: one implementation per provider wire format
//! - [`ChatRequest`] / [`ChatResponse`] / [`StreamChunk`]: normalized shapes
//! - [`SwitchboardConfig`]: startup configuration from TOML and environment
//!
//! # Quick Start
//!
//! ```ignore
//! use std::sync::Arc;
//! use switchboard_core::{load_config, ChatRequest, ResetScheduler};
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let config = load_config()?;
//!     let manager = Arc::new(config.build_manager());
//!     let router = config.build_router(Arc::clone(&manager))?;
//!     let _scheduler = ResetScheduler::spawn(Arc::clone(&manager), config.schedule.clone());
//!
//!     let response = router.complete(&ChatRequest::from_prompt("Hello!")).await;
//!     println!("{}", response.content);
//!     Ok(())
//! }
//! ```
//!
//! # Module Overview
//!
//! - [`providers`]: provider identifiers, capabilities and defaults
//! - [`pool`]: credentials, pools, the provider manager and reset scheduling
//! - [`backend`]: adapter trait, normalized types and provider adapters
//! - [`routing`]: request router, fallback bookkeeping and streaming
//! - [`models`]: default model lookup per provider and chat mode
//! - [`config`]: TOML and environment configuration

#![deny(missing_docs)]
#![deny(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

pub mod backend;
pub mod config;
pub mod models;
pub mod pool;
pub mod providers;
pub mod routing;

// Re-exports for convenience
pub use backend::{
    adapter_for, AdapterConfig, AdapterError, ChatMessage, ChatRequest, ChatResponse,
    GeminiAdapter, ModelInfo, OpenAiCompatAdapter, ProviderAdapter, RequestError, Role,
    StreamChunk, StreamEvent, TokenUsage,
};
pub use models::ChatMode;
pub use pool::schedule::{duration_until_next_reset, ResetSchedule, ResetScheduler};
pub use pool::{CredentialLease, CredentialSnapshot, CredentialState, ProviderHealth, ProviderManager};
pub use providers::{Capability, ProviderId};

// Routing exports
pub use routing::{classify_error, ChatStream, ErrorClass, FallbackContext, RequestRouter};

// Config exports
pub use config::{
    default_config_path, load_config, load_config_from_path, load_config_with_env,
    ConfigError, ConfigOverrides, ConfigSource, SwitchboardConfig, SwitchboardToml,
};
