//! TOML Configuration File Support
//!
//! Centralized startup configuration, read once from a TOML file at
//! `~/.config/switchboard/switchboard.toml` and the process environment.
//! There is no hot reload.
//!
//! # Configuration Priority
//!
//! Values are loaded with the following priority (highest first):
//! 1. CLI arguments ([`ConfigOverrides`])
//! 2. Environment variables
//! 3. TOML configuration file
//! 4. Default values
//!
//! Credential secrets are the exception: environment keys are appended after
//! file keys rather than replacing them.
//!
//! # Environment Keys
//!
//! Each provider reads `<PREFIX>` and `<PREFIX>_<n>` (for example
//! `GROQ_API_KEY`, `GROQ_API_KEY_1`, `GROQ_API_KEY_2`), in numeric order.
//! `SWITCHBOARD_PRIORITY=groq,gemini,deepseek` overrides the priority order.
//!
//! # Example Configuration
//!
//! ```toml
//! [router]
//! priority = ["groq", "openrouter", "deepseek", "gemini"]
//! reset_hour_utc = 0
//! reenable_after_secs = 3600
//!
//! [providers.groq]
//! keys = ["gsk_...", "gsk_..."]
//! daily_limit = 14400
//! timeout_secs = 30
//!
//! [providers.gemini]
//! default_model = "gemini-2.0-flash"
//! enabled = false
//! ```

use std::collections::BTreeMap;
use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::backend::{adapter_for, AdapterConfig, AdapterError};
use crate::pool::schedule::ResetSchedule;
use crate::pool::ProviderManager;
use crate::providers::ProviderId;
use crate::routing::RequestRouter;

/// Environment variable overriding the provider priority order
pub const PRIORITY_ENV: &str = "SWITCHBOARD_PRIORITY";

// =============================================================================
// Error Types
// =============================================================================

/// Errors that can occur when loading configuration
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Failed to read config file
    #[error("Failed to read config file at {path}: {source}")]
    ReadError {
        /// The path that was attempted
        path: PathBuf,
        /// The underlying IO error
        source: std::io::Error,
    },

    /// Failed to parse TOML
    #[error("Failed to parse TOML config: {0}")]
    ParseError(#[from] toml::de::Error),

    /// Invalid configuration value
    #[error("Invalid configuration: {0}")]
    ValidationError(String),
}

// =============================================================================
// Configuration Source Tracking
// =============================================================================

/// Tracks where a configuration value came from
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum ConfigSource {
    /// Value from command-line argument
    Cli,
    /// Value from environment variable
    Env,
    /// Value from TOML configuration file
    File,
    /// Default value
    Default,
}

impl fmt::Display for ConfigSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Cli => write!(f, "CLI"),
            Self::Env => write!(f, "environment"),
            Self::File => write!(f, "config file"),
            Self::Default => write!(f, "default"),
        }
    }
}

// =============================================================================
// TOML Configuration Structures
// =============================================================================

/// Router section of the TOML configuration
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct RouterToml {
    /// Provider names in the order the router tries them
    pub priority: Option<Vec<String>>,

    /// UTC hour of the daily counter reset
    pub reset_hour_utc: Option<u32>,

    /// Age after which a rate-limit flag is optimistically cleared
    pub reenable_after_secs: Option<u64>,
}

/// One `[providers.<id>]` section
#[derive(Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ProviderToml {
    /// API keys, in pool order
    pub keys: Vec<String>,

    /// Per-credential daily request ceiling
    pub daily_limit: Option<u32>,

    /// Single-shot request timeout in seconds
    pub timeout_secs: Option<u64>,

    /// API base URL override
    pub base_url: Option<String>,

    /// Model used when a request names none
    pub default_model: Option<String>,

    /// Whether the provider participates at all
    pub enabled: Option<bool>,
}

impl fmt::Debug for ProviderToml {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ProviderToml")
            .field("keys", &self.keys.len())
            .field("daily_limit", &self.daily_limit)
            .field("timeout_secs", &self.timeout_secs)
            .field("base_url", &self.base_url)
            .field("default_model", &self.default_model)
            .field("enabled", &self.enabled)
            .finish()
    }
}

/// Top-level TOML configuration structure
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct SwitchboardToml {
    /// Router configuration section
    pub router: RouterToml,

    /// Provider sections keyed by provider name
    pub providers: BTreeMap<String, ProviderToml>,
}

// =============================================================================
// Main Configuration Struct
// =============================================================================

/// Resolved settings for one provider
#[derive(Clone)]
pub struct ProviderSettings {
    /// Provider described
    pub provider: ProviderId,
    keys: Vec<String>,
    /// Per-credential daily request ceiling
    pub daily_limit: u32,
    /// Single-shot request timeout
    pub timeout: Duration,
    /// API base URL override
    pub base_url: Option<String>,
    /// Default model override
    pub default_model: Option<String>,
    /// Whether the provider participates
    pub enabled: bool,
}

impl ProviderSettings {
    fn defaults(provider: ProviderId) -> Self {
        Self {
            provider,
            keys: Vec::new(),
            daily_limit: provider.default_daily_limit(),
            timeout: provider.default_timeout(),
            base_url: None,
            default_model: None,
            enabled: true,
        }
    }

    /// Number of configured keys
    #[must_use]
    pub fn key_count(&self) -> usize {
        self.keys.len()
    }

    /// Append a key unless it is already present
    pub fn push_key(&mut self, key: impl Into<String>) {
        let key = key.into();
        if !key.is_empty() && !self.keys.contains(&key) {
            self.keys.push(key);
        }
    }

    /// Whether the provider should get a pool and an adapter
    #[must_use]
    pub fn is_active(&self) -> bool {
        self.enabled && !self.keys.is_empty()
    }

    /// Adapter connection settings derived from these values
    #[must_use]
    pub fn adapter_config(&self) -> AdapterConfig {
        let mut config = AdapterConfig::for_provider(self.provider).with_timeout(self.timeout);
        if let Some(ref url) = self.base_url {
            config = config.with_base_url(url.clone());
        }
        if let Some(ref model) = self.default_model {
            config = config.with_default_model(model.clone());
        }
        config
    }
}

impl fmt::Debug for ProviderSettings {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ProviderSettings")
            .field("provider", &self.provider)
            .field("keys", &self.keys.len())
            .field("daily_limit", &self.daily_limit)
            .field("timeout", &self.timeout)
            .field("base_url", &self.base_url)
            .field("default_model", &self.default_model)
            .field("enabled", &self.enabled)
            .finish()
    }
}

/// Centralized configuration for the switchboard
///
/// Use [`load_config`] to load it with proper priority handling, then
/// [`SwitchboardConfig::build_manager`] and
/// [`SwitchboardConfig::build_router`] to wire the runtime.
#[derive(Clone, Debug)]
pub struct SwitchboardConfig {
    /// Provider order used by the router
    pub priority: Vec<ProviderId>,

    /// Settings for every known provider
    pub providers: BTreeMap<ProviderId, ProviderSettings>,

    /// Reset timing
    pub schedule: ResetSchedule,

    /// Path to the config file that was loaded (if any)
    pub config_file_path: Option<PathBuf>,

    /// Source of configuration values
    source: ConfigSource,
}

impl Default for SwitchboardConfig {
    fn default() -> Self {
        Self {
            priority: ProviderId::ALL.to_vec(),
            providers: ProviderId::ALL
                .into_iter()
                .map(|p| (p, ProviderSettings::defaults(p)))
                .collect(),
            schedule: ResetSchedule::default(),
            config_file_path: None,
            source: ConfigSource::Default,
        }
    }
}

impl SwitchboardConfig {
    /// Create a new configuration with default values
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Get the primary source of this configuration
    #[must_use]
    pub fn source(&self) -> ConfigSource {
        self.source
    }

    /// Settings for a provider
    #[must_use]
    pub fn provider(&self, provider: ProviderId) -> Option<&ProviderSettings> {
        self.providers.get(&provider)
    }

    /// Mutable settings for a provider
    pub fn provider_mut(&mut self, provider: ProviderId) -> &mut ProviderSettings {
        self.providers
            .entry(provider)
            .or_insert_with(|| ProviderSettings::defaults(provider))
    }

    /// Providers that are enabled and have at least one key
    #[must_use]
    pub fn active_providers(&self) -> Vec<ProviderId> {
        self.providers
            .values()
            .filter(|s| s.is_active())
            .map(|s| s.provider)
            .collect()
    }

    /// Check cross-field constraints
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::ValidationError`] naming the first bad value.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.schedule.reset_hour_utc >= 24 {
            return Err(ConfigError::ValidationError(format!(
                "reset_hour_utc must be between 0 and 23, got {}",
                self.schedule.reset_hour_utc
            )));
        }
        if self.schedule.reenable_after.is_zero() {
            return Err(ConfigError::ValidationError(
                "reenable_after_secs must be greater than zero".to_string(),
            ));
        }
        if self.priority.is_empty() {
            return Err(ConfigError::ValidationError(
                "provider priority list is empty".to_string(),
            ));
        }
        for (i, provider) in self.priority.iter().enumerate() {
            if self.priority[..i].contains(provider) {
                return Err(ConfigError::ValidationError(format!(
                    "provider {provider} appears twice in the priority list"
                )));
            }
        }
        for settings in self.providers.values() {
            if settings.timeout.is_zero() {
                return Err(ConfigError::ValidationError(format!(
                    "{}: timeout_secs must be greater than zero",
                    settings.provider
                )));
            }
            if settings.daily_limit == 0 {
                return Err(ConfigError::ValidationError(format!(
                    "{}: daily_limit must be greater than zero",
                    settings.provider
                )));
            }
        }
        Ok(())
    }

    /// Build the provider manager from the active providers
    #[must_use]
    pub fn build_manager(&self) -> ProviderManager {
        self.providers
            .values()
            .filter(|s| s.is_active())
            .fold(ProviderManager::new(), |manager, s| {
                manager.with_pool(s.provider, s.daily_limit, s.keys.iter().cloned())
            })
    }

    /// Build a router with an adapter for every active chat-capable provider
    ///
    /// # Errors
    ///
    /// Returns an error if an HTTP client cannot be constructed.
    pub fn build_router(&self, manager: Arc<ProviderManager>) -> Result<RequestRouter, AdapterError> {
        let mut router = RequestRouter::new(manager, self.priority.clone());
        for settings in self.providers.values().filter(|s| s.is_active()) {
            match adapter_for(settings.adapter_config()) {
                Some(adapter) => router = router.with_adapter(adapter?),
                None => {
                    tracing::debug!(provider = %settings.provider, "No chat adapter for provider");
                }
            }
        }
        Ok(router)
    }
}

// =============================================================================
// Configuration Loading
// =============================================================================

/// Get the default configuration file path
///
/// Returns `$XDG_CONFIG_HOME/switchboard/switchboard.toml` or
/// `~/.config/switchboard/switchboard.toml` if `XDG_CONFIG_HOME` is not set.
#[must_use]
pub fn default_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|p| p.join("switchboard").join("switchboard.toml"))
}

/// Load configuration from the default path and the process environment
///
/// # Errors
///
/// Returns an error if the config file exists but cannot be parsed, or if a
/// value fails validation. A missing config file is not an error.
pub fn load_config() -> Result<SwitchboardConfig, ConfigError> {
    load_config_from_path(default_config_path())
}

/// Load configuration from a specific path and the process environment
///
/// # Errors
///
/// Returns an error if the specified config file cannot be read or parsed,
/// or if a value fails validation.
pub fn load_config_from_path(path: Option<PathBuf>) -> Result<SwitchboardConfig, ConfigError> {
    load_config_with_env(path, std::env::vars())
}

/// Load configuration from a path and an explicit set of environment variables
///
/// # Errors
///
/// Same as [`load_config_from_path`].
pub fn load_config_with_env<I>(path: Option<PathBuf>, env: I) -> Result<SwitchboardConfig, ConfigError>
where
    I: IntoIterator<Item = (String, String)>,
{
    let mut config = SwitchboardConfig::default();

    if let Some(ref config_path) = path {
        if config_path.exists() {
            let toml_content =
                std::fs::read_to_string(config_path).map_err(|e| ConfigError::ReadError {
                    path: config_path.clone(),
                    source: e,
                })?;

            let toml_config: SwitchboardToml = toml::from_str(&toml_content)?;
            apply_toml_config(&mut config, &toml_config)?;
            config.config_file_path = Some(config_path.clone());
            config.source = ConfigSource::File;

            tracing::info!(
                path = %config_path.display(),
                "Loaded configuration from file"
            );
        } else {
            tracing::debug!(
                path = %config_path.display(),
                "Config file not found, using defaults"
            );
        }
    }

    apply_env_config(&mut config, env)?;
    config.validate()?;

    for settings in config.providers.values().filter(|s| s.is_active()) {
        tracing::debug!(
            provider = %settings.provider,
            keys = settings.key_count(),
            daily_limit = settings.daily_limit,
            "Provider configured"
        );
    }

    Ok(config)
}

fn parse_priority<'a>(names: impl IntoIterator<Item = &'a str>) -> Result<Vec<ProviderId>, ConfigError> {
    names
        .into_iter()
        .map(str::trim)
        .filter(|n| !n.is_empty())
        .map(|n| {
            n.parse::<ProviderId>()
                .map_err(|e| ConfigError::ValidationError(e.to_string()))
        })
        .collect()
}

/// Apply TOML configuration values to the config struct
fn apply_toml_config(config: &mut SwitchboardConfig, toml: &SwitchboardToml) -> Result<(), ConfigError> {
    if let Some(ref priority) = toml.router.priority {
        config.priority = parse_priority(priority.iter().map(String::as_str))?;
    }
    if let Some(hour) = toml.router.reset_hour_utc {
        config.schedule.reset_hour_utc = hour;
    }
    if let Some(secs) = toml.router.reenable_after_secs {
        config.schedule.reenable_after = Duration::from_secs(secs);
    }

    for (name, section) in &toml.providers {
        let provider = name
            .parse::<ProviderId>()
            .map_err(|e| ConfigError::ValidationError(e.to_string()))?;
        let settings = config.provider_mut(provider);

        for key in &section.keys {
            settings.push_key(key.trim());
        }
        if let Some(limit) = section.daily_limit {
            settings.daily_limit = limit;
        }
        if let Some(secs) = section.timeout_secs {
            settings.timeout = Duration::from_secs(secs);
        }
        if let Some(ref url) = section.base_url {
            settings.base_url = Some(url.clone());
        }
        if let Some(ref model) = section.default_model {
            settings.default_model = Some(model.clone());
        }
        if let Some(enabled) = section.enabled {
            settings.enabled = enabled;
        }
    }
    Ok(())
}

/// Position of a key variable in its provider's list, if it is one
///
/// The bare prefix sorts first, then numbered suffixes in numeric order.
fn key_ordinal(name: &str, prefix: &str) -> Option<u64> {
    let rest = name.strip_prefix(prefix)?;
    if rest.is_empty() {
        return Some(0);
    }
    let digits = rest.strip_prefix('_')?;
    if digits.is_empty() || !digits.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    digits.parse::<u64>().ok().map(|n| n.saturating_add(1))
}

/// Apply environment variables to the config struct
fn apply_env_config<I>(config: &mut SwitchboardConfig, env: I) -> Result<(), ConfigError>
where
    I: IntoIterator<Item = (String, String)>,
{
    let vars: Vec<(String, String)> = env.into_iter().collect();
    let mut from_env = false;

    for provider in ProviderId::ALL {
        let prefix = provider.env_prefix();
        let mut found: Vec<(u64, &str)> = vars
            .iter()
            .filter_map(|(name, value)| key_ordinal(name, prefix).map(|n| (n, value.trim())))
            .filter(|(_, value)| !value.is_empty())
            .collect();
        if found.is_empty() {
            continue;
        }
        found.sort_by_key(|(n, _)| *n);

        let settings = config.provider_mut(provider);
        for (_, key) in found {
            settings.push_key(key);
        }
        from_env = true;
    }

    if let Some((_, value)) = vars.iter().find(|(name, _)| name == PRIORITY_ENV) {
        config.priority = parse_priority(value.split(','))?;
        from_env = true;
    }

    if from_env && config.source == ConfigSource::Default {
        config.source = ConfigSource::Env;
    }
    Ok(())
}

// =============================================================================
// CLI Overrides
// =============================================================================

/// Configuration overrides from CLI arguments
#[derive(Clone, Debug, Default)]
pub struct ConfigOverrides {
    /// Priority order override
    pub priority: Option<Vec<ProviderId>>,

    /// Reset hour override
    pub reset_hour_utc: Option<u32>,
}

impl ConfigOverrides {
    /// Create a new empty set of overrides
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Set priority override
    #[must_use]
    pub fn with_priority(mut self, priority: Vec<ProviderId>) -> Self {
        self.priority = Some(priority);
        self
    }

    /// Set reset hour override
    #[must_use]
    pub fn with_reset_hour_utc(mut self, hour: u32) -> Self {
        self.reset_hour_utc = Some(hour);
        self
    }

    /// Apply overrides to a configuration and re-validate it
    ///
    /// # Errors
    ///
    /// Returns an error if an override produces an invalid configuration.
    pub fn apply(&self, config: &mut SwitchboardConfig) -> Result<(), ConfigError> {
        if self.priority.is_some() || self.reset_hour_utc.is_some() {
            config.source = ConfigSource::Cli;
        }
        if let Some(ref priority) = self.priority {
            config.priority = priority.clone();
        }
        if let Some(hour) = self.reset_hour_utc {
            config.schedule.reset_hour_utc = hour;
        }
        config.validate()
    }
}

// =============================================================================
// Tests
// =============================================================================
