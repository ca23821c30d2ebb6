//! Configuration for the payment gate.
//!
//! Configuration is environment-sourced with hardcoded fallbacks. The dev
//! bypass is modeled as an explicit [`GateMode`] injected at construction
//! time, so tests can instantiate both modes deterministically instead of
//! reading a scattered environment flag.
//!
//! # Recognized environment variables
//!
//! - `X402_FACILITATOR_URL` - facilitator base URL (required)
//! - `X402_RECIPIENT` - payee wallet address (required)
//! - `X402_TOKEN` - payment token symbol (default `USDC`)
//! - `X402_MAX_PRICE` - advisory upper price bound (optional)
//! - `X402_DEV_BYPASS` - disable gating entirely (`true`/`1`)
//! - `X402_ENABLE_HEALTHCHECK` - toggle facilitator health probing
//! - `X402_HEALTHCHECK_TIMEOUT` - probe timeout in milliseconds

use std::env;
use std::time::Duration;
use url::Url;

use crate::price::{Price, PriceParseError};

/// Whether payment enforcement is active.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GateMode {
    /// Payments are enforced; this is the production mode.
    Enforce,
    /// Nothing is ever gated. Local-testing escape hatch only.
    Bypass,
}

impl GateMode {
    pub fn is_bypass(&self) -> bool {
        matches!(self, GateMode::Bypass)
    }
}

/// Facilitator health probing configuration.
#[derive(Debug, Clone)]
pub struct HealthCheckConfig {
    /// When false, the gate assumes the facilitator is always healthy.
    pub enabled: bool,
    /// Bound on the health probe request.
    pub timeout: Duration,
}

impl Default for HealthCheckConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            timeout: config_defaults::DEFAULT_HEALTHCHECK_TIMEOUT,
        }
    }
}

/// Complete configuration of a payment gate.
#[derive(Debug, Clone)]
pub struct GateConfig {
    /// Base URL of the facilitator service.
    pub facilitator_url: Url,
    /// Payee wallet address included in every instruction payload.
    pub recipient: String,
    /// Payment token symbol.
    pub token: String,
    /// Advisory upper bound on route prices; enforced client-side.
    pub max_price: Option<Price>,
    /// Enforcement mode.
    pub mode: GateMode,
    /// Health probing settings.
    pub health_check: HealthCheckConfig,
}

pub mod config_defaults {
    use std::time::Duration;

    pub const DEFAULT_TOKEN: &str = "USDC";
    pub const DEFAULT_HEALTHCHECK_TIMEOUT: Duration = Duration::from_millis(2000);
}

/// Configuration error types.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Missing required environment variable {0}")]
    MissingVar(&'static str),
    #[error("Invalid URL in {var}: {source}")]
    InvalidUrl {
        var: &'static str,
        #[source]
        source: url::ParseError,
    },
    #[error("Invalid price in {var}: {source}")]
    InvalidPrice {
        var: &'static str,
        #[source]
        source: PriceParseError,
    },
    #[error("Invalid number in X402_HEALTHCHECK_TIMEOUT: {0}")]
    InvalidTimeout(String),
}

impl GateConfig {
    /// Creates a configuration with defaults for everything optional.
    pub fn new(facilitator_url: Url, recipient: impl Into<String>) -> Self {
        Self {
            facilitator_url,
            recipient: recipient.into(),
            token: config_defaults::DEFAULT_TOKEN.to_string(),
            max_price: None,
            mode: GateMode::Enforce,
            health_check: HealthCheckConfig::default(),
        }
    }

    /// Loads configuration from `X402_*` environment variables.
    pub fn from_env() -> Result<Self, ConfigError> {
        let facilitator_url = env::var("X402_FACILITATOR_URL")
            .map_err(|_| ConfigError::MissingVar("X402_FACILITATOR_URL"))?;
        let facilitator_url = Url::parse(&facilitator_url).map_err(|e| ConfigError::InvalidUrl {
            var: "X402_FACILITATOR_URL",
            source: e,
        })?;
        let recipient =
            env::var("X402_RECIPIENT").map_err(|_| ConfigError::MissingVar("X402_RECIPIENT"))?;
        let token =
            env::var("X402_TOKEN").unwrap_or_else(|_| config_defaults::DEFAULT_TOKEN.to_string());
        let max_price = match env::var("X402_MAX_PRICE") {
            Ok(raw) => Some(Price::parse(&raw).map_err(|e| ConfigError::InvalidPrice {
                var: "X402_MAX_PRICE",
                source: e,
            })?),
            Err(_) => None,
        };
        let mode = if env_flag("X402_DEV_BYPASS", false) {
            GateMode::Bypass
        } else {
            GateMode::Enforce
        };
        let timeout = match env::var("X402_HEALTHCHECK_TIMEOUT") {
            Ok(raw) => {
                let millis: u64 = raw
                    .parse()
                    .map_err(|_| ConfigError::InvalidTimeout(raw.clone()))?;
                Duration::from_millis(millis)
            }
            Err(_) => config_defaults::DEFAULT_HEALTHCHECK_TIMEOUT,
        };
        let health_check = HealthCheckConfig {
            enabled: env_flag("X402_ENABLE_HEALTHCHECK", true),
            timeout,
        };
        Ok(Self {
            facilitator_url,
            recipient,
            token,
            max_price,
            mode,
            health_check,
        })
    }

    /// Sets the enforcement mode.
    pub fn with_mode(mut self, mode: GateMode) -> Self {
        self.mode = mode;
        self
    }

    /// Sets the payment token symbol.
    pub fn with_token(mut self, token: impl Into<String>) -> Self {
        self.token = token.into();
        self
    }

    /// Sets the health probing configuration.
    pub fn with_health_check(mut self, health_check: HealthCheckConfig) -> Self {
        self.health_check = health_check;
        self
    }
}

/// Reads a boolean flag from the environment; `"true"` and `"1"` enable it.
fn env_flag(var: &str, default: bool) -> bool {
    match env::var(var) {
        Ok(raw) => matches!(raw.trim().to_ascii_lowercase().as_str(), "true" | "1"),
        Err(_) => default,
    }
}
