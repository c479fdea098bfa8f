// SPDX-FileCopyrightText: 2025 Semiotic Labs
//
// SPDX-License-Identifier: Apache-2.0

//! Server configuration module
//!
//! This module provides configuration structures and logic for the lookup server,
//! supporting different environments and validation of configuration parameters.
//! Pool, fallback and lookup sections are converted into the `registry-lookup`
//! configuration types when the server is assembled.

use std::{
    collections::BTreeMap,
    fmt,
    net::{IpAddr, Ipv4Addr, SocketAddr},
    time::Duration,
};

use anyhow::{Result, anyhow, ensure};
use config::{Config, ConfigError, Environment as ConfigEnv, File};
use portal_client::PresetAuthenticator;
use registry_lookup::{ChannelConfig, FallbackConfig, LookupConfig, PoolConfig};
use serde::{Deserialize, Deserializer, Serialize, de};
use url::Url;

use crate::error::{ServerError, ServerResult};

/// A validated server port that ensures the value is appropriate for the environment
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ServerPort {
    port: u16,
    environment: Environment,
}

impl ServerPort {
    /// Create a new `ServerPort`, ensuring it's valid for the given environment
    ///
    /// # Errors
    ///
    /// Returns an error if the port is 0 in non-testing environments
    pub fn new(port: u16, environment: Environment) -> Result<Self> {
        if port == 0 && environment != Environment::Testing {
            return Err(anyhow!("port cannot be 0 in non-testing environments"));
        }
        Ok(Self { port, environment })
    }

    /// Create a safe default port for development
    pub const fn default_development() -> Self {
        Self {
            port: 3000,
            environment: Environment::Development,
        }
    }

    /// Create a safe testing port (port 0)
    pub const fn testing() -> Self {
        Self {
            port: 0,
            environment: Environment::Testing,
        }
    }

    /// Get the port value
    pub fn value(&self) -> u16 {
        self.port
    }
}

impl<'de> Deserialize<'de> for ServerPort {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let port = u16::deserialize(deserializer)?;
        // Re-validated in `load` once the environment is known
        Ok(Self {
            port,
            environment: Environment::Development,
        })
    }
}

/// A validated timeout duration in seconds
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct TimeoutSeconds(Duration);

impl TimeoutSeconds {
    /// Create a new `TimeoutSeconds`, ensuring the value is within valid bounds
    ///
    /// # Errors
    ///
    /// Returns an error if timeout is 0 or greater than 300 seconds
    pub fn new(seconds: u64) -> Result<Self> {
        ensure!(seconds != 0, "timeout must be greater than 0");
        ensure!(seconds <= 300, "timeout cannot exceed 300");
        Ok(Self(Duration::from_secs(seconds)))
    }

    /// Create a safe default timeout (30 seconds)
    pub const fn default_value() -> Self {
        Self(Duration::from_secs(30))
    }

    /// Create a safe testing timeout (5 seconds)
    pub const fn testing() -> Self {
        Self(Duration::from_secs(5))
    }

    /// Get the timeout value
    pub fn value(&self) -> Duration {
        self.0
    }
}

impl<'de> Deserialize<'de> for TimeoutSeconds {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let seconds = u64::deserialize(deserializer)?;
        Self::new(seconds).map_err(|e| de::Error::custom(e.to_string()))
    }
}

impl Default for TimeoutSeconds {
    fn default() -> Self {
        Self::default_value()
    }
}

/// Environment types for configuration
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, utoipa::ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum Environment {
    /// Production environment
    Production,
    /// Development environment
    Development,
    /// Testing environment
    Testing,
}

impl fmt::Display for Environment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Environment::Production => write!(f, "production"),
            Environment::Development => write!(f, "development"),
            Environment::Testing => write!(f, "testing"),
        }
    }
}

/// IP based rate limiting for the lookup endpoints
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RateLimitingConfig {
    /// Whether rate limiting is applied
    pub enabled: bool,
    /// Requests allowed per client IP in a one minute window
    pub requests_per_minute: u32,
}

impl Default for RateLimitingConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            requests_per_minute: 120,
        }
    }
}

/// Administrative endpoint access
#[derive(Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AdminConfig {
    /// Bearer token; admin endpoints are disabled when absent
    pub token: Option<String>,
}

impl AdminConfig {
    /// Configured, non-blank token
    pub fn token(&self) -> Option<&str> {
        self.token.as_deref().filter(|token| !token.trim().is_empty())
    }
}

impl fmt::Debug for AdminConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AdminConfig")
            .field("token", &self.token().map(|_| "<redacted>"))
            .finish()
    }
}

/// Per-lookup deadline and batch limits
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LookupSettings {
    /// Largest accepted batch
    pub max_batch_size: usize,
    /// Deadline for a single lookup, both paths included
    pub deadline_seconds: u64,
}

impl Default for LookupSettings {
    fn default() -> Self {
        Self {
            max_batch_size: 50,
            deadline_seconds: 10,
        }
    }
}

impl LookupSettings {
    /// Orchestrator configuration
    pub fn to_lookup_config(&self) -> LookupConfig {
        LookupConfig {
            max_batch_size: self.max_batch_size,
            deadline: Duration::from_secs(self.deadline_seconds),
        }
    }
}

/// Portal session pool settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PoolSettings {
    /// Number of sessions created at startup and on refresh
    pub max_sessions: usize,
    /// Pause between consecutive authentications
    pub bootstrap_delay_ms: u64,
    /// Upper bound for a single authentication
    pub authentication_timeout_seconds: u64,
    /// Upper bound for a single portal query
    pub query_timeout_seconds: u64,
    /// Age after which a cached form token is fetched again
    pub token_max_age_seconds: u64,
    /// Portal page hosting the buyer lookup form
    pub portal_url: Url,
}

impl Default for PoolSettings {
    fn default() -> Self {
        let channel = ChannelConfig::default();
        Self {
            max_sessions: 3,
            bootstrap_delay_ms: 2_000,
            authentication_timeout_seconds: 30,
            query_timeout_seconds: 3,
            token_max_age_seconds: 600,
            portal_url: channel.portal_url,
        }
    }
}

impl PoolSettings {
    /// Pool configuration
    pub fn to_pool_config(&self) -> PoolConfig {
        PoolConfig {
            max_sessions: self.max_sessions,
            bootstrap_delay: Duration::from_millis(self.bootstrap_delay_ms),
            authentication_timeout: Duration::from_secs(self.authentication_timeout_seconds),
            channel: ChannelConfig {
                portal_url: self.portal_url.clone(),
                query_timeout: Duration::from_secs(self.query_timeout_seconds),
                token_max_age: Duration::from_secs(self.token_max_age_seconds),
            },
        }
    }
}

/// Public registry endpoints and budgets
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct FallbackSettings {
    /// Civil-registry mirror used for short-form numbers
    pub civil_registry_url: Url,
    /// Consolidated taxpayer endpoint used for long-form numbers
    pub tax_registry_url: Url,
    /// Establishment listing used for the head-office address
    pub establishments_url: Url,
    /// Total budget of one fallback resolution
    pub budget_seconds: u64,
    /// Budget of the address enrichment call
    pub enrichment_budget_seconds: u64,
}

impl Default for FallbackSettings {
    fn default() -> Self {
        let fallback = FallbackConfig::default();
        Self {
            civil_registry_url: fallback.civil_registry_url,
            tax_registry_url: fallback.tax_registry_url,
            establishments_url: fallback.establishments_url,
            budget_seconds: 3,
            enrichment_budget_seconds: 2,
        }
    }
}

impl FallbackSettings {
    /// Fallback resolver configuration
    pub fn to_fallback_config(&self) -> FallbackConfig {
        FallbackConfig {
            civil_registry_url: self.civil_registry_url.clone(),
            tax_registry_url: self.tax_registry_url.clone(),
            establishments_url: self.establishments_url.clone(),
            budget: Duration::from_secs(self.budget_seconds),
            enrichment_budget: Duration::from_secs(self.enrichment_budget_seconds),
        }
    }
}

/// Session material transferred from an out-of-process portal login
///
/// Cookies are given as a single `Cookie` header value (`name=value; name2=value2`)
/// so that cookie names keep their case when set through environment variables.
#[derive(Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct CredentialsConfig {
    /// Cookie header captured after login
    pub cookie_header: Option<String>,
    /// Form token captured after login
    pub token: Option<String>,
}

impl CredentialsConfig {
    /// Cookie pairs parsed from the header value, malformed pairs skipped
    pub fn cookies(&self) -> BTreeMap<String, String> {
        self.cookie_header
            .as_deref()
            .unwrap_or_default()
            .split(';')
            .filter_map(|pair| {
                let (name, value) = pair.split_once('=')?;
                let name = name.trim();
                (!name.is_empty()).then(|| (name.to_string(), value.trim().to_string()))
            })
            .collect()
    }

    /// Authenticator replaying these credentials
    pub fn authenticator(&self) -> PresetAuthenticator {
        PresetAuthenticator::new(self.cookies(), self.token.clone())
    }
}

impl fmt::Debug for CredentialsConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CredentialsConfig")
            .field("cookies", &self.cookies().keys().collect::<Vec<_>>())
            .field("token", &self.token.as_ref().map(|_| "<redacted>"))
            .finish()
    }
}

/// Server configuration for different environments
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Server host address
    pub host: IpAddr,
    /// Server port (validated for environment compatibility)
    pub port: ServerPort,
    /// Request timeout in seconds (validated range: 1-300)
    pub timeout_seconds: TimeoutSeconds,
    /// Environment type
    pub environment: Environment,
    /// Rate limiting configuration
    #[serde(default)]
    pub rate_limiting: RateLimitingConfig,
    /// Administrative endpoint access
    #[serde(default)]
    pub admin: AdminConfig,
    /// Lookup limits
    #[serde(default)]
    pub lookup: LookupSettings,
    /// Session pool
    #[serde(default)]
    pub pool: PoolSettings,
    /// Public registry fallback
    #[serde(default)]
    pub fallback: FallbackSettings,
    /// Portal session material
    #[serde(default)]
    pub credentials: CredentialsConfig,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: IpAddr::V4(Ipv4Addr::LOCALHOST),
            port: ServerPort::default_development(),
            timeout_seconds: TimeoutSeconds::default(),
            environment: Environment::Development,
            rate_limiting: RateLimitingConfig::default(),
            admin: AdminConfig::default(),
            lookup: LookupSettings::default(),
            pool: PoolSettings::default(),
            fallback: FallbackSettings::default(),
            credentials: CredentialsConfig::default(),
        }
    }
}

impl ServerConfig {
    /// Create configuration from environment variables and optional configuration files
    ///
    /// # Errors
    ///
    /// Returns `ServerError::Config` if configuration is invalid or cannot be loaded.
    pub fn from_env() -> ServerResult<Self> {
        let config = Self::load().map_err(|e| ServerError::Config {
            message: format!("failed to load configuration: {e}"),
        })?;
        config.validate().map_err(|e| ServerError::Config {
            message: format!("invalid configuration: {e}"),
        })?;
        Ok(config)
    }

    /// Load configuration using the config crate with hierarchical sources
    ///
    /// Configuration is loaded in the following order (later sources override earlier ones):
    /// 1. Default values
    /// 2. Configuration file (config.json)
    /// 3. Environment-specific files (config.{env}.json)
    /// 4. Environment variables with `SERVER_` prefix, nested keys joined by `__`
    ///    (for example `SERVER_POOL__MAX_SESSIONS=2`)
    ///
    /// # Errors
    ///
    /// Returns `ConfigError` if configuration cannot be loaded or is invalid.
    pub fn load() -> Result<Self, ConfigError> {
        let env_var = std::env::var("ENVIRONMENT").unwrap_or_else(|_| "development".to_string());

        let mut config_builder = Config::builder()
            .set_default("host", "127.0.0.1")?
            .set_default("port", 3000)?
            .set_default("timeout_seconds", 30)?
            .set_default("environment", "development")?
            .add_source(File::with_name("config.json").required(false))
            .add_source(
                File::with_name(&format!("config.{}.json", env_var.to_lowercase())).required(false),
            )
            .add_source(
                ConfigEnv::with_prefix("SERVER")
                    .prefix_separator("_")
                    .separator("__")
                    .try_parsing(true),
            );

        if std::env::var("ENVIRONMENT").is_ok() {
            config_builder = config_builder.set_override("environment", env_var.to_lowercase())?;
        }

        let config = config_builder.build()?;
        let mut server_config: Self = config.try_deserialize()?;

        server_config.port = ServerPort::new(server_config.port.value(), server_config.environment)
            .map_err(|e| ConfigError::Message(format!("invalid port configuration: {e}")))?;

        Ok(server_config)
    }

    /// Cross-field checks the individual types cannot express
    ///
    /// # Errors
    ///
    /// Returns an error describing the first invalid setting.
    pub fn validate(&self) -> Result<()> {
        ensure!(
            self.lookup.max_batch_size > 0,
            "lookup.max_batch_size must be greater than 0"
        );
        ensure!(
            self.lookup.deadline_seconds > 0,
            "lookup.deadline_seconds must be greater than 0"
        );
        ensure!(
            self.pool.query_timeout_seconds > 0,
            "pool.query_timeout_seconds must be greater than 0"
        );
        ensure!(
            self.pool.authentication_timeout_seconds > 0,
            "pool.authentication_timeout_seconds must be greater than 0"
        );
        ensure!(
            self.fallback.budget_seconds > 0,
            "fallback.budget_seconds must be greater than 0"
        );
        ensure!(
            self.fallback.enrichment_budget_seconds <= self.fallback.budget_seconds,
            "fallback.enrichment_budget_seconds cannot exceed fallback.budget_seconds"
        );
        if self.rate_limiting.enabled {
            ensure!(
                self.rate_limiting.requests_per_minute > 0,
                "rate_limiting.requests_per_minute must be greater than 0 when enabled"
            );
        }
        if self.environment == Environment::Production && self.admin.token().is_none() {
            tracing::warn!("no admin token configured, pool administration endpoints are disabled");
        }
        Ok(())
    }

    /// Create configuration optimized for testing
    ///
    /// No portal credentials are configured, so the pool stays empty and every
    /// lookup is served by the fallback unless a test sets credentials.
    pub fn for_testing() -> Self {
        Self {
            host: IpAddr::V4(Ipv4Addr::LOCALHOST),
            port: ServerPort::testing(),
            timeout_seconds: TimeoutSeconds::testing(),
            environment: Environment::Testing,
            rate_limiting: RateLimitingConfig {
                enabled: false,
                requests_per_minute: 120,
            },
            admin: AdminConfig::default(),
            lookup: LookupSettings {
                max_batch_size: 10,
                deadline_seconds: 4,
            },
            pool: PoolSettings {
                bootstrap_delay_ms: 0,
                authentication_timeout_seconds: 1,
                query_timeout_seconds: 1,
                ..PoolSettings::default()
            },
            fallback: FallbackSettings {
                budget_seconds: 2,
                enrichment_budget_seconds: 1,
                ..FallbackSettings::default()
            },
            credentials: CredentialsConfig::default(),
        }
    }

    /// Get socket address for binding
    pub fn socket_addr(&self) -> SocketAddr {
        SocketAddr::new(self.host, self.port.value())
    }
}
