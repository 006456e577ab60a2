//! Bridge Configuration
//!
//! Supports config files and `JSBRIDGE__*` environment variables.

use jsbridge_transport::{ScriptInjector, SchemeRouter, DEFAULT_NAMESPACE, DEFAULT_SCHEME};
use jsbridge_types::{BridgeError, BridgeResult};
use serde::{Deserialize, Serialize};

use crate::context::ThreadPolicy;

/// When the startup queue is armed
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StartupPolicy {
    /// Buffer until the first `pageLoaded`, then dispatch directly for the
    /// rest of the bridge's life
    #[default]
    OneShot,
    /// Start buffering again whenever a new page starts loading
    RearmOnNavigation,
}

/// Bridge configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BridgeConfig {
    /// URL scheme of inbound signals, without `://`
    #[serde(default = "default_scheme")]
    pub scheme: String,

    /// Script object holding the entry points (empty = globals)
    #[serde(default = "default_script_namespace")]
    pub script_namespace: String,

    /// Percent-decode inbound payloads
    #[serde(default = "default_true")]
    pub percent_decode_inbound: bool,

    #[serde(default)]
    pub startup_policy: StartupPolicy,

    #[serde(default)]
    pub thread_policy: ThreadPolicy,

    /// Logging configuration
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Logging configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Log level or filter directive (trace, debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Log format (json, pretty)
    #[serde(default = "default_log_format")]
    pub format: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: default_log_format(),
        }
    }
}

// =============================================================================
// Default Functions
// =============================================================================

fn default_scheme() -> String {
    DEFAULT_SCHEME.to_string()
}

fn default_script_namespace() -> String {
    DEFAULT_NAMESPACE.to_string()
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_log_format() -> String {
    "pretty".to_string()
}

fn default_true() -> bool {
    true
}

// =============================================================================
// Configuration Loading
// =============================================================================

impl BridgeConfig {
    /// Load configuration from environment and optional config file
    pub fn load(config_path: Option<&str>) -> BridgeResult<Self> {
        // Load .env file if present
        let _ = dotenvy::dotenv();

        let mut builder = config::Config::builder();

        if let Some(path) = config_path {
            builder = builder.add_source(config::File::with_name(path).required(true));
        }

        builder = builder
            .add_source(config::File::with_name("config/default").required(false))
            .add_source(config::File::with_name("config/local").required(false));

        // JSBRIDGE__SCHEME, JSBRIDGE__LOGGING__LEVEL, ...
        builder = builder.add_source(
            config::Environment::with_prefix("JSBRIDGE")
                .separator("__")
                .try_parsing(true),
        );

        let config = builder
            .build()
            .map_err(|e| BridgeError::config(e.to_string()))?;
        let bridge_config: BridgeConfig = config
            .try_deserialize()
            .map_err(|e| BridgeError::config(e.to_string()))?;

        bridge_config.validate()?;
        Ok(bridge_config)
    }

    /// Reject settings the bridge cannot run with
    pub fn validate(&self) -> BridgeResult<()> {
        let scheme_ok = self
            .scheme
            .chars()
            .next()
            .is_some_and(|c| c.is_ascii_alphabetic())
            && self
                .scheme
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || matches!(c, '+' | '-' | '.'));
        if !scheme_ok {
            return Err(BridgeError::config(format!(
                "invalid URL scheme {:?}",
                self.scheme
            )));
        }

        let namespace_ok = self
            .script_namespace
            .split('.')
            .all(|part| !part.is_empty() && part.chars().all(|c| c.is_alphanumeric() || c == '_' || c == '$'));
        if !self.script_namespace.is_empty() && !namespace_ok {
            return Err(BridgeError::config(format!(
                "invalid script namespace {:?}",
                self.script_namespace
            )));
        }

        if !matches!(self.logging.format.as_str(), "pretty" | "json") {
            return Err(BridgeError::config(format!(
                "unknown log format {:?}",
                self.logging.format
            )));
        }
        Ok(())
    }

    /// Router for inbound navigations
    pub fn router(&self) -> SchemeRouter {
        SchemeRouter::new(self.scheme.clone(), self.percent_decode_inbound)
    }

    /// Injector for outbound scripts
    pub fn injector(&self) -> ScriptInjector {
        ScriptInjector::new(self.script_namespace.clone())
    }

    /// Create a configuration for development/testing
    pub fn development() -> Self {
        Self {
            scheme: default_scheme(),
            script_namespace: default_script_namespace(),
            percent_decode_inbound: true,
            startup_policy: StartupPolicy::OneShot,
            thread_policy: ThreadPolicy::Panic,
            logging: LoggingConfig {
                level: "debug".to_string(),
                format: "pretty".to_string(),
            },
        }
    }

    /// Create a configuration for production
    pub fn production() -> Self {
        Self {
            thread_policy: ThreadPolicy::Reject,
            logging: LoggingConfig {
                level: "info".to_string(),
                format: "json".to_string(),
            },
            ..Self::development()
        }
    }
}

impl Default for BridgeConfig {
    fn default() -> Self {
        Self {
            scheme: default_scheme(),
            script_namespace: default_script_namespace(),
            percent_decode_inbound: true,
            startup_policy: StartupPolicy::default(),
            thread_policy: ThreadPolicy::default(),
            logging: LoggingConfig::default(),
        }
    }
}
