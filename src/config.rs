//! Configuration management for fixturebox
//!
//! Settings are loaded from environment variables with sensible defaults.
//! Tests that need a specific configuration can build one with the `with_*`
//! methods instead of touching the environment.
//!
//! # Environment Variables
//!
//! - `FIXTUREBOX_DOCKER_HOST`: daemon endpoint override (`unix:///path`,
//!   `tcp://host:port`, or a bare socket path) - default: `DOCKER_HOST`, then
//!   `/var/run/docker.sock`
//! - `FIXTUREBOX_IMAGE_PREFIX`: repository name prefix for built images - default: "fixturebox"
//! - `FIXTUREBOX_CONNECT_TIMEOUT`: daemon connection timeout in seconds - default: "120"
//! - `FIXTUREBOX_WAIT`: wait policy after start (exit|running) - default: "exit"
//! - `FIXTUREBOX_LOG_LEVEL`, `FIXTUREBOX_LOG_JSON`: see [`crate::util::logging`]
//!
//! [`FixtureConfig::from_env`] rejects unparsable values with
//! [`ConfigError::ParseError`]; `Default::default()` logs a warning and uses
//! the default for that field instead.
//!
//! # Example
//!
//! ```no_run
//! use fixturebox::{FixtureConfig, WaitPolicy};
//!
//! let config = FixtureConfig::default()
//!     .with_image_prefix("my-tests")
//!     .with_wait(WaitPolicy::Exit);
//! config.validate().expect("Invalid configuration");
//! ```

use crate::runtime::endpoint::DaemonEndpoint;
use crate::runtime::WaitPolicy;
use std::env;
use std::fmt;
use std::str::FromStr;
use thiserror::Error;
use tracing::warn;

const DEFAULT_IMAGE_PREFIX: &str = "fixturebox";
const DEFAULT_CONNECT_TIMEOUT_SECS: u64 = 120;

/// Configuration errors
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Daemon endpoint string is not a supported form
    #[error("Invalid daemon endpoint: {0}. Expected unix://<path>, tcp://<host:port>, http://<host:port> or an absolute socket path")]
    InvalidEndpoint(String),

    /// Failed to parse configuration value
    #[error("Failed to parse {field}: {error}")]
    ParseError { field: String, error: String },

    /// Configuration validation failed
    #[error("Configuration validation failed: {0}")]
    ValidationFailed(String),
}

/// Fixture configuration
///
/// `Default::default()` reads `FIXTUREBOX_*` environment variables and falls
/// back to defaults for anything unset; unparsable values are logged and
/// replaced by their default.
#[derive(Debug, Clone)]
pub struct FixtureConfig {
    /// Explicit daemon endpoint; `None` defers to `DOCKER_HOST` and the platform default
    pub docker_host: Option<String>,

    /// Repository name prefix for built images
    pub image_prefix: String,

    /// Daemon connection timeout in seconds
    pub connect_timeout_secs: u64,

    /// How long construction waits after starting the container
    pub wait: WaitPolicy,
}

impl Default for FixtureConfig {
    fn default() -> Self {
        let connect_timeout_secs = parse_env::<u64>("FIXTUREBOX_CONNECT_TIMEOUT")
            .unwrap_or_else(warn_and_skip)
            .unwrap_or(DEFAULT_CONNECT_TIMEOUT_SECS);

        let wait = parse_env::<WaitPolicy>("FIXTUREBOX_WAIT")
            .unwrap_or_else(warn_and_skip)
            .unwrap_or_default();

        Self {
            docker_host: env_docker_host(),
            image_prefix: env_image_prefix(),
            connect_timeout_secs,
            wait,
        }
    }
}

impl FixtureConfig {
    /// Loads configuration from the environment, failing on unparsable values
    pub fn from_env() -> Result<Self, ConfigError> {
        Ok(Self {
            docker_host: env_docker_host(),
            image_prefix: env_image_prefix(),
            connect_timeout_secs: parse_env("FIXTUREBOX_CONNECT_TIMEOUT")?
                .unwrap_or(DEFAULT_CONNECT_TIMEOUT_SECS),
            wait: parse_env("FIXTUREBOX_WAIT")?.unwrap_or_default(),
        })
    }

    pub fn with_docker_host(mut self, host: impl Into<String>) -> Self {
        self.docker_host = Some(host.into());
        self
    }

    pub fn with_image_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.image_prefix = prefix.into();
        self
    }

    pub fn with_connect_timeout(mut self, secs: u64) -> Self {
        self.connect_timeout_secs = secs;
        self
    }

    pub fn with_wait(mut self, wait: WaitPolicy) -> Self {
        self.wait = wait;
        self
    }

    /// Validates the configuration
    ///
    /// Checks that the timeout is non-zero, the image prefix is a valid
    /// repository name component, and an explicit endpoint parses.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.connect_timeout_secs == 0 {
            return Err(ConfigError::ValidationFailed(
                "Connect timeout must be at least 1 second".to_string(),
            ));
        }

        if !is_valid_repository_component(&self.image_prefix) {
            return Err(ConfigError::ValidationFailed(format!(
                "Invalid image prefix: '{}'. Use lowercase letters, digits, '.', '_' or '-', starting with a letter or digit",
                self.image_prefix
            )));
        }

        if let Some(host) = &self.docker_host {
            DaemonEndpoint::parse(host)?;
        }

        Ok(())
    }

    /// Resolves the daemon endpoint for this configuration
    pub fn daemon_endpoint(&self) -> Result<DaemonEndpoint, ConfigError> {
        DaemonEndpoint::resolve(self.docker_host.as_deref())
    }
}

impl fmt::Display for FixtureConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Fixture Configuration:")?;
        writeln!(
            f,
            "  Docker Host: {}",
            self.docker_host.as_deref().unwrap_or("(auto)")
        )?;
        writeln!(f, "  Image Prefix: {}", self.image_prefix)?;
        writeln!(f, "  Connect Timeout: {}s", self.connect_timeout_secs)?;
        writeln!(f, "  Wait: {}", self.wait)?;
        Ok(())
    }
}

fn env_docker_host() -> Option<String> {
    env::var("FIXTUREBOX_DOCKER_HOST")
        .ok()
        .filter(|v| !v.trim().is_empty())
}

fn env_image_prefix() -> String {
    env::var("FIXTUREBOX_IMAGE_PREFIX").unwrap_or_else(|_| DEFAULT_IMAGE_PREFIX.to_string())
}

/// Parses `key` from the environment; unset or blank yields `None`
fn parse_env<T>(key: &str) -> Result<Option<T>, ConfigError>
where
    T: FromStr,
    T::Err: fmt::Display,
{
    let raw = match env::var(key) {
        Ok(v) if !v.trim().is_empty() => v,
        _ => return Ok(None),
    };
    raw.trim()
        .parse::<T>()
        .map(Some)
        .map_err(|e| ConfigError::ParseError {
            field: key.to_string(),
            error: format!("'{}': {}", raw, e),
        })
}

fn warn_and_skip<T>(err: ConfigError) -> Option<T> {
    warn!("{}; using default", err);
    None
}

fn is_valid_repository_component(s: &str) -> bool {
    let mut chars = s.chars();
    match chars.next() {
        Some(c) if c.is_ascii_lowercase() || c.is_ascii_digit() => {}
        _ => return false,
    }
    chars.all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || matches!(c, '.' | '_' | '-'))
}
