//! Plugin configuration.
//!
//! All settings come from environment variables (optionally seeded from a
//! `.env` file) and are validated once at startup.

use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use kms_common::ProxyConfig;
use thiserror::Error;

use crate::keyvault::KeyVaultConfig;

/// Default gRPC endpoint.
pub const DEFAULT_LISTEN_ADDR: &str = "unix:///opt/azurekms.socket";

/// Default bearer token location.
pub const DEFAULT_ACCESS_TOKEN_FILE: &str = "/var/run/secrets/kms/access-token";

const UNIX_SCHEME: &str = "unix://";

/// Configuration errors.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ConfigError {
    /// Missing required variable
    #[error("missing required configuration: {0}")]
    MissingRequired(String),

    /// Variable present but unparseable
    #[error("failed to parse environment variable {name}: {reason}")]
    ParseError {
        /// Variable name
        name: String,
        /// Parser message
        reason: String,
    },

    /// Listen address is not a `unix://` endpoint
    #[error("invalid listen address {0}: only unix:// endpoints are supported")]
    InvalidListenAddr(String),

    /// Invalid port
    #[error("invalid {0}: must be between 1 and 65535")]
    InvalidPort(String),

    /// Zero duration where a positive one is required
    #[error("invalid {0}: must be greater than 0")]
    InvalidTimeout(String),
}

/// Plugin configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Config {
    /// gRPC endpoint, `unix://` scheme
    pub listen_addr: String,
    /// Remote key identity and connection settings
    pub key_vault: KeyVaultConfig,
    /// Bearer token file, re-read on every request
    pub access_token_file: PathBuf,
    /// Default log filter when `RUST_LOG` is unset
    pub log_level: String,
    /// Emit JSON log lines
    pub log_format_json: bool,
    /// Drain window after a shutdown signal
    pub shutdown_timeout: Duration,
}

impl Config {
    /// Load configuration from environment variables.
    ///
    /// # Errors
    ///
    /// Returns an error if required variables are missing or invalid.
    pub fn from_env() -> Result<Self, ConfigError> {
        dotenvy::dotenv().ok();
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Load configuration through an arbitrary variable lookup.
    ///
    /// # Errors
    ///
    /// Returns an error if required variables are missing or invalid.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let listen_addr =
            lookup("LISTEN_ADDR").unwrap_or_else(|| DEFAULT_LISTEN_ADDR.to_string());

        let vault_name = required(&lookup, "KEY_VAULT_NAME")?;
        let key_name = required(&lookup, "KEY_NAME")?;
        let key_version = required(&lookup, "KEY_VERSION")?;

        let managed_hsm = parse_env(&lookup, "MANAGED_HSM", false)?;
        let proxy_mode = parse_env(&lookup, "PROXY_MODE", false)?;
        let proxy_address = lookup("PROXY_ADDRESS").unwrap_or_default();
        let proxy_port: u16 = parse_env(&lookup, "PROXY_PORT", 7788)?;

        let request_timeout =
            Duration::from_secs(parse_env(&lookup, "KEY_VAULT_REQUEST_TIMEOUT", 30)?);
        let max_retries = parse_env(&lookup, "KEY_VAULT_MAX_RETRIES", 2)?;

        let mut key_vault = KeyVaultConfig::new(vault_name, key_name, key_version)
            .with_managed_hsm(managed_hsm)
            .with_request_timeout(request_timeout)
            .with_max_retries(max_retries);

        if let Some(suffix) = lookup("KEY_VAULT_DNS_SUFFIX").filter(|s| !s.trim().is_empty()) {
            key_vault = key_vault.with_dns_suffix(suffix.trim());
        }

        if proxy_mode {
            if proxy_address.trim().is_empty() {
                return Err(ConfigError::MissingRequired(
                    "PROXY_ADDRESS (required when PROXY_MODE is enabled)".to_string(),
                ));
            }
            key_vault = key_vault.with_proxy(ProxyConfig::new(proxy_address.trim(), proxy_port));
        }

        let config = Self {
            listen_addr,
            key_vault,
            access_token_file: lookup("ACCESS_TOKEN_FILE")
                .map_or_else(|| PathBuf::from(DEFAULT_ACCESS_TOKEN_FILE), PathBuf::from),
            log_level: lookup("LOG_LEVEL").unwrap_or_else(|| "info".to_string()),
            log_format_json: parse_env(&lookup, "LOG_FORMAT_JSON", false)?,
            shutdown_timeout: Duration::from_secs(parse_env(&lookup, "SHUTDOWN_TIMEOUT", 30)?),
        };

        config.validate()?;
        Ok(config)
    }

    /// Validate the configuration.
    ///
    /// # Errors
    ///
    /// Returns the first invalid setting found.
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.socket_path()?;

        for (name, value) in [
            ("KEY_VAULT_NAME", &self.key_vault.vault_name),
            ("KEY_NAME", &self.key_vault.key_name),
            ("KEY_VERSION", &self.key_vault.key_version),
        ] {
            if value.trim().is_empty() {
                return Err(ConfigError::MissingRequired(name.to_string()));
            }
        }

        if let Some(proxy) = &self.key_vault.proxy {
            if proxy.port == 0 {
                return Err(ConfigError::InvalidPort("PROXY_PORT".to_string()));
            }
        }

        if self.key_vault.request_timeout.is_zero() {
            return Err(ConfigError::InvalidTimeout("KEY_VAULT_REQUEST_TIMEOUT".to_string()));
        }

        if self.shutdown_timeout.is_zero() {
            return Err(ConfigError::InvalidTimeout("SHUTDOWN_TIMEOUT".to_string()));
        }

        Ok(())
    }

    /// Filesystem path of the listen socket.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::InvalidListenAddr`] for non-unix endpoints.
    pub fn socket_path(&self) -> Result<PathBuf, ConfigError> {
        parse_unix_endpoint(&self.listen_addr)
    }
}

/// Extract the socket path from a `unix://` endpoint.
///
/// # Errors
///
/// Returns [`ConfigError::InvalidListenAddr`] if the scheme is not `unix` or
/// the path is empty.
pub fn parse_unix_endpoint(endpoint: &str) -> Result<PathBuf, ConfigError> {
    match endpoint.strip_prefix(UNIX_SCHEME) {
        Some(path) if !path.is_empty() => Ok(PathBuf::from(path)),
        _ => Err(ConfigError::InvalidListenAddr(endpoint.to_string())),
    }
}

fn required<F>(lookup: &F, name: &str) -> Result<String, ConfigError>
where
    F: Fn(&str) -> Option<String>,
{
    lookup(name)
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty())
        .ok_or_else(|| ConfigError::MissingRequired(name.to_string()))
}

/// Parse environment variable with default value.
fn parse_env<F, T>(lookup: &F, name: &str, default: T) -> Result<T, ConfigError>
where
    F: Fn(&str) -> Option<String>,
    T: FromStr,
    T::Err: std::fmt::Display,
{
    match lookup(name) {
        Some(value) => value.trim().parse().map_err(|e: T::Err| ConfigError::ParseError {
            name: name.to_string(),
            reason: e.to_string(),
        }),
        None => Ok(default),
    }
}
