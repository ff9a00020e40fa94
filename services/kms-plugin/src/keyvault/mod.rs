//! Key-operation backends.
//!
//! [`KeyOperationClient`] is the seam between the gRPC service and whatever
//! performs the cryptographic operation. [`KeyVaultClient`] implements it on
//! top of the Azure Key Vault / Managed HSM REST API.

mod auth;
mod client;
mod models;

use std::time::Duration;

use async_trait::async_trait;
use kms_common::ProxyConfig;

use crate::context::RequestContext;
use crate::error::KmsError;

pub use auth::{AccessTokenProvider, FileTokenProvider, StaticTokenProvider};
pub use client::{KeyVaultClient, ENCRYPTION_ALGORITHM, KEY_VAULT_API_VERSION};
pub use models::{parse_retry_after, KeyOperationRequest, KeyOperationResult};

/// Performs encrypt/decrypt with one configured remote key.
///
/// Implementations are shared by every in-flight request and must honor the
/// context's cancellation and deadline.
#[async_trait]
pub trait KeyOperationClient: Send + Sync {
    /// Encrypt `plaintext` with the configured key.
    async fn encrypt(&self, ctx: &RequestContext, plaintext: &[u8]) -> Result<Vec<u8>, KmsError>;

    /// Decrypt `ciphertext` previously produced by [`encrypt`](Self::encrypt).
    async fn decrypt(&self, ctx: &RequestContext, ciphertext: &[u8]) -> Result<Vec<u8>, KmsError>;
}

/// Host suffix of Key Vault instances in the public cloud.
pub const VAULT_DNS_SUFFIX: &str = "vault.azure.net";

/// Host suffix of Managed HSM instances in the public cloud.
pub const MANAGED_HSM_DNS_SUFFIX: &str = "managedhsm.azure.net";

/// Remote key identity and connection settings, fixed at construction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeyVaultConfig {
    /// Vault or managed HSM name
    pub vault_name: String,
    /// Key name
    pub key_name: String,
    /// Key version
    pub key_version: String,
    /// Target a managed HSM instead of a vault
    pub managed_hsm: bool,
    /// Outbound HTTP proxy
    pub proxy: Option<ProxyConfig>,
    /// Host suffix override
    pub dns_suffix: Option<String>,
    /// Upper bound for a single HTTP attempt
    pub request_timeout: Duration,
    /// Retries of transient failures after the first attempt
    pub max_retries: u32,
}

impl KeyVaultConfig {
    /// Settings for `key_name`/`key_version` in `vault_name`, with defaults
    /// for everything else.
    #[must_use]
    pub fn new(
        vault_name: impl Into<String>,
        key_name: impl Into<String>,
        key_version: impl Into<String>,
    ) -> Self {
        Self {
            vault_name: vault_name.into(),
            key_name: key_name.into(),
            key_version: key_version.into(),
            managed_hsm: false,
            proxy: None,
            dns_suffix: None,
            request_timeout: Duration::from_secs(30),
            max_retries: 2,
        }
    }

    /// Target a managed HSM.
    #[must_use]
    pub const fn with_managed_hsm(mut self, managed_hsm: bool) -> Self {
        self.managed_hsm = managed_hsm;
        self
    }

    /// Route requests through an HTTP proxy.
    #[must_use]
    pub fn with_proxy(mut self, proxy: ProxyConfig) -> Self {
        self.proxy = Some(proxy);
        self
    }

    /// Override the vault host suffix.
    #[must_use]
    pub fn with_dns_suffix(mut self, suffix: impl Into<String>) -> Self {
        self.dns_suffix = Some(suffix.into());
        self
    }

    /// Set the per-attempt timeout.
    #[must_use]
    pub const fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }

    /// Set the retry budget.
    #[must_use]
    pub const fn with_max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = max_retries;
        self
    }

    /// Fully qualified host of the vault, e.g. `myvault.vault.azure.net`.
    #[must_use]
    pub fn vault_host(&self) -> String {
        let suffix = match &self.dns_suffix {
            Some(suffix) => suffix.trim_start_matches('.'),
            None if self.managed_hsm => MANAGED_HSM_DNS_SUFFIX,
            None => VAULT_DNS_SUFFIX,
        };
        format!("{}.{}", self.vault_name, suffix)
    }

    /// Key identifier used in diagnostics, `name/version`.
    #[must_use]
    pub fn key_id(&self) -> String {
        format!("{}/{}", self.key_name, self.key_version)
    }
}
