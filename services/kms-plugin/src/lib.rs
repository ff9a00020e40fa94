//! Kubernetes KMS `v1beta1` plugin backed by Azure Key Vault.
//!
//! The plugin serves the `KeyManagementService` gRPC API on a local unix
//! socket. Encrypt and Decrypt are delegated to a [`KeyOperationClient`];
//! each call yields one [`RequestOutcome`] on the configured
//! [`StatsReporter`].
//!
//! ```no_run
//! use std::sync::Arc;
//!
//! use kms_plugin::{
//!     FileTokenProvider, KeyManagementServiceImpl, KeyVaultClient, KeyVaultConfig,
//!     NoopStatsReporter,
//! };
//!
//! # fn main() -> Result<(), kms_plugin::KmsError> {
//! let config = KeyVaultConfig::new("contoso", "kek", "0123abcd");
//! let tokens = Arc::new(FileTokenProvider::new("/var/run/secrets/kms/access-token"));
//! let backend = KeyVaultClient::new(&config, tokens)?;
//! let service = KeyManagementServiceImpl::new(Arc::new(backend), Arc::new(NoopStatsReporter));
//! # let _ = service;
//! # Ok(())
//! # }
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod config;
pub mod context;
pub mod error;
pub mod grpc;
pub mod keyvault;
pub mod metrics;
pub mod proto;
pub mod scope;
pub mod server;
pub mod shutdown;
pub mod version;

pub use config::{Config, ConfigError};
pub use context::RequestContext;
pub use error::KmsError;
pub use grpc::KeyManagementServiceImpl;
pub use keyvault::{
    AccessTokenProvider, FileTokenProvider, KeyOperationClient, KeyVaultClient, KeyVaultConfig,
    StaticTokenProvider,
};
pub use metrics::{
    NoopStatsReporter, OperationType, PrometheusStatsReporter, RequestOutcome, StatsReporter,
    StatusType,
};
pub use server::ServerError;
pub use version::VersionInfo;
