//! Shared building blocks for the Key Vault KMS plugin.
//!
//! This crate provides:
//! - Retry policies with exponential backoff bounded by a request deadline
//! - HTTP client configuration, including outbound proxy support
//! - Tracing subscriber initialisation

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod http;
pub mod retry;
pub mod tracing_config;

pub use http::{build_http_client, HttpConfig, ProxyConfig};
pub use retry::{RetryConfig, RetryPolicy, Retryable};
pub use tracing_config::{init_tracing, TracingConfig, TracingInitError};
