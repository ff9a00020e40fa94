//! HTTP client configuration and building.
//!
//! Key service clients share one pooled reqwest client per process. When a
//! proxy is configured every request, TLS included, is tunnelled through it.
//! Otherwise the usual `HTTPS_PROXY` and `NO_PROXY` environment variables
//! apply.

use reqwest::{Client, ClientBuilder, Proxy};
use std::time::Duration;

/// Outbound HTTP proxy endpoint.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProxyConfig {
    /// Proxy host name or IP address
    pub address: String,
    /// Proxy port
    pub port: u16,
}

impl ProxyConfig {
    /// Create a proxy configuration.
    #[must_use]
    pub fn new(address: impl Into<String>, port: u16) -> Self {
        Self {
            address: address.into(),
            port,
        }
    }

    /// Proxy URL in `http://host:port` form.
    #[must_use]
    pub fn url(&self) -> String {
        format!("http://{}:{}", self.address, self.port)
    }
}

/// HTTP client configuration.
#[derive(Debug, Clone)]
pub struct HttpConfig {
    /// Request timeout (default: 30s)
    pub timeout: Duration,
    /// Connection timeout (default: 10s)
    pub connect_timeout: Duration,
    /// Pool idle timeout (default: 90s)
    pub pool_idle_timeout: Duration,
    /// Maximum idle connections per host (default: 10)
    pub pool_max_idle_per_host: usize,
    /// User agent string
    pub user_agent: String,
    /// Optional outbound proxy
    pub proxy: Option<ProxyConfig>,
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(30),
            connect_timeout: Duration::from_secs(10),
            pool_idle_timeout: Duration::from_secs(90),
            pool_max_idle_per_host: 10,
            user_agent: concat!("keyvault-kms-plugin/", env!("CARGO_PKG_VERSION")).to_string(),
            proxy: None,
        }
    }
}

impl HttpConfig {
    /// Set the request timeout.
    #[must_use]
    pub const fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Set the user agent.
    #[must_use]
    pub fn with_user_agent(mut self, user_agent: impl Into<String>) -> Self {
        self.user_agent = user_agent.into();
        self
    }

    /// Route all requests through `proxy`.
    #[must_use]
    pub fn with_proxy(mut self, proxy: ProxyConfig) -> Self {
        self.proxy = Some(proxy);
        self
    }
}

/// Build a configured HTTP client.
///
/// # Errors
///
/// Returns an error if the proxy URL is invalid or TLS initialisation fails.
///
/// # Examples
///
/// ```
/// use kms_common::{build_http_client, HttpConfig, ProxyConfig};
///
/// let config = HttpConfig::default().with_proxy(ProxyConfig::new("127.0.0.1", 7788));
/// let client = build_http_client(&config);
/// assert!(client.is_ok());
/// ```
pub fn build_http_client(config: &HttpConfig) -> Result<Client, reqwest::Error> {
    let mut builder = ClientBuilder::new()
        .timeout(config.timeout)
        .connect_timeout(config.connect_timeout)
        .pool_idle_timeout(config.pool_idle_timeout)
        .pool_max_idle_per_host(config.pool_max_idle_per_host)
        .user_agent(&config.user_agent)
        .use_rustls_tls();

    if let Some(proxy) = &config.proxy {
        builder = builder.proxy(Proxy::all(proxy.url())?);
    }

    builder.build()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = HttpConfig::default();
        assert_eq!(config.timeout, Duration::from_secs(30));
        assert_eq!(config.connect_timeout, Duration::from_secs(10));
        assert!(config.proxy.is_none());
        assert!(config.user_agent.starts_with("keyvault-kms-plugin/"));
    }

    #[test]
    fn test_proxy_url() {
        let proxy = ProxyConfig::new("10.0.0.4", 7788);
        assert_eq!(proxy.url(), "http://10.0.0.4:7788");
    }

    #[test]
    fn test_build_client_with_and_without_proxy() {
        assert!(build_http_client(&HttpConfig::default()).is_ok());

        let proxied = HttpConfig::default()
            .with_timeout(Duration::from_secs(5))
            .with_proxy(ProxyConfig::new("localhost", 8080));
        assert!(build_http_client(&proxied).is_ok());
    }

    #[test]
    fn test_custom_user_agent() {
        let config = HttpConfig::default().with_user_agent("custom/1.0");
        assert_eq!(config.user_agent, "custom/1.0");
        assert!(build_http_client(&config).is_ok());
    }
}
