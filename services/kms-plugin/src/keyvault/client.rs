//! Azure Key Vault / Managed HSM key-operation client.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use base64::alphabet;
use base64::engine::general_purpose::{GeneralPurpose, GeneralPurposeConfig};
use base64::engine::DecodePaddingMode;
use base64::Engine;
use kms_common::{build_http_client, HttpConfig, RetryConfig, RetryPolicy};
use reqwest::Client;
use secrecy::ExposeSecret;
use tracing::{debug, instrument};
use url::Url;

use super::auth::AccessTokenProvider;
use super::models::{error_for_status, parse_retry_after, KeyOperationRequest, KeyOperationResult};
use super::{KeyOperationClient, KeyVaultConfig};
use crate::context::RequestContext;
use crate::error::KmsError;
use crate::version::BUILD_VERSION;

/// Key Vault REST API version.
pub const KEY_VAULT_API_VERSION: &str = "7.4";

/// Key wrapping algorithm used for both directions.
pub const ENCRYPTION_ALGORITHM: &str = "RSA-OAEP-256";

/// Unpadded base64url on output, padding optional on input.
const BASE64URL: GeneralPurpose = GeneralPurpose::new(
    &alphabet::URL_SAFE,
    GeneralPurposeConfig::new()
        .with_encode_padding(false)
        .with_decode_padding_mode(DecodePaddingMode::Indifferent),
);

/// Key Vault backend bound to a single key version.
///
/// Transient failures are retried here, within the request deadline; the
/// caller sees one result per call.
#[derive(Clone)]
pub struct KeyVaultClient {
    http: Client,
    base_url: Url,
    key_name: String,
    key_version: String,
    token_provider: Arc<dyn AccessTokenProvider>,
    retry: RetryPolicy,
    request_timeout: Duration,
}

impl KeyVaultClient {
    /// Build a client for the key described by `config`.
    ///
    /// # Errors
    ///
    /// Returns [`KmsError::InvalidRequest`] if the vault name, key name or
    /// key version is empty, and [`KmsError::Internal`] if the HTTP client
    /// cannot be built.
    pub fn new(
        config: &KeyVaultConfig,
        token_provider: Arc<dyn AccessTokenProvider>,
    ) -> Result<Self, KmsError> {
        for (field, value) in [
            ("key vault name", &config.vault_name),
            ("key name", &config.key_name),
            ("key version", &config.key_version),
        ] {
            if value.trim().is_empty() {
                return Err(KmsError::invalid_request(format!("{field} must not be empty")));
            }
        }

        let base_url = Url::parse(&format!("https://{}/", config.vault_host()))
            .map_err(|err| KmsError::invalid_request(format!("invalid key vault host: {err}")))?;

        let mut http_config = HttpConfig::default()
            .with_timeout(config.request_timeout)
            .with_user_agent(format!("keyvault-kms-plugin/{BUILD_VERSION}"));
        if let Some(proxy) = &config.proxy {
            http_config = http_config.with_proxy(proxy.clone());
        }
        let http = build_http_client(&http_config)
            .map_err(|err| KmsError::Internal(format!("failed to build HTTP client: {err}")))?;

        Ok(Self {
            http,
            base_url,
            key_name: config.key_name.clone(),
            key_version: config.key_version.clone(),
            token_provider,
            retry: RetryPolicy::new(RetryConfig::default().with_max_retries(config.max_retries)),
            request_timeout: config.request_timeout,
        })
    }

    /// Send requests to `base_url` instead of the vault host.
    #[must_use]
    pub fn with_base_url(mut self, base_url: Url) -> Self {
        self.base_url = base_url;
        self
    }

    /// Replace the retry policy.
    #[must_use]
    pub fn with_retry_policy(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    /// Endpoint for `operation` on the configured key version.
    ///
    /// # Errors
    ///
    /// Returns [`KmsError::Internal`] if the base URL cannot carry a path.
    pub fn operation_url(&self, operation: &str) -> Result<Url, KmsError> {
        let mut url = self.base_url.clone();
        url.path_segments_mut()
            .map_err(|()| KmsError::Internal(format!("invalid key vault URL: {}", self.base_url)))?
            .pop_if_empty()
            .extend(["keys", self.key_name.as_str(), self.key_version.as_str(), operation]);
        url.query_pairs_mut()
            .append_pair("api-version", KEY_VAULT_API_VERSION);
        Ok(url)
    }

    fn key_id(&self) -> String {
        format!("{}/{}", self.key_name, self.key_version)
    }

    #[instrument(skip(self, ctx, value), fields(key = %self.key_id()))]
    async fn key_operation(
        &self,
        ctx: &RequestContext,
        operation: &str,
        value: String,
    ) -> Result<String, KmsError> {
        let url = self.operation_url(operation)?;
        let body = KeyOperationRequest {
            alg: ENCRYPTION_ALGORITHM,
            value,
        };
        let (url, body) = (&url, &body);

        self.retry
            .execute(ctx.deadline(), move || self.send_once(ctx, operation, url, body))
            .await
    }

    async fn send_once(
        &self,
        ctx: &RequestContext,
        operation: &str,
        url: &Url,
        body: &KeyOperationRequest<'_>,
    ) -> Result<String, KmsError> {
        let timeout = ctx
            .remaining()
            .map_or(self.request_timeout, |remaining| remaining.min(self.request_timeout));
        if timeout.is_zero() {
            return Err(KmsError::DeadlineExceeded);
        }

        let token = self.token_provider.access_token().await?;
        let response = self
            .http
            .post(url.clone())
            .bearer_auth(token.expose_secret())
            .timeout(timeout)
            .json(body)
            .send()
            .await?;

        let status = response.status();
        if status.is_success() {
            let result: KeyOperationResult = response.json().await.map_err(|err| {
                KmsError::invalid_response(format!("malformed {operation} result: {err}"))
            })?;
            return Ok(result.value);
        }

        let retry_after = parse_retry_after(response.headers());
        let text = response.text().await.unwrap_or_default();
        let err = error_for_status(status, retry_after, &text, &self.key_id());
        debug!(operation, status = status.as_u16(), error = %err, "key vault returned an error");
        Err(err)
    }
}

#[async_trait]
impl KeyOperationClient for KeyVaultClient {
    async fn encrypt(&self, ctx: &RequestContext, plaintext: &[u8]) -> Result<Vec<u8>, KmsError> {
        let value = BASE64URL.encode(plaintext);
        let result = self.key_operation(ctx, "encrypt", value).await?;
        Ok(result.into_bytes())
    }

    async fn decrypt(&self, ctx: &RequestContext, ciphertext: &[u8]) -> Result<Vec<u8>, KmsError> {
        let value = std::str::from_utf8(ciphertext)
            .map_err(|_| KmsError::invalid_request("ciphertext is not valid UTF-8"))?
            .to_owned();
        let result = self.key_operation(ctx, "decrypt", value).await?;
        BASE64URL
            .decode(result.as_bytes())
            .map_err(|_| KmsError::invalid_response("decrypt result is not base64url"))
    }
}
