//! gRPC `KeyManagementService` implementation.
//!
//! Encrypt and Decrypt forward the payload to the configured
//! [`KeyOperationClient`] and report exactly one [`RequestOutcome`] per call.
//! Payload bytes never reach a log line or a metric label.
//!
//! [`RequestOutcome`]: crate::metrics::RequestOutcome

use std::future::Future;
use std::sync::Arc;

use tonic::{Request, Response, Status};
use tracing::{error, info_span, trace, warn, Instrument};
use uuid::Uuid;

use crate::context::RequestContext;
use crate::error::KmsError;
use crate::keyvault::KeyOperationClient;
use crate::metrics::{OperationType, StatsReporter};
use crate::proto::key_management_service_server::{
    KeyManagementService, KeyManagementServiceServer,
};
use crate::proto::{
    DecryptRequest, DecryptResponse, EncryptRequest, EncryptResponse, VersionRequest,
    VersionResponse,
};
use crate::scope::RequestScope;
use crate::version::VersionInfo;

/// KMS plugin service.
pub struct KeyManagementServiceImpl {
    kv_client: Arc<dyn KeyOperationClient>,
    reporter: Arc<dyn StatsReporter>,
    version: VersionInfo,
}

impl KeyManagementServiceImpl {
    /// Create the service around a backend and a reporter.
    #[must_use]
    pub fn new(kv_client: Arc<dyn KeyOperationClient>, reporter: Arc<dyn StatsReporter>) -> Self {
        Self {
            kv_client,
            reporter,
            version: VersionInfo::default(),
        }
    }

    /// Override the identity returned by `Version`.
    #[must_use]
    pub fn with_version(mut self, version: VersionInfo) -> Self {
        self.version = version;
        self
    }

    /// Identity returned by `Version`.
    #[must_use]
    pub fn version_info(&self) -> &VersionInfo {
        &self.version
    }

    /// Wrap the service for registration with a tonic server.
    #[must_use]
    pub fn into_server(self) -> KeyManagementServiceServer<Self> {
        KeyManagementServiceServer::new(self)
    }

    /// Encrypt `plaintext` through the backend.
    ///
    /// # Errors
    ///
    /// Returns the backend's error unchanged, or [`KmsError::Cancelled`] /
    /// [`KmsError::DeadlineExceeded`] if `ctx` ends first.
    pub async fn encrypt_payload(
        &self,
        ctx: &RequestContext,
        plaintext: &[u8],
    ) -> Result<Vec<u8>, KmsError> {
        self.key_operation(OperationType::Encrypt, ctx, || {
            self.kv_client.encrypt(ctx, plaintext)
        })
        .await
    }

    /// Decrypt `ciphertext` through the backend.
    ///
    /// # Errors
    ///
    /// Returns the backend's error unchanged, or [`KmsError::Cancelled`] /
    /// [`KmsError::DeadlineExceeded`] if `ctx` ends first.
    pub async fn decrypt_payload(
        &self,
        ctx: &RequestContext,
        ciphertext: &[u8],
    ) -> Result<Vec<u8>, KmsError> {
        self.key_operation(OperationType::Decrypt, ctx, || {
            self.kv_client.decrypt(ctx, ciphertext)
        })
        .await
    }

    async fn key_operation<F, Fut>(
        &self,
        operation: OperationType,
        ctx: &RequestContext,
        call: F,
    ) -> Result<Vec<u8>, KmsError>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<Vec<u8>, KmsError>>,
    {
        let scope =
            RequestScope::open(self.reporter.as_ref(), operation).with_deadline(ctx.deadline());
        trace!("{operation} request started");

        match ctx.run(call()).await {
            Ok(output) => {
                scope.succeed();
                trace!("{operation} request complete");
                Ok(output)
            }
            Err(err) if err.is_cancellation() => {
                warn!(error = %err, "{operation} request ended by caller");
                scope.fail(&err);
                Err(err)
            }
            Err(err) => {
                error!(error = %err, "failed to {operation}");
                scope.fail(&err);
                Err(err)
            }
        }
    }
}

#[tonic::async_trait]
impl KeyManagementService for KeyManagementServiceImpl {
    async fn version(
        &self,
        _request: Request<VersionRequest>,
    ) -> Result<Response<VersionResponse>, Status> {
        Ok(Response::new(VersionResponse::from(&self.version)))
    }

    async fn decrypt(
        &self,
        request: Request<DecryptRequest>,
    ) -> Result<Response<DecryptResponse>, Status> {
        let ctx = RequestContext::from_metadata(request.metadata());
        let span = info_span!("decrypt", request_id = %Uuid::new_v4());
        let plain = self
            .decrypt_payload(&ctx, &request.get_ref().cipher)
            .instrument(span)
            .await?;

        Ok(Response::new(DecryptResponse { plain }))
    }

    async fn encrypt(
        &self,
        request: Request<EncryptRequest>,
    ) -> Result<Response<EncryptResponse>, Status> {
        let ctx = RequestContext::from_metadata(request.metadata());
        let span = info_span!("encrypt", request_id = %Uuid::new_v4());
        let cipher = self
            .encrypt_payload(&ctx, &request.get_ref().plain)
            .instrument(span)
            .await?;

        Ok(Response::new(EncryptResponse { cipher }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::metrics::{NoopStatsReporter, RequestOutcome, StatusType};
    use async_trait::async_trait;
    use std::sync::Mutex;
    use tonic::Code;

    struct Reverse;

    #[async_trait]
    impl KeyOperationClient for Reverse {
        async fn encrypt(
            &self,
            _ctx: &RequestContext,
            plaintext: &[u8],
        ) -> Result<Vec<u8>, KmsError> {
            Ok(plaintext.iter().rev().copied().collect())
        }

        async fn decrypt(
            &self,
            _ctx: &RequestContext,
            ciphertext: &[u8],
        ) -> Result<Vec<u8>, KmsError> {
            Ok(ciphertext.iter().rev().copied().collect())
        }
    }

    struct Broken;

    #[async_trait]
    impl KeyOperationClient for Broken {
        async fn encrypt(
            &self,
            _ctx: &RequestContext,
            _plaintext: &[u8],
        ) -> Result<Vec<u8>, KmsError> {
            Err(KmsError::permission_denied("no encrypt permission"))
        }

        async fn decrypt(
            &self,
            _ctx: &RequestContext,
            _ciphertext: &[u8],
        ) -> Result<Vec<u8>, KmsError> {
            Err(KmsError::key_not_found("kek/1"))
        }
    }

    struct Stalled;

    #[async_trait]
    impl KeyOperationClient for Stalled {
        async fn encrypt(
            &self,
            _ctx: &RequestContext,
            _plaintext: &[u8],
        ) -> Result<Vec<u8>, KmsError> {
            tokio::time::sleep(std::time::Duration::from_secs(30)).await;
            Ok(Vec::new())
        }

        async fn decrypt(
            &self,
            _ctx: &RequestContext,
            _ciphertext: &[u8],
        ) -> Result<Vec<u8>, KmsError> {
            tokio::time::sleep(std::time::Duration::from_secs(30)).await;
            Ok(Vec::new())
        }
    }

    #[derive(Default)]
    struct Recorder(Mutex<Vec<RequestOutcome>>);

    impl StatsReporter for Recorder {
        fn report_request(&self, outcome: &RequestOutcome) {
            self.0.lock().unwrap().push(outcome.clone());
        }
    }

    #[tokio::test]
    async fn test_encrypt_rpc() {
        let reporter = Arc::new(Recorder::default());
        let service = KeyManagementServiceImpl::new(Arc::new(Reverse), reporter.clone());

        let response = service
            .encrypt(Request::new(EncryptRequest {
                version: "v1beta1".to_string(),
                plain: b"abc".to_vec(),
            }))
            .await
            .unwrap();
        assert_eq!(response.into_inner().cipher, b"cba");

        let outcomes = reporter.0.lock().unwrap();
        assert_eq!(outcomes.len(), 1);
        assert_eq!(outcomes[0].operation, OperationType::Encrypt);
        assert_eq!(outcomes[0].status, StatusType::Success);
    }

    #[tokio::test]
    async fn test_decrypt_error_maps_to_status() {
        let reporter = Arc::new(Recorder::default());
        let service = KeyManagementServiceImpl::new(Arc::new(Broken), reporter.clone());

        let status = service
            .decrypt(Request::new(DecryptRequest {
                version: "v1beta1".to_string(),
                cipher: b"xyz".to_vec(),
            }))
            .await
            .unwrap_err();
        assert_eq!(status.code(), Code::NotFound);
        assert_eq!(status.message(), "key not found: kek/1");

        let outcomes = reporter.0.lock().unwrap();
        assert_eq!(outcomes.len(), 1);
        assert_eq!(outcomes[0].operation, OperationType::Decrypt);
        assert_eq!(outcomes[0].error_message, "key not found: kek/1");
    }

    #[tokio::test]
    async fn test_version_rpc() {
        let service = KeyManagementServiceImpl::new(Arc::new(Broken), Arc::new(NoopStatsReporter));
        let response = service
            .version(Request::new(VersionRequest {
                version: "v1beta1".to_string(),
            }))
            .await
            .unwrap()
            .into_inner();
        assert_eq!(response.version, "v1beta1");
        assert_eq!(response.runtime_name, service.version_info().runtime_name);
    }

    #[tokio::test]
    async fn test_grpc_timeout_header_sets_deadline() {
        let reporter = Arc::new(Recorder::default());
        let service = KeyManagementServiceImpl::new(Arc::new(Stalled), reporter.clone());

        let mut request = Request::new(EncryptRequest {
            version: "v1beta1".to_string(),
            plain: b"abc".to_vec(),
        });
        request
            .metadata_mut()
            .insert("grpc-timeout", "20m".parse().unwrap());

        let status = service.encrypt(request).await.unwrap_err();
        assert_eq!(status.code(), Code::DeadlineExceeded);
        assert_eq!(reporter.0.lock().unwrap()[0].error_message, "deadline exceeded");
    }
}
