//! Test doubles shared by the integration and property tests.

#![allow(dead_code)]

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use kms_plugin::{
    KeyManagementServiceImpl, KeyOperationClient, KmsError, RequestContext, RequestOutcome,
    StatsReporter,
};

/// Reversible in-memory backend: XORs every byte with a fixed pad, after an
/// optional delay.
#[derive(Default)]
pub struct XorBackend {
    delay: Option<Duration>,
    calls: AtomicUsize,
}

impl XorBackend {
    const PAD: u8 = 0x5a;

    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_delay(delay: Duration) -> Self {
        Self {
            delay: Some(delay),
            calls: AtomicUsize::new(0),
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    async fn transform(&self, input: &[u8]) -> Vec<u8> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        input.iter().map(|b| b ^ Self::PAD).collect()
    }
}

#[async_trait]
impl KeyOperationClient for XorBackend {
    async fn encrypt(&self, _ctx: &RequestContext, plaintext: &[u8]) -> Result<Vec<u8>, KmsError> {
        Ok(self.transform(plaintext).await)
    }

    async fn decrypt(&self, _ctx: &RequestContext, ciphertext: &[u8]) -> Result<Vec<u8>, KmsError> {
        Ok(self.transform(ciphertext).await)
    }
}

/// Backend that fails every call with the same error.
pub struct FailingBackend {
    error: KmsError,
    calls: AtomicUsize,
}

impl FailingBackend {
    pub fn new(error: KmsError) -> Self {
        Self {
            error,
            calls: AtomicUsize::new(0),
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl KeyOperationClient for FailingBackend {
    async fn encrypt(&self, _ctx: &RequestContext, _plaintext: &[u8]) -> Result<Vec<u8>, KmsError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Err(self.error.clone())
    }

    async fn decrypt(
        &self,
        _ctx: &RequestContext,
        _ciphertext: &[u8],
    ) -> Result<Vec<u8>, KmsError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Err(self.error.clone())
    }
}

/// Reporter keeping every outcome in memory.
#[derive(Default)]
pub struct RecordingReporter {
    outcomes: Mutex<Vec<RequestOutcome>>,
}

impl RecordingReporter {
    pub fn outcomes(&self) -> Vec<RequestOutcome> {
        self.outcomes.lock().unwrap().clone()
    }

    pub fn len(&self) -> usize {
        self.outcomes.lock().unwrap().len()
    }
}

impl StatsReporter for RecordingReporter {
    fn report_request(&self, outcome: &RequestOutcome) {
        self.outcomes.lock().unwrap().push(outcome.clone());
    }
}

/// Service wired to `backend` and a fresh recording reporter.
pub fn service_with<B>(backend: Arc<B>) -> (KeyManagementServiceImpl, Arc<RecordingReporter>)
where
    B: KeyOperationClient + 'static,
{
    let reporter = Arc::new(RecordingReporter::default());
    let service = KeyManagementServiceImpl::new(backend, reporter.clone());
    (service, reporter)
}
