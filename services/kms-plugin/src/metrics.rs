//! Request outcome reporting.
//!
//! The service emits one [`RequestOutcome`] per Encrypt/Decrypt call through
//! a [`StatsReporter`]. [`PrometheusStatsReporter`] records outcomes as a
//! latency histogram.

use prometheus::{HistogramOpts, HistogramVec, Registry};
use std::fmt;
use tracing::warn;

/// Key operation kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum OperationType {
    /// Encrypt RPC
    Encrypt,
    /// Decrypt RPC
    Decrypt,
}

impl OperationType {
    /// Label value for this operation.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Encrypt => "encrypt",
            Self::Decrypt => "decrypt",
        }
    }
}

impl fmt::Display for OperationType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Request status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StatusType {
    /// The backend returned a result
    Success,
    /// The request failed for any reason
    Error,
}

impl StatusType {
    /// Label value for this status.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Success => "success",
            Self::Error => "error",
        }
    }
}

/// One observation per completed request.
#[derive(Debug, Clone, PartialEq)]
pub struct RequestOutcome {
    /// Which RPC ran
    pub operation: OperationType,
    /// Whether it succeeded
    pub status: StatusType,
    /// Wall-clock duration of the call in seconds
    pub elapsed_seconds: f64,
    /// Error string, empty on success
    pub error_message: String,
}

/// Sink for request outcomes.
///
/// Implementations are shared by all concurrent requests. Reporting is
/// fire-and-forget: it must not block, and a failure to record must be
/// absorbed by the implementation.
pub trait StatsReporter: Send + Sync {
    /// Record one request outcome.
    fn report_request(&self, outcome: &RequestOutcome);
}

/// Reporter that discards every outcome.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopStatsReporter;

impl StatsReporter for NoopStatsReporter {
    fn report_request(&self, _outcome: &RequestOutcome) {}
}

/// Histogram buckets in seconds, covering local HSM latency up to slow
/// cross-region vault calls.
const LATENCY_BUCKETS: &[f64] = &[
    0.005, 0.01, 0.025, 0.05, 0.1, 0.2, 0.3, 0.4, 0.5, 1.0, 1.5, 2.0, 2.5, 3.0, 5.0, 10.0,
];

/// Prometheus-backed reporter.
#[derive(Clone)]
pub struct PrometheusStatsReporter {
    request_duration: HistogramVec,
}

impl PrometheusStatsReporter {
    /// Create the reporter and register its histogram in `registry`.
    ///
    /// # Errors
    ///
    /// Returns an error if the metric is already registered in `registry`.
    pub fn new(registry: &Registry) -> Result<Self, prometheus::Error> {
        let request_duration = HistogramVec::new(
            HistogramOpts::new(
                "request_duration_seconds",
                "Duration of KMS encrypt and decrypt requests in seconds",
            )
            .namespace("kms")
            .buckets(LATENCY_BUCKETS.to_vec()),
            &["operation", "status", "error_message"],
        )?;
        registry.register(Box::new(request_duration.clone()))?;

        Ok(Self { request_duration })
    }

    /// Histogram handle, for inspection.
    #[must_use]
    pub fn request_duration(&self) -> &HistogramVec {
        &self.request_duration
    }
}

impl StatsReporter for PrometheusStatsReporter {
    fn report_request(&self, outcome: &RequestOutcome) {
        match self.request_duration.get_metric_with_label_values(&[
            outcome.operation.as_str(),
            outcome.status.as_str(),
            outcome.error_message.as_str(),
        ]) {
            Ok(histogram) => histogram.observe(outcome.elapsed_seconds),
            Err(err) => warn!(
                error = %err,
                operation = %outcome.operation,
                "failed to record request metric"
            ),
        }
    }
}
