//! Per-request cancellation and deadline.
//!
//! A [`RequestContext`] is built for every inbound RPC and handed to the
//! key-operation backend. [`RequestContext::run`] races a future against the
//! context so the in-flight call is dropped as soon as the caller gives up.

use std::future::Future;
use std::time::Duration;

use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tonic::metadata::MetadataMap;

use crate::error::KmsError;

/// gRPC metadata key carrying the caller's timeout.
const GRPC_TIMEOUT_HEADER: &str = "grpc-timeout";

/// Upper bound on how far ahead of the caller's timeout the handler deadline
/// is placed.
///
/// The transport starts its own `grpc-timeout` timer before the handler runs
/// and answers `Cancelled` when it fires. Expiring slightly earlier lets the
/// handler answer `DeadlineExceeded` itself.
pub const DEADLINE_HEADROOM: Duration = Duration::from_millis(50);

/// Cancellation signal and optional deadline for one request.
#[derive(Debug, Clone, Default)]
pub struct RequestContext {
    deadline: Option<Instant>,
    cancellation: CancellationToken,
}

impl RequestContext {
    /// A context with no deadline.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// A context that expires `timeout` from now.
    #[must_use]
    pub fn with_timeout(timeout: Duration) -> Self {
        Self::new().with_deadline(Instant::now() + timeout)
    }

    /// Set an absolute deadline.
    #[must_use]
    pub fn with_deadline(mut self, deadline: Instant) -> Self {
        self.deadline = Some(deadline);
        self
    }

    /// Tie this context to an externally owned cancellation token.
    #[must_use]
    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.cancellation = token;
        self
    }

    /// Build a context from inbound gRPC metadata, honoring `grpc-timeout`.
    ///
    /// The deadline lands [`DEADLINE_HEADROOM`] before the caller's timeout,
    /// or a quarter of the timeout early when that is shorter.
    #[must_use]
    pub fn from_metadata(metadata: &MetadataMap) -> Self {
        let timeout = metadata
            .get(GRPC_TIMEOUT_HEADER)
            .and_then(|value| value.to_str().ok())
            .and_then(parse_grpc_timeout);

        match timeout {
            Some(timeout) => {
                let headroom = DEADLINE_HEADROOM.min(timeout / 4);
                Self::with_timeout(timeout - headroom)
            }
            None => Self::new(),
        }
    }

    /// The deadline, if any.
    #[must_use]
    pub const fn deadline(&self) -> Option<Instant> {
        self.deadline
    }

    /// Time left before the deadline; `None` when unbounded.
    #[must_use]
    pub fn remaining(&self) -> Option<Duration> {
        self.deadline
            .map(|deadline| deadline.saturating_duration_since(Instant::now()))
    }

    /// Cancel the request.
    pub fn cancel(&self) {
        self.cancellation.cancel();
    }

    /// Whether the request was cancelled.
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.cancellation.is_cancelled()
    }

    /// Drive `operation` unless the context is cancelled or expires first.
    ///
    /// Cancellation wins over an elapsed deadline, which wins over a
    /// completed operation, when several are ready at the same poll.
    ///
    /// # Errors
    ///
    /// Returns [`KmsError::Cancelled`] or [`KmsError::DeadlineExceeded`] when
    /// the context ends first, otherwise the operation's own error.
    pub async fn run<F, T>(&self, operation: F) -> Result<T, KmsError>
    where
        F: Future<Output = Result<T, KmsError>>,
    {
        let expiry = async {
            match self.deadline {
                Some(deadline) => tokio::time::sleep_until(deadline).await,
                None => std::future::pending::<()>().await,
            }
        };

        tokio::select! {
            biased;
            () = self.cancellation.cancelled() => Err(KmsError::Cancelled),
            () = expiry => Err(KmsError::DeadlineExceeded),
            result = operation => result,
        }
    }
}

/// Parse a `grpc-timeout` header value such as `"250m"` or `"30S"`.
///
/// The value is at most eight ASCII digits followed by one unit:
/// `H`ours, `M`inutes, `S`econds, `m`illis, `u`micros, `n`anos.
#[must_use]
pub fn parse_grpc_timeout(value: &str) -> Option<Duration> {
    if value.len() < 2 {
        return None;
    }
    let (digits, unit) = value.split_at(value.len() - 1);
    if digits.len() > 8 || !digits.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    let amount: u64 = digits.parse().ok()?;

    match unit {
        "H" => Some(Duration::from_secs(amount * 3600)),
        "M" => Some(Duration::from_secs(amount * 60)),
        "S" => Some(Duration::from_secs(amount)),
        "m" => Some(Duration::from_millis(amount)),
        "u" => Some(Duration::from_micros(amount)),
        "n" => Some(Duration::from_nanos(amount)),
        _ => None,
    }
}
