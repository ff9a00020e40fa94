//! Instrumentation scope for a single Encrypt/Decrypt call.

use std::panic::{catch_unwind, AssertUnwindSafe};
use std::time::Instant;

use tokio::time::Instant as Deadline;
use tracing::warn;

use crate::error::KmsError;
use crate::metrics::{OperationType, RequestOutcome, StatsReporter, StatusType};

/// Message reported when the handler is dropped before it records an outcome.
pub const ABANDONED_MESSAGE: &str = "request abandoned before completion";

/// Reports exactly one [`RequestOutcome`] when dropped.
///
/// The scope is opened before the backend call and consumed by
/// [`succeed`](Self::succeed) or [`fail`](Self::fail). If the surrounding
/// future is dropped first (caller disconnect, transport shutdown) the
/// outcome is still reported, as an error. A drop at or past the request
/// deadline reports [`KmsError::DeadlineExceeded`], the same outcome the
/// handler records when its own deadline fires first.
pub struct RequestScope<'a> {
    reporter: &'a dyn StatsReporter,
    operation: OperationType,
    start: Instant,
    deadline: Option<Deadline>,
    outcome: Option<Result<(), String>>,
}

impl<'a> RequestScope<'a> {
    /// Start timing `operation`.
    #[must_use]
    pub fn open(reporter: &'a dyn StatsReporter, operation: OperationType) -> Self {
        Self {
            reporter,
            operation,
            start: Instant::now(),
            deadline: None,
            outcome: None,
        }
    }

    /// Deadline used to classify a dropped scope.
    #[must_use]
    pub fn with_deadline(mut self, deadline: Option<Deadline>) -> Self {
        self.deadline = deadline;
        self
    }

    /// Record success and report.
    pub fn succeed(mut self) {
        self.outcome = Some(Ok(()));
    }

    /// Record `err` and report.
    pub fn fail(mut self, err: &KmsError) {
        self.outcome = Some(Err(err.to_string()));
    }

    fn build_outcome(&mut self) -> RequestOutcome {
        let (status, error_message) = match self.outcome.take() {
            Some(Ok(())) => (StatusType::Success, String::new()),
            Some(Err(message)) => (StatusType::Error, message),
            None if self.deadline.is_some_and(|d| Deadline::now() >= d) => {
                (StatusType::Error, KmsError::DeadlineExceeded.to_string())
            }
            None => (StatusType::Error, ABANDONED_MESSAGE.to_string()),
        };

        RequestOutcome {
            operation: self.operation,
            status,
            elapsed_seconds: self.start.elapsed().as_secs_f64(),
            error_message,
        }
    }
}

impl Drop for RequestScope<'_> {
    fn drop(&mut self) {
        let outcome = self.build_outcome();
        let reporter = self.reporter;

        if catch_unwind(AssertUnwindSafe(|| reporter.report_request(&outcome))).is_err() {
            warn!(operation = %outcome.operation, "stats reporter panicked; outcome dropped");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    #[derive(Default)]
    struct Recorder(Mutex<Vec<RequestOutcome>>);

    impl StatsReporter for Recorder {
        fn report_request(&self, outcome: &RequestOutcome) {
            self.0.lock().unwrap().push(outcome.clone());
        }
    }

    struct Panicking;

    impl StatsReporter for Panicking {
        fn report_request(&self, _outcome: &RequestOutcome) {
            panic!("sink exploded");
        }
    }

    #[test]
    fn test_success_reports_once_with_empty_message() {
        let recorder = Recorder::default();
        RequestScope::open(&recorder, OperationType::Encrypt).succeed();

        let outcomes = recorder.0.lock().unwrap();
        assert_eq!(outcomes.len(), 1);
        assert_eq!(outcomes[0].status, StatusType::Success);
        assert_eq!(outcomes[0].operation, OperationType::Encrypt);
        assert!(outcomes[0].error_message.is_empty());
        assert!(outcomes[0].elapsed_seconds >= 0.0);
    }

    #[test]
    fn test_failure_reports_error_string() {
        let recorder = Recorder::default();
        let err = KmsError::key_not_found("k1");
        RequestScope::open(&recorder, OperationType::Decrypt).fail(&err);

        let outcomes = recorder.0.lock().unwrap();
        assert_eq!(outcomes.len(), 1);
        assert_eq!(outcomes[0].status, StatusType::Error);
        assert_eq!(outcomes[0].error_message, err.to_string());
    }

    #[test]
    fn test_dropped_scope_reports_abandoned() {
        let recorder = Recorder::default();
        {
            let _scope = RequestScope::open(&recorder, OperationType::Encrypt);
        }

        let outcomes = recorder.0.lock().unwrap();
        assert_eq!(outcomes.len(), 1);
        assert_eq!(outcomes[0].status, StatusType::Error);
        assert_eq!(outcomes[0].error_message, ABANDONED_MESSAGE);
    }

    #[tokio::test(start_paused = true)]
    async fn test_dropped_past_deadline_reports_deadline_exceeded() {
        let recorder = Recorder::default();
        let deadline = Deadline::now() + std::time::Duration::from_millis(30);
        {
            let _scope =
                RequestScope::open(&recorder, OperationType::Decrypt).with_deadline(Some(deadline));
            tokio::time::sleep(std::time::Duration::from_millis(30)).await;
        }
        {
            let _scope = RequestScope::open(&recorder, OperationType::Decrypt)
                .with_deadline(Some(Deadline::now() + std::time::Duration::from_secs(5)));
        }

        let outcomes = recorder.0.lock().unwrap();
        assert_eq!(outcomes.len(), 2);
        assert_eq!(outcomes[0].error_message, "deadline exceeded");
        assert_eq!(outcomes[1].error_message, ABANDONED_MESSAGE);
    }

    #[test]
    fn test_panicking_reporter_is_contained() {
        RequestScope::open(&Panicking, OperationType::Encrypt).succeed();
    }
}
