//! Key Vault REST payloads and error mapping.

use std::time::Duration;

use reqwest::header::{HeaderMap, RETRY_AFTER};
use reqwest::StatusCode;
use serde::{Deserialize, Serialize};

use crate::error::KmsError;

/// Body of a `keys/{name}/{version}/{encrypt|decrypt}` call.
#[derive(Debug, Clone, Serialize)]
pub struct KeyOperationRequest<'a> {
    /// Wrapping algorithm
    pub alg: &'a str,
    /// Base64url input
    pub value: String,
}

/// Successful key operation response.
#[derive(Debug, Clone, Deserialize)]
pub struct KeyOperationResult {
    /// Full key identifier used by the vault
    #[serde(default)]
    pub kid: Option<String>,
    /// Base64url output
    pub value: String,
}

#[derive(Debug, Default, Deserialize)]
struct ErrorResponse {
    #[serde(default)]
    error: ErrorDetail,
}

#[derive(Debug, Default, Deserialize)]
struct ErrorDetail {
    #[serde(default)]
    code: String,
    #[serde(default)]
    message: String,
}

/// Parse a `Retry-After` header given in whole seconds.
#[must_use]
pub fn parse_retry_after(headers: &HeaderMap) -> Option<Duration> {
    headers
        .get(RETRY_AFTER)?
        .to_str()
        .ok()?
        .trim()
        .parse::<u64>()
        .ok()
        .map(Duration::from_secs)
}

/// Map a non-success vault response onto [`KmsError`].
pub(crate) fn error_for_status(
    status: StatusCode,
    retry_after: Option<Duration>,
    body: &str,
    key_id: &str,
) -> KmsError {
    let detail = serde_json::from_str::<ErrorResponse>(body)
        .map(|response| response.error)
        .unwrap_or_default();
    let reason = if detail.message.is_empty() {
        format!("HTTP {}", status.as_u16())
    } else {
        detail.message.clone()
    };

    match status {
        StatusCode::UNAUTHORIZED => KmsError::unauthenticated(reason),
        StatusCode::FORBIDDEN => KmsError::permission_denied(reason),
        StatusCode::NOT_FOUND => KmsError::key_not_found(key_id),
        StatusCode::TOO_MANY_REQUESTS => KmsError::Throttled { retry_after },
        status if status.is_server_error() => KmsError::unavailable(reason),
        status => KmsError::Rejected {
            status: status.as_u16(),
            code: detail.code,
            message: detail.message,
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use reqwest::header::HeaderValue;

    const BAD_PARAMETER: &str =
        r#"{"error":{"code":"BadParameter","message":"Invalid algorithm"}}"#;

    #[test]
    fn test_request_serialization() {
        let body = KeyOperationRequest {
            alg: "RSA-OAEP-256",
            value: "aGVsbG8".to_string(),
        };
        let json = serde_json::to_value(&body).unwrap();
        assert_eq!(json, serde_json::json!({"alg": "RSA-OAEP-256", "value": "aGVsbG8"}));
    }

    #[test]
    fn test_result_without_kid() {
        let result: KeyOperationResult = serde_json::from_str(r#"{"value":"abc"}"#).unwrap();
        assert_eq!(result.value, "abc");
        assert!(result.kid.is_none());
    }

    #[test]
    fn test_parse_retry_after() {
        let mut headers = HeaderMap::new();
        assert_eq!(parse_retry_after(&headers), None);

        headers.insert(RETRY_AFTER, HeaderValue::from_static("7"));
        assert_eq!(parse_retry_after(&headers), Some(Duration::from_secs(7)));

        headers.insert(RETRY_AFTER, HeaderValue::from_static("Wed, 21 Oct 2015 07:28:00 GMT"));
        assert_eq!(parse_retry_after(&headers), None);
    }

    #[test]
    fn test_status_mapping() {
        let map = |status| error_for_status(status, None, "", "kek/1");

        assert!(matches!(map(StatusCode::UNAUTHORIZED), KmsError::Unauthenticated { .. }));
        assert!(matches!(map(StatusCode::FORBIDDEN), KmsError::PermissionDenied { .. }));
        assert_eq!(map(StatusCode::NOT_FOUND), KmsError::key_not_found("kek/1"));
        assert!(matches!(map(StatusCode::SERVICE_UNAVAILABLE), KmsError::Unavailable { .. }));
        assert!(matches!(map(StatusCode::BAD_GATEWAY), KmsError::Unavailable { .. }));
    }

    #[test]
    fn test_throttled_keeps_hint() {
        let err = error_for_status(
            StatusCode::TOO_MANY_REQUESTS,
            Some(Duration::from_secs(2)),
            "",
            "kek/1",
        );
        assert_eq!(
            err,
            KmsError::Throttled {
                retry_after: Some(Duration::from_secs(2))
            }
        );
    }

    #[test]
    fn test_rejected_carries_vault_detail() {
        let err = error_for_status(StatusCode::BAD_REQUEST, None, BAD_PARAMETER, "kek/1");
        assert_eq!(
            err,
            KmsError::Rejected {
                status: 400,
                code: "BadParameter".to_string(),
                message: "Invalid algorithm".to_string(),
            }
        );
    }

    #[test]
    fn test_forbidden_uses_vault_message() {
        let body = r#"{"error":{"code":"Forbidden","message":"caller lacks keys/encrypt"}}"#;
        let err = error_for_status(StatusCode::FORBIDDEN, None, body, "kek/1");
        assert_eq!(err, KmsError::permission_denied("caller lacks keys/encrypt"));
    }

    #[test]
    fn test_unparseable_body_falls_back_to_status() {
        let err = error_for_status(StatusCode::UNAUTHORIZED, None, "<html>", "kek/1");
        assert_eq!(err, KmsError::unauthenticated("HTTP 401"));
    }
}
