//! Mapping of transport failures and error responses onto [`DetectionError`]
//!
//! Only the HTTP status and the service's symbolic status (e.g.
//! `INVALID_ARGUMENT`) ever reach the user. The free-text message in the body
//! is used for classification and nothing else.

use detection_core::DetectionError;
use reqwest::StatusCode;
use serde::Deserialize;
use serde_json::Value;

/// Google API error envelope
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ApiError {
    /// Error details
    #[serde(default)]
    pub error: ErrorDetail,
}

/// Detailed error information
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ErrorDetail {
    /// HTTP status echoed by the service
    pub code: Option<u16>,
    /// Human-readable message, never shown to the user
    pub message: Option<String>,
    /// Symbolic status such as `RESOURCE_EXHAUSTED`
    pub status: Option<String>,
    /// Typed detail objects (`ErrorInfo`, `RetryInfo`, ...)
    #[serde(default)]
    pub details: Vec<Value>,
}

impl ErrorDetail {
    fn has_reason(&self, reason: &str) -> bool {
        self.details
            .iter()
            .any(|d| d.get("reason").and_then(Value::as_str) == Some(reason))
    }

    /// `RetryInfo.retryDelay`, e.g. `"37s"` or `"1.5s"`, rounded up
    fn retry_delay_secs(&self) -> Option<u64> {
        self.details.iter().find_map(|d| {
            let delay = d.get("retryDelay")?.as_str()?;
            let secs: f64 = delay.strip_suffix('s')?.parse().ok()?;
            (secs.is_finite() && secs >= 0.0).then(|| secs.ceil() as u64)
        })
    }
}

/// Classify a non-2xx response
///
/// `retry_after` is the raw `Retry-After` header, when present.
pub fn status_error(status: StatusCode, retry_after: Option<&str>, body: &str) -> DetectionError {
    let detail = serde_json::from_str::<ApiError>(body)
        .map(|e| e.error)
        .unwrap_or_default();
    let symbolic = detail.status.as_deref().unwrap_or_default();

    let key_rejected = detail.has_reason("API_KEY_INVALID")
        || detail
            .message
            .as_deref()
            .is_some_and(|m| m.contains("API key not valid"));

    if status == StatusCode::UNAUTHORIZED
        || status == StatusCode::FORBIDDEN
        || matches!(symbolic, "UNAUTHENTICATED" | "PERMISSION_DENIED")
        || (status == StatusCode::BAD_REQUEST && key_rejected)
    {
        return DetectionError::Authentication;
    }

    if status == StatusCode::TOO_MANY_REQUESTS || symbolic == "RESOURCE_EXHAUSTED" {
        let retry_after_secs = retry_after
            .and_then(|v| v.trim().parse::<u64>().ok())
            .or_else(|| detail.retry_delay_secs());
        return DetectionError::RateLimited { retry_after_secs };
    }

    let reason = status.canonical_reason().unwrap_or("Unknown error");
    let detail = if status == StatusCode::NOT_FOUND {
        "the requested model was not found".to_string()
    } else if symbolic.is_empty() {
        reason.to_string()
    } else {
        format!("{reason} ({symbolic})")
    };

    DetectionError::RemoteService {
        status: Some(status.as_u16()),
        detail,
    }
}

/// Classify a failure that happened before any response arrived
pub fn transport_error(err: &reqwest::Error) -> DetectionError {
    if err.is_timeout() {
        DetectionError::Network("the request timed out".to_string())
    } else if err.is_connect() {
        DetectionError::Network("could not connect to the remote service".to_string())
    } else {
        DetectionError::Network("the request failed before a response was received".to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const KEY_INVALID_BODY: &str = r#"{
  "error": {
    "code": 400,
    "message": "API key not valid. Please pass a valid API key.",
    "status": "INVALID_ARGUMENT",
    "details": [
      {
        "@type": "type.googleapis.com/google.rpc.ErrorInfo",
        "reason": "API_KEY_INVALID",
        "domain": "googleapis.com"
      }
    ]
  }
}"#;

    #[test]
    fn unauthorized_and_forbidden_are_authentication() {
        for status in [StatusCode::UNAUTHORIZED, StatusCode::FORBIDDEN] {
            assert!(matches!(
                status_error(status, None, ""),
                DetectionError::Authentication
            ));
        }
    }

    #[test]
    fn bad_request_with_invalid_key_is_authentication() {
        let err = status_error(StatusCode::BAD_REQUEST, None, KEY_INVALID_BODY);
        assert!(matches!(err, DetectionError::Authentication));
    }

    #[test]
    fn other_bad_request_is_remote_service_without_message() {
        let body = r#"{"error":{"code":400,"message":"Request contains an invalid argument: secret-ish detail","status":"INVALID_ARGUMENT"}}"#;
        let err = status_error(StatusCode::BAD_REQUEST, None, body);
        match &err {
            DetectionError::RemoteService { status, detail } => {
                assert_eq!(*status, Some(400));
                assert_eq!(detail, "Bad Request (INVALID_ARGUMENT)");
            }
            other => panic!("expected remote service error, got {other:?}"),
        }
        assert!(!err.to_string().contains("secret-ish"));
    }

    #[test]
    fn too_many_requests_is_rate_limited_with_header() {
        let err = status_error(StatusCode::TOO_MANY_REQUESTS, Some("12"), "");
        assert!(matches!(
            err,
            DetectionError::RateLimited {
                retry_after_secs: Some(12)
            }
        ));
    }

    #[test]
    fn resource_exhausted_uses_retry_info() {
        let body = r#"{"error":{"code":429,"status":"RESOURCE_EXHAUSTED","details":[{"@type":"type.googleapis.com/google.rpc.RetryInfo","retryDelay":"36.2s"}]}}"#;
        let err = status_error(StatusCode::TOO_MANY_REQUESTS, None, body);
        assert!(matches!(
            err,
            DetectionError::RateLimited {
                retry_after_secs: Some(37)
            }
        ));
    }

    #[test]
    fn non_finite_retry_delay_is_ignored() {
        for delay in ["infs", "NaNs", "-3s"] {
            let body = format!(
                r#"{{"error":{{"code":429,"status":"RESOURCE_EXHAUSTED","details":[{{"retryDelay":"{delay}"}}]}}}}"#
            );
            let err = status_error(StatusCode::TOO_MANY_REQUESTS, None, &body);
            assert!(
                matches!(err, DetectionError::RateLimited { retry_after_secs: None }),
                "{delay} gave {err:?}"
            );
        }
    }

    #[test]
    fn not_found_mentions_model() {
        let err = status_error(StatusCode::NOT_FOUND, None, "<html>nope</html>");
        match err {
            DetectionError::RemoteService { status, detail } => {
                assert_eq!(status, Some(404));
                assert!(detail.contains("model"));
            }
            other => panic!("expected remote service error, got {other:?}"),
        }
    }

    #[test]
    fn unparseable_server_error_uses_canonical_reason() {
        let err = status_error(StatusCode::SERVICE_UNAVAILABLE, None, "upstream connect error");
        match err {
            DetectionError::RemoteService { status, detail } => {
                assert_eq!(status, Some(503));
                assert_eq!(detail, "Service Unavailable");
            }
            other => panic!("expected remote service error, got {other:?}"),
        }
    }
}
