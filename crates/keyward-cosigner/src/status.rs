//! Mapping of HTTP outcomes onto [`CosignerError`].

use keyward_core::effects::CosignerError;
use serde::Deserialize;

/// Error body the co-signer attaches to non-2xx responses.
#[derive(Debug, Default, Deserialize)]
struct ErrorBody {
    #[serde(default)]
    code: Option<String>,
    #[serde(default)]
    message: Option<String>,
}

/// Classify a non-success status and its body.
///
/// 401/403 mean a stale or invalid proof of possession, 409 a server state
/// conflict, 5xx a retryable outage. Unknown 4xx codes are rejections.
pub fn classify_status(status: u16, body: &str) -> CosignerError {
    let parsed: ErrorBody = serde_json::from_str(body).unwrap_or_default();
    let message = parsed
        .message
        .unwrap_or_else(|| truncate(body).to_string());

    match status {
        401 | 403 => CosignerError::unauthorized(message),
        404 => CosignerError::not_found(message),
        409 => CosignerError::conflict(
            parsed.code.unwrap_or_else(|| "CONFLICT".to_string()),
            message,
        ),
        408 | 429 | 500..=599 => CosignerError::network(format!("status {status}: {message}")),
        _ => CosignerError::Rejected { status, message },
    }
}

/// Classify a transport-level failure (no response received).
pub fn classify_transport(err: &reqwest::Error) -> CosignerError {
    if err.is_decode() {
        return CosignerError::Serialization {
            message: err.to_string(),
        };
    }
    if let Some(status) = err.status() {
        return classify_status(status.as_u16(), "");
    }
    // Timeouts, refused connections and anything else below HTTP
    CosignerError::network(err.to_string())
}

fn truncate(body: &str) -> &str {
    const MAX: usize = 256;
    match body.char_indices().nth(MAX) {
        Some((idx, _)) => &body[..idx],
        None => body,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;

    #[test]
    fn auth_failures_are_unauthorized() {
        assert_matches!(classify_status(401, ""), CosignerError::Unauthorized { .. });
        assert_matches!(classify_status(403, "{}"), CosignerError::Unauthorized { .. });
    }

    #[test]
    fn conflict_keeps_server_code() {
        let err = classify_status(
            409,
            r#"{"code":"RECOVERY_ALREADY_EXISTS","message":"another recovery is active"}"#,
        );
        assert_eq!(
            err,
            CosignerError::conflict("RECOVERY_ALREADY_EXISTS", "another recovery is active")
        );
        assert!(!err.is_retryable());
    }

    #[test]
    fn server_errors_are_retryable() {
        for status in [500, 502, 503, 429] {
            let err = classify_status(status, "upstream");
            assert!(err.is_retryable(), "{status} should be retryable");
        }
    }

    #[test]
    fn other_client_errors_are_rejections() {
        assert_matches!(
            classify_status(400, "bad body"),
            CosignerError::Rejected { status: 400, ref message } if message == "bad body"
        );
        assert_matches!(classify_status(404, ""), CosignerError::NotFound { .. });
    }

    #[test]
    fn long_bodies_are_truncated() {
        let body = "x".repeat(1000);
        let CosignerError::Rejected { message, .. } = classify_status(422, &body) else {
            panic!("expected rejection");
        };
        assert_eq!(message.len(), 256);
    }
}
