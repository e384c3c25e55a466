//! Interpretation of a function's captured standard output.
//!
//! The stdout stream may carry diagnostics ahead of the response; the
//! response payload is everything up to the last newline. The parsed
//! payload is classified as either a structured success response or an
//! unhandled error by the presence of the error-indicating fields.

use std::borrow::Cow;

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;
use serde_json::Value;

use crate::error::{GatewayError, GatewayResult};

/// Content type used when the payload does not declare one.
pub const DEFAULT_CONTENT_TYPE: &str = "application/json";

const ERROR_FIELDS: [&str; 3] = ["errorMessage", "errorType", "stackTrace"];

/// True when a parsed payload looks like an unhandled function error rather
/// than user data: either the full error triple is present, or
/// `errorMessage` alone.
pub fn error_like(payload: &Value) -> bool {
    match payload.as_object() {
        Some(map) => {
            ERROR_FIELDS.iter().all(|field| map.contains_key(*field))
                || map.contains_key("errorMessage")
        }
        None => false,
    }
}

/// Outcome of interpreting the raw output.
#[derive(Debug, Clone, PartialEq)]
pub enum FunctionResponse {
    Success {
        status: u16,
        content_type: String,
        body: Vec<u8>,
    },
    Unhandled {
        payload: Value,
    },
}

#[derive(Debug, Clone, PartialEq)]
pub struct ClassifiedOutput {
    pub response: FunctionResponse,
    /// Diagnostic text found after the final newline, if any.
    pub trailer: Option<String>,
}

/// Classifies the text captured from a unit's standard output.
pub fn classify(raw: &str) -> GatewayResult<ClassifiedOutput> {
    let (candidate, trailer) = match raw.rfind('\n') {
        Some(index) => {
            let trailer = raw[index..].trim();
            (
                raw[..index].trim(),
                (!trailer.is_empty()).then(|| trailer.to_string()),
            )
        }
        None => (raw.trim(), None),
    };

    let payload: Value =
        serde_json::from_str(candidate).map_err(|e| GatewayError::MalformedResponse {
            message: format!("{} in function output '{}'", e, candidate),
        })?;

    if error_like(&payload) {
        return Ok(ClassifiedOutput {
            response: FunctionResponse::Unhandled { payload },
            trailer,
        });
    }

    let status = payload
        .get("statusCode")
        .and_then(Value::as_u64)
        .unwrap_or(200) as u16;
    let content_type = payload
        .get("headers")
        .and_then(|headers| headers.get("Content-Type"))
        .and_then(Value::as_str)
        .unwrap_or(DEFAULT_CONTENT_TYPE)
        .to_string();

    let body_text: Cow<'_, str> = match payload.get("body") {
        Some(Value::String(text)) => Cow::Borrowed(text.as_str()),
        Some(Value::Null) | None => Cow::Borrowed(""),
        Some(other) => Cow::Owned(other.to_string()),
    };
    let body = if payload
        .get("isBase64Encoded")
        .and_then(Value::as_bool)
        .unwrap_or(false)
    {
        BASE64
            .decode(body_text.as_bytes())
            .map_err(|e| GatewayError::MalformedResponse {
                message: format!("invalid base64 body: {}", e),
            })?
    } else {
        body_text.into_owned().into_bytes()
    };

    Ok(ClassifiedOutput {
        response: FunctionResponse::Success {
            status,
            content_type,
            body,
        },
        trailer,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_error_like_full_triple() {
        assert!(error_like(&json!({
            "errorMessage": "whoops",
            "errorType": "errrr",
            "stackTrace": []
        })));
    }

    #[test]
    fn test_error_like_message_alone() {
        assert!(error_like(&json!({ "errorMessage": "I'm aware" })));
    }

    #[test]
    fn test_error_like_ignores_user_data() {
        assert!(!error_like(&json!({ "foo": true })));
        assert!(!error_like(&json!("errorMessage")));
    }

    #[test]
    fn test_classify_success() {
        let output = classify("{\"statusCode\":201,\"body\":\"ok\"}\n").unwrap();
        assert_eq!(
            output.response,
            FunctionResponse::Success {
                status: 201,
                content_type: DEFAULT_CONTENT_TYPE.to_string(),
                body: b"ok".to_vec(),
            }
        );
        assert!(output.trailer.is_none());
    }

    #[test]
    fn test_classify_defaults() {
        let output = classify("{\"body\":\"hi\"}").unwrap();
        match output.response {
            FunctionResponse::Success {
                status,
                content_type,
                ..
            } => {
                assert_eq!(status, 200);
                assert_eq!(content_type, DEFAULT_CONTENT_TYPE);
            }
            other => panic!("expected success, got {:?}", other),
        }
    }

    #[test]
    fn test_classify_declared_content_type() {
        let raw = "{\"statusCode\":200,\"headers\":{\"Content-Type\":\"text/html\"},\"body\":\"<p>hi</p>\"}";
        let output = classify(raw).unwrap();
        match output.response {
            FunctionResponse::Success { content_type, .. } => {
                assert_eq!(content_type, "text/html");
            }
            other => panic!("expected success, got {:?}", other),
        }
    }

    #[test]
    fn test_classify_base64_body() {
        let raw = "{\"statusCode\":200,\"body\":\"aGVsbG8=\",\"isBase64Encoded\":true}";
        let output = classify(raw).unwrap();
        match output.response {
            FunctionResponse::Success { body, .. } => assert_eq!(body, b"hello"),
            other => panic!("expected success, got {:?}", other),
        }
    }

    #[test]
    fn test_classify_invalid_base64_rejected() {
        let raw = "{\"body\":\"not-base64!!!\",\"isBase64Encoded\":true}";
        assert!(matches!(
            classify(raw),
            Err(GatewayError::MalformedResponse { .. })
        ));
    }

    #[test]
    fn test_classify_unhandled_error() {
        let output = classify("{\"errorMessage\":\"boom\"}").unwrap();
        match output.response {
            FunctionResponse::Unhandled { payload } => {
                assert_eq!(payload["errorMessage"], "boom");
            }
            other => panic!("expected unhandled error, got {:?}", other),
        }
    }

    #[test]
    fn test_classify_surfaces_trailer() {
        let output = classify("{\"statusCode\":204}\nEND RequestId: 42").unwrap();
        assert_eq!(output.trailer.as_deref(), Some("END RequestId: 42"));
        match output.response {
            FunctionResponse::Success { status, .. } => assert_eq!(status, 204),
            other => panic!("expected success, got {:?}", other),
        }
    }

    #[test]
    fn test_classify_malformed() {
        assert!(matches!(
            classify("not json at all"),
            Err(GatewayError::MalformedResponse { .. })
        ));
    }
}
