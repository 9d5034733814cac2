//! HTTP error mapping.

use crate::error::Error;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::{json, Value};
use tracing::{debug, warn};

/// An error response: a status plus `{ "error": message }`, optionally with
/// extra top-level fields.
#[derive(Debug)]
pub struct ApiError {
    pub(crate) status: StatusCode,
    pub(crate) message: String,
    pub(crate) extra: Option<Value>,
}

impl ApiError {
    /// 400 with `message`.
    pub fn bad_request(message: impl Into<String>) -> Self {
        Self::new(StatusCode::BAD_REQUEST, message)
    }

    /// 401 with `message`.
    pub fn unauthorized(message: impl Into<String>) -> Self {
        Self::new(StatusCode::UNAUTHORIZED, message)
    }

    /// 404 with `message`.
    pub fn not_found(message: impl Into<String>) -> Self {
        Self::new(StatusCode::NOT_FOUND, message)
    }

    fn new(status: StatusCode, message: impl Into<String>) -> Self {
        Self {
            status,
            message: message.into(),
            extra: None,
        }
    }

    /// Merge the fields of `extra` (an object) into the body.
    #[must_use]
    pub fn with_extra(mut self, extra: Value) -> Self {
        self.extra = Some(extra);
        self
    }

    /// Status code of the response.
    #[must_use]
    pub const fn status(&self) -> StatusCode {
        self.status
    }
}

impl From<Error> for ApiError {
    fn from(err: Error) -> Self {
        let status = match &err {
            Error::Validation { .. } | Error::Crypto(_) => StatusCode::BAD_REQUEST,
            Error::Session(_) => StatusCode::UNAUTHORIZED,
            Error::PaymentRequired(_) => StatusCode::PAYMENT_REQUIRED,
            Error::Unauthorized(_) => StatusCode::FORBIDDEN,
            Error::NotFound { .. } => StatusCode::NOT_FOUND,
            Error::InvalidTransition { .. } => StatusCode::CONFLICT,
            Error::Network(_) => StatusCode::BAD_GATEWAY,
            Error::Config(_) | Error::Io(_) | Error::Serialization(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        };
        if status.is_server_error() {
            warn!("Request failed: {err}");
        } else {
            debug!("Request rejected ({status}): {err}");
        }
        Self::new(status, err.to_string())
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let mut body = json!({ "error": self.message });
        if let (Some(Value::Object(extra)), Some(obj)) = (self.extra, body.as_object_mut()) {
            for (k, v) in extra {
                obj.entry(k).or_insert(v);
            }
        }
        (self.status, Json(body)).into_response()
    }
}

/// Result type for handlers.
pub type ApiResult<T> = std::result::Result<T, ApiError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_mapping() {
        let cases = [
            (Error::validation("disease", "bad"), StatusCode::BAD_REQUEST),
            (Error::not_found("claim", "x"), StatusCode::NOT_FOUND),
            (Error::Unauthorized("no".into()), StatusCode::FORBIDDEN),
            (
                Error::InvalidTransition {
                    from: "paid".into(),
                    to: "verified".into(),
                },
                StatusCode::CONFLICT,
            ),
            (Error::PaymentRequired("pay".into()), StatusCode::PAYMENT_REQUIRED),
            (Error::Session("expired".into()), StatusCode::UNAUTHORIZED),
            (Error::Network("down".into()), StatusCode::BAD_GATEWAY),
            (Error::Config("bad".into()), StatusCode::INTERNAL_SERVER_ERROR),
        ];
        for (err, status) in cases {
            assert_eq!(ApiError::from(err).status(), status);
        }
    }

    #[test]
    fn test_message_preserved() {
        let err = ApiError::from(Error::validation("claimAmount", "must be positive"));
        assert_eq!(err.message, "invalid claimAmount: must be positive");
    }
}
