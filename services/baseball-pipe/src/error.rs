//! Per-request error responses
//!
//! Every failure reaching a client is rendered as
//! `{"error":{"type","stage","message","request_id"}}`, plus `details` when
//! the media gateway sent a GraphQL error payload.

use axum::http::{StatusCode, header};
use axum::response::{IntoResponse, Response};
use mlbtv_stream::Error as StreamError;
use serde_json::Value;

#[derive(Debug)]
pub struct ApiError {
    pub status: StatusCode,
    pub kind: &'static str,
    pub stage: &'static str,
    pub message: String,
    pub details: Option<Value>,
    pub request_id: String,
}

impl ApiError {
    pub fn new(
        status: StatusCode,
        kind: &'static str,
        message: impl Into<String>,
        request_id: &str,
    ) -> Self {
        Self {
            status,
            kind,
            stage: "request",
            message: message.into(),
            details: None,
            request_id: request_id.to_string(),
        }
    }

    pub fn not_found(message: impl Into<String>, request_id: &str) -> Self {
        Self::new(StatusCode::NOT_FOUND, "not_found", message, request_id)
    }

    /// Map a stream pipeline failure to a client response.
    ///
    /// Auth and negotiation failures are the gateway's fault from the
    /// player's point of view (502); CDN statuses pass through; timeouts
    /// anywhere are 504.
    pub fn from_stream(err: &StreamError, request_id: &str) -> Self {
        let (status, kind) = if err.is_timeout() {
            (StatusCode::GATEWAY_TIMEOUT, "upstream_timeout")
        } else {
            match err {
                StreamError::Auth(_) => (StatusCode::BAD_GATEWAY, "auth_error"),
                StreamError::Negotiation(_) | StreamError::Gateway(_) => {
                    (StatusCode::BAD_GATEWAY, "negotiation_error")
                }
                StreamError::UpstreamFetch { status, .. } => (
                    StatusCode::from_u16(*status).unwrap_or(StatusCode::BAD_GATEWAY),
                    "upstream_error",
                ),
                StreamError::Transport(_) => (StatusCode::BAD_GATEWAY, "upstream_error"),
                StreamError::InvalidRequest(_) => (StatusCode::BAD_REQUEST, "invalid_request"),
                StreamError::Timeout { .. } => (StatusCode::GATEWAY_TIMEOUT, "upstream_timeout"),
            }
        };

        Self {
            status,
            kind,
            stage: err.stage(),
            message: err.to_string(),
            details: match err {
                StreamError::Negotiation(payload) => Some(payload.clone()),
                _ => None,
            },
            request_id: request_id.to_string(),
        }
    }

    pub fn body(&self) -> Value {
        let mut error = serde_json::json!({
            "type": self.kind,
            "stage": self.stage,
            "message": self.message,
            "request_id": self.request_id,
        });
        if let Some(details) = &self.details {
            error["details"] = details.clone();
        }
        serde_json::json!({ "error": error })
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (
            self.status,
            [
                (header::CONTENT_TYPE, "application/json"),
                (header::ACCESS_CONTROL_ALLOW_ORIGIN, "*"),
            ],
            self.body().to_string(),
        )
            .into_response()
    }
}
