//! Error types for the issuer HTTP surface.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;

use tollgate_core::CoreError;
use tollgate_proto::channel::OpenChannelDecodeError;
use tollgate_proto::error::{AsPaymentProblem, ErrorReason};

/// Errors that can occur handling an issuer HTTP request.
#[derive(Debug, thiserror::Error)]
pub enum IssuerError {
    /// A domain/crypto invariant check failed.
    #[error(transparent)]
    Core(#[from] CoreError),

    /// The channel-open request body was malformed or ambiguous.
    #[error(transparent)]
    OpenChannelDecode(#[from] OpenChannelDecodeError),

    /// The request body was not valid JSON for its expected shape.
    #[error("invalid request body: {0}")]
    InvalidBody(#[from] serde_json::Error),

    /// A base64 field in the request did not decode.
    #[error("invalid base64 in request: {0}")]
    InvalidBase64(#[from] base64::DecodeError),

    /// A commitment root did not decode to exactly 32 bytes.
    #[error("commitment root must be exactly 32 bytes, got {0}")]
    InvalidRootLength(usize),
}

impl IssuerError {
    fn reason(&self) -> ErrorReason {
        match self {
            Self::Core(err) => err.as_payment_problem().reason,
            Self::OpenChannelDecode(_)
            | Self::InvalidBody(_)
            | Self::InvalidBase64(_)
            | Self::InvalidRootLength(_) => ErrorReason::InvalidRequest,
        }
    }
}

impl IntoResponse for IssuerError {
    fn into_response(self) -> Response {
        let reason = self.reason();
        let status = StatusCode::from_u16(reason.http_status()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
        let body = serde_json::json!({ "reason": reason.as_str(), "details": self.to_string() });
        (status, Json(body)).into_response()
    }
}
