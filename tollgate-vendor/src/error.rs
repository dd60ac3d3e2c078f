//! Error types for the vendor HTTP surface.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;

use tollgate_core::CoreError;
use tollgate_proto::error::{AsPaymentProblem, ErrorReason};

use crate::issuer_client::IssuerClientError;

/// Errors that can occur handling a vendor HTTP request.
#[derive(Debug, thiserror::Error)]
pub enum VendorError {
    /// A domain/crypto invariant check failed.
    #[error(transparent)]
    Core(#[from] CoreError),

    /// The request body was not valid JSON for its expected shape.
    #[error("invalid request body: {0}")]
    InvalidBody(#[from] serde_json::Error),

    /// A base64 field in the request did not decode.
    #[error("invalid base64 in request: {0}")]
    InvalidBase64(#[from] base64::DecodeError),

    /// A commitment field did not decode to exactly 32 bytes.
    #[error("commitment value must be exactly 32 bytes, got {0}")]
    InvalidHashLength(usize),

    /// The issuer could not be reached, or returned a malformed response.
    #[error("issuer request failed: {0}")]
    Issuer(#[from] IssuerClientError),
}

impl VendorError {
    fn reason(&self) -> ErrorReason {
        match self {
            Self::Core(err) => err.as_payment_problem().reason,
            Self::InvalidBody(_) | Self::InvalidBase64(_) | Self::InvalidHashLength(_) => ErrorReason::InvalidRequest,
            Self::Issuer(IssuerClientError::ChannelNotFound) => ErrorReason::ChannelNotFound,
            Self::Issuer(_) => ErrorReason::UpstreamUnavailable,
        }
    }
}

impl IntoResponse for VendorError {
    fn into_response(self) -> Response {
        let reason = self.reason();
        let status = StatusCode::from_u16(reason.http_status()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
        let body = serde_json::json!({ "reason": reason.as_str(), "details": self.to_string() });
        (status, Json(body)).into_response()
    }
}
