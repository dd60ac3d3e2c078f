//! Axum route handlers for the issuer HTTP surface.
//!
//! Every handler is a thin wrapper around [`IssuerService`]: parse the
//! request, call one service method, wrap the result in `Json`. Business
//! logic belongs in `service.rs`, not here.

use std::collections::HashMap;
use std::sync::Arc;

use axum::extract::{Path, Query, State};
use axum::Json;

use tollgate_proto::channel::{
    ChannelSummary, CloseChannelResponse, OpenChannelEnvelopeRequest, OpenChannelResponse,
    SignatureCloseRequest,
};
use tollgate_proto::payment::{PaytreeSettleRequest, PaywordSettleRequest};
use tollgate_proto::{AccountResponse, IssuerPublicKeyResponse, RegisterAccountRequest};
use tollgate_storage::ChannelStatus;

use crate::error::IssuerError;
use crate::service::IssuerService;

/// Shared application state for the issuer service.
pub type IssuerState = Arc<IssuerService>;

/// `POST /issuer/accounts` — registers a fresh account or returns the
/// existing one. Idempotent; carries no signature.
pub async fn post_register_account(
    State(service): State<IssuerState>,
    Json(body): Json<RegisterAccountRequest>,
) -> Json<AccountResponse> {
    let account = service.register_account(body.public_key_der_b64).await;
    Json(AccountResponse {
        public_key_der_b64: account.public_key_der_b64,
        balance: account.balance,
    })
}

/// `GET /issuer/accounts?public_key_der_b64=...` — looks up an account.
///
/// # Errors
///
/// Returns 404 if no account is registered at this key.
pub async fn get_account(
    State(service): State<IssuerState>,
    Query(params): Query<HashMap<String, String>>,
) -> Result<Json<AccountResponse>, IssuerError> {
    let public_key_der_b64 = params.get("public_key_der_b64").cloned().unwrap_or_default();
    let account = service.get_account(&public_key_der_b64).await?;
    Ok(Json(AccountResponse {
        public_key_der_b64: account.public_key_der_b64,
        balance: account.balance,
    }))
}

/// `GET /issuer/keys/public` — publishes the issuer's own verification key.
pub async fn get_issuer_public_key(State(service): State<IssuerState>) -> Json<IssuerPublicKeyResponse> {
    Json(IssuerPublicKeyResponse {
        public_key_der_b64: service.public_key_der_b64(),
    })
}

/// `POST /issuer/channels{,/payword,/paytree,/paytree_first_opt,/paytree_second_opt}`
/// — opens a channel. The scheme is inferred from the signed payload's
/// fields, not from which of these paths was called; all five routes share
/// this handler.
///
/// # Errors
///
/// Returns 400 on a malformed or ambiguous payload, an invalid envelope
/// signature, a key-confusion mismatch, a non-positive amount, or a
/// commitment window exceeding the locked amount; 404 if either account is
/// unregistered.
pub async fn post_open_channel(
    State(service): State<IssuerState>,
    Json(body): Json<OpenChannelEnvelopeRequest>,
) -> Result<Json<OpenChannelResponse>, IssuerError> {
    let response = service.open_channel(body).await?;
    Ok(Json(response))
}

/// `GET /issuer/channels/{channel_id}` — looks up a channel's metadata.
///
/// # Errors
///
/// Returns 404 if no channel exists at this id.
pub async fn get_channel(
    State(service): State<IssuerState>,
    Path(channel_id): Path<String>,
) -> Result<Json<ChannelSummary>, IssuerError> {
    let summary = service.get_channel(&channel_id).await?;
    Ok(Json(summary))
}

/// `GET /issuer/channels?status=open|closed|all&before=...&limit=...` —
/// lists channel summaries, most recently opened first. Not part of the
/// core settlement path; exposed so operators can enumerate channels the
/// same way the underlying store's indices are organized.
pub async fn list_channels(
    State(service): State<IssuerState>,
    Query(params): Query<HashMap<String, String>>,
) -> Json<Vec<ChannelSummary>> {
    let status = match params.get("status").map(String::as_str) {
        Some("open") => ChannelStatus::Open,
        Some("closed") => ChannelStatus::Closed,
        _ => ChannelStatus::All,
    };
    let before = params.get("before").and_then(|v| v.parse::<u64>().ok());
    let limit = params
        .get("limit")
        .and_then(|v| v.parse::<usize>().ok())
        .unwrap_or(100);
    Json(service.list_channels(status, before, limit).await)
}

/// Untagged settlement body for `POST /issuer/channels/{channel_id}/settlements`.
/// A single endpoint accepts all three shapes; serde disambiguates by which
/// variant's required fields are present since the three shapes never
/// overlap in field names.
#[derive(Debug, Clone, serde::Deserialize)]
#[serde(untagged)]
pub enum SettlementRequest {
    /// Signature-variant close: a jointly-signed cumulative amount.
    Signature(SignatureCloseRequest),
    /// `PayWord` settlement: final `(k, token)`.
    Payword(PaywordSettleRequest),
    /// `PayTree` settlement: final `(i, leaf, siblings)`.
    Paytree(PaytreeSettleRequest),
}

/// `POST /issuer/channels/{channel_id}/settlements` — closes a channel
/// against whichever settlement shape the body carries.
///
/// # Errors
///
/// Returns 400 for any verification or capacity failure, 404 if the channel
/// doesn't exist, or 409-equivalent (mapped to 400) if it is already closed
/// or the wrong scheme.
pub async fn post_settlement(
    State(service): State<IssuerState>,
    Path(channel_id): Path<String>,
    Json(body): Json<SettlementRequest>,
) -> Result<Json<CloseChannelResponse>, IssuerError> {
    let response = match body {
        SettlementRequest::Signature(request) => service.close_channel_signature(&channel_id, request).await?,
        SettlementRequest::Payword(request) => service.settle_payword(&channel_id, request).await?,
        SettlementRequest::Paytree(request) => service.settle_paytree(&channel_id, request).await?,
    };
    Ok(Json(response))
}

/// Builds the full issuer `axum::Router`.
///
/// Endpoints:
/// - `POST /issuer/accounts` — register or fetch an account
/// - `GET /issuer/accounts` — look up an account by public key
/// - `GET /issuer/keys/public` — the issuer's own verification key
/// - `POST /issuer/channels` — open a signature channel
/// - `POST /issuer/channels/payword` — open a `PayWord` channel
/// - `POST /issuer/channels/paytree{,_first_opt,_second_opt}` — open a `PayTree` channel
/// - `GET /issuer/channels/{channel_id}` — channel metadata
/// - `GET /issuer/channels` — list channel summaries
/// - `POST /issuer/channels/{channel_id}/settlements` — close/settle a channel
pub fn issuer_router(state: IssuerState) -> axum::Router {
    axum::Router::new()
        .route("/issuer/accounts", axum::routing::post(post_register_account).get(get_account))
        .route("/issuer/keys/public", axum::routing::get(get_issuer_public_key))
        .route("/issuer/channels", axum::routing::post(post_open_channel).get(list_channels))
        .route("/issuer/channels/payword", axum::routing::post(post_open_channel))
        .route("/issuer/channels/paytree", axum::routing::post(post_open_channel))
        .route("/issuer/channels/paytree_first_opt", axum::routing::post(post_open_channel))
        .route("/issuer/channels/paytree_second_opt", axum::routing::post(post_open_channel))
        .route("/issuer/channels/{channel_id}", axum::routing::get(get_channel))
        .route("/issuer/channels/{channel_id}/settlements", axum::routing::post(post_settlement))
        .with_state(state)
}
