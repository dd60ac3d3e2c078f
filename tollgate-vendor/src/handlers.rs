//! Axum route handlers for the vendor HTTP surface.
//!
//! Every handler is a thin wrapper around [`VendorService`]: parse the
//! request, call one service method, wrap the result in `Json`. Business
//! logic belongs in `service.rs`, not here.

use std::sync::Arc;

use axum::extract::{Path, State};
use axum::Json;

use tollgate_proto::channel::CloseChannelResponse;
use tollgate_proto::envelope::Envelope;
use tollgate_proto::payment::PaymentReceipt;

use crate::error::VendorError;
use crate::service::VendorService;

/// Shared application state for the vendor service.
pub type VendorState = Arc<VendorService>;

/// `POST /vendor/channels/signature/{channel_id}/payments` — accepts one
/// signature-variant streaming payment.
///
/// # Errors
///
/// Returns 400 if the envelope does not verify, the counter does not
/// strictly increase, or the cumulative amount exceeds the locked capacity;
/// 404 if the channel is unknown both locally and at the issuer.
pub async fn post_signature_payment(
    State(service): State<VendorState>,
    Path(channel_id): Path<String>,
    Json(envelope): Json<Envelope>,
) -> Result<Json<PaymentReceipt>, VendorError> {
    let receipt = service.receive_signature_payment(&channel_id, envelope).await?;
    Ok(Json(receipt))
}

/// `POST /vendor/channels/payword/{channel_id}/payments` — accepts one
/// `PayWord` streaming payment.
///
/// # Errors
///
/// Returns 400 if the envelope does not verify, the token does not hash to
/// the expected value, or `k` does not strictly increase or exceeds the
/// channel's commitment window; 404 if the channel is unknown both locally
/// and at the issuer.
pub async fn post_payword_payment(
    State(service): State<VendorState>,
    Path(channel_id): Path<String>,
    Json(envelope): Json<Envelope>,
) -> Result<Json<PaymentReceipt>, VendorError> {
    let receipt = service.receive_payword_payment(&channel_id, envelope).await?;
    Ok(Json(receipt))
}

/// `POST /vendor/channels/{paytree,paytree_first_opt,paytree_second_opt}/{channel_id}/payments`
/// — accepts one `PayTree` streaming payment, for any of the three pruning
/// subtypes; which subtype applies is read off the channel record itself,
/// not off which of these three routes was called.
///
/// # Errors
///
/// Returns 400 if the envelope does not verify, the pruned proof cannot be
/// reconstructed or does not recompute the channel's root, or `i` does not
/// strictly increase or exceeds the channel's commitment window; 404 if the
/// channel is unknown both locally and at the issuer.
pub async fn post_paytree_payment(
    State(service): State<VendorState>,
    Path(channel_id): Path<String>,
    Json(envelope): Json<Envelope>,
) -> Result<Json<PaymentReceipt>, VendorError> {
    let receipt = service.receive_paytree_payment(&channel_id, envelope).await?;
    Ok(Json(receipt))
}

/// `POST /vendor/channels/{scheme}/{channel_id}/closure-requests` — submits
/// a settlement request to the issuer for the latest accepted payment,
/// whichever scheme the channel actually carries.
///
/// # Errors
///
/// Returns 400 if no payment has ever been accepted on the channel, or the
/// channel is already closed; whatever the issuer rejects the settlement
/// with, otherwise.
pub async fn post_closure_request(
    State(service): State<VendorState>,
    Path(channel_id): Path<String>,
) -> Result<Json<CloseChannelResponse>, VendorError> {
    let response = service.request_closure(&channel_id).await?;
    Ok(Json(response))
}

/// Builds the full vendor `axum::Router`.
///
/// Endpoints:
/// - `POST /vendor/channels/signature/{channel_id}/payments`
/// - `POST /vendor/channels/payword/{channel_id}/payments`
/// - `POST /vendor/channels/paytree{,_first_opt,_second_opt}/{channel_id}/payments`
/// - `POST /vendor/channels/{scheme}/{channel_id}/closure-requests`
pub fn vendor_router(state: VendorState) -> axum::Router {
    axum::Router::new()
        .route(
            "/vendor/channels/signature/{channel_id}/payments",
            axum::routing::post(post_signature_payment),
        )
        .route(
            "/vendor/channels/payword/{channel_id}/payments",
            axum::routing::post(post_payword_payment),
        )
        .route(
            "/vendor/channels/paytree/{channel_id}/payments",
            axum::routing::post(post_paytree_payment),
        )
        .route(
            "/vendor/channels/paytree_first_opt/{channel_id}/payments",
            axum::routing::post(post_paytree_payment),
        )
        .route(
            "/vendor/channels/paytree_second_opt/{channel_id}/payments",
            axum::routing::post(post_paytree_payment),
        )
        .route(
            "/vendor/channels/signature/{channel_id}/closure-requests",
            axum::routing::post(post_closure_request),
        )
        .route(
            "/vendor/channels/payword/{channel_id}/closure-requests",
            axum::routing::post(post_closure_request),
        )
        .route(
            "/vendor/channels/paytree/{channel_id}/closure-requests",
            axum::routing::post(post_closure_request),
        )
        .route(
            "/vendor/channels/paytree_first_opt/{channel_id}/closure-requests",
            axum::routing::post(post_closure_request),
        )
        .route(
            "/vendor/channels/paytree_second_opt/{channel_id}/closure-requests",
            axum::routing::post(post_closure_request),
        )
        .with_state(state)
}
