// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Checkout endpoints: submit a registration, follow its payment, cancel it.

use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use tracing::info;

use crate::{
    error::ApiError,
    models::{CheckoutResponse, RegistrationForm},
    state::AppState,
};

/// Submit the registration form and send the M-Pesa prompt.
///
/// On success the payment is being confirmed in the background; poll
/// `GET /v1/checkouts/{checkout_request_id}` for the outcome.
#[utoipa::path(
    post,
    path = "/v1/checkouts",
    tag = "Checkout",
    request_body = RegistrationForm,
    responses(
        (status = 202, description = "STK Push sent, awaiting confirmation", body = CheckoutResponse),
        (status = 400, description = "A required field is missing"),
        (status = 409, description = "A payment is already pending for this phone"),
        (status = 502, description = "Payments backend rejected or failed the STK Push"),
        (status = 503, description = "Service is shutting down"),
    )
)]
pub async fn create_checkout(
    State(state): State<AppState>,
    Json(form): Json<RegistrationForm>,
) -> Result<(StatusCode, Json<CheckoutResponse>), ApiError> {
    let poll = state
        .registry
        .submit(&form)
        .await
        .map_err(|e| ApiError::from_submission(e, &state.offer))?;

    info!(checkout_request_id = %poll.request_id, "Checkout started");
    Ok((
        StatusCode::ACCEPTED,
        Json(CheckoutResponse::from_state(poll, &state.offer)),
    ))
}

/// Current state and visitor-facing message of a checkout.
#[utoipa::path(
    get,
    path = "/v1/checkouts/{checkout_request_id}",
    tag = "Checkout",
    params(("checkout_request_id" = String, Path, description = "Checkout request id")),
    responses(
        (status = 200, description = "Checkout state", body = CheckoutResponse),
        (status = 404, description = "Unknown or cancelled checkout"),
    )
)]
pub async fn get_checkout(
    State(state): State<AppState>,
    Path(checkout_request_id): Path<String>,
) -> Result<Json<CheckoutResponse>, ApiError> {
    let poll = state
        .registry
        .view(&checkout_request_id)
        .ok_or_else(|| ApiError::not_found("Checkout not found"))?;
    Ok(Json(CheckoutResponse::from_state(poll, &state.offer)))
}

/// Stop following a pending checkout.
///
/// The M-Pesa prompt itself cannot be withdrawn; this only stops polling.
#[utoipa::path(
    delete,
    path = "/v1/checkouts/{checkout_request_id}",
    tag = "Checkout",
    params(("checkout_request_id" = String, Path, description = "Checkout request id")),
    responses(
        (status = 204, description = "Polling stopped"),
        (status = 404, description = "No pending checkout with this id"),
    )
)]
pub async fn cancel_checkout(
    State(state): State<AppState>,
    Path(checkout_request_id): Path<String>,
) -> Result<StatusCode, ApiError> {
    state
        .registry
        .cancel(&checkout_request_id)
        .ok_or_else(|| ApiError::not_found("No pending checkout with this id"))?;
    Ok(StatusCode::NO_CONTENT)
}
